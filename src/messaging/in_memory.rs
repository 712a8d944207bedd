//! # In-Memory Message Bus
//!
//! Topic fan-out over `tokio::sync::broadcast`, for testing and single
//! process deployments. Subscribers that fall behind skip the lagged
//! messages; the store never relies on a hint being delivered.

use super::{MessageBus, MessageStream, MessagingError, MessagingResult};
use crate::constants::system;
use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::warn;

#[derive(Debug)]
pub struct InMemoryMessageBus {
    topics: DashMap<String, broadcast::Sender<Vec<u8>>>,
    capacity: usize,
    published: AtomicU64,
}

impl Default for InMemoryMessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryMessageBus {
    pub fn new() -> Self {
        Self::with_capacity(system::DEFAULT_BUS_CAPACITY)
    }

    /// `capacity` is the per-topic backlog a slow subscriber may lag behind
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            topics: DashMap::new(),
            capacity: capacity.max(1),
            published: AtomicU64::new(0),
        }
    }

    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    fn sender(&self, topic: &str) -> broadcast::Sender<Vec<u8>> {
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

fn validate_topic(topic: &str) -> MessagingResult<()> {
    if topic.trim().is_empty() {
        return Err(MessagingError::InvalidTopic {
            topic: topic.to_string(),
            reason: "topic must not be empty".to_string(),
        });
    }
    Ok(())
}

#[async_trait]
impl MessageBus for InMemoryMessageBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> MessagingResult<usize> {
        validate_topic(topic)?;
        self.published.fetch_add(1, Ordering::Relaxed);
        // send only fails when nobody is subscribed
        Ok(self.sender(topic).send(payload).unwrap_or(0))
    }

    async fn subscribe(&self, topic: &str) -> MessagingResult<MessageStream> {
        validate_topic(topic)?;
        let receiver = self.sender(topic).subscribe();
        let topic = topic.to_string();

        let stream = futures::stream::unfold(receiver, move |mut receiver| {
            let topic = topic.clone();
            async move {
                loop {
                    match receiver.recv().await {
                        Ok(payload) => return Some((payload, receiver)),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(topic = %topic, skipped = skipped, "Subscriber lagged, skipping notifications");
                        }
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            }
        });

        Ok(stream.boxed())
    }

    fn provider_name(&self) -> &'static str {
        "in_memory"
    }
}
