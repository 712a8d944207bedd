//! # Task Notifier
//!
//! Publishes a [`QueryTaskNotification`] on `{topic_prefix}.{pool}` whenever
//! a task enters READY. Announcing is best-effort: the store logs and
//! continues when the bus is unavailable, and idle workers still find the
//! work through `get_query`.

use super::{MessageBus, MessagingError, MessagingResult};
use crate::config::NotificationConfig;
use crate::models::QueryTaskNotification;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::sync::Arc;
use tracing::{debug, warn};

pub type NotificationStream = BoxStream<'static, QueryTaskNotification>;

#[derive(Debug, Clone)]
pub struct TaskNotifier {
    bus: Option<Arc<dyn MessageBus>>,
    topic_prefix: String,
}

impl TaskNotifier {
    pub fn new(bus: Arc<dyn MessageBus>, config: &NotificationConfig) -> Self {
        Self {
            bus: config.enabled.then_some(bus),
            topic_prefix: config.topic_prefix.clone(),
        }
    }

    /// A notifier that never publishes
    pub fn disabled() -> Self {
        Self {
            bus: None,
            topic_prefix: String::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.bus.is_some()
    }

    pub fn topic_for_pool(&self, pool: &str) -> String {
        format!("{}.{}", self.topic_prefix, pool)
    }

    /// Publish one hint. Returns the number of subscribers reached.
    pub async fn announce(&self, notification: &QueryTaskNotification) -> MessagingResult<usize> {
        let Some(bus) = &self.bus else {
            return Ok(0);
        };
        let topic = self.topic_for_pool(&notification.query_pool);
        let payload = serde_json::to_vec(notification)?;
        let reached = bus.publish(&topic, payload).await?;
        debug!(
            topic = %topic,
            task_id = %notification.task_id,
            query_id = %notification.query_id,
            subscribers = reached,
            "📣 Announced ready task"
        );
        Ok(reached)
    }

    /// Stream of decoded hints for `pool`. Undecodable payloads are dropped.
    pub async fn subscribe(&self, pool: &str) -> MessagingResult<NotificationStream> {
        let Some(bus) = &self.bus else {
            return Err(MessagingError::Disabled);
        };
        let topic = self.topic_for_pool(pool);
        let raw = bus.subscribe(&topic).await?;

        let stream = raw.filter_map(move |payload| {
            let topic = topic.clone();
            async move {
                match serde_json::from_slice::<QueryTaskNotification>(&payload) {
                    Ok(notification) => Some(notification),
                    Err(e) => {
                        warn!(topic = %topic, error = %e, "Dropping undecodable task notification");
                        None
                    }
                }
            }
        });

        Ok(stream.boxed())
    }
}
