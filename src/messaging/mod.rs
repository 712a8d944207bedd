//! # Messaging
//!
//! Pub/sub transport abstraction and the "task ready" notifier built on it.
//! The transport is `{publish(topic, payload), subscribe(topic) -> stream}`;
//! delivery is at-least-once and unordered, and nothing in the store depends
//! on a hint being delivered.

pub mod errors;
pub mod in_memory;
pub mod notifier;

pub use errors::{MessagingError, MessagingResult};
pub use in_memory::InMemoryMessageBus;
pub use notifier::{NotificationStream, TaskNotifier};

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::fmt::Debug;

/// Raw payload stream of one topic subscription
pub type MessageStream = BoxStream<'static, Vec<u8>>;

#[async_trait]
pub trait MessageBus: Send + Sync + Debug + 'static {
    /// Publish `payload` to `topic`. Returns the number of subscribers reached;
    /// zero subscribers is not an error.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> MessagingResult<usize>;

    async fn subscribe(&self, topic: &str) -> MessagingResult<MessageStream>;

    fn provider_name(&self) -> &'static str;
}
