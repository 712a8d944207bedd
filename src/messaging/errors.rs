//! # Messaging Error Types
//!
//! Structured errors for the pub/sub bus and the task notifier.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MessagingError {
    #[error("Message serialization error: {message}")]
    MessageSerialization { message: String },

    #[error("Message deserialization error: {message}")]
    MessageDeserialization { message: String },

    #[error("Publish to topic {topic} failed: {message}")]
    Publish { topic: String, message: String },

    #[error("Subscription to topic {topic} failed: {message}")]
    Subscription { topic: String, message: String },

    #[error("Invalid topic name: {topic}: {reason}")]
    InvalidTopic { topic: String, reason: String },

    #[error("Notifications are disabled")]
    Disabled,

    #[error("Internal messaging error: {message}")]
    Internal { message: String },
}

impl MessagingError {
    pub fn publish(topic: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Publish {
            topic: topic.into(),
            message: message.into(),
        }
    }

    pub fn subscription(topic: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Subscription {
            topic: topic.into(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for MessagingError {
    fn from(error: serde_json::Error) -> Self {
        Self::MessageSerialization {
            message: error.to_string(),
        }
    }
}

pub type MessagingResult<T> = Result<T, MessagingError>;
