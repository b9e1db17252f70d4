//! Compute capability and the payloads exchanged over the direct channel.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Sent back in place of a reply when local inference fails.
pub const FALLBACK_REPLY: &str = "An error occurred while processing your request.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One turn of the conversation as handed to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: ChatRole,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRequest {
    pub messages: Vec<PromptMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskReply {
    pub reply: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskReply {
    pub fn ok(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            error: None,
        }
    }

    pub fn failed(cause: &ComputeError) -> Self {
        Self {
            reply: FALLBACK_REPLY.to_string(),
            error: Some(cause.to_string()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("model unavailable: {0}")]
    Unavailable(String),
    #[error("inference failed: {0}")]
    Failed(String),
}

/// Local inference engine. Opaque to the session logic.
#[async_trait]
pub trait Compute: Send + Sync {
    async fn compute(&self, request: TaskRequest) -> Result<String, ComputeError>;
}
