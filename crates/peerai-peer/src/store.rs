use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::compute::{ChatRole, PromptMessage, TaskRequest};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    pub timestamp_ms: u64,
}

/// Conversation history, keyed by chat session.
pub trait MessageStore: Send + Sync {
    fn append(&self, session: &str, message: ChatMessage);

    /// All messages of a session, oldest first.
    fn list(&self, session: &str) -> Vec<ChatMessage>;

    fn clear_session(&self, session: &str);
}

/// In-memory message store
#[derive(Clone, Default)]
pub struct InMemoryMessageStore {
    /// Messages per chat session: session -> Vec<ChatMessage>
    messages: Arc<DashMap<String, Vec<ChatMessage>>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions with at least one message
    pub fn sessions(&self) -> usize {
        self.messages.len()
    }
}

impl MessageStore for InMemoryMessageStore {
    fn append(&self, session: &str, message: ChatMessage) {
        self.messages
            .entry(session.to_string())
            .or_default()
            .push(message);
    }

    fn list(&self, session: &str) -> Vec<ChatMessage> {
        let mut msgs = self
            .messages
            .get(session)
            .map(|msgs| msgs.clone())
            .unwrap_or_default();
        msgs.sort_by_key(|m| m.timestamp_ms);
        msgs
    }

    fn clear_session(&self, session: &str) {
        self.messages.remove(session);
    }
}

/// Build the request context for a session: history in timestamp order,
/// stored system messages dropped, `system_prompt` first.
pub fn build_request(store: &dyn MessageStore, session: &str, system_prompt: &str) -> TaskRequest {
    let history = store
        .list(session)
        .into_iter()
        .filter(|m| m.role != ChatRole::System)
        .map(|m| PromptMessage {
            role: m.role,
            content: m.content,
        });

    let messages = std::iter::once(PromptMessage {
        role: ChatRole::System,
        content: system_prompt.to_string(),
    })
    .chain(history)
    .collect();

    TaskRequest { messages }
}
