use std::collections::HashMap;
use std::sync::Mutex;

use crate::message::ChatMessage;

/// Opaque handle identifying one conversation's message history.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemoryId(pub String);

impl MemoryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MemoryId {
    fn default() -> Self {
        Self("default".to_string())
    }
}

impl std::fmt::Display for MemoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for MemoryId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for MemoryId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Conversation history keyed by memory id. The dispatcher performs an
/// append-only sequence of writes and full reads; implementations handle
/// their own synchronization and may block.
pub trait ChatMemoryStore: Send + Sync {
    fn append(&self, memory_id: &MemoryId, message: ChatMessage);

    fn messages(&self, memory_id: &MemoryId) -> Vec<ChatMessage>;
}

/// Process-local store backed by a mutex-guarded map. Suitable for tests
/// and single-process applications.
#[derive(Default)]
pub struct InMemoryChatMemoryStore {
    conversations: Mutex<HashMap<MemoryId, Vec<ChatMessage>>>,
}

impl InMemoryChatMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChatMemoryStore for InMemoryChatMemoryStore {
    fn append(&self, memory_id: &MemoryId, message: ChatMessage) {
        let mut conversations = self.conversations.lock().unwrap();
        conversations
            .entry(memory_id.clone())
            .or_default()
            .push(message);
    }

    fn messages(&self, memory_id: &MemoryId) -> Vec<ChatMessage> {
        let conversations = self.conversations.lock().unwrap();
        conversations.get(memory_id).cloned().unwrap_or_default()
    }
}
