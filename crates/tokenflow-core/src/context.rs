use std::sync::Arc;

use crate::memory::ChatMemoryStore;
use crate::model::StreamingChatModel;

/// Shared collaborators for a conversational service: the streaming model
/// client and, optionally, a durable chat memory store. Cheap to clone.
#[derive(Clone)]
pub struct ServiceContext {
    model: Arc<dyn StreamingChatModel>,
    memory_store: Option<Arc<dyn ChatMemoryStore>>,
}

impl ServiceContext {
    pub fn new(model: Arc<dyn StreamingChatModel>) -> Self {
        Self {
            model,
            memory_store: None,
        }
    }

    pub fn with_memory_store(mut self, store: Arc<dyn ChatMemoryStore>) -> Self {
        self.memory_store = Some(store);
        self
    }

    pub fn model(&self) -> &Arc<dyn StreamingChatModel> {
        &self.model
    }

    pub fn memory_store(&self) -> Option<&Arc<dyn ChatMemoryStore>> {
        self.memory_store.as_ref()
    }

    pub fn has_memory_store(&self) -> bool {
        self.memory_store.is_some()
    }
}
