//! tokenflow-core: Streaming dispatch engine for tokenflow
//!
//! This crate provides the conversation dispatcher, chat memory, reasoning
//! classification and the token-stream configuration surface used by the
//! tokenflow provider adapters.

pub mod context;
pub mod delta;
mod dispatcher;
pub mod error;
pub mod handler;
pub mod memory;
pub mod message;
pub mod model;
pub mod reasoning;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod token_stream;
pub mod tool;

pub use context::ServiceContext;
pub use delta::{Delta, FunctionCallFragment, RawChunk, ToolCallFragment};
pub use error::Error;
pub use handler::{ReasoningAwareHandler, StreamingResponseHandler};
pub use memory::{ChatMemoryStore, InMemoryChatMemoryStore, MemoryId};
pub use message::{ChatMessage, Content, Role, TokenUsage, ToolExecutionRequest};
pub use model::{
    ChatRequest, ChatResponse, ChatStream, FinishReason, StreamEvent, StreamingChatModel,
};
pub use reasoning::{ExtractionStrategy, ReasoningClassifier, ReasoningDetectorFn, Routed};
pub use token_stream::{TokenStream, TokenStreamParams};
pub use tool::{
    PropertySchema, ToolExecution, ToolExecutor, ToolParameters, ToolProvider,
    ToolProviderRequest, ToolProviderResult, ToolProviderResultBuilder, ToolSpecification,
};

pub type Result<T> = std::result::Result<T, Error>;
