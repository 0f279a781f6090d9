use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::delta::RawChunk;
use crate::error::Error;
use crate::message::{ChatMessage, TokenUsage, ToolExecutionRequest};
use crate::tool::ToolSpecification;

pub type ChatStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, Error>> + Send>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tool_specifications: Vec<ToolSpecification>,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            tool_specifications: Vec::new(),
        }
    }

    pub fn with_tool_specifications(mut self, tool_specifications: Vec<ToolSpecification>) -> Self {
        self.tool_specifications = tool_specifications;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// The assistant message for this turn, tool-call requests included.
    pub message: ChatMessage,
    /// Cumulative token usage as reported to the consumer. Within a
    /// tool-round chain the dispatcher rebuilds the terminal response so
    /// this field covers every turn of the chain.
    pub usage: TokenUsage,
    pub model: String,
    pub finish_reason: FinishReason,
}

impl ChatResponse {
    pub fn tool_execution_requests(&self) -> &[ToolExecutionRequest] {
        &self.message.tool_calls
    }

    /// A turn with no tool-call requests ends the conversation.
    pub fn is_terminal(&self) -> bool {
        self.message.tool_calls.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    Error,
}

/// One event of a model response stream.
///
/// `PartialResponse` carries text the client already extracted; `RawChunk`
/// carries the unclassified payload and is routed through the reasoning
/// classifier. A client emits one or the other per chunk, and must finish a
/// successful stream with exactly one `CompleteResponse`.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    PartialResponse { text: String },
    PartialReasoning { text: String },
    CompleteReasoning { text: String },
    RawChunk { raw: RawChunk },
    CompleteResponse { response: ChatResponse },
}

/// Narrow interface to a streaming-capable model client. Transport,
/// authentication and wire codecs live behind implementations.
#[async_trait]
pub trait StreamingChatModel: Send + Sync {
    async fn chat(&self, request: ChatRequest) -> Result<ChatStream, Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_builder() {
        let request = ChatRequest::new(vec![ChatMessage::user("Hello")])
            .with_tool_specifications(vec![ToolSpecification::new("sum", "Add two numbers")]);

        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.tool_specifications.len(), 1);
    }

    #[test]
    fn test_response_terminal_when_no_tool_requests() {
        let response = ChatResponse {
            message: ChatMessage::assistant("hello"),
            usage: TokenUsage::new(5, 2),
            model: "test".to_string(),
            finish_reason: FinishReason::Stop,
        };
        assert!(response.is_terminal());
        assert!(response.tool_execution_requests().is_empty());

        let request = ToolExecutionRequest::new("call-1", "sum", serde_json::json!({}));
        let response = ChatResponse {
            message: ChatMessage::assistant_with_tool_calls("", vec![request]),
            usage: TokenUsage::default(),
            model: "test".to_string(),
            finish_reason: FinishReason::ToolCalls,
        };
        assert!(!response.is_terminal());
        assert_eq!(response.tool_execution_requests().len(), 1);
    }
}
