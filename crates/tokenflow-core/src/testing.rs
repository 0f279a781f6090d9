//! Test doubles for exercising streaming flows without a live provider.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::Error;
use crate::message::{ChatMessage, TokenUsage};
use crate::model::{
    ChatRequest, ChatResponse, ChatStream, FinishReason, StreamEvent, StreamingChatModel,
};

/// Scripted model. Each queued script becomes the event stream of one
/// `chat` call, consumed in FIFO order, and every request is captured
/// for later inspection.
#[derive(Default)]
pub struct MockStreamingModel {
    scripts: Mutex<Vec<Vec<Result<StreamEvent, Error>>>>,
    captured_requests: Mutex<Vec<ChatRequest>>,
}

impl MockStreamingModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(self, events: Vec<Result<StreamEvent, Error>>) -> Self {
        self.queue_events(events);
        self
    }

    pub fn queue_events(&self, events: Vec<Result<StreamEvent, Error>>) {
        self.scripts.lock().unwrap().push(events);
    }

    /// Script a stream that fails on its first item.
    pub fn queue_error(&self, error: Error) {
        self.queue_events(vec![Err(error)]);
    }

    pub fn request_count(&self) -> usize {
        self.captured_requests.lock().unwrap().len()
    }

    pub fn captured_requests(&self) -> Vec<ChatRequest> {
        self.captured_requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> Option<ChatRequest> {
        self.captured_requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl StreamingChatModel for MockStreamingModel {
    async fn chat(&self, request: ChatRequest) -> Result<ChatStream, Error> {
        self.captured_requests.lock().unwrap().push(request);
        let script = {
            let mut scripts = self.scripts.lock().unwrap();
            if scripts.is_empty() {
                return Err(Error::stream("no scripted response queued"));
            }
            scripts.remove(0)
        };
        Ok(Box::pin(futures::stream::iter(script)))
    }
}

/// Shorthand for a partial answer event.
pub fn partial(text: &str) -> Result<StreamEvent, Error> {
    Ok(StreamEvent::PartialResponse {
        text: text.to_string(),
    })
}

/// Shorthand for a terminal event carrying the given assistant message.
pub fn complete(message: ChatMessage, usage: TokenUsage) -> Result<StreamEvent, Error> {
    let finish_reason = if message.has_tool_calls() {
        FinishReason::ToolCalls
    } else {
        FinishReason::Stop
    };
    Ok(StreamEvent::CompleteResponse {
        response: ChatResponse {
            message,
            usage,
            model: "mock-model".to_string(),
            finish_reason,
        },
    })
}
