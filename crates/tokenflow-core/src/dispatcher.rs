use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use tracing::{debug, warn};

use crate::context::ServiceContext;
use crate::error::Error;
use crate::memory::MemoryId;
use crate::message::{ChatMessage, TokenUsage};
use crate::model::{ChatRequest, ChatResponse, ChatStream, StreamEvent};
use crate::reasoning::{ReasoningClassifier, Routed};
use crate::tool::{ToolExecution, ToolExecutor, ToolSpecification};

pub(crate) struct Callbacks {
    pub(crate) partial_response: Box<dyn Fn(String) + Send + Sync>,
    pub(crate) complete_response: Option<Box<dyn Fn(ChatResponse) + Send + Sync>>,
    pub(crate) error: Option<Box<dyn Fn(Error) + Send + Sync>>,
    pub(crate) tool_executed: Option<Box<dyn Fn(ToolExecution) + Send + Sync>>,
    pub(crate) partial_reasoning: Option<Box<dyn Fn(String) + Send + Sync>>,
    pub(crate) complete_reasoning: Option<Box<dyn Fn(String) + Send + Sync>>,
}

/// Drives one conversation lineage to completion: streams each model turn,
/// routes partial events through the classifier, runs tool rounds against
/// memory and stops at the first turn without tool calls.
///
/// Tool rounds run as iterations of a single loop, so a long chain costs no
/// call-stack depth. Callbacks are invoked serially from this task and never
/// overlap within a lineage.
pub(crate) struct StreamingDispatcher {
    pub(crate) context: ServiceContext,
    pub(crate) memory_id: MemoryId,
    pub(crate) callbacks: Callbacks,
    pub(crate) classifier: ReasoningClassifier,
    pub(crate) tool_specifications: Vec<ToolSpecification>,
    pub(crate) tool_executors: HashMap<String, Arc<dyn ToolExecutor>>,
    /// Fallback history used when the context carries no memory store.
    /// Seeded with the initial request messages, owned by this lineage.
    pub(crate) temporary_memory: Vec<ChatMessage>,
    /// Token usage folded in from every finished turn of this lineage.
    pub(crate) accumulated_usage: TokenUsage,
    pub(crate) max_tool_rounds: Option<u32>,
}

impl StreamingDispatcher {
    pub(crate) async fn dispatch(mut self, initial_request: ChatRequest) {
        let mut request = initial_request;
        let mut round: u32 = 0;

        loop {
            debug!(
                memory_id = %self.memory_id,
                messages = request.messages.len(),
                tools = request.tool_specifications.len(),
                "Dispatching chat request"
            );

            let stream = match self.context.model().chat(request).await {
                Ok(stream) => stream,
                Err(error) => {
                    self.handle_error(error);
                    return;
                }
            };

            let response = match self.drive_stream(stream).await {
                Some(response) => response,
                None => return,
            };

            // The assistant message is remembered whether or not a tool
            // round follows.
            self.append_to_memory(response.message.clone());

            let tool_requests = response.message.tool_calls.clone();
            if tool_requests.is_empty() {
                let usage = self.accumulated_usage.add(&response.usage);
                debug!(
                    memory_id = %self.memory_id,
                    prompt_tokens = usage.prompt_tokens,
                    completion_tokens = usage.completion_tokens,
                    "Conversation complete"
                );
                if let Some(handler) = &self.callbacks.complete_response {
                    handler(ChatResponse { usage, ..response });
                }
                return;
            }

            round += 1;
            if let Some(limit) = self.max_tool_rounds {
                if round > limit {
                    self.handle_error(Error::ToolRoundLimit(limit));
                    return;
                }
            }

            debug!(round, requests = tool_requests.len(), "Executing tool round");
            for tool_request in &tool_requests {
                let executor = match self.tool_executors.get(&tool_request.name) {
                    Some(executor) => executor.clone(),
                    None => {
                        self.handle_error(Error::tool_not_found(&tool_request.name));
                        return;
                    }
                };

                let result = match executor.execute(tool_request, &self.memory_id).await {
                    Ok(result) => result,
                    Err(error) => {
                        self.handle_error(Error::tool_execution(
                            &tool_request.name,
                            error.to_string(),
                        ));
                        return;
                    }
                };

                debug!(tool = %tool_request.name, result_len = result.len(), "Tool executed");
                self.append_to_memory(ChatMessage::tool_result(tool_request, &result));
                if let Some(handler) = &self.callbacks.tool_executed {
                    handler(ToolExecution::new(tool_request.clone(), result));
                }
            }

            self.accumulated_usage = self.accumulated_usage.add(&response.usage);
            request = ChatRequest::new(self.messages_to_send())
                .with_tool_specifications(self.tool_specifications.clone());
        }
    }

    /// Pulls the stream until its complete response. Returns `None` when
    /// the lineage ended through the error path instead.
    async fn drive_stream(&self, mut stream: ChatStream) -> Option<ChatResponse> {
        while let Some(event) = stream.next().await {
            match event {
                Ok(StreamEvent::PartialResponse { text }) => {
                    (self.callbacks.partial_response)(text);
                }
                Ok(StreamEvent::PartialReasoning { text }) => {
                    if let Some(handler) = &self.callbacks.partial_reasoning {
                        handler(text);
                    }
                }
                Ok(StreamEvent::CompleteReasoning { text }) => {
                    if let Some(handler) = &self.callbacks.complete_reasoning {
                        handler(text);
                    }
                }
                Ok(StreamEvent::RawChunk { raw }) => match self.classifier.route(&raw) {
                    Routed::Answer(text) => (self.callbacks.partial_response)(text),
                    Routed::Reasoning(text) => {
                        if let Some(handler) = &self.callbacks.partial_reasoning {
                            handler(text);
                        }
                    }
                    Routed::Ignored => {}
                },
                Ok(StreamEvent::CompleteResponse { response }) => return Some(response),
                Err(error) => {
                    self.handle_error(error);
                    return None;
                }
            }
        }

        self.handle_error(Error::stream(
            "model stream ended without a complete response",
        ));
        None
    }

    fn append_to_memory(&mut self, message: ChatMessage) {
        match self.context.memory_store() {
            Some(store) => store.append(&self.memory_id, message),
            None => self.temporary_memory.push(message),
        }
    }

    fn messages_to_send(&self) -> Vec<ChatMessage> {
        match self.context.memory_store() {
            Some(store) => store.messages(&self.memory_id),
            None => self.temporary_memory.clone(),
        }
    }

    fn handle_error(&self, error: Error) {
        match &self.callbacks.error {
            Some(handler) => handler(error),
            None => warn!(error = %error, "Stream error with no error handler configured"),
        }
    }
}
