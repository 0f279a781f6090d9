use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::context::ServiceContext;
use crate::dispatcher::{Callbacks, StreamingDispatcher};
use crate::error::Error;
use crate::memory::MemoryId;
use crate::message::{ChatMessage, Content, TokenUsage};
use crate::model::{ChatRequest, ChatResponse};
use crate::reasoning::{ExtractionStrategy, ReasoningClassifier, ReasoningDetectorFn};
use crate::tool::{ToolExecution, ToolExecutor, ToolProviderResult, ToolSpecification};

/// Everything a token stream needs besides its callbacks: the service
/// context, the conversation seed and the tool catalog.
pub struct TokenStreamParams {
    context: ServiceContext,
    memory_id: MemoryId,
    messages: Vec<ChatMessage>,
    tool_specifications: Vec<ToolSpecification>,
    tool_executors: HashMap<String, Arc<dyn ToolExecutor>>,
    retrieved_contents: Vec<Content>,
    max_tool_rounds: Option<u32>,
}

impl TokenStreamParams {
    pub fn new(
        context: ServiceContext,
        memory_id: impl Into<MemoryId>,
        messages: Vec<ChatMessage>,
    ) -> Self {
        Self {
            context,
            memory_id: memory_id.into(),
            messages,
            tool_specifications: Vec::new(),
            tool_executors: HashMap::new(),
            retrieved_contents: Vec::new(),
            max_tool_rounds: None,
        }
    }

    pub fn with_tool_specifications(mut self, tool_specifications: Vec<ToolSpecification>) -> Self {
        self.tool_specifications = tool_specifications;
        self
    }

    pub fn with_tool_executors(
        mut self,
        tool_executors: HashMap<String, Arc<dyn ToolExecutor>>,
    ) -> Self {
        self.tool_executors = tool_executors;
        self
    }

    /// Adopts a provider catalog wholesale: its specifications become the
    /// request tools and its executors the dispatch map.
    pub fn with_tool_provider_result(mut self, result: ToolProviderResult) -> Self {
        self.tool_specifications = result.tool_specifications();
        self.tool_executors = result.executors_by_name();
        self
    }

    pub fn with_retrieved_contents(mut self, contents: Vec<Content>) -> Self {
        self.retrieved_contents = contents;
        self
    }

    /// Caps the number of tool rounds a single conversation may run.
    /// Unlimited when unset.
    pub fn with_max_tool_rounds(mut self, limit: u32) -> Self {
        self.max_tool_rounds = Some(limit);
        self
    }
}

/// How often each counted setter has been invoked. Validated as a whole
/// when the stream starts, so misconfiguration surfaces as one error
/// rather than panicking mid-flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct HandlerCounts {
    on_partial_response: u32,
    on_complete_response: u32,
    on_retrieved: u32,
    on_tool_executed: u32,
    on_error: u32,
    ignore_errors: u32,
}

impl HandlerCounts {
    fn validate(&self) -> Result<(), Error> {
        if self.on_partial_response != 1 {
            return Err(Self::exactly_once(
                "on_partial_response",
                self.on_partial_response,
            ));
        }
        if self.on_complete_response > 1 {
            return Err(Self::at_most_once(
                "on_complete_response",
                self.on_complete_response,
            ));
        }
        if self.on_retrieved > 1 {
            return Err(Self::at_most_once("on_retrieved", self.on_retrieved));
        }
        if self.on_tool_executed > 1 {
            return Err(Self::at_most_once("on_tool_executed", self.on_tool_executed));
        }
        if self.on_error + self.ignore_errors != 1 {
            return Err(Self::exactly_once(
                "one of on_error or ignore_errors",
                self.on_error + self.ignore_errors,
            ));
        }
        Ok(())
    }

    fn exactly_once(name: &str, count: u32) -> Error {
        Error::illegal_configuration(format!(
            "{} must be invoked on TokenStream exactly 1 time, but was invoked {} times",
            name, count
        ))
    }

    fn at_most_once(name: &str, count: u32) -> Error {
        Error::illegal_configuration(format!(
            "{} can be invoked on TokenStream at most 1 time, but was invoked {} times",
            name, count
        ))
    }
}

/// Fluent configuration for one streamed conversation.
///
/// Callback setters return the stream, so a conversation reads as one
/// chain ending in [`TokenStream::start`]. Counted setters must respect
/// the invariants checked there; the reasoning setters are exempt from
/// counting and may be reconfigured freely before launch. `start`
/// consumes the stream, so it cannot be launched twice.
pub struct TokenStream {
    params: TokenStreamParams,
    counts: HandlerCounts,
    partial_response: Option<Box<dyn Fn(String) + Send + Sync>>,
    complete_response: Option<Box<dyn Fn(ChatResponse) + Send + Sync>>,
    error: Option<Box<dyn Fn(Error) + Send + Sync>>,
    retrieved: Option<Box<dyn Fn(Vec<Content>) + Send + Sync>>,
    tool_executed: Option<Box<dyn Fn(ToolExecution) + Send + Sync>>,
    partial_reasoning: Option<Box<dyn Fn(String) + Send + Sync>>,
    complete_reasoning: Option<Box<dyn Fn(String) + Send + Sync>>,
    classifier: ReasoningClassifier,
}

impl TokenStream {
    pub fn new(params: TokenStreamParams) -> Self {
        Self {
            params,
            counts: HandlerCounts::default(),
            partial_response: None,
            complete_response: None,
            error: None,
            retrieved: None,
            tool_executed: None,
            partial_reasoning: None,
            complete_reasoning: None,
            classifier: ReasoningClassifier::disabled(),
        }
    }

    /// Handler for each answer token. Required, exactly once.
    pub fn on_partial_response(
        mut self,
        handler: impl Fn(String) + Send + Sync + 'static,
    ) -> Self {
        self.counts.on_partial_response += 1;
        self.partial_response = Some(Box::new(handler));
        self
    }

    /// Handler for the final response of the conversation, invoked after
    /// any tool rounds have run.
    pub fn on_complete_response(
        mut self,
        handler: impl Fn(ChatResponse) + Send + Sync + 'static,
    ) -> Self {
        self.counts.on_complete_response += 1;
        self.complete_response = Some(Box::new(handler));
        self
    }

    /// Handler for the retrieved contents that augmented the user message,
    /// invoked before the first model call.
    pub fn on_retrieved(
        mut self,
        handler: impl Fn(Vec<Content>) + Send + Sync + 'static,
    ) -> Self {
        self.counts.on_retrieved += 1;
        self.retrieved = Some(Box::new(handler));
        self
    }

    /// Handler invoked after each tool execution with the request and its
    /// result.
    pub fn on_tool_executed(
        mut self,
        handler: impl Fn(ToolExecution) + Send + Sync + 'static,
    ) -> Self {
        self.counts.on_tool_executed += 1;
        self.tool_executed = Some(Box::new(handler));
        self
    }

    /// Handler for stream and tool errors. Mutually exclusive with
    /// [`TokenStream::ignore_errors`].
    pub fn on_error(mut self, handler: impl Fn(Error) + Send + Sync + 'static) -> Self {
        self.counts.on_error += 1;
        self.error = Some(Box::new(handler));
        self
    }

    /// Declares that errors are intentionally unhandled. They are logged
    /// at warning level instead.
    pub fn ignore_errors(mut self) -> Self {
        self.counts.ignore_errors += 1;
        self.error = None;
        self
    }

    /// Handler for reasoning tokens. Not counted towards validation.
    pub fn on_partial_reasoning(
        mut self,
        handler: impl Fn(String) + Send + Sync + 'static,
    ) -> Self {
        self.partial_reasoning = Some(Box::new(handler));
        self
    }

    /// Handler for the aggregated reasoning text of a turn. Not counted
    /// towards validation.
    pub fn on_complete_reasoning(
        mut self,
        handler: impl Fn(String) + Send + Sync + 'static,
    ) -> Self {
        self.complete_reasoning = Some(Box::new(handler));
        self
    }

    /// Enables reasoning classification for raw chunks. The detector and
    /// its path hint are set together, so the classifier is never half
    /// configured. Not counted towards validation.
    pub fn with_reasoning_detector(
        mut self,
        detector: ReasoningDetectorFn,
        path: impl Into<String>,
    ) -> Self {
        self.classifier.set_detector(detector);
        self.classifier.set_path(path);
        self
    }

    /// Replaces how reasoning and answer text are pulled out of raw
    /// chunks. Not counted towards validation.
    pub fn with_extraction_strategy(mut self, strategy: ExtractionStrategy) -> Self {
        self.classifier = self.classifier.with_strategy(strategy);
        self
    }

    /// Validates the configuration and launches the conversation.
    ///
    /// Returns once the initial request has been handed to the model
    /// client; all subsequent events arrive through the configured
    /// handlers. Misconfiguration fails here, before any I/O. Must be
    /// called from within a Tokio runtime.
    pub fn start(self) -> Result<(), Error> {
        self.counts.validate()?;
        if self.params.messages.is_empty() {
            return Err(Error::illegal_configuration("messages must not be empty"));
        }

        let partial_response = self
            .partial_response
            .ok_or_else(|| HandlerCounts::exactly_once("on_partial_response", 0))?;

        let request = ChatRequest::new(self.params.messages.clone())
            .with_tool_specifications(self.params.tool_specifications.clone());

        let temporary_memory = if self.params.context.has_memory_store() {
            Vec::new()
        } else {
            self.params.messages
        };

        let dispatcher = StreamingDispatcher {
            context: self.params.context,
            memory_id: self.params.memory_id,
            callbacks: Callbacks {
                partial_response,
                complete_response: self.complete_response,
                error: self.error,
                tool_executed: self.tool_executed,
                partial_reasoning: self.partial_reasoning,
                complete_reasoning: self.complete_reasoning,
            },
            classifier: self.classifier,
            tool_specifications: self.params.tool_specifications,
            tool_executors: self.params.tool_executors,
            temporary_memory,
            accumulated_usage: TokenUsage::default(),
            max_tool_rounds: self.params.max_tool_rounds,
        };

        if let Some(handler) = &self.retrieved {
            if !self.params.retrieved_contents.is_empty() {
                handler(self.params.retrieved_contents);
            }
        }

        debug!(memory_id = %dispatcher.memory_id, "Starting token stream");
        tokio::spawn(dispatcher.dispatch(request));
        Ok(())
    }
}
