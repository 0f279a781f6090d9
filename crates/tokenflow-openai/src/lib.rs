//! tokenflow-openai: OpenAI-compatible streaming model client for tokenflow
//!
//! Speaks the `/chat/completions` SSE protocol and turns its wire deltas
//! into the engine's stream events. Works against api.openai.com and any
//! compatible server via [`OpenAIStreamingModel::with_base_url`].

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error};

use tokenflow_core::{
    ChatMessage, ChatRequest, ChatResponse, ChatStream, Delta, Error, FinishReason,
    FunctionCallFragment, RawChunk, Role, StreamEvent, StreamingChatModel, TokenUsage,
    ToolCallFragment, ToolExecutionRequest, ToolSpecification,
};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAIStreamingModel {
    client: Client,
    api_key: String,
    base_url: String,
    model: Option<String>,
}

impl OpenAIStreamingModel {
    pub fn new(api_key: impl Into<String>) -> Self {
        // Configure the client for proper SSE streaming:
        // - Use HTTP/1.1 to avoid HTTP/2 framing issues
        // - Disable automatic decompression which can buffer entire response
        let client = Client::builder()
            .http1_only()
            .no_gzip()
            .no_brotli()
            .no_deflate()
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: None,
        }
    }

    /// Replace the HTTP client, for callers that need proxies or custom TLS.
    /// The default client is already tuned for SSE delivery.
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    fn build_request(&self, request: &ChatRequest) -> OpenAIChatRequest {
        let messages: Vec<OpenAIMessage> = request.messages.iter().map(convert_message).collect();

        let tools = if request.tool_specifications.is_empty() {
            None
        } else {
            Some(
                request
                    .tool_specifications
                    .iter()
                    .map(convert_tool)
                    .collect(),
            )
        };

        OpenAIChatRequest {
            model: self.model.clone(),
            messages,
            stream: true,
            tools,
            stream_options: StreamOptions {
                include_usage: true,
            },
        }
    }

    fn parse_error(&self, status: u16, body: &str) -> Error {
        #[derive(Deserialize)]
        struct ErrorResponse {
            error: ErrorDetail,
        }

        #[derive(Deserialize)]
        struct ErrorDetail {
            message: String,
        }

        if let Ok(err) = serde_json::from_str::<ErrorResponse>(body) {
            match status {
                401 => Error::auth(err.error.message),
                429 => Error::rate_limit(err.error.message),
                400 => Error::invalid_request(err.error.message),
                _ => Error::api(status, err.error.message),
            }
        } else {
            Error::api(status, body.to_string())
        }
    }
}

#[async_trait]
impl StreamingChatModel for OpenAIStreamingModel {
    async fn chat(&self, request: ChatRequest) -> Result<ChatStream, Error> {
        let api_request = self.build_request(&request);
        debug!(
            messages = api_request.messages.len(),
            tools = api_request.tools.as_ref().map_or(0, Vec::len),
            "OpenAI stream request"
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .header("Accept-Encoding", "identity")
            .header("Cache-Control", "no-cache")
            .json(&api_request)
            .send()
            .await
            .map_err(|e| Error::network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(self.parse_error(status.as_u16(), &error_text));
        }

        let (tx, rx) = mpsc::channel::<Result<StreamEvent, Error>>(100);

        tokio::spawn(async move {
            let mut response = response;
            let mut buffer = String::new();
            let mut accumulator = StreamAccumulator::new();

            loop {
                let chunk = match response.chunk().await {
                    Ok(Some(chunk)) => chunk,
                    Ok(None) => break,
                    Err(e) => {
                        let _ = tx.send(Err(Error::network(e.to_string()))).await;
                        return;
                    }
                };

                match std::str::from_utf8(&chunk) {
                    Ok(text) => buffer.push_str(text),
                    Err(_) => {
                        error!("Invalid UTF-8 in SSE stream");
                        continue;
                    }
                }

                // Process complete SSE events (separated by \n\n)
                while let Some(event_end) = buffer.find("\n\n") {
                    let event_data = buffer[..event_end].to_string();
                    buffer = buffer[event_end + 2..].to_string();

                    for line in event_data.lines() {
                        if let Some(data) = line.strip_prefix("data: ") {
                            if data == "[DONE]" {
                                for event in accumulator.finish() {
                                    let _ = tx.send(Ok(event)).await;
                                }
                                return;
                            }

                            for event in accumulator.apply_data(data) {
                                let _ = tx.send(Ok(event)).await;
                            }
                        }
                    }
                }
            }

            // Connection closed without [DONE]. Finalize if the server got
            // as far as a finish reason, otherwise let the consumer see a
            // truncated stream.
            if accumulator.saw_finish_reason() {
                for event in accumulator.finish() {
                    let _ = tx.send(Ok(event)).await;
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

fn convert_message(message: &ChatMessage) -> OpenAIMessage {
    let role = match message.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    };

    let content = if message.content.is_empty() && message.has_tool_calls() {
        None
    } else {
        Some(message.content.clone())
    };

    let tool_calls = if message.tool_calls.is_empty() {
        None
    } else {
        Some(
            message
                .tool_calls
                .iter()
                .map(|tc| OpenAIToolCall {
                    id: tc.id.clone(),
                    r#type: "function".to_string(),
                    function: OpenAIFunctionCall {
                        name: tc.name.clone(),
                        arguments: tc.arguments.to_string(),
                    },
                })
                .collect(),
        )
    };

    OpenAIMessage {
        role: role.to_string(),
        content,
        name: message.name.clone(),
        tool_calls,
        tool_call_id: message.tool_call_id.clone(),
    }
}

fn convert_tool(tool: &ToolSpecification) -> OpenAITool {
    OpenAITool {
        r#type: "function".to_string(),
        function: OpenAIFunction {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: serde_json::to_value(&tool.parameters).unwrap_or_default(),
        },
    }
}

/// Folds wire deltas into the terminal response while handing each one on
/// as a raw chunk, so reasoning classification stays downstream.
struct StreamAccumulator {
    model: String,
    content: String,
    reasoning: String,
    tool_calls: Vec<ToolCallFragment>,
    finish_reason: Option<String>,
    usage: Option<TokenUsage>,
}

impl StreamAccumulator {
    fn new() -> Self {
        Self {
            model: String::new(),
            content: String::new(),
            reasoning: String::new(),
            tool_calls: Vec::new(),
            finish_reason: None,
            usage: None,
        }
    }

    /// Parse one SSE data payload and fold it in. Malformed frames are
    /// logged and dropped; only transport failures become stream errors.
    fn apply_data(&mut self, data: &str) -> Vec<StreamEvent> {
        match serde_json::from_str::<OpenAIStreamChunk>(data) {
            Ok(chunk) => self.apply(chunk),
            Err(e) => {
                error!(error = %e, "Failed to parse SSE message");
                Vec::new()
            }
        }
    }

    fn apply(&mut self, chunk: OpenAIStreamChunk) -> Vec<StreamEvent> {
        if let Some(model) = chunk.model {
            if self.model.is_empty() {
                self.model = model;
            }
        }
        if let Some(usage) = chunk.usage {
            self.usage = Some(TokenUsage::new(usage.prompt_tokens, usage.completion_tokens));
        }

        let mut events = Vec::new();
        for choice in chunk.choices {
            if let Some(reason) = choice.finish_reason {
                self.finish_reason = Some(reason);
            }

            let delta = choice.delta;
            if let Some(content) = delta.content() {
                self.content.push_str(content);
            }
            if let Some(reasoning) = delta.reasoning_content().or(delta.reasoning()) {
                self.reasoning.push_str(reasoning);
            }
            for fragment in delta.tool_calls() {
                self.merge_fragment(fragment);
            }

            events.push(StreamEvent::RawChunk {
                raw: RawChunk::Delta(delta),
            });
        }
        events
    }

    /// Streaming tool calls arrive as indexed fragments: the first carries
    /// the id and name, the rest append argument text.
    fn merge_fragment(&mut self, fragment: &ToolCallFragment) {
        let key = fragment.index.unwrap_or(self.tool_calls.len() as u32);

        if let Some(existing) = self.tool_calls.iter_mut().find(|tc| tc.index == Some(key)) {
            if existing.id.is_none() {
                existing.id = fragment.id.clone();
            }
            if existing.call_type.is_none() {
                existing.call_type = fragment.call_type.clone();
            }
            if let Some(fragment_fn) = &fragment.function {
                let function = existing
                    .function
                    .get_or_insert_with(FunctionCallFragment::default);
                if function.name.is_none() {
                    function.name = fragment_fn.name.clone();
                }
                if let Some(arguments) = &fragment_fn.arguments {
                    function
                        .arguments
                        .get_or_insert_with(String::new)
                        .push_str(arguments);
                }
            }
        } else {
            let mut owned = fragment.clone();
            owned.index = Some(key);
            self.tool_calls.push(owned);
        }
    }

    fn saw_finish_reason(&self) -> bool {
        self.finish_reason.is_some()
    }

    fn finish(self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if !self.reasoning.is_empty() {
            events.push(StreamEvent::CompleteReasoning {
                text: self.reasoning,
            });
        }

        let tool_requests: Vec<ToolExecutionRequest> = self
            .tool_calls
            .into_iter()
            .map(|tc| {
                let (name, arguments) = match tc.function {
                    Some(function) => (
                        function.name.unwrap_or_default(),
                        function.arguments.unwrap_or_default(),
                    ),
                    None => (String::new(), String::new()),
                };
                ToolExecutionRequest::new(
                    tc.id.unwrap_or_default(),
                    name,
                    serde_json::from_str(&arguments).unwrap_or_default(),
                )
            })
            .collect();

        let message = if tool_requests.is_empty() {
            ChatMessage::assistant(self.content)
        } else {
            ChatMessage::assistant_with_tool_calls(self.content, tool_requests)
        };

        let finish_reason = match self.finish_reason.as_deref() {
            Some("stop") => FinishReason::Stop,
            Some("length") => FinishReason::Length,
            Some("tool_calls") => FinishReason::ToolCalls,
            Some("content_filter") => FinishReason::ContentFilter,
            _ => FinishReason::Stop,
        };

        events.push(StreamEvent::CompleteResponse {
            response: ChatResponse {
                message,
                usage: self.usage.unwrap_or_default(),
                model: self.model,
                finish_reason,
            },
        });
        events
    }
}

// OpenAI API types

#[derive(Debug, Serialize)]
struct OpenAIChatRequest {
    /// Model to use. Optional for servers that have a default model.
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    messages: Vec<OpenAIMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAITool>>,
    stream_options: StreamOptions,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAIToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct OpenAIToolCall {
    id: String,
    r#type: String,
    function: OpenAIFunctionCall,
}

#[derive(Debug, Serialize)]
struct OpenAIFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize)]
struct OpenAITool {
    r#type: String,
    function: OpenAIFunction,
}

#[derive(Debug, Serialize)]
struct OpenAIFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

/// One parsed SSE payload. The choice delta reuses the engine's wire
/// `Delta`, which already tolerates unknown fields.
#[derive(Debug, Deserialize)]
struct OpenAIStreamChunk {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<OpenAIStreamChoice>,
    #[serde(default)]
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamChoice {
    delta: Delta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}
