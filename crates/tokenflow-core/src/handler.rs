use std::sync::Arc;

use crate::delta::RawChunk;
use crate::error::Error;
use crate::model::ChatResponse;
use crate::reasoning::{ExtractionStrategy, ReasoningClassifier, ReasoningDetectorFn, Routed};

/// Terminal sink of one streamed model response.
///
/// The first three methods are the mandatory capabilities; the reasoning
/// methods default to no-ops so plain sinks can ignore that channel.
/// Callbacks for one response are invoked serially and never overlap.
pub trait StreamingResponseHandler: Send + Sync {
    fn on_partial_response(&self, token: String);

    fn on_complete_response(&self, response: ChatResponse);

    fn on_error(&self, error: Error);

    fn on_partial_reasoning(&self, _token: String) {}

    fn on_complete_reasoning(&self, _reasoning: String) {}
}

/// Wraps a base sink with raw-chunk classification: payloads fed to
/// [`process_raw_chunk`](Self::process_raw_chunk) are routed to the base
/// sink's answer or reasoning channel. Everything else delegates.
pub struct ReasoningAwareHandler {
    inner: Arc<dyn StreamingResponseHandler>,
    classifier: ReasoningClassifier,
}

impl ReasoningAwareHandler {
    /// Wraps `inner` with classification disabled; raw chunks route to the
    /// answer channel until a detector and path are set.
    pub fn new(inner: Arc<dyn StreamingResponseHandler>) -> Self {
        Self {
            inner,
            classifier: ReasoningClassifier::disabled(),
        }
    }

    /// Builds a reasoning-aware sink from a base sink, a detector and its
    /// extraction path.
    pub fn from_parts(
        inner: Arc<dyn StreamingResponseHandler>,
        detector: ReasoningDetectorFn,
        path: impl Into<String>,
    ) -> Self {
        Self {
            inner,
            classifier: ReasoningClassifier::new(detector, path),
        }
    }

    pub fn set_reasoning_detector(&mut self, detector: ReasoningDetectorFn) {
        self.classifier.set_detector(detector);
    }

    pub fn set_reasoning_json_path(&mut self, path: impl Into<String>) {
        self.classifier.set_path(path);
    }

    pub fn with_extraction_strategy(mut self, strategy: ExtractionStrategy) -> Self {
        self.classifier = self.classifier.with_strategy(strategy);
        self
    }

    /// Classifies one raw chunk and forwards the extracted slice, if any,
    /// to the matching channel of the base sink.
    pub fn process_raw_chunk(&self, raw: &RawChunk) {
        match self.classifier.route(raw) {
            Routed::Reasoning(text) => self.inner.on_partial_reasoning(text),
            Routed::Answer(text) => self.inner.on_partial_response(text),
            Routed::Ignored => {}
        }
    }
}

impl StreamingResponseHandler for ReasoningAwareHandler {
    fn on_partial_response(&self, token: String) {
        self.inner.on_partial_response(token);
    }

    fn on_complete_response(&self, response: ChatResponse) {
        self.inner.on_complete_response(response);
    }

    fn on_error(&self, error: Error) {
        self.inner.on_error(error);
    }

    fn on_partial_reasoning(&self, token: String) {
        self.inner.on_partial_reasoning(token);
    }

    fn on_complete_reasoning(&self, reasoning: String) {
        self.inner.on_complete_reasoning(reasoning);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::Delta;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<String>>,
    }

    impl RecordingSink {
        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }

        fn push(&self, event: String) {
            self.events.lock().unwrap().push(event);
        }
    }

    impl StreamingResponseHandler for RecordingSink {
        fn on_partial_response(&self, token: String) {
            self.push(format!("answer:{token}"));
        }

        fn on_complete_response(&self, response: ChatResponse) {
            self.push(format!("complete:{}", response.message.content));
        }

        fn on_error(&self, error: Error) {
            self.push(format!("error:{error}"));
        }

        fn on_partial_reasoning(&self, token: String) {
            self.push(format!("reasoning:{token}"));
        }
    }

    fn detector() -> ReasoningDetectorFn {
        Arc::new(|_path: &str, raw: &RawChunk| Ok(raw.reasoning_content().is_some()))
    }

    #[test]
    fn test_process_raw_chunk_routes_to_channels() {
        let sink = Arc::new(RecordingSink::default());
        let handler = ReasoningAwareHandler::from_parts(sink.clone(), detector(), "$.reasoning_content");

        handler.process_raw_chunk(&RawChunk::Delta(Delta::new().with_reasoning_content("think")));
        handler.process_raw_chunk(&RawChunk::Delta(Delta::new().with_content("A")));
        handler.process_raw_chunk(&RawChunk::Delta(Delta::new()));

        assert_eq!(sink.events(), vec!["reasoning:think", "answer:A"]);
    }

    #[test]
    fn test_setters_enable_classification() {
        let sink = Arc::new(RecordingSink::default());
        let mut handler = ReasoningAwareHandler::new(sink.clone());

        let chunk = RawChunk::Delta(Delta::new().with_reasoning_content("think"));
        handler.process_raw_chunk(&chunk);
        assert!(sink.events().is_empty());

        handler.set_reasoning_detector(detector());
        handler.process_raw_chunk(&chunk);
        assert!(sink.events().is_empty());

        handler.set_reasoning_json_path("$.reasoning_content");
        handler.process_raw_chunk(&chunk);
        assert_eq!(sink.events(), vec!["reasoning:think"]);
    }

    #[test]
    fn test_delegation_passes_through() {
        let sink = Arc::new(RecordingSink::default());
        let handler = ReasoningAwareHandler::new(sink.clone());

        handler.on_partial_response("he".to_string());
        handler.on_error(Error::stream("boom"));

        let events = sink.events();
        assert_eq!(events[0], "answer:he");
        assert!(events[1].starts_with("error:"));
    }
}
