use std::sync::Arc;

use tracing::warn;

use crate::delta::RawChunk;
use crate::error::Error;

/// User-supplied predicate deciding whether a raw chunk carries reasoning.
/// Receives the provider-specific extraction path and the chunk. The path
/// is opaque to this crate; the predicate alone interprets it.
pub type ReasoningDetectorFn = Arc<dyn Fn(&str, &RawChunk) -> Result<bool, Error> + Send + Sync>;

type ExtractFn = Arc<dyn Fn(&RawChunk) -> Option<String> + Send + Sync>;

/// How to pull the reasoning and answer slices out of a raw chunk once it
/// has been classified. The defaults read the chunk's `reasoning_content`
/// (falling back to `reasoning`) and `content` fields.
#[derive(Clone)]
pub struct ExtractionStrategy {
    reasoning: ExtractFn,
    answer: ExtractFn,
}

impl ExtractionStrategy {
    pub fn new(
        reasoning: impl Fn(&RawChunk) -> Option<String> + Send + Sync + 'static,
        answer: impl Fn(&RawChunk) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            reasoning: Arc::new(reasoning),
            answer: Arc::new(answer),
        }
    }

    pub fn reasoning_slice(&self, raw: &RawChunk) -> Option<String> {
        (self.reasoning)(raw)
    }

    pub fn answer_slice(&self, raw: &RawChunk) -> Option<String> {
        (self.answer)(raw)
    }
}

impl Default for ExtractionStrategy {
    fn default() -> Self {
        Self::new(
            |raw| raw.reasoning_content().or_else(|| raw.reasoning()),
            |raw| raw.content(),
        )
    }
}

/// Destination of one classified chunk. Empty slices are dropped, so a
/// chunk yields at most one partial event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routed {
    Reasoning(String),
    Answer(String),
    Ignored,
}

/// Classifies raw chunks into reasoning and answer slices.
///
/// Enabled only when both the detector and the path are present; otherwise
/// every chunk routes through the answer extractor and reasoning is never
/// emitted. A failing detector is logged at warning level and the chunk is
/// handled as a normal answer chunk; the stream keeps going.
#[derive(Clone)]
pub struct ReasoningClassifier {
    detector: Option<ReasoningDetectorFn>,
    path: Option<String>,
    strategy: ExtractionStrategy,
}

impl ReasoningClassifier {
    pub fn disabled() -> Self {
        Self {
            detector: None,
            path: None,
            strategy: ExtractionStrategy::default(),
        }
    }

    pub fn new(detector: ReasoningDetectorFn, path: impl Into<String>) -> Self {
        Self {
            detector: Some(detector),
            path: Some(path.into()),
            strategy: ExtractionStrategy::default(),
        }
    }

    pub fn with_strategy(mut self, strategy: ExtractionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn set_detector(&mut self, detector: ReasoningDetectorFn) {
        self.detector = Some(detector);
    }

    pub fn set_path(&mut self, path: impl Into<String>) {
        self.path = Some(path.into());
    }

    pub fn is_enabled(&self) -> bool {
        self.detector.is_some() && self.path.is_some()
    }

    pub fn route(&self, raw: &RawChunk) -> Routed {
        let is_reasoning = match (&self.detector, &self.path) {
            (Some(detector), Some(path)) => match detector(path, raw) {
                Ok(decision) => decision,
                Err(error) => {
                    warn!(error = %error, "Reasoning detector failed, treating chunk as answer");
                    false
                }
            },
            _ => false,
        };

        if is_reasoning {
            match self
                .strategy
                .reasoning_slice(raw)
                .filter(|text| !text.is_empty())
            {
                Some(text) => Routed::Reasoning(text),
                None => Routed::Ignored,
            }
        } else {
            match self
                .strategy
                .answer_slice(raw)
                .filter(|text| !text.is_empty())
            {
                Some(text) => Routed::Answer(text),
                None => Routed::Ignored,
            }
        }
    }
}
