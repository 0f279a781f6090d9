use serde::{Deserialize, Serialize};

/// One streamed chunk of a model response as it appears on the wire:
/// optional answer text, reasoning text under two provider aliases, and
/// tool-call fragments. Values are read-only once constructed; unknown wire
/// fields are ignored and nulls map to absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Delta {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    tool_calls: Vec<ToolCallFragment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCallFragment>,
}

impl Delta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_reasoning_content(mut self, reasoning_content: impl Into<String>) -> Self {
        self.reasoning_content = Some(reasoning_content.into());
        self
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }

    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCallFragment>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    pub fn with_function_call(mut self, function_call: FunctionCallFragment) -> Self {
        self.function_call = Some(function_call);
        self
    }

    pub fn role(&self) -> Option<&str> {
        self.role.as_deref()
    }

    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    pub fn reasoning_content(&self) -> Option<&str> {
        self.reasoning_content.as_deref()
    }

    pub fn reasoning(&self) -> Option<&str> {
        self.reasoning.as_deref()
    }

    pub fn tool_calls(&self) -> &[ToolCallFragment] {
        &self.tool_calls
    }

    pub fn function_call(&self) -> Option<&FunctionCallFragment> {
        self.function_call.as_ref()
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// A fragment of one tool call. Streaming providers spread a single call
/// over several chunks keyed by `index`; `arguments` text concatenates
/// across fragments and may be incomplete JSON until the call is done.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToolCallFragment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub call_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<FunctionCallFragment>,
}

/// Legacy single-function call form, kept for providers that still emit
/// `function_call` instead of `tool_calls`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionCallFragment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

/// Raw payload handed to the reasoning classifier. Providers that parse
/// their wire format supply `Delta`; others can hand over loose JSON or
/// untouched bytes and still get field access on a best-effort basis.
#[derive(Debug, Clone, PartialEq)]
pub enum RawChunk {
    Delta(Delta),
    Json(serde_json::Value),
    Bytes(Vec<u8>),
}

impl RawChunk {
    pub fn content(&self) -> Option<String> {
        self.text_field("content", |d| d.content())
    }

    pub fn reasoning_content(&self) -> Option<String> {
        self.text_field("reasoning_content", |d| d.reasoning_content())
    }

    pub fn reasoning(&self) -> Option<String> {
        self.text_field("reasoning", |d| d.reasoning())
    }

    pub fn as_delta(&self) -> Option<&Delta> {
        match self {
            RawChunk::Delta(delta) => Some(delta),
            _ => None,
        }
    }

    fn text_field(&self, key: &str, get: impl Fn(&Delta) -> Option<&str>) -> Option<String> {
        match self {
            RawChunk::Delta(delta) => get(delta).map(str::to_owned),
            RawChunk::Json(value) => value
                .get(key)
                .and_then(|v| v.as_str())
                .map(str::to_owned),
            RawChunk::Bytes(bytes) => serde_json::from_slice::<Delta>(bytes)
                .ok()
                .and_then(|delta| get(&delta).map(str::to_owned)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_deserialize_snake_case_fields() {
        let delta: Delta = serde_json::from_str(
            r#"{"role":"assistant","content":"hi","reasoning_content":"think","reasoning":null}"#,
        )
        .unwrap();
        assert_eq!(delta.role(), Some("assistant"));
        assert_eq!(delta.content(), Some("hi"));
        assert_eq!(delta.reasoning_content(), Some("think"));
        assert_eq!(delta.reasoning(), None);
        assert!(delta.tool_calls().is_empty());
    }

    #[test]
    fn test_deserialize_ignores_unknown_fields() {
        let delta: Delta =
            serde_json::from_str(r#"{"content":"hi","logprobs":null,"refusal":"no"}"#).unwrap();
        assert_eq!(delta.content(), Some("hi"));
    }

    #[test]
    fn test_deserialize_tool_call_fragments() {
        let delta: Delta = serde_json::from_str(
            r#"{"tool_calls":[{"index":0,"id":"call-1","type":"function","function":{"name":"sum","arguments":"{\"a\""}}]}"#,
        )
        .unwrap();
        let calls = delta.tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].index, Some(0));
        assert_eq!(calls[0].id.as_deref(), Some("call-1"));
        assert_eq!(calls[0].call_type.as_deref(), Some("function"));
        let function = calls[0].function.as_ref().unwrap();
        assert_eq!(function.name.as_deref(), Some("sum"));
        assert_eq!(function.arguments.as_deref(), Some("{\"a\""));
    }

    #[test]
    fn test_deserialize_legacy_function_call() {
        let delta: Delta = serde_json::from_str(
            r#"{"function_call":{"name":"sum","arguments":"{}"}}"#,
        )
        .unwrap();
        let call = delta.function_call().unwrap();
        assert_eq!(call.name.as_deref(), Some("sum"));
        assert!(delta.tool_calls().is_empty());
    }

    #[test]
    fn test_serialize_skips_absent_fields() {
        let json = serde_json::to_string(&Delta::new().with_content("hi")).unwrap();
        assert_eq!(json, r#"{"content":"hi"}"#);
    }

    #[test]
    fn test_structural_equality_and_hash() {
        let a = Delta::new().with_role("assistant").with_content("hi");
        let b = Delta::new().with_role("assistant").with_content("hi");
        let c = Delta::new().with_role("assistant").with_content("bye");
        assert_eq!(a, b);
        assert_ne!(a, c);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
        assert!(!set.contains(&c));
    }

    #[test]
    fn test_raw_chunk_delta_fields() {
        let raw = RawChunk::Delta(Delta::new().with_reasoning_content("think"));
        assert_eq!(raw.reasoning_content().as_deref(), Some("think"));
        assert_eq!(raw.content(), None);
    }

    #[test]
    fn test_raw_chunk_json_fields() {
        let raw = RawChunk::Json(serde_json::json!({"content": "hi", "extra": 1}));
        assert_eq!(raw.content().as_deref(), Some("hi"));
        assert_eq!(raw.reasoning(), None);
    }

    #[test]
    fn test_raw_chunk_bytes_parse() {
        let raw = RawChunk::Bytes(br#"{"reasoning":"think"}"#.to_vec());
        assert_eq!(raw.reasoning().as_deref(), Some("think"));

        let garbage = RawChunk::Bytes(b"not json".to_vec());
        assert_eq!(garbage.content(), None);
    }
}
