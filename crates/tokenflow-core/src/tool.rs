use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::Error;
use crate::memory::MemoryId;
use crate::message::{ChatMessage, ToolExecutionRequest};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpecification {
    pub name: String,
    pub description: String,
    pub parameters: ToolParameters,
}

impl ToolSpecification {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: ToolParameters::default(),
        }
    }

    pub fn with_parameters(mut self, parameters: ToolParameters) -> Self {
        self.parameters = parameters;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolParameters {
    #[serde(rename = "type")]
    pub schema_type: String,
    #[serde(default)]
    pub properties: HashMap<String, PropertySchema>,
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(rename = "additionalProperties", default)]
    pub additional_properties: bool,
}

impl Default for ToolParameters {
    fn default() -> Self {
        Self {
            schema_type: "object".to_string(),
            properties: HashMap::new(),
            required: Vec::new(),
            additional_properties: false,
        }
    }
}

impl ToolParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_property(
        mut self,
        name: impl Into<String>,
        schema: PropertySchema,
        required: bool,
    ) -> Self {
        let name = name.into();
        self.properties.insert(name.clone(), schema);
        if required {
            self.required.push(name);
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertySchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<PropertySchema>>,
}

impl PropertySchema {
    pub fn string(description: impl Into<String>) -> Self {
        Self {
            schema_type: "string".to_string(),
            description: Some(description.into()),
            enum_values: None,
            default: None,
            items: None,
        }
    }

    pub fn integer(description: impl Into<String>) -> Self {
        Self {
            schema_type: "integer".to_string(),
            description: Some(description.into()),
            enum_values: None,
            default: None,
            items: None,
        }
    }

    pub fn number(description: impl Into<String>) -> Self {
        Self {
            schema_type: "number".to_string(),
            description: Some(description.into()),
            enum_values: None,
            default: None,
            items: None,
        }
    }

    pub fn boolean(description: impl Into<String>) -> Self {
        Self {
            schema_type: "boolean".to_string(),
            description: Some(description.into()),
            enum_values: None,
            default: None,
            items: None,
        }
    }

    pub fn array(description: impl Into<String>, items: PropertySchema) -> Self {
        Self {
            schema_type: "array".to_string(),
            description: Some(description.into()),
            enum_values: None,
            default: None,
            items: Some(Box::new(items)),
        }
    }

    pub fn enum_string(description: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            schema_type: "string".to_string(),
            description: Some(description.into()),
            enum_values: Some(values),
            default: None,
            items: None,
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

/// Runs one tool-execution request on behalf of a conversation and returns
/// the string result fed back to the model.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(
        &self,
        request: &ToolExecutionRequest,
        memory_id: &MemoryId,
    ) -> Result<String, Error>;
}

/// A completed tool invocation: the request the model issued and the result
/// its executor produced.
#[derive(Debug, Clone)]
pub struct ToolExecution {
    pub request: ToolExecutionRequest,
    pub result: String,
}

impl ToolExecution {
    pub fn new(request: ToolExecutionRequest, result: impl Into<String>) -> Self {
        Self {
            request,
            result: result.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ToolProviderRequest {
    pub memory_id: MemoryId,
    pub user_message: ChatMessage,
}

impl ToolProviderRequest {
    pub fn new(memory_id: impl Into<MemoryId>, user_message: ChatMessage) -> Self {
        Self {
            memory_id: memory_id.into(),
            user_message,
        }
    }
}

/// Supplies the tool catalog for one request.
#[async_trait]
pub trait ToolProvider: Send + Sync {
    async fn provide_tools(
        &self,
        request: &ToolProviderRequest,
    ) -> Result<ToolProviderResult, Error>;
}

/// The catalog a provider returns: tool specifications in insertion order,
/// each bound to the executor that will run it. Built once, never mutated.
#[derive(Clone, Default)]
pub struct ToolProviderResult {
    entries: Vec<(ToolSpecification, Arc<dyn ToolExecutor>)>,
}

impl ToolProviderResult {
    pub fn builder() -> ToolProviderResultBuilder {
        ToolProviderResultBuilder {
            entries: Vec::new(),
        }
    }

    pub fn tool_specifications(&self) -> Vec<ToolSpecification> {
        self.entries.iter().map(|(spec, _)| spec.clone()).collect()
    }

    /// Executor lookup table keyed by tool name. On duplicate names the
    /// later entry wins and a warning is logged.
    pub fn executors_by_name(&self) -> HashMap<String, Arc<dyn ToolExecutor>> {
        let mut executors: HashMap<String, Arc<dyn ToolExecutor>> = HashMap::new();
        for (specification, executor) in &self.entries {
            if executors
                .insert(specification.name.clone(), executor.clone())
                .is_some()
            {
                warn!(tool = %specification.name, "Duplicate tool name in catalog, keeping the later entry");
            }
        }
        executors
    }

    pub fn iter(&self) -> impl Iterator<Item = &(ToolSpecification, Arc<dyn ToolExecutor>)> {
        self.entries.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl std::fmt::Debug for ToolProviderResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolProviderResult")
            .field(
                "entries",
                &self
                    .entries
                    .iter()
                    .map(|(spec, _)| spec.name.as_str())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

pub struct ToolProviderResultBuilder {
    entries: Vec<(ToolSpecification, Arc<dyn ToolExecutor>)>,
}

impl ToolProviderResultBuilder {
    pub fn add(mut self, specification: ToolSpecification, executor: Arc<dyn ToolExecutor>) -> Self {
        self.entries.push((specification, executor));
        self
    }

    pub fn build(self) -> ToolProviderResult {
        ToolProviderResult {
            entries: self.entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedExecutor(&'static str);

    #[async_trait]
    impl ToolExecutor for FixedExecutor {
        async fn execute(
            &self,
            _request: &ToolExecutionRequest,
            _memory_id: &MemoryId,
        ) -> Result<String, Error> {
            Ok(self.0.to_string())
        }
    }

    #[test]
    fn test_tool_specification() {
        let spec = ToolSpecification::new("read_file", "Read contents of a file").with_parameters(
            ToolParameters::new().add_property("path", PropertySchema::string("Path to the file"), true),
        );

        assert_eq!(spec.name, "read_file");
        assert!(spec.parameters.required.contains(&"path".to_string()));
    }

    #[test]
    fn test_property_schema() {
        let schema = PropertySchema::string("A test string");
        assert_eq!(schema.schema_type, "string");

        let enum_schema =
            PropertySchema::enum_string("A choice", vec!["a".to_string(), "b".to_string()]);
        assert_eq!(enum_schema.enum_values.unwrap().len(), 2);
    }

    #[test]
    fn test_catalog_preserves_insertion_order() {
        let result = ToolProviderResult::builder()
            .add(ToolSpecification::new("b", ""), Arc::new(FixedExecutor("b")))
            .add(ToolSpecification::new("a", ""), Arc::new(FixedExecutor("a")))
            .build();

        let names: Vec<String> = result
            .tool_specifications()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_duplicate_names_resolve_to_later_entry() {
        let result = ToolProviderResult::builder()
            .add(ToolSpecification::new("sum", ""), Arc::new(FixedExecutor("first")))
            .add(ToolSpecification::new("sum", ""), Arc::new(FixedExecutor("second")))
            .build();

        let executors = result.executors_by_name();
        assert_eq!(executors.len(), 1);

        let request = ToolExecutionRequest::new("call-1", "sum", serde_json::json!({}));
        let output = executors["sum"]
            .execute(&request, &MemoryId::default())
            .await
            .unwrap();
        assert_eq!(output, "second");
    }
}
