use async_trait::async_trait;
use tokenflow_core::{Error, ToolExecutionRequest, ToolSpecification};

/// Minimal contract for one MCP server connection.
///
/// Implement this for the MCP client library of your choice; the provider
/// needs only discovery and execution, so the protocol dependency stays in
/// your code. Implementations must be shareable across tasks.
#[async_trait]
pub trait McpClient: Send + Sync {
    /// Stable identifier for this connection, used in logs and errors.
    fn key(&self) -> &str;

    /// Lists the tools currently exposed by the server.
    async fn list_tools(&self) -> Result<Vec<ToolSpecification>, Error>;

    /// Executes one tool call and returns its text result.
    async fn execute_tool(&self, request: &ToolExecutionRequest) -> Result<String, Error>;
}
