use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use tokenflow_core::{
    Error, MemoryId, ToolExecutionRequest, ToolExecutor, ToolProvider, ToolProviderRequest,
    ToolProviderResult, ToolSpecification,
};

use crate::client::McpClient;

/// Observes a client's tool list after discovery, before the tools are
/// added to the catalog. An error counts as that client's failure.
pub trait McpToolsPreInterceptor: Send + Sync {
    fn before_tools_added(
        &self,
        client: &dyn McpClient,
        tools: &[ToolSpecification],
    ) -> Result<(), Error>;
}

/// Observes a client's tool list after all of its tools were added.
/// An error counts as that client's failure.
pub trait McpToolsPostInterceptor: Send + Sync {
    fn after_tools_added(
        &self,
        client: &dyn McpClient,
        tools: &[ToolSpecification],
    ) -> Result<(), Error>;
}

/// Executor bound to the client its tool was discovered on. The binding
/// is fixed when the catalog is built and never rebound.
struct McpClientToolExecutor {
    client: Arc<dyn McpClient>,
}

#[async_trait]
impl ToolExecutor for McpClientToolExecutor {
    async fn execute(
        &self,
        request: &ToolExecutionRequest,
        _memory_id: &MemoryId,
    ) -> Result<String, Error> {
        self.client.execute_tool(request).await
    }
}

/// Tool provider backed by one or more MCP clients.
///
/// Clients are queried in configuration order and each client's tools keep
/// their listing order, so the catalog is reproducible run to run. With
/// `fail_if_one_server_fails` unset, a failing client is logged at warning
/// level and skipped and the catalog carries whatever was collected.
pub struct McpToolProvider {
    mcp_clients: Vec<Arc<dyn McpClient>>,
    fail_if_one_server_fails: bool,
    pre_interceptor: Option<Arc<dyn McpToolsPreInterceptor>>,
    post_interceptor: Option<Arc<dyn McpToolsPostInterceptor>>,
}

impl McpToolProvider {
    pub fn builder() -> McpToolProviderBuilder {
        McpToolProviderBuilder::default()
    }

    /// Lists a client's tools and runs the pre-interceptor over the
    /// result.
    async fn discover(&self, client: &dyn McpClient) -> Result<Vec<ToolSpecification>, Error> {
        let tools = client.list_tools().await?;
        if let Some(interceptor) = &self.pre_interceptor {
            interceptor.before_tools_added(client, &tools)?;
        }
        debug!(client = client.key(), tools = tools.len(), "Discovered MCP tools");
        Ok(tools)
    }

    fn handle_client_failure(&self, client: &dyn McpClient, error: Error) -> Result<(), Error> {
        if self.fail_if_one_server_fails {
            return Err(Error::tool_listing(client.key(), error.to_string()));
        }
        warn!(
            client = client.key(),
            error = %error,
            "Failed to retrieve tools from MCP server, skipping"
        );
        Ok(())
    }
}

#[async_trait]
impl ToolProvider for McpToolProvider {
    async fn provide_tools(
        &self,
        _request: &ToolProviderRequest,
    ) -> Result<ToolProviderResult, Error> {
        let mut builder = ToolProviderResult::builder();

        for client in &self.mcp_clients {
            let tools = match self.discover(client.as_ref()).await {
                Ok(tools) => tools,
                Err(error) => {
                    self.handle_client_failure(client.as_ref(), error)?;
                    continue;
                }
            };

            for specification in &tools {
                builder = builder.add(
                    specification.clone(),
                    Arc::new(McpClientToolExecutor {
                        client: client.clone(),
                    }),
                );
            }

            if let Some(interceptor) = &self.post_interceptor {
                if let Err(error) = interceptor.after_tools_added(client.as_ref(), &tools) {
                    self.handle_client_failure(client.as_ref(), error)?;
                }
            }
        }

        Ok(builder.build())
    }
}

#[derive(Default)]
pub struct McpToolProviderBuilder {
    mcp_clients: Vec<Arc<dyn McpClient>>,
    fail_if_one_server_fails: bool,
    pre_interceptor: Option<Arc<dyn McpToolsPreInterceptor>>,
    post_interceptor: Option<Arc<dyn McpToolsPostInterceptor>>,
}

impl McpToolProviderBuilder {
    /// Replaces the configured clients with the given set.
    pub fn mcp_clients(mut self, clients: impl IntoIterator<Item = Arc<dyn McpClient>>) -> Self {
        self.mcp_clients = clients.into_iter().collect();
        self
    }

    pub fn add_mcp_client(mut self, client: Arc<dyn McpClient>) -> Self {
        self.mcp_clients.push(client);
        self
    }

    pub fn add_pre_interceptor(mut self, interceptor: Arc<dyn McpToolsPreInterceptor>) -> Self {
        self.pre_interceptor = Some(interceptor);
        self
    }

    pub fn add_post_interceptor(mut self, interceptor: Arc<dyn McpToolsPostInterceptor>) -> Self {
        self.post_interceptor = Some(interceptor);
        self
    }

    /// When true, any client failure aborts the whole `provide_tools`
    /// call. Defaults to false: failures are logged and skipped.
    pub fn fail_if_one_server_fails(mut self, fail: bool) -> Self {
        self.fail_if_one_server_fails = fail;
        self
    }

    pub fn build(self) -> McpToolProvider {
        McpToolProvider {
            mcp_clients: self.mcp_clients,
            fail_if_one_server_fails: self.fail_if_one_server_fails,
            pre_interceptor: self.pre_interceptor,
            post_interceptor: self.post_interceptor,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use tokenflow_core::ChatMessage;

    struct FakeClient {
        key: String,
        tools: Vec<ToolSpecification>,
        fail_listing: bool,
    }

    impl FakeClient {
        fn new(key: &str, tool_names: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                key: key.to_string(),
                tools: tool_names
                    .iter()
                    .map(|name| ToolSpecification::new(*name, format!("{} tool", name)))
                    .collect(),
                fail_listing: false,
            })
        }

        fn failing(key: &str) -> Arc<Self> {
            Arc::new(Self {
                key: key.to_string(),
                tools: Vec::new(),
                fail_listing: true,
            })
        }
    }

    #[async_trait]
    impl McpClient for FakeClient {
        fn key(&self) -> &str {
            &self.key
        }

        async fn list_tools(&self) -> Result<Vec<ToolSpecification>, Error> {
            if self.fail_listing {
                return Err(Error::network("connection refused"));
            }
            Ok(self.tools.clone())
        }

        async fn execute_tool(&self, request: &ToolExecutionRequest) -> Result<String, Error> {
            Ok(format!("{}:{}", self.key, request.name))
        }
    }

    #[derive(Default)]
    struct RecordingInterceptor {
        events: Mutex<Vec<String>>,
        fail_pre: bool,
        fail_post: bool,
    }

    impl RecordingInterceptor {
        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    impl McpToolsPreInterceptor for RecordingInterceptor {
        fn before_tools_added(
            &self,
            client: &dyn McpClient,
            tools: &[ToolSpecification],
        ) -> Result<(), Error> {
            self.events
                .lock()
                .unwrap()
                .push(format!("pre:{}:{}", client.key(), tools.len()));
            if self.fail_pre {
                return Err(Error::invalid_request("rejected by policy"));
            }
            Ok(())
        }
    }

    impl McpToolsPostInterceptor for RecordingInterceptor {
        fn after_tools_added(
            &self,
            client: &dyn McpClient,
            tools: &[ToolSpecification],
        ) -> Result<(), Error> {
            self.events
                .lock()
                .unwrap()
                .push(format!("post:{}:{}", client.key(), tools.len()));
            if self.fail_post {
                return Err(Error::invalid_request("rejected by policy"));
            }
            Ok(())
        }
    }

    fn request() -> ToolProviderRequest {
        ToolProviderRequest::new("default", ChatMessage::user("hi"))
    }

    #[tokio::test]
    async fn test_catalog_preserves_client_and_listing_order() {
        let provider = McpToolProvider::builder()
            .add_mcp_client(FakeClient::new("alpha", &["a1", "a2"]))
            .add_mcp_client(FakeClient::new("beta", &["b1"]))
            .build();

        let catalog = provider.provide_tools(&request()).await.unwrap();

        let names: Vec<String> = catalog
            .tool_specifications()
            .into_iter()
            .map(|spec| spec.name)
            .collect();
        assert_eq!(names, vec!["a1", "a2", "b1"]);
        assert_eq!(catalog.len(), 3);
    }

    #[tokio::test]
    async fn test_executor_bound_to_originating_client() {
        let provider = McpToolProvider::builder()
            .mcp_clients(vec![
                FakeClient::new("alpha", &["a1"]) as Arc<dyn McpClient>,
                FakeClient::new("beta", &["b1"]),
            ])
            .build();

        let catalog = provider.provide_tools(&request()).await.unwrap();
        let executors = catalog.executors_by_name();

        let result = executors["b1"]
            .execute(
                &ToolExecutionRequest::new("call-1", "b1", json!({})),
                &MemoryId::default(),
            )
            .await
            .unwrap();
        assert_eq!(result, "beta:b1");

        let result = executors["a1"]
            .execute(
                &ToolExecutionRequest::new("call-2", "a1", json!({})),
                &MemoryId::default(),
            )
            .await
            .unwrap();
        assert_eq!(result, "alpha:a1");
    }

    #[tokio::test]
    async fn test_failing_client_is_skipped_by_default() {
        let interceptor = Arc::new(RecordingInterceptor::default());
        let provider = McpToolProvider::builder()
            .add_mcp_client(FakeClient::new("alpha", &["a1"]))
            .add_mcp_client(FakeClient::failing("beta"))
            .add_mcp_client(FakeClient::new("gamma", &["g1"]))
            .add_pre_interceptor(interceptor.clone())
            .add_post_interceptor(interceptor.clone())
            .build();

        let catalog = provider.provide_tools(&request()).await.unwrap();

        let names: Vec<String> = catalog
            .tool_specifications()
            .into_iter()
            .map(|spec| spec.name)
            .collect();
        assert_eq!(names, vec!["a1", "g1"]);
        // The failing client never reached its hooks; the others did.
        assert_eq!(
            interceptor.events(),
            vec!["pre:alpha:1", "post:alpha:1", "pre:gamma:1", "post:gamma:1"]
        );
    }

    #[tokio::test]
    async fn test_strict_mode_fails_on_first_client_error() {
        let provider = McpToolProvider::builder()
            .add_mcp_client(FakeClient::failing("alpha"))
            .add_mcp_client(FakeClient::new("beta", &["b1"]))
            .fail_if_one_server_fails(true)
            .build();

        let error = provider.provide_tools(&request()).await.unwrap_err();
        assert!(matches!(error, Error::ToolListing { .. }));
        assert!(error.to_string().contains("Failed to list tools from alpha"));
    }

    #[tokio::test]
    async fn test_interceptors_fire_per_client_in_order() {
        let interceptor = Arc::new(RecordingInterceptor::default());
        let provider = McpToolProvider::builder()
            .add_mcp_client(FakeClient::new("alpha", &["a1", "a2"]))
            .add_mcp_client(FakeClient::new("beta", &["b1"]))
            .add_pre_interceptor(interceptor.clone())
            .add_post_interceptor(interceptor.clone())
            .build();

        provider.provide_tools(&request()).await.unwrap();

        assert_eq!(
            interceptor.events(),
            vec!["pre:alpha:2", "post:alpha:2", "pre:beta:1", "post:beta:1"]
        );
    }

    #[tokio::test]
    async fn test_pre_interceptor_error_counts_as_client_failure() {
        let interceptor = Arc::new(RecordingInterceptor {
            fail_pre: true,
            ..Default::default()
        });
        let provider = McpToolProvider::builder()
            .add_mcp_client(FakeClient::new("alpha", &["a1"]))
            .add_pre_interceptor(interceptor.clone())
            .build();

        let catalog = provider.provide_tools(&request()).await.unwrap();
        assert!(catalog.is_empty());

        let strict = McpToolProvider::builder()
            .add_mcp_client(FakeClient::new("alpha", &["a1"]))
            .add_pre_interceptor(interceptor)
            .fail_if_one_server_fails(true)
            .build();
        assert!(strict.provide_tools(&request()).await.is_err());
    }

    #[tokio::test]
    async fn test_post_interceptor_error_keeps_added_tools_when_not_strict() {
        let interceptor = Arc::new(RecordingInterceptor {
            fail_post: true,
            ..Default::default()
        });
        let provider = McpToolProvider::builder()
            .add_mcp_client(FakeClient::new("alpha", &["a1"]))
            .add_post_interceptor(interceptor)
            .build();

        let catalog = provider.provide_tools(&request()).await.unwrap();
        // The client's tools were already committed before the hook ran.
        assert_eq!(catalog.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_client_list_yields_empty_catalog() {
        let provider = McpToolProvider::builder().build();
        let catalog = provider.provide_tools(&request()).await.unwrap();
        assert!(catalog.is_empty());
    }
}
