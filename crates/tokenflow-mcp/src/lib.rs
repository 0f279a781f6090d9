//! tokenflow-mcp: MCP-backed tool catalogs for tokenflow
//!
//! This crate aggregates the tools of one or more MCP server connections
//! into a single tool-provider catalog, with each discovered tool bound to
//! the client it came from.

pub mod client;
pub mod provider;

pub use client::McpClient;
pub use provider::{
    McpToolProvider, McpToolProviderBuilder, McpToolsPostInterceptor, McpToolsPreInterceptor,
};
