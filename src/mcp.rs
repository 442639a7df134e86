//! MCP JSON-RPC bridge over stdio.
//!
//! Exposes every tool in the [`ToolRegistry`] through `list_tools` /
//! `call_tool`. Tool failures are returned as error results carrying the
//! same `{ code, message }` body the HTTP transport uses; only an unknown
//! tool name is a protocol-level error.

use std::borrow::Cow;
use std::sync::Arc;

use anyhow::{Context, Result};
use rmcp::model::*;
use rmcp::{ErrorData as McpError, ServerHandler, ServiceExt};

use crate::error::as_tool_error;
use crate::traits::{ToolContext, ToolRegistry};

/// Each MCP session gets a clone; everything is behind `Arc`.
#[derive(Clone)]
pub struct McpBridge {
    ctx: ToolContext,
    tools: Arc<ToolRegistry>,
}

impl McpBridge {
    pub fn new(ctx: ToolContext, tools: Arc<ToolRegistry>) -> Self {
        Self { ctx, tools }
    }

    fn to_mcp_tool(tool: &dyn crate::traits::Tool) -> Tool {
        let input_schema: Arc<serde_json::Map<String, serde_json::Value>> =
            match tool.parameters_schema() {
                serde_json::Value::Object(map) => Arc::new(map),
                _ => Arc::new(serde_json::Map::new()),
            };

        Tool {
            name: Cow::Owned(tool.name().to_string()),
            title: None,
            description: Some(Cow::Owned(tool.description().to_string())),
            input_schema,
            output_schema: None,
            annotations: Some(ToolAnnotations::new().read_only(true)),
            execution: None,
            icons: None,
            meta: None,
        }
    }
}

/// Serve the bridge on stdin/stdout until the client disconnects.
pub async fn serve_stdio(bridge: McpBridge) -> Result<()> {
    tracing::info!(tools = bridge.tools.len(), "serving MCP over stdio");
    let service = bridge
        .serve(rmcp::transport::stdio())
        .await
        .context("Failed to start MCP stdio transport")?;
    service.waiting().await?;
    Ok(())
}

/// JSON body for a failed tool call, shared with the HTTP transport.
pub fn error_body(err: &anyhow::Error) -> serde_json::Value {
    let code = as_tool_error(err).map(|e| e.code()).unwrap_or("tool_error");
    serde_json::json!({ "error": { "code": code, "message": format!("{:#}", err) } })
}

impl ServerHandler for McpBridge {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "workspace-mcp".to_string(),
                title: Some("Workspace MCP".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                description: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Project capsules and code search for a large workspace. Start with find_app \
                 or list_roots, call bootstrap for a project's purpose and layout, then \
                 search_semantic to locate code."
                    .to_string(),
            ),
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        let tools: Vec<Tool> = self
            .tools
            .tools()
            .iter()
            .map(|t| Self::to_mcp_tool(t.as_ref()))
            .collect();
        std::future::ready(Ok(ListToolsResult::with_all_items(tools)))
    }

    fn get_tool(&self, name: &str) -> Option<Tool> {
        self.tools.find(name).map(Self::to_mcp_tool)
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let tool = self.tools.find(&request.name).ok_or_else(|| {
            McpError::new(
                ErrorCode::METHOD_NOT_FOUND,
                format!("no tool registered with name: {}", request.name),
                None,
            )
        })?;

        let params = request
            .arguments
            .map(serde_json::Value::Object)
            .unwrap_or(serde_json::Value::Object(serde_json::Map::new()));

        match tool.execute(params, &self.ctx).await {
            Ok(result) => {
                let text = serde_json::to_string_pretty(&result).unwrap_or_default();
                Ok(CallToolResult::success(vec![Content::text(text)]))
            }
            Err(e) => {
                tracing::debug!(tool = %request.name, error = %format!("{:#}", e), "tool call failed");
                let text = serde_json::to_string_pretty(&error_body(&e)).unwrap_or_default();
                Ok(CallToolResult::error(vec![Content::text(text)]))
            }
        }
    }
}
