use std::sync::Arc;

use rmcp::ServerHandler;
use rmcp::model::{
    CallToolRequestParam, CallToolResult, ErrorData, Implementation, ListToolsResult,
    PaginatedRequestParam, ProtocolVersion, ServerCapabilities, ServerInfo, Tool,
};
use rmcp::service::{RequestContext, RoleServer};
use serde_json::Value;

use crate::context::ToolContext;
use crate::envelope::Envelope;
use crate::toolset::ToolRegistry;

/// The MCP server handler
///
/// Tool listings are computed against the default cluster's discovery
/// snapshot on every request, so newly installed CRDs surface without a
/// restart. Dispatch goes through the envelope; protocol errors are reserved
/// for unknown tool names.
pub struct NavarchServer {
    ctx: Arc<ToolContext>,
    registry: Arc<ToolRegistry>,
    envelope: Envelope,
}

impl NavarchServer {
    pub fn new(ctx: Arc<ToolContext>, registry: Arc<ToolRegistry>) -> Self {
        Self {
            ctx,
            registry,
            envelope: Envelope::new(),
        }
    }

    async fn visible_tools(&self) -> Vec<Tool> {
        match self.ctx.cluster("").await {
            Ok(cluster) => {
                let discovery = cluster.bundle.discovery();
                if let Err(error) = discovery.refresh().await {
                    tracing::warn!(%error, "discovery refresh failed while listing tools");
                }
                self.registry.list_visible(Some(discovery)).await
            }
            Err(error) => {
                // No cluster, no gating decision: advertise the ungated core.
                tracing::warn!(%error, "default cluster unavailable while listing tools");
                self.registry.list_visible(None).await
            }
        }
    }
}

impl ServerHandler for NavarchServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::default(),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "Navarch exposes Kubernetes operations as tools. Tools take an optional \
                 `context` argument naming the kubeconfig context to act on; omit it for \
                 the default cluster. Tools for optional platform features (KEDA, KubeVirt, \
                 Argo Rollouts, ...) are listed only when the matching CRDs are installed."
                    .to_string(),
            ),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        Ok(ListToolsResult {
            next_cursor: None,
            tools: self.visible_tools().await,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        let Some(spec) = self.registry.find(&request.name) else {
            return Err(ErrorData::invalid_params(
                format!("unknown tool: {}", request.name),
                None,
            ));
        };

        let args = request
            .arguments
            .map_or_else(|| Value::Object(serde_json::Map::new()), Value::Object);

        Ok(self.envelope.invoke(Arc::clone(&self.ctx), spec, args).await)
    }
}
