use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use kube::api::GroupVersionKind;
use navarch_discovery::DiscoveryCache;
use rmcp::model::Tool;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::context::ToolContext;
use crate::descriptor::ToolDescriptor;
use crate::error::ToolError;

type HandlerFuture = BoxFuture<'static, Result<Value, ToolError>>;
type Handler = Arc<dyn Fn(Arc<ToolContext>, Value) -> HandlerFuture + Send + Sync>;

/// A descriptor plus the handler that serves it
///
/// Arguments arrive as loose JSON; the constructor wraps the typed handler
/// with serde coercion so handlers only ever see their argument struct.
#[derive(Clone)]
pub struct ToolSpec {
    pub descriptor: ToolDescriptor,
    handler: Handler,
}

impl ToolSpec {
    pub fn new<A, F, Fut>(descriptor: ToolDescriptor, handler: F) -> Self
    where
        A: DeserializeOwned + Send + 'static,
        F: Fn(Arc<ToolContext>, A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let wrapped: Handler = Arc::new(move |ctx: Arc<ToolContext>, raw: Value| {
            let handler = Arc::clone(&handler);
            Box::pin(async move {
                let args: A = serde_json::from_value(raw)
                    .map_err(|e| ToolError::BadArgument(format!("invalid arguments: {e}")))?;
                handler(ctx, args).await
            })
        });
        Self {
            descriptor,
            handler: wrapped,
        }
    }

    /// Coerce the raw arguments and run the handler
    pub fn invoke(&self, ctx: Arc<ToolContext>, args: Value) -> HandlerFuture {
        (self.handler)(ctx, args)
    }
}

/// A named group of tools, optionally gated on root CRDs
///
/// A gated toolset is hidden from tool listings unless at least one of its
/// gating GVKs is discovered; calls still reach the handler, which reports
/// a missing feature itself.
pub struct Toolset {
    pub name: &'static str,
    /// When non-empty, the toolset is listed only if any of these GVKs is
    /// discovered
    pub gates: Vec<GroupVersionKind>,
    pub tools: Vec<ToolSpec>,
}

impl Toolset {
    pub fn open(name: &'static str, tools: Vec<ToolSpec>) -> Self {
        Self {
            name,
            gates: Vec::new(),
            tools,
        }
    }

    pub fn gated(name: &'static str, gates: Vec<GroupVersionKind>, tools: Vec<ToolSpec>) -> Self {
        Self { name, gates, tools }
    }
}

/// All registered toolsets, indexed by tool name for dispatch
pub struct ToolRegistry {
    toolsets: Vec<Toolset>,
    by_name: HashMap<&'static str, (usize, usize)>,
}

impl ToolRegistry {
    pub fn new(toolsets: Vec<Toolset>) -> Self {
        let mut by_name = HashMap::new();
        for (set_idx, toolset) in toolsets.iter().enumerate() {
            for (tool_idx, tool) in toolset.tools.iter().enumerate() {
                by_name.insert(tool.descriptor.name, (set_idx, tool_idx));
            }
        }
        Self { toolsets, by_name }
    }

    /// Find a tool by name regardless of gating
    pub fn find(&self, name: &str) -> Option<&ToolSpec> {
        let (set_idx, tool_idx) = self.by_name.get(name)?;
        Some(&self.toolsets[*set_idx].tools[*tool_idx])
    }

    /// List the tools visible against a discovery snapshot
    ///
    /// With no snapshot (default cluster unreachable) only ungated toolsets
    /// are listed.
    pub async fn list_visible(&self, discovery: Option<&DiscoveryCache>) -> Vec<Tool> {
        let mut tools = Vec::new();
        for toolset in &self.toolsets {
            if gate_open(toolset, discovery).await {
                tools.extend(toolset.tools.iter().map(|t| t.descriptor.to_tool()));
            }
        }
        tools
    }

    /// All toolsets, for inspection
    pub fn toolsets(&self) -> &[Toolset] {
        &self.toolsets
    }
}

async fn gate_open(toolset: &Toolset, discovery: Option<&DiscoveryCache>) -> bool {
    if toolset.gates.is_empty() {
        return true;
    }
    let Some(cache) = discovery else {
        return false;
    };
    for gvk in &toolset.gates {
        if cache.has(gvk).await {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use navarch_discovery::{DiscoveredResource, DiscoveryError, ResourceLister, gvks};
    use serde::Deserialize;

    use super::*;
    use crate::descriptor::Capability;

    struct FixedLister(Vec<DiscoveredResource>);

    #[async_trait]
    impl ResourceLister for FixedLister {
        async fn list_resources(&self) -> Result<Vec<DiscoveredResource>, DiscoveryError> {
            Ok(self.0.clone())
        }
    }

    fn noop_spec(name: &'static str) -> ToolSpec {
        #[derive(Deserialize)]
        struct NoArgs {}

        ToolSpec::new(
            ToolDescriptor::new(name, name, "test tool", Capability::ReadOnly, vec![]),
            |_ctx, _args: NoArgs| async { Ok(Value::Null) },
        )
    }

    fn registry() -> ToolRegistry {
        ToolRegistry::new(vec![
            Toolset::open("core", vec![noop_spec("core.pods_list"), noop_spec("core.pods_get")]),
            Toolset::gated(
                "kubevirt",
                vec![gvks::kubevirt_virtual_machine()],
                vec![noop_spec("kubevirt.vm_list")],
            ),
        ])
    }

    async fn cache_with(resources: Vec<DiscoveredResource>) -> DiscoveryCache {
        let cache = DiscoveryCache::new(Arc::new(FixedLister(resources)), Duration::from_secs(60));
        cache.refresh().await.unwrap();
        cache
    }

    #[tokio::test]
    async fn gated_toolset_is_hidden_without_its_crd() {
        let cache = cache_with(vec![]).await;
        let tools = registry().list_visible(Some(&cache)).await;

        let names: Vec<_> = tools.iter().map(|t| t.name.to_string()).collect();
        assert_eq!(names, vec!["core.pods_list", "core.pods_get"]);
    }

    #[tokio::test]
    async fn gated_toolset_appears_when_crd_is_discovered() {
        let cache = cache_with(vec![DiscoveredResource {
            group: "kubevirt.io".to_string(),
            version: "v1".to_string(),
            kind: "VirtualMachine".to_string(),
            plural: "virtualmachines".to_string(),
            namespaced: true,
        }])
        .await;

        let tools = registry().list_visible(Some(&cache)).await;
        assert!(tools.iter().any(|t| t.name == "kubevirt.vm_list"));
    }

    #[tokio::test]
    async fn no_snapshot_lists_only_ungated_tools() {
        let tools = registry().list_visible(None).await;
        assert_eq!(tools.len(), 2);
    }

    #[test]
    fn find_resolves_gated_and_ungated_tools() {
        let registry = registry();
        assert!(registry.find("core.pods_list").is_some());
        assert!(registry.find("kubevirt.vm_list").is_some());
        assert!(registry.find("nonexistent").is_none());
    }
}
