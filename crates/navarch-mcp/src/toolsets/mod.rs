//! Tool implementations, grouped by platform feature
//!
//! `core`, `autoscaling` and `helm` are always registered; every other
//! toolset is gated on the root CRD of the feature it drives.

use kube::api::{Api, DynamicObject, GroupVersionKind, ListParams, ObjectList};
use navarch_client::ClusterClient;
use navarch_discovery::GvrEntry;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::toolset::ToolRegistry;

mod autoscaling;
mod backup;
mod capi;
mod certs;
mod core;
mod gitops;
mod helm;
mod kubevirt;
mod net;
mod policy;
mod rollouts;

/// Assemble every toolset into one registry
pub fn registry() -> ToolRegistry {
    ToolRegistry::new(vec![
        core::toolset(),
        autoscaling::toolset(),
        autoscaling::keda_toolset(),
        kubevirt::toolset(),
        policy::toolset(),
        gitops::toolset(),
        rollouts::toolset(),
        certs::toolset(),
        backup::toolset(),
        capi::toolset(),
        net::toolset(),
        helm::toolset(),
    ])
}

/// Arguments shared by cluster-wide tools
#[derive(Deserialize)]
pub(crate) struct ClusterArgs {
    #[serde(default)]
    pub context: String,
}

/// Arguments shared by namespace-scoped list tools
#[derive(Deserialize)]
pub(crate) struct ListArgs {
    #[serde(default)]
    pub context: String,
    /// Empty means all namespaces
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub label_selector: String,
}

/// Arguments shared by tools targeting one named object
#[derive(Deserialize)]
pub(crate) struct NamedArgs {
    #[serde(default)]
    pub context: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    pub name: String,
}

pub(crate) fn default_namespace() -> String {
    "default".to_string()
}

/// Build a dynamic `Api` over a discovered entry, namespace-scoped when the
/// resource is namespaced and a namespace was given
pub(crate) fn dynamic_api(cluster: &ClusterClient, entry: &GvrEntry, namespace: &str) -> Api<DynamicObject> {
    let resource = entry.api_resource();
    if entry.namespaced && !namespace.is_empty() {
        Api::namespaced_with(cluster.bundle.client(), namespace, &resource)
    } else {
        Api::all_with(cluster.bundle.client(), &resource)
    }
}

pub(crate) fn list_params(label_selector: &str) -> ListParams {
    let mut params = ListParams::default();
    if !label_selector.is_empty() {
        params = params.labels(label_selector);
    }
    params
}

/// Parse `apiVersion` + `kind` arguments into a GVK; core types carry the
/// empty group
pub(crate) fn parse_gvk(api_version: &str, kind: &str) -> GroupVersionKind {
    match api_version.split_once('/') {
        Some((group, version)) => GroupVersionKind::gvk(group, version, kind),
        None => GroupVersionKind::gvk("", api_version, kind),
    }
}

/// Base summary fields every dynamic object carries
pub(crate) fn meta_fields(object: &DynamicObject) -> serde_json::Map<String, Value> {
    let mut fields = serde_json::Map::new();
    fields.insert("name".to_string(), json!(object.metadata.name));
    if let Some(namespace) = &object.metadata.namespace {
        fields.insert("namespace".to_string(), json!(namespace));
    }
    if let Some(created) = &object.metadata.creation_timestamp {
        fields.insert("created".to_string(), json!(created.0.to_rfc3339()));
    }
    fields
}

/// Render a dynamic list through a per-item summarizer
pub(crate) fn summarize(list: &ObjectList<DynamicObject>, item: impl Fn(&DynamicObject) -> Value) -> Value {
    let items: Vec<Value> = list.items.iter().map(item).collect();
    json!({ "count": items.len(), "items": items })
}

/// Merge-patch body setting one metadata annotation; `None` clears it
pub(crate) fn annotation_patch(key: &str, value: Option<&str>) -> Value {
    json!({ "metadata": { "annotations": { key: value } } })
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::descriptor::Capability;

    #[test]
    fn tool_names_are_unique_across_toolsets() {
        let registry = registry();
        let mut seen = HashSet::new();
        for toolset in registry.toolsets() {
            for tool in &toolset.tools {
                assert!(
                    seen.insert(tool.descriptor.name),
                    "duplicate tool name {}",
                    tool.descriptor.name
                );
            }
        }
        assert!(seen.len() > 30);
    }

    #[test]
    fn tool_names_are_dotted_and_prefixed_by_their_toolset() {
        for toolset in registry().toolsets() {
            for tool in &toolset.tools {
                let name = tool.descriptor.name;
                assert!(
                    name.starts_with(&format!("{}.", toolset.name)),
                    "{name} is not prefixed by its toolset {}",
                    toolset.name
                );
                assert_eq!(name.matches('.').count(), 1, "{name} must have one dot");
                assert!(
                    name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '.'),
                    "{name} is not a dotted lowercase identifier"
                );
            }
        }
    }

    #[test]
    fn every_tool_has_exactly_one_capability_in_its_annotations() {
        for toolset in registry().toolsets() {
            for tool in &toolset.tools {
                let annotations = tool.descriptor.to_tool().annotations.unwrap();
                let read_only = annotations.read_only_hint.unwrap();
                let destructive = annotations.destructive_hint.unwrap();
                assert_ne!(
                    read_only, destructive,
                    "{} must carry exactly one of the read-only/destructive marks",
                    tool.descriptor.name
                );
                match tool.descriptor.capability {
                    Capability::ReadOnly => assert!(read_only),
                    Capability::Destructive => assert!(destructive),
                }
            }
        }
    }

    #[test]
    fn mutating_tools_document_their_target() {
        // Every non-read-only tool except the context-level ones must take
        // a name argument.
        let exempt = ["helm.install", "core.port_forward_start", "backup.velero_backup_create"];
        for toolset in registry().toolsets() {
            for tool in &toolset.tools {
                if tool.descriptor.capability == Capability::ReadOnly
                    || exempt.contains(&tool.descriptor.name)
                {
                    continue;
                }
                assert!(
                    tool.descriptor.params.iter().any(|p| p.name == "name" || p.name == "release" || p.name == "id"),
                    "{} does not name its target",
                    tool.descriptor.name
                );
            }
        }
    }

    #[test]
    fn gvk_parsing_handles_core_and_grouped_versions() {
        let core = parse_gvk("v1", "Pod");
        assert_eq!(core.group, "");
        assert_eq!(core.version, "v1");

        let grouped = parse_gvk("apps/v1", "Deployment");
        assert_eq!(grouped.group, "apps");
        assert_eq!(grouped.version, "v1");
        assert_eq!(grouped.kind, "Deployment");
    }

    #[test]
    fn annotation_patch_clears_with_null() {
        let patch = annotation_patch("fluxcd.io/reconcile", None);
        assert!(patch["metadata"]["annotations"]["fluxcd.io/reconcile"].is_null());
    }
}
