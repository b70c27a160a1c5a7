//! Cluster API tools, gated on the cluster.x-k8s.io Cluster CRD

use std::sync::Arc;

use navarch_discovery::gvks;
use serde_json::{Value, json};

use crate::context::ToolContext;
use crate::descriptor::{Capability, ParamType, ToolDescriptor, ToolParam};
use crate::error::ToolError;
use crate::toolset::{ToolSpec, Toolset};
use crate::toolsets::{ListArgs, dynamic_api, meta_fields, summarize};
use crate::unstructured;

pub fn toolset() -> Toolset {
    Toolset::gated("capi", vec![gvks::capi_cluster()], vec![ToolSpec::new(
        ToolDescriptor::new(
            "capi.clusters_list",
            "List Workload Clusters",
            "List Cluster API workload clusters with phase and control-plane readiness",
            Capability::ReadOnly,
            vec![
                ToolParam::optional("context", ParamType::String, "Cluster context; empty for the default"),
                ToolParam::optional("namespace", ParamType::String, "Namespace; empty for all namespaces"),
                ToolParam::optional("label_selector", ParamType::String, "Label selector"),
            ],
        ),
        clusters_list,
    )])
}

async fn clusters_list(ctx: Arc<ToolContext>, args: ListArgs) -> Result<Value, ToolError> {
    let cluster = ctx.cluster(&args.context).await?;
    let entry = ctx.gated(&cluster, &gvks::capi_cluster(), "Cluster API Cluster").await?;
    cluster.bundle.throttle().await;

    let api = dynamic_api(&cluster, &entry, &args.namespace);
    let list = api.list(&super::list_params(&args.label_selector)).await?;

    Ok(summarize(&list, |object| {
        let mut fields = meta_fields(object);
        fields.insert(
            "phase".to_string(),
            json!(unstructured::nested_str(&object.data, &["status", "phase"])),
        );
        fields.insert(
            "infrastructure".to_string(),
            json!(unstructured::nested_str(&object.data, &["spec", "infrastructureRef", "kind"])),
        );
        fields.insert(
            "control_plane_ready".to_string(),
            json!(unstructured::nested_bool(&object.data, &["status", "controlPlaneReady"]).unwrap_or(false)),
        );
        Value::Object(fields)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toolset_is_gated_on_the_capi_cluster_crd() {
        let toolset = toolset();
        assert_eq!(toolset.gates, vec![gvks::capi_cluster()]);
        assert_eq!(toolset.tools[0].descriptor.capability, Capability::ReadOnly);
    }
}
