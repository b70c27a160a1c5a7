//! Argo Rollouts tools, gated on the Rollout CRD

use std::sync::Arc;

use kube::api::{Patch, PatchParams};
use navarch_discovery::gvks;
use serde_json::{Value, json};

use crate::context::ToolContext;
use crate::descriptor::{Capability, ParamType, ToolDescriptor, ToolParam};
use crate::error::ToolError;
use crate::toolset::{ToolSpec, Toolset};
use crate::toolsets::{ListArgs, NamedArgs, dynamic_api, meta_fields, summarize};
use crate::unstructured;

const ROLLOUT_FEATURE: &str = "Argo Rollout";

pub fn toolset() -> Toolset {
    Toolset::gated("rollouts", vec![gvks::argo_rollout()], vec![
        ToolSpec::new(
            ToolDescriptor::new(
                "rollouts.list",
                "List Rollouts",
                "List Argo Rollouts with phase and replica progress",
                Capability::ReadOnly,
                vec![
                    ToolParam::optional("context", ParamType::String, "Cluster context; empty for the default"),
                    ToolParam::optional("namespace", ParamType::String, "Namespace; empty for all namespaces"),
                    ToolParam::optional("label_selector", ParamType::String, "Label selector"),
                ],
            ),
            rollouts_list,
        ),
        ToolSpec::new(
            ToolDescriptor::new(
                "rollouts.promote",
                "Promote Rollout",
                "Unpause a rollout so it proceeds to the next step",
                Capability::Destructive,
                target_params(),
            ).idempotent(),
            rollout_promote,
        ),
        ToolSpec::new(
            ToolDescriptor::new(
                "rollouts.abort",
                "Abort Rollout",
                "Abort an in-progress rollout, reverting to the stable version",
                Capability::Destructive,
                target_params(),
            ).idempotent(),
            rollout_abort,
        ),
    ])
}

fn target_params() -> Vec<ToolParam> {
    vec![
        ToolParam::optional("context", ParamType::String, "Cluster context; empty for the default"),
        ToolParam::optional("namespace", ParamType::String, "Namespace; defaults to `default`"),
        ToolParam::required("name", ParamType::String, "Rollout name"),
    ]
}

async fn rollouts_list(ctx: Arc<ToolContext>, args: ListArgs) -> Result<Value, ToolError> {
    let cluster = ctx.cluster(&args.context).await?;
    let entry = ctx.gated(&cluster, &gvks::argo_rollout(), ROLLOUT_FEATURE).await?;
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
            "paused".to_string(),
            json!(unstructured::nested_bool(&object.data, &["spec", "paused"]).unwrap_or(false)),
        );
        fields.insert(
            "desired".to_string(),
            json!(unstructured::nested_i64(&object.data, &["spec", "replicas"])),
        );
        fields.insert(
            "ready".to_string(),
            json!(unstructured::nested_i64(&object.data, &["status", "readyReplicas"])),
        );
        fields.insert(
            "strategy".to_string(),
            json!(rollout_strategy(&object.data)),
        );
        Value::Object(fields)
    }))
}

fn rollout_strategy(data: &Value) -> Option<&'static str> {
    if unstructured::nested(data, &["spec", "strategy", "canary"]).is_some() {
        Some("canary")
    } else if unstructured::nested(data, &["spec", "strategy", "blueGreen"]).is_some() {
        Some("blueGreen")
    } else {
        None
    }
}

async fn rollout_promote(ctx: Arc<ToolContext>, args: NamedArgs) -> Result<Value, ToolError> {
    let cluster = ctx.cluster(&args.context).await?;
    let entry = ctx.gated(&cluster, &gvks::argo_rollout(), ROLLOUT_FEATURE).await?;
    ctx.authorize(&cluster, "patch", &entry.group, &entry.plural, &args.namespace).await?;
    cluster.bundle.throttle().await;

    let api = dynamic_api(&cluster, &entry, &args.namespace);
    api.patch(
        &args.name,
        &PatchParams::default(),
        &Patch::Merge(json!({ "spec": { "paused": false } })),
    )
    .await?;
    Ok(json!({ "promoted": args.name, "namespace": args.namespace }))
}

async fn rollout_abort(ctx: Arc<ToolContext>, args: NamedArgs) -> Result<Value, ToolError> {
    let cluster = ctx.cluster(&args.context).await?;
    let entry = ctx.gated(&cluster, &gvks::argo_rollout(), ROLLOUT_FEATURE).await?;
    ctx.authorize(&cluster, "patch", &entry.group, &entry.plural, &args.namespace).await?;
    cluster.bundle.throttle().await;

    // Abort is a status-level flag, set through the status subresource.
    let api = dynamic_api(&cluster, &entry, &args.namespace);
    api.patch_subresource(
        "status",
        &args.name,
        &PatchParams::default(),
        &Patch::Merge(json!({ "status": { "abort": true } })),
    )
    .await?;
    Ok(json!({ "aborted": args.name, "namespace": args.namespace }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_detection() {
        let canary = json!({ "spec": { "strategy": { "canary": { "steps": [] } } } });
        assert_eq!(rollout_strategy(&canary), Some("canary"));

        let bluegreen = json!({ "spec": { "strategy": { "blueGreen": {} } } });
        assert_eq!(rollout_strategy(&bluegreen), Some("blueGreen"));

        assert_eq!(rollout_strategy(&json!({})), None);
    }

    #[test]
    fn toolset_is_gated_on_the_rollout_crd() {
        assert_eq!(toolset().gates, vec![gvks::argo_rollout()]);
    }
}
