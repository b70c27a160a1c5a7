//! Policy engine tools: Kyverno and Gatekeeper, gated on their CRDs

use std::sync::Arc;

use navarch_discovery::gvks;
use serde_json::{Value, json};

use crate::context::ToolContext;
use crate::descriptor::{Capability, ParamType, ToolDescriptor, ToolParam};
use crate::error::ToolError;
use crate::toolset::{ToolSpec, Toolset};
use crate::toolsets::{ClusterArgs, ListArgs, dynamic_api, meta_fields, summarize};
use crate::unstructured;

pub fn toolset() -> Toolset {
    Toolset::gated(
        "policy",
        vec![
            gvks::kyverno_cluster_policy(),
            gvks::kyverno_policy(),
            gvks::gatekeeper_constraint_template(),
        ],
        vec![
            ToolSpec::new(
                ToolDescriptor::new(
                    "policy.kyverno_clusterpolicies_list",
                    "List Kyverno ClusterPolicies",
                    "List cluster-scoped Kyverno policies with their action and readiness",
                    Capability::ReadOnly,
                    vec![ToolParam::optional(
                        "context",
                        ParamType::String,
                        "Cluster context; empty for the default",
                    )],
                ),
                kyverno_clusterpolicies_list,
            ),
            ToolSpec::new(
                ToolDescriptor::new(
                    "policy.kyverno_policies_list",
                    "List Kyverno Policies",
                    "List namespaced Kyverno policies",
                    Capability::ReadOnly,
                    vec![
                        ToolParam::optional("context", ParamType::String, "Cluster context; empty for the default"),
                        ToolParam::optional("namespace", ParamType::String, "Namespace; empty for all namespaces"),
                    ],
                ),
                kyverno_policies_list,
            ),
            ToolSpec::new(
                ToolDescriptor::new(
                    "policy.gatekeeper_constrainttemplates_list",
                    "List Gatekeeper ConstraintTemplates",
                    "List Gatekeeper constraint templates with their target kinds",
                    Capability::ReadOnly,
                    vec![ToolParam::optional(
                        "context",
                        ParamType::String,
                        "Cluster context; empty for the default",
                    )],
                ),
                gatekeeper_constrainttemplates_list,
            ),
        ],
    )
}

fn policy_summary(object: &kube::api::DynamicObject) -> Value {
    let mut fields = meta_fields(object);
    fields.insert(
        "action".to_string(),
        json!(unstructured::nested_str(
            &object.data,
            &["spec", "validationFailureAction"]
        )),
    );
    if let Some((status, _, message)) = unstructured::condition(&object.data, "Ready") {
        fields.insert("ready".to_string(), json!(status == "True"));
        if !message.is_empty() {
            fields.insert("message".to_string(), json!(message));
        }
    }
    Value::Object(fields)
}

async fn kyverno_clusterpolicies_list(ctx: Arc<ToolContext>, args: ClusterArgs) -> Result<Value, ToolError> {
    let cluster = ctx.cluster(&args.context).await?;
    let entry = ctx
        .gated(&cluster, &gvks::kyverno_cluster_policy(), "Kyverno ClusterPolicy")
        .await?;
    cluster.bundle.throttle().await;

    let api = dynamic_api(&cluster, &entry, "");
    let list = api.list(&kube::api::ListParams::default()).await?;
    Ok(summarize(&list, policy_summary))
}

async fn kyverno_policies_list(ctx: Arc<ToolContext>, args: ListArgs) -> Result<Value, ToolError> {
    let cluster = ctx.cluster(&args.context).await?;
    let entry = ctx.gated(&cluster, &gvks::kyverno_policy(), "Kyverno Policy").await?;
    cluster.bundle.throttle().await;

    let api = dynamic_api(&cluster, &entry, &args.namespace);
    let list = api.list(&super::list_params(&args.label_selector)).await?;
    Ok(summarize(&list, policy_summary))
}

async fn gatekeeper_constrainttemplates_list(ctx: Arc<ToolContext>, args: ClusterArgs) -> Result<Value, ToolError> {
    let cluster = ctx.cluster(&args.context).await?;
    let entry = ctx
        .gated(
            &cluster,
            &gvks::gatekeeper_constraint_template(),
            "Gatekeeper ConstraintTemplate",
        )
        .await?;
    cluster.bundle.throttle().await;

    let api = dynamic_api(&cluster, &entry, "");
    let list = api.list(&kube::api::ListParams::default()).await?;

    Ok(summarize(&list, |object| {
        let mut fields = meta_fields(object);
        fields.insert(
            "kind".to_string(),
            json!(unstructured::nested_str(
                &object.data,
                &["spec", "crd", "spec", "names", "kind"]
            )),
        );
        fields.insert(
            "created_constraints".to_string(),
            json!(unstructured::nested_bool(&object.data, &["status", "created"])),
        );
        Value::Object(fields)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toolset_opens_on_any_policy_engine() {
        let toolset = toolset();
        assert_eq!(toolset.gates.len(), 3);
        assert!(toolset.gates.contains(&gvks::gatekeeper_constraint_template()));
        assert!(toolset.tools.iter().all(|t| t.descriptor.capability == Capability::ReadOnly));
    }
}
