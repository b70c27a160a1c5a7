//! Flux GitOps tools, gated on the Kustomization or HelmRelease CRDs

use std::sync::Arc;

use kube::api::{GroupVersionKind, Patch, PatchParams};
use navarch_discovery::gvks;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::context::ToolContext;
use crate::descriptor::{Capability, ParamType, ToolDescriptor, ToolParam};
use crate::error::ToolError;
use crate::toolset::{ToolSpec, Toolset};
use crate::toolsets::{ListArgs, annotation_patch, dynamic_api, meta_fields, summarize};
use crate::unstructured;

const RECONCILE_ANNOTATION: &str = "reconcile.fluxcd.io/requestedAt";

pub fn toolset() -> Toolset {
    Toolset::gated(
        "gitops",
        vec![gvks::flux_kustomization(), gvks::flux_helm_release()],
        vec![
            ToolSpec::new(
                ToolDescriptor::new(
                    "gitops.flux_kustomizations_list",
                    "List Flux Kustomizations",
                    "List Flux Kustomizations with sync state",
                    Capability::ReadOnly,
                    list_params(),
                ),
                kustomizations_list,
            ),
            ToolSpec::new(
                ToolDescriptor::new(
                    "gitops.flux_helmreleases_list",
                    "List Flux HelmReleases",
                    "List Flux HelmReleases with sync state",
                    Capability::ReadOnly,
                    list_params(),
                ),
                helmreleases_list,
            ),
            ToolSpec::new(
                ToolDescriptor::new(
                    "gitops.flux_reconcile",
                    "Trigger Flux Reconciliation",
                    "Request immediate reconciliation of a Kustomization or HelmRelease",
                    Capability::Destructive,
                    target_params(),
                ).idempotent(),
                flux_reconcile,
            ),
            ToolSpec::new(
                ToolDescriptor::new(
                    "gitops.flux_suspend",
                    "Suspend Flux Object",
                    "Suspend reconciliation of a Kustomization or HelmRelease",
                    Capability::Destructive,
                    target_params(),
                ).idempotent(),
                flux_suspend,
            ),
            ToolSpec::new(
                ToolDescriptor::new(
                    "gitops.flux_resume",
                    "Resume Flux Object",
                    "Resume reconciliation of a suspended Kustomization or HelmRelease",
                    Capability::Destructive,
                    target_params(),
                ).idempotent(),
                flux_resume,
            ),
        ],
    )
}

fn list_params() -> Vec<ToolParam> {
    vec![
        ToolParam::optional("context", ParamType::String, "Cluster context; empty for the default"),
        ToolParam::optional("namespace", ParamType::String, "Namespace; empty for all namespaces"),
        ToolParam::optional("label_selector", ParamType::String, "Label selector"),
    ]
}

fn target_params() -> Vec<ToolParam> {
    vec![
        ToolParam::optional("context", ParamType::String, "Cluster context; empty for the default"),
        ToolParam::required("kind", ParamType::String, "Kustomization or HelmRelease"),
        ToolParam::optional("namespace", ParamType::String, "Namespace; defaults to `default`"),
        ToolParam::required("name", ParamType::String, "Object name"),
    ]
}

fn flux_gvk(kind: &str) -> Result<GroupVersionKind, ToolError> {
    match kind {
        "Kustomization" => Ok(gvks::flux_kustomization()),
        "HelmRelease" => Ok(gvks::flux_helm_release()),
        other => Err(ToolError::BadArgument(format!(
            "kind must be Kustomization or HelmRelease, got {other}"
        ))),
    }
}

fn sync_summary(object: &kube::api::DynamicObject) -> Value {
    let mut fields = meta_fields(object);
    fields.insert(
        "suspended".to_string(),
        json!(unstructured::nested_bool(&object.data, &["spec", "suspend"]).unwrap_or(false)),
    );
    fields.insert(
        "revision".to_string(),
        json!(unstructured::nested_str(&object.data, &["status", "lastAppliedRevision"])),
    );
    if let Some((status, reason, message)) = unstructured::condition(&object.data, "Ready") {
        fields.insert("ready".to_string(), json!(status == "True"));
        fields.insert("reason".to_string(), json!(reason));
        if !message.is_empty() {
            fields.insert("message".to_string(), json!(message));
        }
    }
    Value::Object(fields)
}

async fn kustomizations_list(ctx: Arc<ToolContext>, args: ListArgs) -> Result<Value, ToolError> {
    gated_list(&ctx, &args, &gvks::flux_kustomization(), "Flux Kustomization").await
}

async fn helmreleases_list(ctx: Arc<ToolContext>, args: ListArgs) -> Result<Value, ToolError> {
    gated_list(&ctx, &args, &gvks::flux_helm_release(), "Flux HelmRelease").await
}

async fn gated_list(
    ctx: &ToolContext,
    args: &ListArgs,
    gvk: &GroupVersionKind,
    feature: &str,
) -> Result<Value, ToolError> {
    let cluster = ctx.cluster(&args.context).await?;
    let entry = ctx.gated(&cluster, gvk, feature).await?;
    cluster.bundle.throttle().await;

    let api = dynamic_api(&cluster, &entry, &args.namespace);
    let list = api.list(&super::list_params(&args.label_selector)).await?;
    Ok(summarize(&list, sync_summary))
}

#[derive(Deserialize)]
struct FluxTargetArgs {
    #[serde(default)]
    context: String,
    kind: String,
    #[serde(default = "super::default_namespace")]
    namespace: String,
    name: String,
}

async fn patch_flux_object(ctx: &ToolContext, args: &FluxTargetArgs, body: Value) -> Result<(), ToolError> {
    let gvk = flux_gvk(&args.kind)?;
    let cluster = ctx.cluster(&args.context).await?;
    let entry = ctx.gated(&cluster, &gvk, &format!("Flux {}", args.kind)).await?;
    ctx.authorize(&cluster, "patch", &entry.group, &entry.plural, &args.namespace).await?;
    cluster.bundle.throttle().await;

    let api = dynamic_api(&cluster, &entry, &args.namespace);
    api.patch(&args.name, &PatchParams::default(), &Patch::Merge(&body)).await?;
    Ok(())
}

async fn flux_reconcile(ctx: Arc<ToolContext>, args: FluxTargetArgs) -> Result<Value, ToolError> {
    let stamp = k8s_openapi::chrono::Utc::now().to_rfc3339();
    patch_flux_object(&ctx, &args, annotation_patch(RECONCILE_ANNOTATION, Some(&stamp))).await?;
    Ok(json!({ "reconcile_requested": args.name, "kind": args.kind, "at": stamp }))
}

async fn flux_suspend(ctx: Arc<ToolContext>, args: FluxTargetArgs) -> Result<Value, ToolError> {
    patch_flux_object(&ctx, &args, json!({ "spec": { "suspend": true } })).await?;
    Ok(json!({ "suspended": args.name, "kind": args.kind }))
}

async fn flux_resume(ctx: Arc<ToolContext>, args: FluxTargetArgs) -> Result<Value, ToolError> {
    patch_flux_object(&ctx, &args, json!({ "spec": { "suspend": false } })).await?;
    Ok(json!({ "resumed": args.name, "kind": args.kind }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gates_open_on_either_flux_crd() {
        let toolset = toolset();
        assert_eq!(toolset.gates, vec![gvks::flux_kustomization(), gvks::flux_helm_release()]);
    }

    #[test]
    fn kind_argument_is_validated() {
        assert!(flux_gvk("Kustomization").is_ok());
        assert!(flux_gvk("HelmRelease").is_ok());
        let err = flux_gvk("GitRepository").unwrap_err();
        assert!(matches!(err, ToolError::BadArgument(_)));
    }
}
