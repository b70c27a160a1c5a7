//! Horizontal autoscaling: built-in HPAs plus KEDA when installed

use std::sync::Arc;

use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use kube::api::{Api, Patch, PatchParams};
use navarch_discovery::gvks;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::context::ToolContext;
use crate::descriptor::{Capability, ParamType, ToolDescriptor, ToolParam};
use crate::error::ToolError;
use crate::toolset::{ToolSpec, Toolset};
use crate::toolsets::{ListArgs, annotation_patch, dynamic_api, meta_fields, summarize};
use crate::unstructured;

const PAUSED_REPLICAS_ANNOTATION: &str = "autoscaling.keda.sh/paused-replicas";
const KEDA_FEATURE: &str = "KEDA ScaledObject";

pub fn toolset() -> Toolset {
    Toolset::open("autoscaling", vec![ToolSpec::new(
        ToolDescriptor::new(
            "autoscaling.hpa_list",
            "List HorizontalPodAutoscalers",
            "List HPAs with their bounds and current replica counts",
            Capability::ReadOnly,
            scoped_params(),
        ),
        hpa_list,
    )])
}

/// KEDA tools are listed only when the ScaledObject CRD is installed
pub fn keda_toolset() -> Toolset {
    Toolset::gated("autoscaling", vec![gvks::keda_scaled_object()], vec![
        ToolSpec::new(
            ToolDescriptor::new(
                "autoscaling.keda_scaledobjects_list",
                "List KEDA ScaledObjects",
                "List KEDA ScaledObjects with their targets and bounds; reports when KEDA is not installed",
                Capability::ReadOnly,
                scoped_params(),
            ),
            keda_scaledobjects_list,
        ),
        ToolSpec::new(
            ToolDescriptor::new(
                "autoscaling.keda_pause",
                "Pause KEDA Autoscaling",
                "Pause a ScaledObject at a fixed replica count via the paused-replicas annotation",
                Capability::Destructive,
                {
                    let mut params = target_params();
                    params.push(ToolParam::optional(
                        "replicas",
                        ParamType::Integer,
                        "Replica count to hold while paused; defaults to 0",
                    ));
                    params
                },
            ).idempotent(),
            keda_pause,
        ),
        ToolSpec::new(
            ToolDescriptor::new(
                "autoscaling.keda_resume",
                "Resume KEDA Autoscaling",
                "Resume a paused ScaledObject by clearing the paused-replicas annotation",
                Capability::Destructive,
                target_params(),
            ).idempotent(),
            keda_resume,
        ),
    ])
}

fn scoped_params() -> Vec<ToolParam> {
    vec![
        ToolParam::optional("context", ParamType::String, "Cluster context; empty for the default"),
        ToolParam::optional("namespace", ParamType::String, "Namespace; empty for all namespaces"),
        ToolParam::optional("label_selector", ParamType::String, "Label selector"),
    ]
}

fn target_params() -> Vec<ToolParam> {
    vec![
        ToolParam::optional("context", ParamType::String, "Cluster context; empty for the default"),
        ToolParam::optional("namespace", ParamType::String, "Namespace; defaults to `default`"),
        ToolParam::required("name", ParamType::String, "ScaledObject name"),
    ]
}

async fn hpa_list(ctx: Arc<ToolContext>, args: ListArgs) -> Result<Value, ToolError> {
    let cluster = ctx.cluster(&args.context).await?;
    cluster.bundle.throttle().await;

    let api: Api<HorizontalPodAutoscaler> = if args.namespace.is_empty() {
        Api::all(cluster.bundle.client())
    } else {
        Api::namespaced(cluster.bundle.client(), &args.namespace)
    };
    let list = api.list(&super::list_params(&args.label_selector)).await?;

    let items: Vec<Value> = list
        .iter()
        .map(|hpa| {
            let spec = hpa.spec.as_ref();
            let status = hpa.status.as_ref();
            json!({
                "name": hpa.metadata.name,
                "namespace": hpa.metadata.namespace,
                "target": spec.map(|s| format!("{}/{}", s.scale_target_ref.kind, s.scale_target_ref.name)),
                "min_replicas": spec.and_then(|s| s.min_replicas),
                "max_replicas": spec.map(|s| s.max_replicas),
                "current_replicas": status.and_then(|s| s.current_replicas),
                "desired_replicas": status.map(|s| s.desired_replicas),
            })
        })
        .collect();
    Ok(json!({ "count": items.len(), "items": items }))
}

async fn keda_scaledobjects_list(ctx: Arc<ToolContext>, args: ListArgs) -> Result<Value, ToolError> {
    let cluster = ctx.cluster(&args.context).await?;
    let entry = ctx.gated(&cluster, &gvks::keda_scaled_object(), KEDA_FEATURE).await?;
    cluster.bundle.throttle().await;

    let api = dynamic_api(&cluster, &entry, &args.namespace);
    let list = api.list(&super::list_params(&args.label_selector)).await?;

    Ok(summarize(&list, |object| {
        let mut fields = meta_fields(object);
        fields.insert(
            "target".to_string(),
            json!(unstructured::nested_str(&object.data, &["spec", "scaleTargetRef", "name"])),
        );
        fields.insert(
            "min_replicas".to_string(),
            json!(unstructured::nested_i64(&object.data, &["spec", "minReplicaCount"])),
        );
        fields.insert(
            "max_replicas".to_string(),
            json!(unstructured::nested_i64(&object.data, &["spec", "maxReplicaCount"])),
        );
        let paused = object
            .metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(PAUSED_REPLICAS_ANNOTATION))
            .cloned();
        fields.insert("paused_replicas".to_string(), json!(paused));
        Value::Object(fields)
    }))
}

#[derive(Deserialize)]
struct KedaPauseArgs {
    #[serde(default)]
    context: String,
    #[serde(default = "super::default_namespace")]
    namespace: String,
    name: String,
    #[serde(default)]
    replicas: Option<u32>,
}

async fn keda_pause(ctx: Arc<ToolContext>, args: KedaPauseArgs) -> Result<Value, ToolError> {
    let cluster = ctx.cluster(&args.context).await?;
    let entry = ctx.gated(&cluster, &gvks::keda_scaled_object(), KEDA_FEATURE).await?;
    ctx.authorize(&cluster, "patch", &entry.group, &entry.plural, &args.namespace).await?;
    cluster.bundle.throttle().await;

    let replicas = args.replicas.unwrap_or(0).to_string();
    let api = dynamic_api(&cluster, &entry, &args.namespace);
    api.patch(
        &args.name,
        &PatchParams::default(),
        &Patch::Merge(annotation_patch(PAUSED_REPLICAS_ANNOTATION, Some(&replicas))),
    )
    .await?;

    Ok(json!({ "paused": args.name, "namespace": args.namespace, "held_replicas": replicas }))
}

#[derive(Deserialize)]
struct KedaResumeArgs {
    #[serde(default)]
    context: String,
    #[serde(default = "super::default_namespace")]
    namespace: String,
    name: String,
}

async fn keda_resume(ctx: Arc<ToolContext>, args: KedaResumeArgs) -> Result<Value, ToolError> {
    let cluster = ctx.cluster(&args.context).await?;
    let entry = ctx.gated(&cluster, &gvks::keda_scaled_object(), KEDA_FEATURE).await?;
    ctx.authorize(&cluster, "patch", &entry.group, &entry.plural, &args.namespace).await?;
    cluster.bundle.throttle().await;

    let api = dynamic_api(&cluster, &entry, &args.namespace);
    api.patch(
        &args.name,
        &PatchParams::default(),
        &Patch::Merge(annotation_patch(PAUSED_REPLICAS_ANNOTATION, None)),
    )
    .await?;

    Ok(json!({ "resumed": args.name, "namespace": args.namespace }))
}
