//! Always-on tools over built-in Kubernetes resources

use std::sync::Arc;
use std::time::Duration;

use futures::TryStreamExt;
use k8s_openapi::api::core::v1::{ConfigMap, Event, Namespace, Pod, Secret};
use kube::api::{
    Api, DeleteParams, DynamicObject, GroupVersionKind, ListParams, LogParams, Patch, PatchParams, WatchEvent,
    WatchParams,
};
use navarch_client::ClusterClient;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpListener;

use crate::context::{ForwardSession, ToolContext};
use crate::descriptor::{Capability, ParamType, ToolDescriptor, ToolParam};
use crate::error::ToolError;
use crate::toolset::{ToolSpec, Toolset};
use crate::toolsets::{ClusterArgs, ListArgs, NamedArgs, dynamic_api, meta_fields, parse_gvk, summarize};
use crate::unstructured;

#[allow(clippy::too_many_lines)]
pub fn toolset() -> Toolset {
    Toolset::open("core", vec![
        ToolSpec::new(
            ToolDescriptor::new(
                "core.pods_list",
                "List Pods",
                "List pods in a namespace, or across the cluster when no namespace is given",
                Capability::ReadOnly,
                vec![
                    ToolParam::optional("context", ParamType::String, "Cluster context; empty for the default"),
                    ToolParam::optional("namespace", ParamType::String, "Namespace; empty for all namespaces"),
                    ToolParam::optional("label_selector", ParamType::String, "Label selector, e.g. app=web"),
                    ToolParam::optional("field_selector", ParamType::String, "Field selector, e.g. status.phase=Running"),
                ],
            ),
            pods_list,
        ),
        ToolSpec::new(
            ToolDescriptor::new(
                "core.pods_get",
                "Get Pod",
                "Fetch one pod as a full object",
                Capability::ReadOnly,
                named_params(),
            ),
            pods_get,
        ),
        ToolSpec::new(
            ToolDescriptor::new(
                "core.pods_logs",
                "Pod Logs",
                "Fetch container logs from a pod",
                Capability::ReadOnly,
                vec![
                    ToolParam::optional("context", ParamType::String, "Cluster context; empty for the default"),
                    ToolParam::optional("namespace", ParamType::String, "Namespace; defaults to `default`"),
                    ToolParam::required("name", ParamType::String, "Pod name"),
                    ToolParam::optional("container", ParamType::String, "Container name; defaults to the first"),
                    ToolParam::optional("tail_lines", ParamType::Integer, "Only return this many lines from the end"),
                    ToolParam::optional("previous", ParamType::Boolean, "Logs from the previous container instance"),
                ],
            ),
            pods_logs,
        ),
        ToolSpec::new(
            ToolDescriptor::new(
                "core.pods_delete",
                "Delete Pod",
                "Delete one pod",
                Capability::Destructive,
                named_params(),
            ),
            pods_delete,
        ),
        ToolSpec::new(
            ToolDescriptor::new(
                "core.pods_top",
                "Pod Resource Usage",
                "Per-container CPU and memory usage from the metrics API, when installed",
                Capability::ReadOnly,
                vec![
                    ToolParam::optional("context", ParamType::String, "Cluster context; empty for the default"),
                    ToolParam::optional("namespace", ParamType::String, "Namespace; empty for all namespaces"),
                    ToolParam::optional("label_selector", ParamType::String, "Label selector"),
                ],
            ),
            pods_top,
        ),
        ToolSpec::new(
            ToolDescriptor::new(
                "core.resources_list",
                "List Resources",
                "List any resource kind the cluster serves, built-in or CRD",
                Capability::ReadOnly,
                gvk_params(vec![ToolParam::optional(
                    "namespace",
                    ParamType::String,
                    "Namespace; empty for all namespaces",
                )]),
            ),
            resources_list,
        ),
        ToolSpec::new(
            ToolDescriptor::new(
                "core.resources_get",
                "Get Resource",
                "Fetch one object of any kind as a full object",
                Capability::ReadOnly,
                gvk_params(target_params()),
            ),
            resources_get,
        ),
        ToolSpec::new(
            ToolDescriptor::new(
                "core.resources_patch",
                "Patch Resource",
                "Apply a JSON merge patch to one object",
                Capability::Destructive,
                gvk_params({
                    let mut params = target_params();
                    params.push(ToolParam::required("patch", ParamType::Object, "JSON merge patch body"));
                    params
                }),
            ).idempotent(),
            resources_patch,
        ),
        ToolSpec::new(
            ToolDescriptor::new(
                "core.resources_scale",
                "Scale Resource",
                "Set the replica count of a scalable resource",
                Capability::Destructive,
                gvk_params({
                    let mut params = target_params();
                    params.push(ToolParam::required("replicas", ParamType::Integer, "Desired replica count"));
                    params
                }),
            ).idempotent(),
            resources_scale,
        ),
        ToolSpec::new(
            ToolDescriptor::new(
                "core.resources_delete",
                "Delete Resource",
                "Delete one object of any kind",
                Capability::Destructive,
                gvk_params(target_params()),
            ),
            resources_delete,
        ),
        ToolSpec::new(
            ToolDescriptor::new(
                "core.resources_diff",
                "Diff Resource",
                "Compare a proposed manifest against the live object via a server-side dry-run; nothing is persisted",
                Capability::ReadOnly,
                gvk_params({
                    let mut params = target_params();
                    params.push(ToolParam::required("manifest", ParamType::Object, "Proposed full manifest"));
                    params
                }),
            ),
            resources_diff,
        ),
        ToolSpec::new(
            ToolDescriptor::new(
                "core.resources_validate",
                "Validate Resource",
                "Ask the API server to validate a manifest via a dry-run apply; admission rejections are a normal answer",
                Capability::ReadOnly,
                gvk_params(vec![
                    ToolParam::optional("namespace", ParamType::String, "Namespace; defaults to `default`"),
                    ToolParam::required("manifest", ParamType::Object, "Manifest to validate; must carry metadata.name"),
                ]),
            ),
            resources_validate,
        ),
        ToolSpec::new(
            ToolDescriptor::new(
                "core.resources_relationships",
                "Resource Relationships",
                "Walk an object's owner references up to the root controller",
                Capability::ReadOnly,
                gvk_params(target_params()),
            ),
            resources_relationships,
        ),
        ToolSpec::new(
            ToolDescriptor::new(
                "core.resources_watch",
                "Watch Resources",
                "Collect a bounded window of change events for one resource kind",
                Capability::ReadOnly,
                gvk_params(vec![
                    ToolParam::optional("namespace", ParamType::String, "Namespace; empty for all namespaces"),
                    ToolParam::optional("label_selector", ParamType::String, "Label selector"),
                    ToolParam::optional("timeout_secs", ParamType::Integer, "How long to watch; default 10, max 60"),
                    ToolParam::optional("limit", ParamType::Integer, "Stop after this many events; default 50"),
                ]),
            ),
            resources_watch,
        ),
        ToolSpec::new(
            ToolDescriptor::new(
                "core.configmaps_list",
                "List ConfigMaps",
                "List config maps with their key names",
                Capability::ReadOnly,
                list_params_docs(),
            ),
            configmaps_list,
        ),
        ToolSpec::new(
            ToolDescriptor::new(
                "core.secrets_list",
                "List Secrets",
                "List secrets by name, type and key names; values are never returned",
                Capability::ReadOnly,
                list_params_docs(),
            ),
            secrets_list,
        ),
        ToolSpec::new(
            ToolDescriptor::new(
                "core.events_list",
                "List Events",
                "List recent events in a namespace or across the cluster",
                Capability::ReadOnly,
                list_params_docs(),
            ),
            events_list,
        ),
        ToolSpec::new(
            ToolDescriptor::new(
                "core.contexts_list",
                "List Contexts",
                "List the cluster contexts this server can reach",
                Capability::ReadOnly,
                vec![],
            ),
            contexts_list,
        ),
        ToolSpec::new(
            ToolDescriptor::new(
                "core.namespaces_list",
                "List Namespaces",
                "List namespaces with their phase",
                Capability::ReadOnly,
                vec![ToolParam::optional(
                    "context",
                    ParamType::String,
                    "Cluster context; empty for the default",
                )],
            ),
            namespaces_list,
        ),
        ToolSpec::new(
            ToolDescriptor::new(
                "core.port_forward_start",
                "Start Port-Forward",
                "Forward a local port to a pod port; returns a session id",
                Capability::Destructive,
                vec![
                    ToolParam::optional("context", ParamType::String, "Cluster context; empty for the default"),
                    ToolParam::optional("namespace", ParamType::String, "Namespace; defaults to `default`"),
                    ToolParam::required("name", ParamType::String, "Pod name"),
                    ToolParam::required("remote_port", ParamType::Integer, "Pod port to forward to"),
                    ToolParam::optional("local_port", ParamType::Integer, "Local port; 0 or absent picks a free one"),
                ],
            ).idempotent(),
            port_forward_start,
        ),
        ToolSpec::new(
            ToolDescriptor::new(
                "core.port_forward_stop",
                "Stop Port-Forward",
                "Stop a port-forward session by id",
                Capability::Destructive,
                vec![ToolParam::required("id", ParamType::String, "Session id from core.port_forward_start")],
            ).idempotent(),
            port_forward_stop,
        ),
    ])
}

fn named_params() -> Vec<ToolParam> {
    vec![
        ToolParam::optional("context", ParamType::String, "Cluster context; empty for the default"),
        ToolParam::optional("namespace", ParamType::String, "Namespace; defaults to `default`"),
        ToolParam::required("name", ParamType::String, "Object name"),
    ]
}

fn target_params() -> Vec<ToolParam> {
    vec![
        ToolParam::optional("namespace", ParamType::String, "Namespace; defaults to `default`"),
        ToolParam::required("name", ParamType::String, "Object name"),
    ]
}

fn gvk_params(mut rest: Vec<ToolParam>) -> Vec<ToolParam> {
    let mut params = vec![
        ToolParam::optional("context", ParamType::String, "Cluster context; empty for the default"),
        ToolParam::required("api_version", ParamType::String, "apiVersion, e.g. v1 or apps/v1"),
        ToolParam::required("kind", ParamType::String, "Kind, e.g. Deployment"),
    ];
    params.append(&mut rest);
    params
}

fn list_params_docs() -> Vec<ToolParam> {
    vec![
        ToolParam::optional("context", ParamType::String, "Cluster context; empty for the default"),
        ToolParam::optional("namespace", ParamType::String, "Namespace; empty for all namespaces"),
        ToolParam::optional("label_selector", ParamType::String, "Label selector"),
    ]
}

/// Namespace-scoped typed api, cluster-wide when the namespace is empty
fn typed_api<K>(cluster: &ClusterClient, namespace: &str) -> Api<K>
where
    K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>,
    <K as kube::Resource>::DynamicType: Default,
{
    if namespace.is_empty() {
        Api::all(cluster.bundle.client())
    } else {
        Api::namespaced(cluster.bundle.client(), namespace)
    }
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, ToolError> {
    serde_json::to_value(value).map_err(|e| ToolError::Internal(format!("serialization failed: {e}")))
}

#[derive(Deserialize)]
struct PodsListArgs {
    #[serde(default)]
    context: String,
    #[serde(default)]
    namespace: String,
    #[serde(default)]
    label_selector: String,
    #[serde(default)]
    field_selector: String,
}

async fn pods_list(ctx: Arc<ToolContext>, args: PodsListArgs) -> Result<Value, ToolError> {
    let cluster = ctx.cluster(&args.context).await?;
    cluster.bundle.throttle().await;

    let api: Api<Pod> = typed_api(&cluster, &args.namespace);
    let mut params = ListParams::default();
    if !args.label_selector.is_empty() {
        params = params.labels(&args.label_selector);
    }
    if !args.field_selector.is_empty() {
        params = params.fields(&args.field_selector);
    }

    let pods = api.list(&params).await?;
    let items: Vec<Value> = pods.iter().map(pod_summary).collect();
    Ok(json!({ "count": items.len(), "items": items }))
}

fn pod_summary(pod: &Pod) -> Value {
    let status = pod.status.as_ref();
    let containers = status
        .and_then(|s| s.container_statuses.as_deref())
        .unwrap_or_default();
    let ready = containers.iter().filter(|c| c.ready).count();
    let restarts: i32 = containers.iter().map(|c| c.restart_count).sum();

    json!({
        "name": pod.metadata.name,
        "namespace": pod.metadata.namespace,
        "phase": status.and_then(|s| s.phase.clone()),
        "node": pod.spec.as_ref().and_then(|s| s.node_name.clone()),
        "ready": format!("{ready}/{}", containers.len()),
        "restarts": restarts,
        "start_time": status.and_then(|s| s.start_time.as_ref()).map(|t| t.0.to_rfc3339()),
    })
}

async fn pods_get(ctx: Arc<ToolContext>, args: NamedArgs) -> Result<Value, ToolError> {
    let cluster = ctx.cluster(&args.context).await?;
    cluster.bundle.throttle().await;

    let api: Api<Pod> = Api::namespaced(cluster.bundle.client(), &args.namespace);
    let pod = api.get(&args.name).await?;
    to_value(&pod)
}

#[derive(Deserialize)]
struct PodsLogsArgs {
    #[serde(default)]
    context: String,
    #[serde(default = "super::default_namespace")]
    namespace: String,
    name: String,
    #[serde(default)]
    container: Option<String>,
    #[serde(default)]
    tail_lines: Option<i64>,
    #[serde(default)]
    previous: bool,
}

async fn pods_logs(ctx: Arc<ToolContext>, args: PodsLogsArgs) -> Result<Value, ToolError> {
    let cluster = ctx.cluster(&args.context).await?;
    cluster.bundle.throttle().await;

    let api: Api<Pod> = Api::namespaced(cluster.bundle.client(), &args.namespace);
    let params = LogParams {
        container: args.container,
        tail_lines: args.tail_lines,
        previous: args.previous,
        ..LogParams::default()
    };
    let logs = api.logs(&args.name, &params).await?;
    Ok(json!({ "name": args.name, "namespace": args.namespace, "logs": logs }))
}

async fn pods_delete(ctx: Arc<ToolContext>, args: NamedArgs) -> Result<Value, ToolError> {
    let cluster = ctx.cluster(&args.context).await?;
    ctx.authorize(&cluster, "delete", "", "pods", &args.namespace).await?;
    cluster.bundle.throttle().await;

    let api: Api<Pod> = Api::namespaced(cluster.bundle.client(), &args.namespace);
    api.delete(&args.name, &DeleteParams::default()).await?;
    Ok(json!({ "deleted": args.name, "namespace": args.namespace }))
}

async fn pods_top(ctx: Arc<ToolContext>, args: ListArgs) -> Result<Value, ToolError> {
    let cluster = ctx.cluster(&args.context).await?;
    let gvk = GroupVersionKind::gvk("metrics.k8s.io", "v1beta1", "PodMetrics");
    let entry = ctx.gated(&cluster, &gvk, "metrics.k8s.io PodMetrics").await?;
    cluster.bundle.throttle().await;

    let api = dynamic_api(&cluster, &entry, &args.namespace);
    let list = api.list(&super::list_params(&args.label_selector)).await?;

    Ok(summarize(&list, |object| {
        let mut fields = meta_fields(object);
        let containers: Vec<Value> = object
            .data
            .get("containers")
            .and_then(Value::as_array)
            .map(|containers| {
                containers
                    .iter()
                    .map(|c| {
                        json!({
                            "name": unstructured::nested_str(c, &["name"]),
                            "cpu": unstructured::nested_str(c, &["usage", "cpu"]),
                            "memory": unstructured::nested_str(c, &["usage", "memory"]),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        fields.insert("containers".to_string(), Value::Array(containers));
        Value::Object(fields)
    }))
}

#[derive(Deserialize)]
struct ResourcesListArgs {
    #[serde(default)]
    context: String,
    api_version: String,
    kind: String,
    #[serde(default)]
    namespace: String,
    #[serde(default)]
    label_selector: String,
}

/// Resolve an `apiVersion`/`kind` pair through discovery, refreshing first
async fn resolve(cluster: &ClusterClient, api_version: &str, kind: &str) -> Result<navarch_discovery::GvrEntry, ToolError> {
    let gvk = parse_gvk(api_version, kind);
    let discovery = cluster.bundle.discovery();
    if let Err(error) = discovery.refresh().await {
        tracing::warn!(cluster = %cluster.context, %error, "discovery refresh failed, using cached index");
    }

    discovery.lookup(&gvk).await.ok_or_else(|| {
        ToolError::BadArgument(format!("the cluster does not serve {kind} in {api_version}"))
    })
}

async fn resources_list(ctx: Arc<ToolContext>, args: ResourcesListArgs) -> Result<Value, ToolError> {
    let cluster = ctx.cluster(&args.context).await?;
    let entry = resolve(&cluster, &args.api_version, &args.kind).await?;
    cluster.bundle.throttle().await;

    let api = dynamic_api(&cluster, &entry, &args.namespace);
    let list = api.list(&super::list_params(&args.label_selector)).await?;
    Ok(summarize(&list, |object| Value::Object(meta_fields(object))))
}

#[derive(Deserialize)]
struct ResourceTargetArgs {
    #[serde(default)]
    context: String,
    api_version: String,
    kind: String,
    #[serde(default = "super::default_namespace")]
    namespace: String,
    name: String,
}

async fn resources_get(ctx: Arc<ToolContext>, args: ResourceTargetArgs) -> Result<Value, ToolError> {
    let cluster = ctx.cluster(&args.context).await?;
    let entry = resolve(&cluster, &args.api_version, &args.kind).await?;
    cluster.bundle.throttle().await;

    let api = dynamic_api(&cluster, &entry, &args.namespace);
    let object = api.get(&args.name).await?;
    to_value(&object)
}

#[derive(Deserialize)]
struct ResourcesPatchArgs {
    #[serde(default)]
    context: String,
    api_version: String,
    kind: String,
    #[serde(default = "super::default_namespace")]
    namespace: String,
    name: String,
    patch: Value,
}

async fn resources_patch(ctx: Arc<ToolContext>, args: ResourcesPatchArgs) -> Result<Value, ToolError> {
    if !args.patch.is_object() {
        return Err(ToolError::BadArgument("patch must be a JSON object".to_string()));
    }

    let cluster = ctx.cluster(&args.context).await?;
    let entry = resolve(&cluster, &args.api_version, &args.kind).await?;
    ctx.authorize(&cluster, "patch", &entry.group, &entry.plural, &args.namespace).await?;
    cluster.bundle.throttle().await;

    let api = dynamic_api(&cluster, &entry, &args.namespace);
    let patched = api
        .patch(&args.name, &PatchParams::default(), &Patch::Merge(&args.patch))
        .await?;
    Ok(Value::Object(meta_fields(&patched)))
}

#[derive(Deserialize)]
struct ResourcesScaleArgs {
    #[serde(default)]
    context: String,
    api_version: String,
    kind: String,
    #[serde(default = "super::default_namespace")]
    namespace: String,
    name: String,
    replicas: i32,
}

async fn resources_scale(ctx: Arc<ToolContext>, args: ResourcesScaleArgs) -> Result<Value, ToolError> {
    if args.replicas < 0 {
        return Err(ToolError::BadArgument("replicas must be non-negative".to_string()));
    }

    let cluster = ctx.cluster(&args.context).await?;
    let entry = resolve(&cluster, &args.api_version, &args.kind).await?;
    ctx.authorize(&cluster, "patch", &entry.group, &entry.plural, &args.namespace).await?;
    cluster.bundle.throttle().await;

    let api = dynamic_api(&cluster, &entry, &args.namespace);
    let body = json!({ "spec": { "replicas": args.replicas } });
    api.patch_subresource("scale", &args.name, &PatchParams::default(), &Patch::Merge(&body))
        .await?;
    Ok(json!({ "name": args.name, "namespace": args.namespace, "replicas": args.replicas }))
}

async fn resources_delete(ctx: Arc<ToolContext>, args: ResourceTargetArgs) -> Result<Value, ToolError> {
    let cluster = ctx.cluster(&args.context).await?;
    let entry = resolve(&cluster, &args.api_version, &args.kind).await?;
    ctx.authorize(&cluster, "delete", &entry.group, &entry.plural, &args.namespace).await?;
    cluster.bundle.throttle().await;

    let api = dynamic_api(&cluster, &entry, &args.namespace);
    api.delete(&args.name, &DeleteParams::default()).await?;
    Ok(json!({ "deleted": args.name, "kind": args.kind, "namespace": args.namespace }))
}

/// Server-side apply that is never persisted
fn dry_run_apply() -> PatchParams {
    let mut params = PatchParams::apply("navarch").force();
    params.dry_run = true;
    params
}

/// Fill in the envelope fields an apply body needs when the caller passed
/// only the interesting parts of the manifest
fn applyable_manifest(manifest: &Value, api_version: &str, kind: &str, name: &str) -> Result<Value, ToolError> {
    let mut manifest = manifest.clone();
    let Some(root) = manifest.as_object_mut() else {
        return Err(ToolError::BadArgument("manifest must be a JSON object".to_string()));
    };
    root.entry("apiVersion").or_insert_with(|| json!(api_version));
    root.entry("kind").or_insert_with(|| json!(kind));
    let metadata = root.entry("metadata").or_insert_with(|| json!({}));
    if let Some(metadata) = metadata.as_object_mut() {
        metadata.entry("name").or_insert_with(|| json!(name));
    }
    Ok(manifest)
}

/// Drop the server-managed metadata that differs on every dry-run result
fn strip_volatile(object: &mut Value) {
    if let Some(metadata) = object.get_mut("metadata").and_then(Value::as_object_mut) {
        metadata.remove("managedFields");
        metadata.remove("resourceVersion");
        metadata.remove("generation");
    }
}

/// Record leaf-level differences as `{path, live, proposed}` entries
fn json_diff(path: &str, live: &Value, proposed: &Value, out: &mut Vec<Value>) {
    match (live, proposed) {
        (Value::Object(a), Value::Object(b)) => {
            for (key, value) in b {
                let child = if path.is_empty() { key.clone() } else { format!("{path}.{key}") };
                match a.get(key) {
                    Some(live_value) => json_diff(&child, live_value, value, out),
                    None => out.push(json!({ "path": child, "live": Value::Null, "proposed": value })),
                }
            }
            for (key, value) in a {
                if !b.contains_key(key) {
                    let child = if path.is_empty() { key.clone() } else { format!("{path}.{key}") };
                    out.push(json!({ "path": child, "live": value, "proposed": Value::Null }));
                }
            }
        }
        _ if live == proposed => {}
        _ => out.push(json!({ "path": path, "live": live, "proposed": proposed })),
    }
}

#[derive(Deserialize)]
struct ResourcesDiffArgs {
    #[serde(default)]
    context: String,
    api_version: String,
    kind: String,
    #[serde(default = "super::default_namespace")]
    namespace: String,
    name: String,
    manifest: Value,
}

async fn resources_diff(ctx: Arc<ToolContext>, args: ResourcesDiffArgs) -> Result<Value, ToolError> {
    let manifest = applyable_manifest(&args.manifest, &args.api_version, &args.kind, &args.name)?;

    let cluster = ctx.cluster(&args.context).await?;
    let entry = resolve(&cluster, &args.api_version, &args.kind).await?;
    cluster.bundle.throttle().await;

    let api = dynamic_api(&cluster, &entry, &args.namespace);
    let live = api.get_opt(&args.name).await?;
    let proposed = api.patch(&args.name, &dry_run_apply(), &Patch::Apply(&manifest)).await?;

    let creates = live.is_none();
    let mut live = match &live {
        Some(object) => to_value(object)?,
        None => json!({}),
    };
    let mut proposed = to_value(&proposed)?;
    strip_volatile(&mut live);
    strip_volatile(&mut proposed);

    let mut changes = Vec::new();
    json_diff("", &live, &proposed, &mut changes);
    Ok(json!({
        "name": args.name,
        "kind": args.kind,
        "namespace": args.namespace,
        "creates": creates,
        "changes": changes,
    }))
}

#[derive(Deserialize)]
struct ResourcesValidateArgs {
    #[serde(default)]
    context: String,
    api_version: String,
    kind: String,
    #[serde(default = "super::default_namespace")]
    namespace: String,
    manifest: Value,
}

async fn resources_validate(ctx: Arc<ToolContext>, args: ResourcesValidateArgs) -> Result<Value, ToolError> {
    let name = unstructured::nested_str(&args.manifest, &["metadata", "name"])
        .ok_or_else(|| ToolError::BadArgument("manifest must carry metadata.name".to_string()))?
        .to_string();
    let manifest = applyable_manifest(&args.manifest, &args.api_version, &args.kind, &name)?;

    let cluster = ctx.cluster(&args.context).await?;
    let entry = resolve(&cluster, &args.api_version, &args.kind).await?;
    cluster.bundle.throttle().await;

    let api = dynamic_api(&cluster, &entry, &args.namespace);
    match api.patch(&name, &dry_run_apply(), &Patch::Apply(&manifest)).await {
        Ok(_) => Ok(json!({ "valid": true, "name": name, "kind": args.kind })),
        // Schema and admission rejections are the answer, not a failure.
        Err(kube::Error::Api(response)) if response.code == 400 || response.code == 422 => Ok(json!({
            "valid": false,
            "name": name,
            "kind": args.kind,
            "reason": response.reason,
            "message": response.message,
        })),
        Err(error) => Err(error.into()),
    }
}

async fn resources_relationships(ctx: Arc<ToolContext>, args: ResourceTargetArgs) -> Result<Value, ToolError> {
    let cluster = ctx.cluster(&args.context).await?;
    let entry = resolve(&cluster, &args.api_version, &args.kind).await?;
    cluster.bundle.throttle().await;

    let api = dynamic_api(&cluster, &entry, &args.namespace);
    let object = api.get(&args.name).await?;

    let mut owners = Vec::new();
    let mut frontier = object.metadata.owner_references.clone().unwrap_or_default();
    // Owner chains are short (Pod -> ReplicaSet -> Deployment); the depth
    // cap guards against reference cycles.
    for _ in 0..8 {
        if frontier.is_empty() {
            break;
        }
        let mut next = Vec::new();
        for reference in frontier {
            owners.push(json!({
                "api_version": reference.api_version,
                "kind": reference.kind,
                "name": reference.name,
                "controller": reference.controller.unwrap_or(false),
            }));
            let gvk = parse_gvk(&reference.api_version, &reference.kind);
            if let Some(owner_entry) = cluster.bundle.discovery().lookup(&gvk).await {
                let owner_api = dynamic_api(&cluster, &owner_entry, &args.namespace);
                if let Ok(Some(owner)) = owner_api.get_opt(&reference.name).await {
                    next.extend(owner.metadata.owner_references.unwrap_or_default());
                }
            }
        }
        frontier = next;
    }

    Ok(json!({
        "object": Value::Object(meta_fields(&object)),
        "kind": args.kind,
        "owners": owners,
    }))
}

#[derive(Deserialize)]
struct ResourcesWatchArgs {
    #[serde(default)]
    context: String,
    api_version: String,
    kind: String,
    #[serde(default)]
    namespace: String,
    #[serde(default)]
    label_selector: String,
    #[serde(default = "default_watch_timeout")]
    timeout_secs: u32,
    #[serde(default = "default_watch_limit")]
    limit: usize,
}

const fn default_watch_timeout() -> u32 {
    10
}

const fn default_watch_limit() -> usize {
    50
}

async fn resources_watch(ctx: Arc<ToolContext>, args: ResourcesWatchArgs) -> Result<Value, ToolError> {
    let timeout_secs = args.timeout_secs.clamp(1, 60);
    let limit = args.limit.clamp(1, 500);

    let cluster = ctx.cluster(&args.context).await?;
    let entry = resolve(&cluster, &args.api_version, &args.kind).await?;
    cluster.bundle.throttle().await;

    let api = dynamic_api(&cluster, &entry, &args.namespace);
    let list = api.list(&ListParams::default().limit(1)).await?;
    let version = list.metadata.resource_version.unwrap_or_else(|| "0".to_string());

    let mut params = WatchParams::default().timeout(timeout_secs);
    if !args.label_selector.is_empty() {
        params = params.labels(&args.label_selector);
    }

    let collect = async {
        let mut events = Vec::new();
        let stream = api.watch(&params, &version).await?;
        let mut stream = std::pin::pin!(stream);
        while let Some(event) = stream.try_next().await? {
            match event {
                WatchEvent::Added(object) => events.push(watch_record("ADDED", &object)),
                WatchEvent::Modified(object) => events.push(watch_record("MODIFIED", &object)),
                WatchEvent::Deleted(object) => events.push(watch_record("DELETED", &object)),
                WatchEvent::Bookmark(_) => {}
                WatchEvent::Error(response) => {
                    return Err(ToolError::Tool(format!("watch error: {}", response.message)));
                }
            }
            if events.len() >= limit {
                break;
            }
        }
        Ok(events)
    };

    // The server closes the stream at the watch timeout; the outer bound
    // only guards a hung connection.
    let deadline = Duration::from_secs(u64::from(timeout_secs) + 5);
    let events = tokio::time::timeout(deadline, collect)
        .await
        .map_err(|_| ToolError::Tool("watch connection did not close in time".to_string()))??;

    Ok(json!({ "kind": args.kind, "count": events.len(), "events": events }))
}

fn watch_record(event_type: &str, object: &DynamicObject) -> Value {
    let mut fields = meta_fields(object);
    fields.insert("type".to_string(), json!(event_type));
    Value::Object(fields)
}

async fn configmaps_list(ctx: Arc<ToolContext>, args: ListArgs) -> Result<Value, ToolError> {
    let cluster = ctx.cluster(&args.context).await?;
    cluster.bundle.throttle().await;

    let api: Api<ConfigMap> = typed_api(&cluster, &args.namespace);
    let list = api.list(&super::list_params(&args.label_selector)).await?;
    let items: Vec<Value> = list
        .iter()
        .map(|cm| {
            let keys: Vec<&String> = cm.data.as_ref().map(|d| d.keys().collect()).unwrap_or_default();
            json!({
                "name": cm.metadata.name,
                "namespace": cm.metadata.namespace,
                "keys": keys,
            })
        })
        .collect();
    Ok(json!({ "count": items.len(), "items": items }))
}

async fn secrets_list(ctx: Arc<ToolContext>, args: ListArgs) -> Result<Value, ToolError> {
    let cluster = ctx.cluster(&args.context).await?;
    cluster.bundle.throttle().await;

    let api: Api<Secret> = typed_api(&cluster, &args.namespace);
    let list = api.list(&super::list_params(&args.label_selector)).await?;
    // Key names only. Secret values never leave the cluster through this
    // tool.
    let items: Vec<Value> = list
        .iter()
        .map(|secret| {
            let keys: Vec<&String> = secret.data.as_ref().map(|d| d.keys().collect()).unwrap_or_default();
            json!({
                "name": secret.metadata.name,
                "namespace": secret.metadata.namespace,
                "type": secret.type_,
                "keys": keys,
            })
        })
        .collect();
    Ok(json!({ "count": items.len(), "items": items }))
}

async fn events_list(ctx: Arc<ToolContext>, args: ListArgs) -> Result<Value, ToolError> {
    let cluster = ctx.cluster(&args.context).await?;
    cluster.bundle.throttle().await;

    let api: Api<Event> = typed_api(&cluster, &args.namespace);
    let list = api.list(&super::list_params(&args.label_selector)).await?;
    let items: Vec<Value> = list
        .iter()
        .map(|event| {
            json!({
                "namespace": event.metadata.namespace,
                "type": event.type_,
                "reason": event.reason,
                "message": event.message,
                "object": format!(
                    "{}/{}",
                    event.involved_object.kind.as_deref().unwrap_or(""),
                    event.involved_object.name.as_deref().unwrap_or(""),
                ),
                "count": event.count,
                "last_seen": event.last_timestamp.as_ref().map(|t| t.0.to_rfc3339()),
            })
        })
        .collect();
    Ok(json!({ "count": items.len(), "items": items }))
}

async fn contexts_list(ctx: Arc<ToolContext>, _args: ClusterArgs) -> Result<Value, ToolError> {
    let contexts = ctx.provider().list_contexts()?;
    let default = ctx.provider().default_context();
    Ok(json!({ "default": default, "contexts": contexts }))
}

async fn namespaces_list(ctx: Arc<ToolContext>, args: ClusterArgs) -> Result<Value, ToolError> {
    let cluster = ctx.cluster(&args.context).await?;
    cluster.bundle.throttle().await;

    let api: Api<Namespace> = Api::all(cluster.bundle.client());
    let list = api.list(&ListParams::default()).await?;
    let items: Vec<Value> = list
        .iter()
        .map(|ns| {
            json!({
                "name": ns.metadata.name,
                "phase": ns.status.as_ref().and_then(|s| s.phase.clone()),
            })
        })
        .collect();
    Ok(json!({ "count": items.len(), "items": items }))
}

#[derive(Deserialize)]
struct PortForwardStartArgs {
    #[serde(default)]
    context: String,
    #[serde(default = "super::default_namespace")]
    namespace: String,
    name: String,
    remote_port: u16,
    #[serde(default)]
    local_port: u16,
}

async fn port_forward_start(ctx: Arc<ToolContext>, args: PortForwardStartArgs) -> Result<Value, ToolError> {
    let cluster = ctx.cluster(&args.context).await?;
    ctx.authorize(&cluster, "create", "", "pods", &args.namespace).await?;

    let listener = TcpListener::bind(("127.0.0.1", args.local_port))
        .await
        .map_err(|e| ToolError::Tool(format!("failed to bind local port {}: {e}", args.local_port)))?;
    let local_addr = listener
        .local_addr()
        .map_err(|e| ToolError::Tool(format!("failed to read local address: {e}")))?
        .to_string();

    let api: Api<Pod> = Api::namespaced(cluster.bundle.client(), &args.namespace);
    let pod = args.name.clone();
    let remote = args.remote_port;
    let handle = tokio::spawn(async move {
        loop {
            let Ok((mut local, _)) = listener.accept().await else {
                break;
            };
            let api = api.clone();
            let pod = pod.clone();
            tokio::spawn(async move {
                match api.portforward(&pod, &[remote]).await {
                    Ok(mut forwarder) => {
                        if let Some(mut upstream) = forwarder.take_stream(remote) {
                            let _ = tokio::io::copy_bidirectional(&mut local, &mut upstream).await;
                        }
                    }
                    Err(error) => {
                        tracing::warn!(pod = %pod, port = remote, %error, "port-forward connection failed");
                    }
                }
            });
        }
    });

    let id = format!("{}/{}/{}:{}", cluster.context, args.namespace, args.name, remote);
    let session = ForwardSession::new(args.namespace.clone(), args.name.clone(), local_addr.clone(), remote, handle);
    ctx.register_forward(id.clone(), session).await;

    tracing::info!(%id, %local_addr, "port-forward started");
    Ok(json!({ "id": id, "local_addr": local_addr }))
}

#[derive(Deserialize)]
struct PortForwardStopArgs {
    id: String,
}

async fn port_forward_stop(ctx: Arc<ToolContext>, args: PortForwardStopArgs) -> Result<Value, ToolError> {
    match ctx.stop_forward(&args.id).await {
        Some(local_addr) => Ok(json!({ "stopped": args.id, "local_addr": local_addr })),
        None => {
            let active: Vec<String> = ctx.list_forwards().await.into_iter().map(|(id, ..)| id).collect();
            Err(ToolError::Tool(format!(
                "no port-forward session {}; active sessions: {active:?}",
                args.id
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pod_summary_counts_ready_containers() {
        let pod: Pod = serde_json::from_value(json!({
            "metadata": { "name": "web-0", "namespace": "prod" },
            "spec": { "containers": [], "nodeName": "node-a" },
            "status": {
                "phase": "Running",
                "containerStatuses": [
                    { "name": "app", "ready": true, "restartCount": 2, "image": "app:1", "imageID": "" },
                    { "name": "sidecar", "ready": false, "restartCount": 0, "image": "sc:1", "imageID": "" },
                ],
            },
        }))
        .unwrap();

        let summary = pod_summary(&pod);
        assert_eq!(summary["ready"], "1/2");
        assert_eq!(summary["restarts"], 2);
        assert_eq!(summary["node"], "node-a");
        assert_eq!(summary["phase"], "Running");
    }

    #[test]
    fn core_toolset_is_ungated() {
        let toolset = toolset();
        assert!(toolset.gates.is_empty());
        assert!(toolset.tools.iter().any(|t| t.descriptor.name == "core.pods_list"));
        assert!(toolset.tools.iter().any(|t| t.descriptor.name == "core.port_forward_stop"));
    }

    #[test]
    fn dry_run_tools_are_read_only() {
        let toolset = toolset();
        for name in [
            "core.resources_diff",
            "core.resources_validate",
            "core.resources_relationships",
            "core.resources_watch",
        ] {
            let tool = toolset
                .tools
                .iter()
                .find(|t| t.descriptor.name == name)
                .unwrap_or_else(|| panic!("missing tool {name}"));
            assert_eq!(tool.descriptor.capability, Capability::ReadOnly);
        }
    }

    #[test]
    fn json_diff_reports_changed_added_and_removed_paths() {
        let live = json!({
            "spec": { "replicas": 2, "paused": true },
            "metadata": { "name": "web" },
        });
        let proposed = json!({
            "spec": { "replicas": 3, "strategy": "RollingUpdate" },
            "metadata": { "name": "web" },
        });

        let mut changes = Vec::new();
        json_diff("", &live, &proposed, &mut changes);

        let paths: Vec<&str> = changes.iter().filter_map(|c| c["path"].as_str()).collect();
        assert!(paths.contains(&"spec.replicas"));
        assert!(paths.contains(&"spec.strategy"));
        assert!(paths.contains(&"spec.paused"));
        assert!(!paths.iter().any(|p| p.starts_with("metadata")));

        let replicas = changes.iter().find(|c| c["path"] == "spec.replicas").unwrap();
        assert_eq!(replicas["live"], 2);
        assert_eq!(replicas["proposed"], 3);
    }

    #[test]
    fn volatile_metadata_never_reaches_the_diff() {
        let mut object = json!({
            "metadata": {
                "name": "web",
                "resourceVersion": "12345",
                "generation": 7,
                "managedFields": [{ "manager": "navarch" }],
            },
        });
        strip_volatile(&mut object);

        let metadata = object["metadata"].as_object().unwrap();
        assert_eq!(metadata.get("name"), Some(&json!("web")));
        assert!(!metadata.contains_key("resourceVersion"));
        assert!(!metadata.contains_key("generation"));
        assert!(!metadata.contains_key("managedFields"));
    }

    #[test]
    fn partial_manifests_gain_their_apply_envelope() {
        let manifest = applyable_manifest(&json!({ "spec": { "replicas": 3 } }), "apps/v1", "Deployment", "web").unwrap();
        assert_eq!(manifest["apiVersion"], "apps/v1");
        assert_eq!(manifest["kind"], "Deployment");
        assert_eq!(manifest["metadata"]["name"], "web");
        assert_eq!(manifest["spec"]["replicas"], 3);

        // Caller-provided envelope fields win.
        let manifest = applyable_manifest(
            &json!({ "apiVersion": "apps/v1beta2", "metadata": { "name": "api" } }),
            "apps/v1",
            "Deployment",
            "web",
        )
        .unwrap();
        assert_eq!(manifest["apiVersion"], "apps/v1beta2");
        assert_eq!(manifest["metadata"]["name"], "api");

        assert!(applyable_manifest(&json!([1, 2]), "v1", "Pod", "x").is_err());
    }
}
