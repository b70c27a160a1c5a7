//! Velero backup tools, gated on the Backup CRD

use std::sync::Arc;

use kube::api::{DynamicObject, PostParams};
use navarch_discovery::gvks;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::context::ToolContext;
use crate::descriptor::{Capability, ParamType, ToolDescriptor, ToolParam};
use crate::error::ToolError;
use crate::toolset::{ToolSpec, Toolset};
use crate::toolsets::{ListArgs, dynamic_api, meta_fields, summarize};
use crate::unstructured;

const BACKUP_FEATURE: &str = "Velero Backup";

pub fn toolset() -> Toolset {
    Toolset::gated("backup", vec![gvks::velero_backup()], vec![
        ToolSpec::new(
            ToolDescriptor::new(
                "backup.velero_backups_list",
                "List Backups",
                "List Velero backups with phase and expiry",
                Capability::ReadOnly,
                list_params(),
            ),
            backups_list,
        ),
        ToolSpec::new(
            ToolDescriptor::new(
                "backup.velero_backup_create",
                "Create Backup",
                "Create a Velero backup of one or more namespaces",
                Capability::Destructive,
                vec![
                    ToolParam::optional("context", ParamType::String, "Cluster context; empty for the default"),
                    ToolParam::required("name", ParamType::String, "Backup name"),
                    ToolParam::optional(
                        "include_namespaces",
                        ParamType::String,
                        "Comma-separated namespaces to include; empty for all",
                    ),
                ],
            ).idempotent(),
            backup_create,
        ),
        ToolSpec::new(
            ToolDescriptor::new(
                "backup.velero_restores_list",
                "List Restores",
                "List Velero restores with phase and warnings",
                Capability::ReadOnly,
                list_params(),
            ),
            restores_list,
        ),
    ])
}

fn list_params() -> Vec<ToolParam> {
    vec![
        ToolParam::optional("context", ParamType::String, "Cluster context; empty for the default"),
        ToolParam::optional("namespace", ParamType::String, "Namespace; empty for all namespaces"),
        ToolParam::optional("label_selector", ParamType::String, "Label selector"),
    ]
}

async fn backups_list(ctx: Arc<ToolContext>, args: ListArgs) -> Result<Value, ToolError> {
    let cluster = ctx.cluster(&args.context).await?;
    let entry = ctx.gated(&cluster, &gvks::velero_backup(), BACKUP_FEATURE).await?;
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
            "expiration".to_string(),
            json!(unstructured::nested_str(&object.data, &["status", "expiration"])),
        );
        fields.insert(
            "errors".to_string(),
            json!(unstructured::nested_i64(&object.data, &["status", "errors"])),
        );
        Value::Object(fields)
    }))
}

#[derive(Deserialize)]
struct BackupCreateArgs {
    #[serde(default)]
    context: String,
    name: String,
    #[serde(default)]
    include_namespaces: String,
}

async fn backup_create(ctx: Arc<ToolContext>, args: BackupCreateArgs) -> Result<Value, ToolError> {
    let cluster = ctx.cluster(&args.context).await?;
    let entry = ctx.gated(&cluster, &gvks::velero_backup(), BACKUP_FEATURE).await?;
    // Velero backups live in its install namespace.
    let namespace = "velero";
    ctx.authorize(&cluster, "create", &entry.group, &entry.plural, namespace).await?;
    cluster.bundle.throttle().await;

    let included: Vec<&str> = args
        .include_namespaces
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    let mut spec = serde_json::Map::new();
    if !included.is_empty() {
        spec.insert("includedNamespaces".to_string(), json!(included));
    }

    let resource = entry.api_resource();
    let mut backup = DynamicObject::new(&args.name, &resource);
    backup.data = json!({ "spec": spec });

    let api = dynamic_api(&cluster, &entry, namespace);
    let created = api.create(&PostParams::default(), &backup).await?;

    Ok(json!({
        "created": created.metadata.name,
        "namespace": namespace,
        "included_namespaces": included,
    }))
}

async fn restores_list(ctx: Arc<ToolContext>, args: ListArgs) -> Result<Value, ToolError> {
    let cluster = ctx.cluster(&args.context).await?;
    let entry = ctx.gated(&cluster, &gvks::velero_restore(), "Velero Restore").await?;
    cluster.bundle.throttle().await;

    let api = dynamic_api(&cluster, &entry, &args.namespace);
    let list = api.list(&super::list_params(&args.label_selector)).await?;

    Ok(summarize(&list, |object| {
        let mut fields = meta_fields(object);
        fields.insert(
            "backup".to_string(),
            json!(unstructured::nested_str(&object.data, &["spec", "backupName"])),
        );
        fields.insert(
            "phase".to_string(),
            json!(unstructured::nested_str(&object.data, &["status", "phase"])),
        );
        fields.insert(
            "warnings".to_string(),
            json!(unstructured::nested_i64(&object.data, &["status", "warnings"])),
        );
        Value::Object(fields)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toolset_is_gated_on_the_backup_crd() {
        let toolset = toolset();
        assert_eq!(toolset.gates, vec![gvks::velero_backup()]);
        assert_eq!(toolset.tools.len(), 3);
    }
}
