//! KubeVirt virtual machine tools, gated on the VirtualMachine CRD

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

const VM_FEATURE: &str = "KubeVirt VirtualMachine";

pub fn toolset() -> Toolset {
    Toolset::gated("kubevirt", vec![gvks::kubevirt_virtual_machine()], vec![
        ToolSpec::new(
            ToolDescriptor::new(
                "kubevirt.vm_list",
                "List VirtualMachines",
                "List KubeVirt virtual machines with their run state",
                Capability::ReadOnly,
                list_params(),
            ),
            vm_list,
        ),
        ToolSpec::new(
            ToolDescriptor::new(
                "kubevirt.vm_start",
                "Start VirtualMachine",
                "Start a virtual machine by setting spec.running",
                Capability::Destructive,
                vm_target_params(),
            ).idempotent(),
            vm_start,
        ),
        ToolSpec::new(
            ToolDescriptor::new(
                "kubevirt.vm_stop",
                "Stop VirtualMachine",
                "Stop a virtual machine by clearing spec.running",
                Capability::Destructive,
                vm_target_params(),
            ).idempotent(),
            vm_stop,
        ),
        ToolSpec::new(
            ToolDescriptor::new(
                "kubevirt.vm_restart",
                "Restart VirtualMachine",
                "Restart a running virtual machine by stamping the restart annotation on its template",
                Capability::Destructive,
                vm_target_params(),
            ).idempotent(),
            vm_restart,
        ),
        ToolSpec::new(
            ToolDescriptor::new(
                "kubevirt.datasources_list",
                "List DataSources",
                "List CDI data sources available for VM disks",
                Capability::ReadOnly,
                list_params(),
            ),
            datasources_list,
        ),
        ToolSpec::new(
            ToolDescriptor::new(
                "kubevirt.instancetypes_list",
                "List VM Instance Types",
                "List VirtualMachineInstancetypes with CPU and memory sizing",
                Capability::ReadOnly,
                list_params(),
            ),
            instancetypes_list,
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

fn vm_target_params() -> Vec<ToolParam> {
    vec![
        ToolParam::optional("context", ParamType::String, "Cluster context; empty for the default"),
        ToolParam::optional("namespace", ParamType::String, "Namespace; defaults to `default`"),
        ToolParam::required("name", ParamType::String, "VirtualMachine name"),
    ]
}

async fn vm_list(ctx: Arc<ToolContext>, args: ListArgs) -> Result<Value, ToolError> {
    let cluster = ctx.cluster(&args.context).await?;
    let entry = ctx.gated(&cluster, &gvks::kubevirt_virtual_machine(), VM_FEATURE).await?;
    cluster.bundle.throttle().await;

    let api = dynamic_api(&cluster, &entry, &args.namespace);
    let list = api.list(&super::list_params(&args.label_selector)).await?;

    Ok(summarize(&list, |object| {
        let mut fields = meta_fields(object);
        fields.insert(
            "status".to_string(),
            json!(unstructured::nested_str(&object.data, &["status", "printableStatus"])),
        );
        fields.insert(
            "running".to_string(),
            json!(unstructured::nested_bool(&object.data, &["spec", "running"])),
        );
        fields.insert(
            "run_strategy".to_string(),
            json!(unstructured::nested_str(&object.data, &["spec", "runStrategy"])),
        );
        if let Some((status, reason, _)) = unstructured::condition(&object.data, "Ready") {
            fields.insert("ready".to_string(), json!(status == "True"));
            if !reason.is_empty() {
                fields.insert("ready_reason".to_string(), json!(reason));
            }
        }
        Value::Object(fields)
    }))
}

async fn set_running(ctx: &ToolContext, args: &NamedArgs, running: bool) -> Result<Value, ToolError> {
    let cluster = ctx.cluster(&args.context).await?;
    let entry = ctx.gated(&cluster, &gvks::kubevirt_virtual_machine(), VM_FEATURE).await?;
    ctx.authorize(&cluster, "patch", &entry.group, &entry.plural, &args.namespace).await?;
    cluster.bundle.throttle().await;

    let api = dynamic_api(&cluster, &entry, &args.namespace);
    let body = json!({ "spec": { "running": running } });
    api.patch(&args.name, &PatchParams::default(), &Patch::Merge(&body)).await?;

    Ok(json!({
        "name": args.name,
        "namespace": args.namespace,
        "running": running,
    }))
}

async fn vm_start(ctx: Arc<ToolContext>, args: NamedArgs) -> Result<Value, ToolError> {
    set_running(&ctx, &args, true).await
}

async fn vm_stop(ctx: Arc<ToolContext>, args: NamedArgs) -> Result<Value, ToolError> {
    set_running(&ctx, &args, false).await
}

async fn vm_restart(ctx: Arc<ToolContext>, args: NamedArgs) -> Result<Value, ToolError> {
    let cluster = ctx.cluster(&args.context).await?;
    let entry = ctx.gated(&cluster, &gvks::kubevirt_virtual_machine(), VM_FEATURE).await?;
    ctx.authorize(&cluster, "patch", &entry.group, &entry.plural, &args.namespace).await?;
    cluster.bundle.throttle().await;

    // Stamping the template annotation rolls the VMI, same idiom as a
    // deployment rollout restart.
    let stamp = k8s_openapi::chrono::Utc::now().to_rfc3339();
    let body = json!({
        "spec": { "template": { "metadata": { "annotations": {
            "kubevirt.io/restartedAt": stamp,
        } } } }
    });
    let api = dynamic_api(&cluster, &entry, &args.namespace);
    api.patch(&args.name, &PatchParams::default(), &Patch::Merge(&body)).await?;

    Ok(json!({ "restarted": args.name, "namespace": args.namespace, "at": stamp }))
}

async fn datasources_list(ctx: Arc<ToolContext>, args: ListArgs) -> Result<Value, ToolError> {
    let cluster = ctx.cluster(&args.context).await?;
    let entry = ctx.gated(&cluster, &gvks::kubevirt_data_source(), "CDI DataSource").await?;
    cluster.bundle.throttle().await;

    let api = dynamic_api(&cluster, &entry, &args.namespace);
    let list = api.list(&super::list_params(&args.label_selector)).await?;

    Ok(summarize(&list, |object| {
        let mut fields = meta_fields(object);
        fields.insert(
            "source_pvc".to_string(),
            json!(unstructured::nested_str(&object.data, &["spec", "source", "pvc", "name"])),
        );
        if let Some((status, _, message)) = unstructured::condition(&object.data, "Ready") {
            fields.insert("ready".to_string(), json!(status == "True"));
            if !message.is_empty() {
                fields.insert("message".to_string(), json!(message));
            }
        }
        Value::Object(fields)
    }))
}

async fn instancetypes_list(ctx: Arc<ToolContext>, args: ListArgs) -> Result<Value, ToolError> {
    let cluster = ctx.cluster(&args.context).await?;
    let entry = ctx
        .gated(&cluster, &gvks::kubevirt_instancetype(), "KubeVirt VirtualMachineInstancetype")
        .await?;
    cluster.bundle.throttle().await;

    let api = dynamic_api(&cluster, &entry, &args.namespace);
    let list = api.list(&super::list_params(&args.label_selector)).await?;

    Ok(summarize(&list, |object| {
        let mut fields = meta_fields(object);
        fields.insert(
            "cpus".to_string(),
            json!(unstructured::nested_i64(&object.data, &["spec", "cpu", "guest"])),
        );
        fields.insert(
            "memory".to_string(),
            json!(unstructured::nested_str(&object.data, &["spec", "memory", "guest"])),
        );
        Value::Object(fields)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toolset_is_gated_on_the_virtual_machine_crd() {
        let toolset = toolset();
        assert_eq!(toolset.gates, vec![gvks::kubevirt_virtual_machine()]);

        let names: Vec<_> = toolset.tools.iter().map(|t| t.descriptor.name).collect();
        assert_eq!(
            names,
            vec!["kubevirt.vm_list", "kubevirt.vm_start", "kubevirt.vm_stop", "kubevirt.vm_restart", "kubevirt.datasources_list", "kubevirt.instancetypes_list"]
        );
    }

    #[test]
    fn lifecycle_tools_are_mutating_and_convergent() {
        for tool in toolset().tools {
            if tool.descriptor.name.starts_with("kubevirt.vm_") && tool.descriptor.name != "kubevirt.vm_list" {
                assert_eq!(tool.descriptor.capability, Capability::Destructive);
                assert!(tool.descriptor.idempotent);
            }
        }
    }
}
