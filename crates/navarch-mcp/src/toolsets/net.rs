//! Gateway API tools, gated on the Gateway CRD

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
    Toolset::gated("net", vec![gvks::gateway_api_gateway()], vec![
        ToolSpec::new(
            ToolDescriptor::new(
                "net.gateways_list",
                "List Gateways",
                "List Gateway API gateways with class, addresses and listener count",
                Capability::ReadOnly,
                scoped_params(),
            ),
            gateways_list,
        ),
        ToolSpec::new(
            ToolDescriptor::new(
                "net.httproutes_list",
                "List HTTPRoutes",
                "List Gateway API HTTP routes with hostnames and parents",
                Capability::ReadOnly,
                scoped_params(),
            ),
            httproutes_list,
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

async fn gateways_list(ctx: Arc<ToolContext>, args: ListArgs) -> Result<Value, ToolError> {
    let cluster = ctx.cluster(&args.context).await?;
    let entry = ctx.gated(&cluster, &gvks::gateway_api_gateway(), "Gateway API Gateway").await?;
    cluster.bundle.throttle().await;

    let api = dynamic_api(&cluster, &entry, &args.namespace);
    let list = api.list(&super::list_params(&args.label_selector)).await?;

    Ok(summarize(&list, |object| {
        let mut fields = meta_fields(object);
        fields.insert(
            "class".to_string(),
            json!(unstructured::nested_str(&object.data, &["spec", "gatewayClassName"])),
        );
        let addresses: Vec<&str> = unstructured::nested(&object.data, &["status", "addresses"])
            .and_then(Value::as_array)
            .map(|addrs| {
                addrs
                    .iter()
                    .filter_map(|a| a.get("value").and_then(Value::as_str))
                    .collect()
            })
            .unwrap_or_default();
        fields.insert("addresses".to_string(), json!(addresses));
        let listeners = unstructured::nested(&object.data, &["spec", "listeners"])
            .and_then(Value::as_array)
            .map_or(0, Vec::len);
        fields.insert("listeners".to_string(), json!(listeners));
        Value::Object(fields)
    }))
}

async fn httproutes_list(ctx: Arc<ToolContext>, args: ListArgs) -> Result<Value, ToolError> {
    let cluster = ctx.cluster(&args.context).await?;
    let entry = ctx
        .gated(&cluster, &gvks::gateway_api_http_route(), "Gateway API HTTPRoute")
        .await?;
    cluster.bundle.throttle().await;

    let api = dynamic_api(&cluster, &entry, &args.namespace);
    let list = api.list(&super::list_params(&args.label_selector)).await?;

    Ok(summarize(&list, |object| {
        let mut fields = meta_fields(object);
        let hostnames: Vec<&str> = unstructured::nested(&object.data, &["spec", "hostnames"])
            .and_then(Value::as_array)
            .map(|hosts| hosts.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        fields.insert("hostnames".to_string(), json!(hostnames));
        let parents: Vec<&str> = unstructured::nested(&object.data, &["spec", "parentRefs"])
            .and_then(Value::as_array)
            .map(|refs| {
                refs.iter()
                    .filter_map(|r| r.get("name").and_then(Value::as_str))
                    .collect()
            })
            .unwrap_or_default();
        fields.insert("parents".to_string(), json!(parents));
        Value::Object(fields)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toolset_is_gated_on_the_gateway_crd() {
        let toolset = toolset();
        assert_eq!(toolset.gates, vec![gvks::gateway_api_gateway()]);
        assert!(toolset.tools.iter().all(|t| t.descriptor.capability == Capability::ReadOnly));
    }
}
