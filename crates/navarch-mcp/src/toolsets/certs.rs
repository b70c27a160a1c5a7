//! cert-manager tools, gated on the Certificate CRD

use std::sync::Arc;

use kube::api::{Patch, PatchParams};
use navarch_discovery::gvks;
use serde_json::{Value, json};

use crate::context::ToolContext;
use crate::descriptor::{Capability, ParamType, ToolDescriptor, ToolParam};
use crate::error::ToolError;
use crate::toolset::{ToolSpec, Toolset};
use crate::toolsets::{ListArgs, NamedArgs, annotation_patch, dynamic_api, meta_fields, summarize};
use crate::unstructured;

const CERT_FEATURE: &str = "cert-manager Certificate";
const RENEW_ANNOTATION: &str = "renew.cert-manager.io/requestedAt";

pub fn toolset() -> Toolset {
    Toolset::gated("certs", vec![gvks::cert_manager_certificate()], vec![
        ToolSpec::new(
            ToolDescriptor::new(
                "certs.certificates_list",
                "List Certificates",
                "List cert-manager certificates with readiness and expiry",
                Capability::ReadOnly,
                vec![
                    ToolParam::optional("context", ParamType::String, "Cluster context; empty for the default"),
                    ToolParam::optional("namespace", ParamType::String, "Namespace; empty for all namespaces"),
                    ToolParam::optional("label_selector", ParamType::String, "Label selector"),
                ],
            ),
            certificates_list,
        ),
        ToolSpec::new(
            ToolDescriptor::new(
                "certs.certificate_renew",
                "Request Certificate Renewal",
                "Annotate a certificate so cert-manager reissues it",
                Capability::Destructive,
                vec![
                    ToolParam::optional("context", ParamType::String, "Cluster context; empty for the default"),
                    ToolParam::optional("namespace", ParamType::String, "Namespace; defaults to `default`"),
                    ToolParam::required("name", ParamType::String, "Certificate name"),
                ],
            ).idempotent(),
            certificate_renew,
        ),
    ])
}

async fn certificates_list(ctx: Arc<ToolContext>, args: ListArgs) -> Result<Value, ToolError> {
    let cluster = ctx.cluster(&args.context).await?;
    let entry = ctx.gated(&cluster, &gvks::cert_manager_certificate(), CERT_FEATURE).await?;
    cluster.bundle.throttle().await;

    let api = dynamic_api(&cluster, &entry, &args.namespace);
    let list = api.list(&super::list_params(&args.label_selector)).await?;

    Ok(summarize(&list, |object| {
        let mut fields = meta_fields(object);
        fields.insert(
            "secret".to_string(),
            json!(unstructured::nested_str(&object.data, &["spec", "secretName"])),
        );
        fields.insert(
            "issuer".to_string(),
            json!(unstructured::nested_str(&object.data, &["spec", "issuerRef", "name"])),
        );
        fields.insert(
            "not_after".to_string(),
            json!(unstructured::nested_str(&object.data, &["status", "notAfter"])),
        );
        fields.insert(
            "renewal_time".to_string(),
            json!(unstructured::nested_str(&object.data, &["status", "renewalTime"])),
        );
        if let Some((status, reason, message)) = unstructured::condition(&object.data, "Ready") {
            fields.insert("ready".to_string(), json!(status == "True"));
            fields.insert("reason".to_string(), json!(reason));
            if !message.is_empty() {
                fields.insert("message".to_string(), json!(message));
            }
        }
        Value::Object(fields)
    }))
}

async fn certificate_renew(ctx: Arc<ToolContext>, args: NamedArgs) -> Result<Value, ToolError> {
    let cluster = ctx.cluster(&args.context).await?;
    let entry = ctx.gated(&cluster, &gvks::cert_manager_certificate(), CERT_FEATURE).await?;
    ctx.authorize(&cluster, "patch", &entry.group, &entry.plural, &args.namespace).await?;
    cluster.bundle.throttle().await;

    let stamp = k8s_openapi::chrono::Utc::now().to_rfc3339();
    let api = dynamic_api(&cluster, &entry, &args.namespace);
    api.patch(
        &args.name,
        &PatchParams::default(),
        &Patch::Merge(annotation_patch(RENEW_ANNOTATION, Some(&stamp))),
    )
    .await?;

    Ok(json!({ "renewal_requested": args.name, "namespace": args.namespace, "at": stamp }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toolset_is_gated_on_the_certificate_crd() {
        let toolset = toolset();
        assert_eq!(toolset.gates, vec![gvks::cert_manager_certificate()]);
        assert_eq!(toolset.tools.len(), 2);
    }
}
