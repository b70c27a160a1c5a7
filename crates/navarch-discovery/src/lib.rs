#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

//! TTL-cached CRD discovery for Navarch
//!
//! Toolsets consult this cache to decide which optional tools are live on a
//! cluster and to resolve GVKs to wire-level resources for the dynamic
//! client. Refreshes rebuild the whole index from server-preferred
//! resources; a failed refresh leaves the previous index intact.

mod cache;
mod lister;

pub use cache::{DiscoveryCache, GvrEntry};
pub use lister::{ApiServerLister, DiscoveredResource, ResourceLister};

use thiserror::Error;

/// Discovery subsystem errors
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Server-preferred resource enumeration failed
    #[error("discovery enumeration failed: {0}")]
    Enumeration(#[source] kube::Error),
}

/// Well-known gating kinds checked by optional toolsets
pub mod gvks {
    use kube::api::GroupVersionKind;

    pub fn kubevirt_virtual_machine() -> GroupVersionKind {
        GroupVersionKind::gvk("kubevirt.io", "v1", "VirtualMachine")
    }

    pub fn kubevirt_data_source() -> GroupVersionKind {
        GroupVersionKind::gvk("cdi.kubevirt.io", "v1beta1", "DataSource")
    }

    pub fn kubevirt_instancetype() -> GroupVersionKind {
        GroupVersionKind::gvk("instancetype.kubevirt.io", "v1beta1", "VirtualMachineInstancetype")
    }

    pub fn keda_scaled_object() -> GroupVersionKind {
        GroupVersionKind::gvk("keda.sh", "v1alpha1", "ScaledObject")
    }

    pub fn kyverno_cluster_policy() -> GroupVersionKind {
        GroupVersionKind::gvk("kyverno.io", "v1", "ClusterPolicy")
    }

    pub fn kyverno_policy() -> GroupVersionKind {
        GroupVersionKind::gvk("kyverno.io", "v1", "Policy")
    }

    pub fn gatekeeper_constraint_template() -> GroupVersionKind {
        GroupVersionKind::gvk("templates.gatekeeper.sh", "v1", "ConstraintTemplate")
    }

    pub fn flux_kustomization() -> GroupVersionKind {
        GroupVersionKind::gvk("kustomize.toolkit.fluxcd.io", "v1", "Kustomization")
    }

    pub fn flux_helm_release() -> GroupVersionKind {
        GroupVersionKind::gvk("helm.toolkit.fluxcd.io", "v2", "HelmRelease")
    }

    pub fn argo_rollout() -> GroupVersionKind {
        GroupVersionKind::gvk("argoproj.io", "v1alpha1", "Rollout")
    }

    pub fn cert_manager_certificate() -> GroupVersionKind {
        GroupVersionKind::gvk("cert-manager.io", "v1", "Certificate")
    }

    pub fn velero_backup() -> GroupVersionKind {
        GroupVersionKind::gvk("velero.io", "v1", "Backup")
    }

    pub fn velero_restore() -> GroupVersionKind {
        GroupVersionKind::gvk("velero.io", "v1", "Restore")
    }

    pub fn capi_cluster() -> GroupVersionKind {
        GroupVersionKind::gvk("cluster.x-k8s.io", "v1beta1", "Cluster")
    }

    pub fn gateway_api_gateway() -> GroupVersionKind {
        GroupVersionKind::gvk("gateway.networking.k8s.io", "v1", "Gateway")
    }

    pub fn gateway_api_http_route() -> GroupVersionKind {
        GroupVersionKind::gvk("gateway.networking.k8s.io", "v1", "HTTPRoute")
    }
}
