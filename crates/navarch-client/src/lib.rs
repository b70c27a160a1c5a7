#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

//! Cluster client substrate for Navarch
//!
//! Turns a kubeconfig (or in-cluster credentials) into cached, per-context
//! client bundles, and selects bearer credentials per process.

mod bundle;
mod credentials;
pub mod error;
mod factory;
mod provider;

pub use bundle::ClientBundle;
pub use credentials::CredentialSelector;
pub use error::ClientError;
pub use factory::ClientFactory;
pub use provider::{
    ClientProvider, ClusterClient, InClusterProvider, KubeconfigProvider, SingleContextProvider, build_provider,
};

/// Sentinel context name used by the in-cluster provider
pub const IN_CLUSTER_CONTEXT: &str = "in-cluster";
