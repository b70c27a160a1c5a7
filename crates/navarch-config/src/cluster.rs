use std::path::PathBuf;

use serde::Deserialize;

/// How the server reaches its cluster(s)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderMode {
    /// Multi-context provider over a kubeconfig file
    #[default]
    Kubeconfig,
    /// Single bundle from the pod's service-account credentials
    InCluster,
    /// One pinned kubeconfig context; other context names are rejected
    Single,
}

/// Cluster access configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClusterConfig {
    /// Provider selection
    #[serde(default)]
    pub provider: ProviderMode,
    /// Path to the kubeconfig file; defaults to `~/.kube/config`
    #[serde(default)]
    pub kubeconfig: Option<PathBuf>,
    /// Explicit context name (required for `single`)
    #[serde(default)]
    pub context: Option<String>,
    /// Bearer token override applied to every bundle this process builds
    #[serde(default)]
    pub bearer_token: Option<String>,
}
