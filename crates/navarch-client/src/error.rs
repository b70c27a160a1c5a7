use thiserror::Error;

/// Cluster client errors
#[derive(Debug, Error)]
pub enum ClientError {
    /// The requested kubeconfig context does not exist
    #[error("context not found: {requested} (configured: {configured})")]
    ContextNotFound { requested: String, configured: String },

    /// Kubeconfig could not be read or has no usable context
    #[error("kubeconfig error: {0}")]
    Kubeconfig(String),

    /// Flattening a kubeconfig into a REST configuration failed
    #[error("failed to build client configuration: {0}")]
    Config(#[from] kube::config::KubeconfigError),

    /// Service-account credentials are absent or incomplete
    #[error("in-cluster configuration unavailable: {0}")]
    InCluster(#[from] kube::config::InClusterError),

    /// Constructing the client from a REST configuration failed
    #[error("failed to build client: {0}")]
    ClientBuild(#[source] kube::Error),

    /// Provider selection was given an unusable combination
    #[error("invalid provider configuration: {0}")]
    Configuration(String),
}
