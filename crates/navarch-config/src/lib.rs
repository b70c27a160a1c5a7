#![allow(clippy::must_use_candidate)]

pub mod client;
pub mod cluster;
pub mod discovery;
mod env;
pub mod helm;
mod loader;
pub mod logging;
pub mod rbac;
pub mod server;
pub mod telemetry;

use serde::Deserialize;

pub use client::ClientTuning;
pub use cluster::{ClusterConfig, ProviderMode};
pub use discovery::DiscoveryConfig;
pub use helm::HelmConfig;
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use rbac::RbacConfig;
pub use server::{ServerConfig, Transport};
pub use telemetry::{ExportProtocol, TelemetryConfig};

/// Top-level Navarch configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Cluster access: provider mode, kubeconfig path, explicit context
    #[serde(default)]
    pub cluster: ClusterConfig,
    /// Kubernetes client tuning (QPS, burst, request timeout)
    #[serde(default)]
    pub client: ClientTuning,
    /// CRD discovery cache settings
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    /// RBAC gating for mutating tools
    #[serde(default)]
    pub rbac: RbacConfig,
    /// Helm settings bundle consumed by the helm toolset
    #[serde(default)]
    pub helm: HelmConfig,
    /// Logging level and format
    #[serde(default)]
    pub logging: LoggingConfig,
    /// MCP server transport
    #[serde(default)]
    pub server: ServerConfig,
    /// Optional OTLP telemetry export
    #[serde(default)]
    pub telemetry: Option<TelemetryConfig>,
}
