use std::collections::HashMap;

use serde::Deserialize;

/// OTLP telemetry export configuration
///
/// When absent, Navarch logs through the fmt subscriber only and keeps
/// metrics on the process-default meter provider.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TelemetryConfig {
    /// Service name reported in telemetry resource metadata
    #[serde(default = "default_service_name")]
    pub service_name: String,
    /// OTLP endpoint, e.g. `http://localhost:4317`
    pub endpoint: String,
    /// Export protocol
    #[serde(default)]
    pub protocol: ExportProtocol,
    /// Additional resource attributes
    #[serde(default)]
    pub resource_attributes: HashMap<String, String>,
    /// Metric export interval in seconds
    #[serde(default = "default_export_interval")]
    pub export_interval_secs: u64,
}

/// OTLP export protocol
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportProtocol {
    /// gRPC (default)
    #[default]
    Grpc,
    /// HTTP/protobuf
    HttpProto,
}

fn default_service_name() -> String {
    "navarch".to_string()
}

const fn default_export_interval() -> u64 {
    30
}
