use serde::Deserialize;

/// Kubernetes client tuning applied by the client factory
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientTuning {
    /// Sustained request rate towards the API server
    #[serde(default = "default_qps")]
    pub qps: f64,
    /// Burst allowance above the sustained rate
    #[serde(default = "default_burst")]
    pub burst: u32,
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ClientTuning {
    fn default() -> Self {
        Self {
            qps: default_qps(),
            burst: default_burst(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

const fn default_qps() -> f64 {
    50.0
}

const fn default_burst() -> u32 {
    100
}

const fn default_timeout_secs() -> u64 {
    30
}
