use serde::Deserialize;

/// CRD discovery cache settings
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiscoveryConfig {
    /// Seconds before a cached discovery snapshot is considered stale
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
        }
    }
}

const fn default_ttl_secs() -> u64 {
    60
}
