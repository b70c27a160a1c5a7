use serde::Deserialize;

/// RBAC gate configuration for mutating tools
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RbacConfig {
    /// When set, every destructive tool runs a self-subject access review first
    #[serde(default)]
    pub required: bool,
    /// Verdict cache TTL in seconds; values `<= 0` fall back to 5
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: i64,
}

impl Default for RbacConfig {
    fn default() -> Self {
        Self {
            required: false,
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

const fn default_cache_ttl_secs() -> i64 {
    5
}
