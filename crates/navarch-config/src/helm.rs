use std::path::PathBuf;

use serde::Deserialize;

/// Settings bundle handed to the helm toolset
///
/// Navarch does not reimplement Helm's release engine; these paths are
/// forwarded to the `helm` binary on each invocation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HelmConfig {
    /// Path to the `helm` binary; defaults to `helm` on `PATH`
    #[serde(default)]
    pub binary: Option<PathBuf>,
    /// Helm repository cache directory (`--repository-cache`)
    #[serde(default)]
    pub repository_cache: Option<PathBuf>,
    /// Helm repository config file (`--repository-config`)
    #[serde(default)]
    pub repository_config: Option<PathBuf>,
}
