use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use kube::config::{KubeConfigOptions, Kubeconfig};
use navarch_config::ClientTuning;
use navarch_discovery::{ApiServerLister, DiscoveryCache};

use crate::bundle::ClientBundle;
use crate::credentials::CredentialSelector;
use crate::error::ClientError;

/// Builds client bundles from REST configurations
///
/// The factory imposes the configured request timeout and QPS/burst quota
/// before constructing the client, and applies the process-wide credential
/// selector when one is configured.
#[derive(Debug, Clone)]
pub struct ClientFactory {
    tuning: ClientTuning,
    discovery_ttl: Duration,
    selector: Option<CredentialSelector>,
}

impl ClientFactory {
    pub const fn new(tuning: ClientTuning, discovery_ttl: Duration) -> Self {
        Self {
            tuning,
            discovery_ttl,
            selector: None,
        }
    }

    /// Attach a credential selector applied to every bundle this factory builds
    #[must_use]
    pub fn with_selector(mut self, selector: Option<CredentialSelector>) -> Self {
        self.selector = selector;
        self
    }

    /// Build a bundle from a kubeconfig file, optionally pinning a context
    ///
    /// A leading `~/` in the path is expanded to the user's home directory.
    pub async fn from_kubeconfig(&self, path: &Path, context: Option<&str>) -> Result<Arc<ClientBundle>, ClientError> {
        let path = expand_tilde(path);
        let kubeconfig = Kubeconfig::read_from(&path)?;
        let options = KubeConfigOptions {
            context: context.map(String::from),
            ..KubeConfigOptions::default()
        };
        let config = kube::Config::from_custom_kubeconfig(kubeconfig, &options).await?;
        self.build(config)
    }

    /// Build a bundle from the pod's service-account credentials
    pub fn in_cluster(&self) -> Result<Arc<ClientBundle>, ClientError> {
        let config = kube::Config::incluster()?;
        self.build(config)
    }

    /// Build a bundle from an already-flattened REST configuration
    pub fn build(&self, config: kube::Config) -> Result<Arc<ClientBundle>, ClientError> {
        let mut config = CredentialSelector::apply_opt(self.selector.as_ref(), &config);

        let timeout = Duration::from_secs(self.tuning.timeout_secs);
        config.connect_timeout = Some(timeout);
        config.read_timeout = Some(timeout);
        config.write_timeout = Some(timeout);

        let client = kube::Client::try_from(config.clone()).map_err(ClientError::ClientBuild)?;
        let limiter = build_limiter(&self.tuning);
        let discovery = Arc::new(DiscoveryCache::new(
            Arc::new(ApiServerLister::new(client.clone())),
            self.discovery_ttl,
        ));

        Ok(Arc::new(ClientBundle::new(client, config, limiter, discovery)))
    }
}

fn build_limiter(tuning: &ClientTuning) -> DefaultDirectRateLimiter {
    let burst = NonZeroU32::new(tuning.burst).unwrap_or(NonZeroU32::MIN);
    let period = Duration::from_secs_f64(1.0 / tuning.qps.max(0.001));
    let quota = Quota::with_period(period)
        .unwrap_or_else(|| Quota::per_second(burst))
        .allow_burst(burst);
    RateLimiter::direct(quota)
}

/// Expand a leading `~/` to the user's home directory
fn expand_tilde(path: &Path) -> PathBuf {
    let Ok(stripped) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    home::home_dir().map_or_else(|| path.to_path_buf(), |home| home.join(stripped))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tilde_expands_to_home() {
        let Some(home) = home::home_dir() else {
            return;
        };
        let expanded = expand_tilde(Path::new("~/.kube/config"));
        assert_eq!(expanded, home.join(".kube/config"));
    }

    #[test]
    fn absolute_path_is_untouched() {
        let path = Path::new("/etc/navarch/kubeconfig");
        assert_eq!(expand_tilde(path), path);
    }

    #[tokio::test]
    async fn bundle_carries_timeouts_and_injected_token() {
        use secrecy::ExposeSecret;

        let factory = ClientFactory::new(ClientTuning::default(), Duration::from_secs(60))
            .with_selector(Some(CredentialSelector::bearer("abc")));

        let mut base = kube::Config::new("https://10.0.0.1:6443".parse().unwrap());
        base.auth_info.token_file = Some("/var/run/secrets/kubernetes.io/serviceaccount/token".to_string());

        let bundle = factory.build(base).unwrap();
        let config = bundle.config();
        assert_eq!(config.read_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.auth_info.token.as_ref().map(ExposeSecret::expose_secret), Some("abc"));
        assert!(config.auth_info.token_file.is_none());
    }
}
