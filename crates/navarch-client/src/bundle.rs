use std::sync::Arc;

use governor::DefaultDirectRateLimiter;
use navarch_discovery::DiscoveryCache;

/// Everything a tool handler needs to talk to one cluster
///
/// Bundles are immutable once constructed and cheap to share; the underlying
/// kube client is an `Arc`-backed handle.
pub struct ClientBundle {
    client: kube::Client,
    config: kube::Config,
    limiter: DefaultDirectRateLimiter,
    discovery: Arc<DiscoveryCache>,
}

impl ClientBundle {
    pub(crate) const fn new(
        client: kube::Client,
        config: kube::Config,
        limiter: DefaultDirectRateLimiter,
        discovery: Arc<DiscoveryCache>,
    ) -> Self {
        Self {
            client,
            config,
            limiter,
            discovery,
        }
    }

    /// Handle to the cluster; serves typed and dynamic access
    pub fn client(&self) -> kube::Client {
        self.client.clone()
    }

    /// The REST configuration this bundle was built from
    pub const fn config(&self) -> &kube::Config {
        &self.config
    }

    /// The per-cluster CRD discovery cache
    pub const fn discovery(&self) -> &Arc<DiscoveryCache> {
        &self.discovery
    }

    /// Wait for a request permit under the configured QPS/burst quota
    pub async fn throttle(&self) {
        self.limiter.until_ready().await;
    }
}

impl std::fmt::Debug for ClientBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientBundle")
            .field("cluster_url", &self.config.cluster_url)
            .finish_non_exhaustive()
    }
}
