use async_trait::async_trait;
use kube::discovery::{Discovery, Scope};

use crate::DiscoveryError;

/// One resource as reported by server-preferred discovery
#[derive(Debug, Clone)]
pub struct DiscoveredResource {
    pub group: String,
    pub version: String,
    pub kind: String,
    /// Plural resource name; the wire-level GVR `resource` component
    pub plural: String,
    pub namespaced: bool,
}

/// Capability for enumerating the resources a cluster currently serves
///
/// The cache is generic over this seam so tests can stub enumeration
/// without an API server.
#[async_trait]
pub trait ResourceLister: Send + Sync {
    async fn list_resources(&self) -> Result<Vec<DiscoveredResource>, DiscoveryError>;
}

/// Real lister over kube's discovery client
pub struct ApiServerLister {
    client: kube::Client,
}

impl ApiServerLister {
    pub const fn new(client: kube::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResourceLister for ApiServerLister {
    async fn list_resources(&self) -> Result<Vec<DiscoveredResource>, DiscoveryError> {
        let discovery = Discovery::new(self.client.clone())
            .run()
            .await
            .map_err(DiscoveryError::Enumeration)?;

        let mut resources = Vec::new();
        for group in discovery.groups() {
            for version in group.versions() {
                for (resource, capabilities) in group.versioned_resources(version) {
                    resources.push(DiscoveredResource {
                        group: resource.group.clone(),
                        version: resource.version.clone(),
                        kind: resource.kind.clone(),
                        plural: resource.plural.clone(),
                        namespaced: capabilities.scope == Scope::Namespaced,
                    });
                }
            }
        }

        Ok(resources)
    }
}
