use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use kube::api::GroupVersionKind;
use kube::discovery::ApiResource;
use tokio::sync::RwLock;

use crate::lister::{DiscoveredResource, ResourceLister};
use crate::{DiscoveryError, gvks};

/// A resolved GVK→GVR mapping with enough context to build a dynamic `Api`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GvrEntry {
    pub group: String,
    pub version: String,
    pub kind: String,
    /// Wire-level resource path component (plural name)
    pub plural: String,
    pub namespaced: bool,
}

impl GvrEntry {
    /// Build the `ApiResource` a dynamic `Api` needs for this entry
    pub fn api_resource(&self) -> ApiResource {
        let api_version = if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        };
        ApiResource {
            group: self.group.clone(),
            version: self.version.clone(),
            api_version,
            kind: self.kind.clone(),
            plural: self.plural.clone(),
        }
    }
}

struct Index {
    by_gvk: HashMap<String, GvrEntry>,
    last_refreshed: Option<Instant>,
}

/// TTL-gated cache of the cluster's GVK→GVR index
///
/// `refresh` is a no-op while the snapshot is fresh, so CRD-gated handlers
/// can call it on every entry. The index is replaced wholesale on a
/// successful enumeration; a failed one keeps the previous snapshot.
pub struct DiscoveryCache {
    lister: Arc<dyn ResourceLister>,
    ttl: Duration,
    index: RwLock<Index>,
}

impl DiscoveryCache {
    pub fn new(lister: Arc<dyn ResourceLister>, ttl: Duration) -> Self {
        Self {
            lister,
            ttl,
            index: RwLock::new(Index {
                by_gvk: HashMap::new(),
                last_refreshed: None,
            }),
        }
    }

    /// Refresh the index if the snapshot is stale
    ///
    /// Serialized under the writer lock; concurrent callers that lose the
    /// race observe a fresh snapshot and return without enumerating.
    pub async fn refresh(&self) -> Result<(), DiscoveryError> {
        let mut index = self.index.write().await;
        if let Some(at) = index.last_refreshed
            && at.elapsed() < self.ttl
        {
            return Ok(());
        }

        let resources = self.lister.list_resources().await?;
        let by_gvk = build_index(resources);
        tracing::debug!(entries = by_gvk.len(), "discovery index rebuilt");

        index.by_gvk = by_gvk;
        index.last_refreshed = Some(Instant::now());
        Ok(())
    }

    /// Refresh unconditionally, ignoring the TTL
    pub async fn force_refresh(&self) -> Result<(), DiscoveryError> {
        self.index.write().await.last_refreshed = None;
        self.refresh().await
    }

    /// Resolve a GVK to its wire-level resource, if the cluster serves it
    pub async fn lookup(&self, gvk: &GroupVersionKind) -> Option<GvrEntry> {
        self.index.read().await.by_gvk.get(&key_for(gvk)).cloned()
    }

    /// Whether the cluster serves the given GVK
    pub async fn has(&self, gvk: &GroupVersionKind) -> bool {
        self.index.read().await.by_gvk.contains_key(&key_for(gvk))
    }

    /// Whether the KubeVirt `VirtualMachine` CRD is installed
    pub async fn has_kubevirt(&self) -> bool {
        self.has(&gvks::kubevirt_virtual_machine()).await
    }

    /// All GVKs in the current snapshot
    pub async fn known_gvks(&self) -> Vec<GroupVersionKind> {
        let index = self.index.read().await;
        index
            .by_gvk
            .keys()
            .filter_map(|key| {
                // Split the key explicitly; group may be empty for core types.
                let mut parts = key.splitn(3, '/');
                match (parts.next(), parts.next(), parts.next()) {
                    (Some(group), Some(version), Some(kind)) => {
                        Some(GroupVersionKind::gvk(group, version, kind))
                    }
                    _ => None,
                }
            })
            .collect()
    }
}

fn key_for(gvk: &GroupVersionKind) -> String {
    format!("{}/{}/{}", gvk.group, gvk.version, gvk.kind)
}

fn build_index(resources: Vec<DiscoveredResource>) -> HashMap<String, GvrEntry> {
    let mut by_gvk = HashMap::new();
    for resource in resources {
        // Sub-resources carry a `/` in their name; neither they nor
        // kindless entries belong in the index.
        if resource.kind.is_empty() || resource.plural.contains('/') {
            continue;
        }
        let gvk = GroupVersionKind::gvk(&resource.group, &resource.version, &resource.kind);
        by_gvk.insert(key_for(&gvk), GvrEntry {
            group: resource.group,
            version: resource.version,
            kind: resource.kind,
            plural: resource.plural,
            namespaced: resource.namespaced,
        });
    }
    by_gvk
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;

    struct StubLister {
        resources: Vec<DiscoveredResource>,
        calls: AtomicUsize,
        fail: bool,
    }

    impl StubLister {
        fn new(resources: Vec<DiscoveredResource>) -> Self {
            Self {
                resources,
                calls: AtomicUsize::new(0),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                resources: Vec::new(),
                calls: AtomicUsize::new(0),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl ResourceLister for StubLister {
        async fn list_resources(&self) -> Result<Vec<DiscoveredResource>, DiscoveryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(DiscoveryError::Enumeration(kube::Error::LinesCodecMaxLineLengthExceeded));
            }
            Ok(self.resources.clone())
        }
    }

    fn resource(group: &str, version: &str, kind: &str, plural: &str) -> DiscoveredResource {
        DiscoveredResource {
            group: group.to_string(),
            version: version.to_string(),
            kind: kind.to_string(),
            plural: plural.to_string(),
            namespaced: true,
        }
    }

    #[tokio::test]
    async fn lookup_after_refresh_returns_entry() {
        let lister = Arc::new(StubLister::new(vec![
            resource("", "v1", "Pod", "pods"),
            resource("keda.sh", "v1alpha1", "ScaledObject", "scaledobjects"),
        ]));
        let cache = DiscoveryCache::new(lister, Duration::from_secs(60));
        cache.refresh().await.unwrap();

        let entry = cache.lookup(&GroupVersionKind::gvk("", "v1", "Pod")).await.unwrap();
        assert_eq!(entry.plural, "pods");

        assert!(cache.has(&gvks::keda_scaled_object()).await);
        assert!(!cache.has_kubevirt().await);
    }

    #[tokio::test]
    async fn subresources_and_kindless_entries_are_excluded() {
        let lister = Arc::new(StubLister::new(vec![
            resource("", "v1", "Pod", "pods"),
            resource("", "v1", "Pod", "pods/log"),
            resource("", "v1", "", "bindings"),
        ]));
        let cache = DiscoveryCache::new(lister, Duration::from_secs(60));
        cache.refresh().await.unwrap();

        let gvks = cache.known_gvks().await;
        assert_eq!(gvks.len(), 1);
        for entry in gvks {
            let found = cache.lookup(&entry).await.unwrap();
            assert!(!found.plural.contains('/'));
        }
    }

    #[tokio::test]
    async fn refresh_within_ttl_is_a_noop() {
        let lister = Arc::new(StubLister::new(vec![resource("", "v1", "Pod", "pods")]));
        let cache = DiscoveryCache::new(Arc::clone(&lister) as Arc<dyn ResourceLister>, Duration::from_secs(60));

        cache.refresh().await.unwrap();
        cache.refresh().await.unwrap();
        cache.refresh().await.unwrap();
        assert_eq!(lister.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn force_refresh_ignores_ttl() {
        let lister = Arc::new(StubLister::new(vec![resource("", "v1", "Pod", "pods")]));
        let cache = DiscoveryCache::new(Arc::clone(&lister) as Arc<dyn ResourceLister>, Duration::from_secs(60));

        cache.refresh().await.unwrap();
        cache.force_refresh().await.unwrap();
        assert_eq!(lister.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn expired_ttl_triggers_new_enumeration() {
        let lister = Arc::new(StubLister::new(vec![resource("", "v1", "Pod", "pods")]));
        let cache = DiscoveryCache::new(Arc::clone(&lister) as Arc<dyn ResourceLister>, Duration::from_millis(20));

        cache.refresh().await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        cache.refresh().await.unwrap();
        assert_eq!(lister.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_index() {
        let good = Arc::new(StubLister::new(vec![resource("", "v1", "Pod", "pods")]));
        let cache = DiscoveryCache::new(Arc::clone(&good) as Arc<dyn ResourceLister>, Duration::from_secs(60));
        cache.refresh().await.unwrap();

        let bad = DiscoveryCache {
            lister: Arc::new(StubLister::failing()),
            ttl: Duration::ZERO,
            index: RwLock::new(Index {
                by_gvk: build_index(vec![resource("", "v1", "Pod", "pods")]),
                last_refreshed: Some(Instant::now()),
            }),
        };
        assert!(bad.refresh().await.is_err());
        assert!(bad.has(&GroupVersionKind::gvk("", "v1", "Pod")).await);
    }

    #[tokio::test]
    async fn known_gvks_round_trip_core_group() {
        let lister = Arc::new(StubLister::new(vec![
            resource("", "v1", "Pod", "pods"),
            resource("apps", "v1", "Deployment", "deployments"),
        ]));
        let cache = DiscoveryCache::new(lister, Duration::from_secs(60));
        cache.refresh().await.unwrap();

        let mut gvks = cache.known_gvks().await;
        gvks.sort_by(|a, b| a.kind.cmp(&b.kind));
        assert_eq!(gvks[0], GroupVersionKind::gvk("apps", "v1", "Deployment"));
        assert_eq!(gvks[1], GroupVersionKind::gvk("", "v1", "Pod"));
    }
}
