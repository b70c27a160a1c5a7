use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use k8s_openapi::api::authorization::v1::{
    ResourceAttributes, SelfSubjectAccessReview, SelfSubjectAccessReviewSpec,
};
use kube::Api;
use kube::api::PostParams;
use tokio::sync::RwLock;

use crate::AuthError;

/// Default verdict TTL used when the configured value is zero or negative
const DEFAULT_TTL: Duration = Duration::from_secs(5);

/// Outcome of an access review
#[derive(Debug, Clone)]
pub struct Verdict {
    pub allowed: bool,
    /// The server's reason, when it gave one
    pub reason: String,
}

/// Capability for issuing self-subject access reviews
#[async_trait]
pub trait ReviewClient: Send + Sync {
    async fn review(&self, verb: &str, group: &str, resource: &str, namespace: &str) -> Result<Verdict, AuthError>;
}

/// Real review client over the cluster's authorization API
pub struct SelfSubjectReviewClient {
    client: kube::Client,
}

impl SelfSubjectReviewClient {
    pub const fn new(client: kube::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ReviewClient for SelfSubjectReviewClient {
    async fn review(&self, verb: &str, group: &str, resource: &str, namespace: &str) -> Result<Verdict, AuthError> {
        let review = SelfSubjectAccessReview {
            spec: SelfSubjectAccessReviewSpec {
                resource_attributes: Some(ResourceAttributes {
                    verb: Some(verb.to_string()),
                    group: Some(group.to_string()),
                    resource: Some(resource.to_string()),
                    namespace: (!namespace.is_empty()).then(|| namespace.to_string()),
                    ..ResourceAttributes::default()
                }),
                non_resource_attributes: None,
            },
            ..SelfSubjectAccessReview::default()
        };

        let api: Api<SelfSubjectAccessReview> = Api::all(self.client.clone());
        let created = api
            .create(&PostParams::default(), &review)
            .await
            .map_err(AuthError::AccessReview)?;

        let status = created.status.unwrap_or_default();
        Ok(Verdict {
            allowed: status.allowed,
            reason: status.reason.unwrap_or_default(),
        })
    }
}

struct CacheEntry {
    verdict: Verdict,
    expires_at: Instant,
}

/// Self-subject access review with per-key TTL caching
///
/// Keys are `(user, verb, group, resource, namespace)`. The version is
/// intentionally omitted: two versions of the same resource share
/// authorization. Allowed and denied verdicts cache identically; an expired
/// entry is deleted by the read that observes it.
pub struct AccessReviewer {
    client: Arc<dyn ReviewClient>,
    ttl: Duration,
    cache: RwLock<HashMap<String, CacheEntry>>,
}

impl AccessReviewer {
    /// Create a reviewer; a TTL of zero or less falls back to 5 seconds
    pub fn new(client: Arc<dyn ReviewClient>, ttl_secs: i64) -> Self {
        let ttl = u64::try_from(ttl_secs).map_or(DEFAULT_TTL, |secs| {
            if secs == 0 { DEFAULT_TTL } else { Duration::from_secs(secs) }
        });
        Self::with_ttl(client, ttl)
    }

    fn with_ttl(client: Arc<dyn ReviewClient>, ttl: Duration) -> Self {
        Self {
            client,
            ttl,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Whether `user` may perform `verb` on the resource in `namespace`
    ///
    /// Returns the cached verdict when a fresh entry exists; otherwise
    /// issues one review and caches the result for the TTL.
    pub async fn allowed(
        &self,
        user: &str,
        verb: &str,
        group: &str,
        resource: &str,
        namespace: &str,
    ) -> Result<Verdict, AuthError> {
        let key = cache_key(user, verb, group, resource, namespace);

        let expired = {
            let cache = self.cache.read().await;
            match cache.get(&key) {
                Some(entry) if Instant::now() < entry.expires_at => return Ok(entry.verdict.clone()),
                Some(_) => true,
                None => false,
            }
        };
        if expired {
            self.cache.write().await.remove(&key);
        }

        let verdict = self.client.review(verb, group, resource, namespace).await?;
        tracing::debug!(
            user,
            verb,
            group,
            resource,
            namespace,
            allowed = verdict.allowed,
            "access review issued"
        );

        self.cache.write().await.insert(key, CacheEntry {
            verdict: verdict.clone(),
            expires_at: Instant::now() + self.ttl,
        });

        Ok(verdict)
    }
}

fn cache_key(user: &str, verb: &str, group: &str, resource: &str, namespace: &str) -> String {
    format!("{user}|{verb}|{group}|{resource}|{namespace}")
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct StubReviews {
        allowed: bool,
        calls: AtomicUsize,
    }

    impl StubReviews {
        fn allowing(allowed: bool) -> Arc<Self> {
            Arc::new(Self {
                allowed,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ReviewClient for StubReviews {
        async fn review(&self, _verb: &str, _group: &str, _resource: &str, _ns: &str) -> Result<Verdict, AuthError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Verdict {
                allowed: self.allowed,
                reason: if self.allowed { String::new() } else { "RBAC: access denied".to_string() },
            })
        }
    }

    #[tokio::test]
    async fn verdict_is_cached_within_ttl() {
        let stub = StubReviews::allowing(false);
        let reviewer = AccessReviewer::new(Arc::clone(&stub) as Arc<dyn ReviewClient>, 60);

        let first = reviewer.allowed("alice", "update", "apps", "deployments", "prod").await.unwrap();
        let second = reviewer.allowed("alice", "update", "apps", "deployments", "prod").await.unwrap();

        assert!(!first.allowed);
        assert!(!second.allowed);
        assert_eq!(second.reason, "RBAC: access denied");
        assert_eq!(stub.calls(), 1);
    }

    #[tokio::test]
    async fn changing_any_key_component_issues_a_new_review() {
        let stub = StubReviews::allowing(true);
        let reviewer = AccessReviewer::new(Arc::clone(&stub) as Arc<dyn ReviewClient>, 60);

        reviewer.allowed("alice", "update", "apps", "deployments", "prod").await.unwrap();
        reviewer.allowed("alice", "update", "apps", "deployments", "dev").await.unwrap();
        reviewer.allowed("bob", "update", "apps", "deployments", "prod").await.unwrap();
        reviewer.allowed("alice", "delete", "apps", "deployments", "prod").await.unwrap();

        assert_eq!(stub.calls(), 4);
    }

    #[tokio::test]
    async fn expired_entry_is_evicted_and_reviewed_again() {
        let stub = StubReviews::allowing(true);
        let reviewer = AccessReviewer::with_ttl(Arc::clone(&stub) as Arc<dyn ReviewClient>, Duration::from_millis(20));

        reviewer.allowed("", "get", "", "pods", "default").await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        reviewer.allowed("", "get", "", "pods", "default").await.unwrap();

        assert_eq!(stub.calls(), 2);
        assert_eq!(reviewer.cache.read().await.len(), 1);
    }

    #[tokio::test]
    async fn non_positive_ttl_falls_back_to_default() {
        let stub = StubReviews::allowing(true);
        let zero = AccessReviewer::new(Arc::clone(&stub) as Arc<dyn ReviewClient>, 0);
        assert_eq!(zero.ttl, DEFAULT_TTL);

        let negative = AccessReviewer::new(Arc::clone(&stub) as Arc<dyn ReviewClient>, -3);
        assert_eq!(negative.ttl, DEFAULT_TTL);
    }

    #[test]
    fn cache_key_is_deterministic_and_component_sensitive() {
        let a = cache_key("alice", "update", "apps", "deployments", "prod");
        let b = cache_key("alice", "update", "apps", "deployments", "prod");
        assert_eq!(a, b);

        assert_ne!(a, cache_key("alice", "update", "apps", "deployments", "dev"));
        assert_ne!(a, cache_key("bob", "update", "apps", "deployments", "prod"));
        assert_ne!(a, cache_key("alice", "get", "apps", "deployments", "prod"));
        assert_ne!(a, cache_key("alice", "update", "", "deployments", "prod"));
        assert_ne!(a, cache_key("alice", "update", "apps", "statefulsets", "prod"));
    }
}
