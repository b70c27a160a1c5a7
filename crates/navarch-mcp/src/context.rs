use std::collections::HashMap;
use std::sync::Arc;

use kube::api::GroupVersionKind;
use navarch_auth::{AccessReviewer, ReviewedUser, SelfSubjectReviewClient};
use navarch_client::{ClientProvider, ClusterClient};
use navarch_config::HelmConfig;
use navarch_discovery::GvrEntry;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::error::ToolError;

/// A running port-forward session owned by the registry
pub struct ForwardSession {
    pub namespace: String,
    pub pod: String,
    pub local_addr: String,
    pub remote_port: u16,
    handle: JoinHandle<()>,
}

impl ForwardSession {
    pub const fn new(
        namespace: String,
        pod: String,
        local_addr: String,
        remote_port: u16,
        handle: JoinHandle<()>,
    ) -> Self {
        Self {
            namespace,
            pod,
            local_addr,
            remote_port,
            handle,
        }
    }
}

/// Shared state handed to every tool handler
///
/// One context serves all clusters: per-cluster pieces (client bundles,
/// access reviewers) are resolved lazily by context name and cached for the
/// server's lifetime.
pub struct ToolContext {
    provider: Arc<dyn ClientProvider>,
    require_rbac: bool,
    rbac_ttl_secs: i64,
    /// Identity established at startup via token review, when a bearer token
    /// was configured; part of the authorization cache key.
    subject: Option<ReviewedUser>,
    helm: HelmConfig,
    reviewers: RwLock<HashMap<String, Arc<AccessReviewer>>>,
    forwards: RwLock<HashMap<String, ForwardSession>>,
}

impl ToolContext {
    pub fn new(
        provider: Arc<dyn ClientProvider>,
        require_rbac: bool,
        rbac_ttl_secs: i64,
        subject: Option<ReviewedUser>,
        helm: HelmConfig,
    ) -> Self {
        Self {
            provider,
            require_rbac,
            rbac_ttl_secs,
            subject,
            helm,
            reviewers: RwLock::new(HashMap::new()),
            forwards: RwLock::new(HashMap::new()),
        }
    }

    pub fn provider(&self) -> &Arc<dyn ClientProvider> {
        &self.provider
    }

    pub const fn helm(&self) -> &HelmConfig {
        &self.helm
    }

    /// Username of the reviewed subject, empty when none was configured
    pub fn subject_name(&self) -> &str {
        self.subject.as_ref().map_or("", |user| user.username.as_str())
    }

    /// Resolve a context name (empty means default) to a cluster client
    pub async fn cluster(&self, context: &str) -> Result<ClusterClient, ToolError> {
        Ok(self.provider.with_context(context).await?)
    }

    async fn reviewer_for(&self, cluster: &ClusterClient) -> Arc<AccessReviewer> {
        if let Some(reviewer) = self.reviewers.read().await.get(&cluster.context) {
            return Arc::clone(reviewer);
        }

        let mut reviewers = self.reviewers.write().await;
        if let Some(reviewer) = reviewers.get(&cluster.context) {
            return Arc::clone(reviewer);
        }

        let client = SelfSubjectReviewClient::new(cluster.bundle.client());
        let reviewer = Arc::new(AccessReviewer::new(Arc::new(client), self.rbac_ttl_secs));
        reviewers.insert(cluster.context.clone(), Arc::clone(&reviewer));
        reviewer
    }

    /// Gate an operation on a self-subject access review
    ///
    /// No-op when authorization enforcement is disabled. A denied verdict
    /// becomes `Forbidden` carrying the attributes that were reviewed.
    pub async fn authorize(
        &self,
        cluster: &ClusterClient,
        verb: &str,
        group: &str,
        resource: &str,
        namespace: &str,
    ) -> Result<(), ToolError> {
        if !self.require_rbac {
            return Ok(());
        }

        let reviewer = self.reviewer_for(cluster).await;
        let verdict = reviewer
            .allowed(self.subject_name(), verb, group, resource, namespace)
            .await?;
        if verdict.allowed {
            return Ok(());
        }

        Err(ToolError::Forbidden {
            verb: verb.to_string(),
            group: group.to_string(),
            resource: resource.to_string(),
            namespace: namespace.to_string(),
            reason: if verdict.reason.is_empty() {
                "access review denied".to_string()
            } else {
                verdict.reason
            },
        })
    }

    /// Resolve a CRD-backed GVK, refreshing discovery opportunistically
    ///
    /// A refresh failure is logged and the previous snapshot consulted; an
    /// absent GVK is `FeatureNotInstalled` for the named feature.
    pub async fn gated(
        &self,
        cluster: &ClusterClient,
        gvk: &GroupVersionKind,
        feature: &str,
    ) -> Result<GvrEntry, ToolError> {
        let discovery = cluster.bundle.discovery();
        if let Err(error) = discovery.refresh().await {
            tracing::warn!(cluster = %cluster.context, %error, "discovery refresh failed, using cached index");
        }

        discovery
            .lookup(gvk)
            .await
            .ok_or_else(|| ToolError::feature_not_installed(feature))
    }

    /// Register a running port-forward under its session id
    pub async fn register_forward(&self, id: String, session: ForwardSession) {
        self.forwards.write().await.insert(id, session);
    }

    /// Stop a port-forward; returns its listen address when one was running
    pub async fn stop_forward(&self, id: &str) -> Option<String> {
        let session = self.forwards.write().await.remove(id)?;
        session.handle.abort();
        Some(session.local_addr)
    }

    /// Snapshot of active sessions as `(id, namespace, pod, local, remote)`
    pub async fn list_forwards(&self) -> Vec<(String, String, String, String, u16)> {
        self.forwards
            .read()
            .await
            .iter()
            .map(|(id, s)| {
                (
                    id.clone(),
                    s.namespace.clone(),
                    s.pod.clone(),
                    s.local_addr.clone(),
                    s.remote_port,
                )
            })
            .collect()
    }
}
