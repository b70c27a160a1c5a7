use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use kube::config::Kubeconfig;
use navarch_config::{ClusterConfig, ProviderMode};
use tokio::sync::RwLock;

use crate::IN_CLUSTER_CONTEXT;
use crate::bundle::ClientBundle;
use crate::error::ClientError;
use crate::factory::ClientFactory;

/// A bundle paired with the context name it was resolved for
#[derive(Clone)]
pub struct ClusterClient {
    pub bundle: Arc<ClientBundle>,
    /// Concrete context name; never empty
    pub context: String,
}

/// Resolves context names to cached client bundles
///
/// Empty-string contexts resolve to the provider's default here, never in
/// tool handlers.
#[async_trait]
pub trait ClientProvider: Send + Sync {
    /// Get or build the bundle for a context
    async fn get_bundle(&self, context: &str) -> Result<Arc<ClientBundle>, ClientError>;

    /// Enumerate the contexts this provider can serve
    fn list_contexts(&self) -> Result<Vec<String>, ClientError>;

    /// The context used when the caller names none
    fn default_context(&self) -> String;

    /// Resolve a context (defaulting the empty string) to a `ClusterClient`
    async fn with_context(&self, context: &str) -> Result<ClusterClient, ClientError> {
        let name = if context.is_empty() {
            self.default_context()
        } else {
            context.to_string()
        };
        let bundle = self.get_bundle(&name).await?;
        Ok(ClusterClient { bundle, context: name })
    }
}

/// Multi-context provider over a kubeconfig file
///
/// Bundles are built lazily per context and cached for the provider's
/// lifetime; double-checked locking keeps concurrent first use down to a
/// single construction.
pub struct KubeconfigProvider {
    path: PathBuf,
    factory: ClientFactory,
    bundles: RwLock<HashMap<String, Arc<ClientBundle>>>,
}

impl KubeconfigProvider {
    pub fn new(path: impl Into<PathBuf>, factory: ClientFactory) -> Self {
        Self {
            path: path.into(),
            factory,
            bundles: RwLock::new(HashMap::new()),
        }
    }

    fn read_kubeconfig(&self) -> Result<Kubeconfig, ClientError> {
        Ok(Kubeconfig::read_from(&self.path)?)
    }
}

#[async_trait]
impl ClientProvider for KubeconfigProvider {
    async fn get_bundle(&self, context: &str) -> Result<Arc<ClientBundle>, ClientError> {
        // Resolve before caching; the empty string must never be a map key.
        let name = if context.is_empty() {
            let default = self.default_context();
            if default.is_empty() {
                return Err(ClientError::Kubeconfig(format!(
                    "kubeconfig {} has no current-context",
                    self.path.display()
                )));
            }
            default
        } else {
            context.to_string()
        };

        if let Some(bundle) = self.bundles.read().await.get(&name) {
            return Ok(Arc::clone(bundle));
        }

        let mut bundles = self.bundles.write().await;
        if let Some(bundle) = bundles.get(&name) {
            return Ok(Arc::clone(bundle));
        }

        let bundle = self.factory.from_kubeconfig(&self.path, Some(&name)).await?;
        bundles.insert(name.clone(), Arc::clone(&bundle));
        tracing::debug!(context = %name, "built client bundle");
        Ok(bundle)
    }

    fn list_contexts(&self) -> Result<Vec<String>, ClientError> {
        // Read fresh each call; the context set may change under us.
        let kubeconfig = self.read_kubeconfig()?;
        Ok(kubeconfig.contexts.into_iter().map(|c| c.name).collect())
    }

    fn default_context(&self) -> String {
        self.read_kubeconfig()
            .ok()
            .and_then(|k| k.current_context)
            .unwrap_or_default()
    }
}

/// Provider over the pod's service-account credentials
///
/// One bundle, built at construction; context arguments are ignored.
pub struct InClusterProvider {
    bundle: Arc<ClientBundle>,
}

impl InClusterProvider {
    pub fn new(factory: &ClientFactory) -> Result<Self, ClientError> {
        Ok(Self {
            bundle: factory.in_cluster()?,
        })
    }
}

#[async_trait]
impl ClientProvider for InClusterProvider {
    async fn get_bundle(&self, _context: &str) -> Result<Arc<ClientBundle>, ClientError> {
        Ok(Arc::clone(&self.bundle))
    }

    fn list_contexts(&self) -> Result<Vec<String>, ClientError> {
        Ok(vec![IN_CLUSTER_CONTEXT.to_string()])
    }

    fn default_context(&self) -> String {
        IN_CLUSTER_CONTEXT.to_string()
    }
}

/// Provider pinned to one kubeconfig context
pub struct SingleContextProvider {
    context: String,
    bundle: Arc<ClientBundle>,
}

impl SingleContextProvider {
    pub async fn new(path: &Path, context: &str, factory: &ClientFactory) -> Result<Self, ClientError> {
        let bundle = factory.from_kubeconfig(path, Some(context)).await?;
        Ok(Self {
            context: context.to_string(),
            bundle,
        })
    }
}

#[async_trait]
impl ClientProvider for SingleContextProvider {
    async fn get_bundle(&self, context: &str) -> Result<Arc<ClientBundle>, ClientError> {
        if context.is_empty() || context == self.context {
            return Ok(Arc::clone(&self.bundle));
        }
        Err(ClientError::ContextNotFound {
            requested: context.to_string(),
            configured: self.context.clone(),
        })
    }

    fn list_contexts(&self) -> Result<Vec<String>, ClientError> {
        Ok(vec![self.context.clone()])
    }

    fn default_context(&self) -> String {
        self.context.clone()
    }
}

/// Build the provider named by the cluster configuration
pub async fn build_provider(
    cluster: &ClusterConfig,
    factory: ClientFactory,
) -> Result<Arc<dyn ClientProvider>, ClientError> {
    let default_path = || {
        cluster
            .kubeconfig
            .clone()
            .or_else(|| home::home_dir().map(|h| h.join(".kube/config")))
            .ok_or_else(|| ClientError::Kubeconfig("no kubeconfig path and no home directory".to_string()))
    };

    match cluster.provider {
        ProviderMode::Kubeconfig => Ok(Arc::new(KubeconfigProvider::new(default_path()?, factory))),
        ProviderMode::InCluster => Ok(Arc::new(InClusterProvider::new(&factory)?)),
        ProviderMode::Single => {
            let context = cluster
                .context
                .as_deref()
                .ok_or_else(|| ClientError::Configuration("single provider requires an explicit context".to_string()))?;
            Ok(Arc::new(SingleContextProvider::new(&default_path()?, context, &factory).await?))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;
    use std::time::Duration;

    use navarch_config::ClientTuning;

    use super::*;

    const KUBECONFIG: &str = r#"
apiVersion: v1
kind: Config
current-context: staging
clusters:
- name: test-cluster
  cluster:
    server: https://127.0.0.1:6443
    insecure-skip-tls-verify: true
contexts:
- name: staging
  context:
    cluster: test-cluster
    user: test-user
- name: prod
  context:
    cluster: test-cluster
    user: test-user
users:
- name: test-user
  user:
    token: test-token
"#;

    fn write_kubeconfig() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(KUBECONFIG.as_bytes()).unwrap();
        file
    }

    fn factory() -> ClientFactory {
        ClientFactory::new(ClientTuning::default(), Duration::from_secs(60))
    }

    #[tokio::test]
    async fn empty_context_resolves_to_current_context() {
        let file = write_kubeconfig();
        let provider = KubeconfigProvider::new(file.path(), factory());

        let client = provider.with_context("").await.unwrap();
        assert_eq!(client.context, "staging");
    }

    #[tokio::test]
    async fn list_contexts_reads_kubeconfig() {
        let file = write_kubeconfig();
        let provider = KubeconfigProvider::new(file.path(), factory());

        let contexts = provider.list_contexts().unwrap();
        assert_eq!(contexts, vec!["staging".to_string(), "prod".to_string()]);
        assert_eq!(provider.default_context(), "staging");
    }

    #[tokio::test]
    async fn bundles_are_cached_per_context() {
        let file = write_kubeconfig();
        let provider = KubeconfigProvider::new(file.path(), factory());

        let first = provider.get_bundle("staging").await.unwrap();
        let second = provider.get_bundle("staging").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let other = provider.get_bundle("prod").await.unwrap();
        assert!(!Arc::ptr_eq(&first, &other));
    }

    #[tokio::test]
    async fn concurrent_first_use_builds_one_bundle() {
        let file = write_kubeconfig();
        let provider = Arc::new(KubeconfigProvider::new(file.path(), factory()));

        let handles: Vec<_> = (0..100)
            .map(|_| {
                let provider = Arc::clone(&provider);
                tokio::spawn(async move { provider.get_bundle("staging").await.unwrap() })
            })
            .collect();

        let mut bundles = Vec::with_capacity(handles.len());
        for handle in handles {
            bundles.push(handle.await.unwrap());
        }

        let first = &bundles[0];
        assert!(bundles.iter().all(|b| Arc::ptr_eq(first, b)));
        assert_eq!(provider.bundles.read().await.len(), 1);
    }

    #[tokio::test]
    async fn single_context_provider_rejects_other_names() {
        let file = write_kubeconfig();
        let provider = SingleContextProvider::new(file.path(), "staging", &factory()).await.unwrap();

        assert!(provider.get_bundle("").await.is_ok());
        assert!(provider.get_bundle("staging").await.is_ok());

        let err = provider.get_bundle("prod").await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("prod"));
        assert!(message.contains("staging"));
    }

    #[tokio::test]
    async fn single_without_context_is_a_configuration_error() {
        let file = write_kubeconfig();
        let cluster = ClusterConfig {
            provider: ProviderMode::Single,
            kubeconfig: Some(file.path().to_path_buf()),
            context: None,
            bearer_token: None,
        };
        let Err(err) = build_provider(&cluster, factory()).await else {
            panic!("single mode without a context must fail");
        };
        assert!(matches!(err, ClientError::Configuration(_)));
    }
}
