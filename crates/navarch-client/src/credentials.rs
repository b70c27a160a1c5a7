use secrecy::SecretString;

/// Per-process credential override applied to freshly built REST configurations
///
/// Applying a selector never mutates its input; `apply` hands back a copy.
/// A selector without a bearer token is the identity.
#[derive(Debug, Clone, Default)]
pub struct CredentialSelector {
    /// Bearer token that replaces whatever the kubeconfig carries
    pub bearer_token: Option<String>,
    /// Keep the configured service-account credentials as-is
    pub use_service_account: bool,
}

impl CredentialSelector {
    /// Selector that injects the given bearer token
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            bearer_token: Some(token.into()),
            ..Self::default()
        }
    }

    /// Produce a configuration with this selector applied
    ///
    /// When a non-empty bearer token is present, it replaces the token and
    /// clears `token_file` so the file can never override the injected
    /// token. Otherwise the copy is unchanged.
    pub fn apply(&self, config: &kube::Config) -> kube::Config {
        let mut out = config.clone();
        if let Some(ref token) = self.bearer_token
            && !token.is_empty()
        {
            out.auth_info.token = Some(SecretString::from(token.clone()));
            out.auth_info.token_file = None;
        }
        out
    }

    /// Apply an optional selector; `None` yields an untouched copy
    pub fn apply_opt(selector: Option<&Self>, config: &kube::Config) -> kube::Config {
        selector.map_or_else(|| config.clone(), |s| s.apply(config))
    }
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    fn base_config() -> kube::Config {
        let mut config = kube::Config::new("https://10.0.0.1:6443".parse().unwrap());
        config.auth_info.token_file = Some("/var/run/secrets/kubernetes.io/serviceaccount/token".to_string());
        config
    }

    #[test]
    fn bearer_replaces_token_and_clears_file() {
        let base = base_config();
        let selector = CredentialSelector::bearer("abc");

        let applied = selector.apply(&base);
        assert_eq!(applied.auth_info.token.as_ref().map(ExposeSecret::expose_secret), Some("abc"));
        assert!(applied.auth_info.token_file.is_none());

        // The original is untouched.
        assert!(base.auth_info.token.is_none());
        assert!(base.auth_info.token_file.is_some());
    }

    #[test]
    fn empty_bearer_is_identity() {
        let base = base_config();
        let selector = CredentialSelector {
            bearer_token: Some(String::new()),
            use_service_account: false,
        };

        let applied = selector.apply(&base);
        assert!(applied.auth_info.token.is_none());
        assert_eq!(applied.auth_info.token_file, base.auth_info.token_file);
    }

    #[test]
    fn none_selector_is_identity() {
        let base = base_config();
        let applied = CredentialSelector::apply_opt(None, &base);
        assert!(applied.auth_info.token.is_none());
        assert_eq!(applied.auth_info.token_file, base.auth_info.token_file);
    }
}
