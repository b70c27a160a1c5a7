use std::path::Path;

use crate::{Config, ProviderMode};

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Reads the file, expands `{{ env.VAR }}` placeholders, then
    /// deserializes and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, environment variable
    /// expansion fails, TOML parsing fails, or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;
        Self::from_toml(&raw)
    }

    /// Parse and validate configuration from a TOML string
    ///
    /// # Errors
    ///
    /// Returns an error on expansion, parse, or validation failure
    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        let expanded =
            crate::env::expand_env(raw).map_err(|e| anyhow::anyhow!("config variable expansion failed: {e}"))?;

        let config: Self = toml::from_str(&expanded).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    ///
    /// # Errors
    ///
    /// Returns an error on an invalid provider/context combination or
    /// nonsensical client tuning
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.cluster.provider == ProviderMode::Single && self.cluster.context.is_none() {
            anyhow::bail!("cluster.provider = \"single\" requires cluster.context to be set");
        }

        if self.client.qps <= 0.0 {
            anyhow::bail!("client.qps must be positive");
        }

        if self.client.burst == 0 {
            anyhow::bail!("client.burst must be at least 1");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{Config, LogFormat, ProviderMode, Transport};

    #[test]
    fn empty_config_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.cluster.provider, ProviderMode::Kubeconfig);
        assert!((config.client.qps - 50.0).abs() < f64::EPSILON);
        assert_eq!(config.client.burst, 100);
        assert_eq!(config.discovery.ttl_secs, 60);
        assert_eq!(config.rbac.cache_ttl_secs, 5);
        assert!(!config.rbac.required);
        assert_eq!(config.server.transport, Transport::Stdio);
        assert!(config.telemetry.is_none());
    }

    #[test]
    fn full_config_parses() {
        let raw = r#"
            [cluster]
            provider = "single"
            kubeconfig = "/etc/navarch/kubeconfig"
            context = "staging"

            [client]
            qps = 25.0
            burst = 50
            timeout_secs = 10

            [rbac]
            required = true
            cache_ttl_secs = 60

            [logging]
            level = "debug"
            format = "json"

            [server]
            transport = "streamable-http"
            listen = "0.0.0.0:9000"
        "#;
        let config = Config::from_toml(raw).unwrap();
        assert_eq!(config.cluster.provider, ProviderMode::Single);
        assert_eq!(config.cluster.context.as_deref(), Some("staging"));
        assert!(config.rbac.required);
        assert_eq!(config.rbac.cache_ttl_secs, 60);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.server.transport, Transport::StreamableHttp);
    }

    #[test]
    fn single_without_context_is_rejected() {
        let raw = "[cluster]\nprovider = \"single\"\n";
        let err = Config::from_toml(raw).unwrap_err();
        assert!(err.to_string().contains("cluster.context"));
    }

    #[test]
    fn non_positive_qps_is_rejected() {
        let raw = "[client]\nqps = 0.0\n";
        assert!(Config::from_toml(raw).is_err());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let raw = "[cluster]\nbogus = true\n";
        assert!(Config::from_toml(raw).is_err());
    }

    #[test]
    fn env_expansion_reaches_values() {
        temp_env::with_var("NAVARCH_CTX", Some("prod"), || {
            let raw = "[cluster]\nprovider = \"single\"\ncontext = \"{{ env.NAVARCH_CTX }}\"\n";
            let config = Config::from_toml(raw).unwrap();
            assert_eq!(config.cluster.context.as_deref(), Some("prod"));
        });
    }
}
