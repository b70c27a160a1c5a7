use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use navarch_config::{Config, Transport};

/// Navarch Kubernetes MCP server
#[derive(Debug, Parser)]
#[command(name = "navarch", about = "MCP server exposing Kubernetes operations as tools")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "navarch.toml", env = "NAVARCH_CONFIG")]
    pub config: PathBuf,

    /// Override the kubeconfig path
    #[arg(long, env = "NAVARCH_KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    /// Override the default kubeconfig context
    #[arg(long, env = "NAVARCH_CONTEXT")]
    pub context: Option<String>,

    /// Override the MCP transport
    #[arg(long, value_enum, env = "NAVARCH_TRANSPORT")]
    pub transport: Option<TransportArg>,

    /// Override the listen address (streamable-HTTP transport only)
    #[arg(long, env = "NAVARCH_LISTEN")]
    pub listen: Option<SocketAddr>,
}

/// Transport selection on the command line
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum TransportArg {
    Stdio,
    StreamableHttp,
}

impl From<TransportArg> for Transport {
    fn from(arg: TransportArg) -> Self {
        match arg {
            TransportArg::Stdio => Self::Stdio,
            TransportArg::StreamableHttp => Self::StreamableHttp,
        }
    }
}

impl Args {
    /// Apply command-line overrides on top of the loaded configuration
    pub fn apply(&self, config: &mut Config) {
        if let Some(path) = &self.kubeconfig {
            config.cluster.kubeconfig = Some(path.clone());
        }
        if let Some(context) = &self.context {
            config.cluster.context = Some(context.clone());
        }
        if let Some(transport) = self.transport {
            config.server.transport = transport.into();
        }
        if let Some(listen) = self.listen {
            config.server.listen = listen;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_land_in_config() {
        let args = Args::parse_from([
            "navarch",
            "--kubeconfig",
            "/etc/navarch/kubeconfig",
            "--context",
            "staging",
            "--transport",
            "streamable-http",
            "--listen",
            "0.0.0.0:9000",
        ]);
        let mut config = Config::default();
        args.apply(&mut config);

        assert_eq!(
            config.cluster.kubeconfig.as_deref(),
            Some(std::path::Path::new("/etc/navarch/kubeconfig"))
        );
        assert_eq!(config.cluster.context.as_deref(), Some("staging"));
        assert_eq!(config.server.transport, Transport::StreamableHttp);
        assert_eq!(config.server.listen.port(), 9000);
    }

    #[test]
    fn defaults_leave_config_untouched() {
        let args = Args::parse_from(["navarch"]);
        let mut config = Config::default();
        args.apply(&mut config);

        assert!(config.cluster.kubeconfig.is_none());
        assert_eq!(config.server.transport, Transport::Stdio);
    }
}
