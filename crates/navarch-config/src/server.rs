use std::net::SocketAddr;

use serde::Deserialize;

/// MCP transport selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Transport {
    /// Serve a single client over stdin/stdout
    #[default]
    Stdio,
    /// Serve the MCP streamable-HTTP protocol
    StreamableHttp,
}

/// MCP server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default)]
    pub transport: Transport,
    /// Listen address for the streamable-HTTP transport
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: Transport::default(),
            listen: default_listen(),
        }
    }
}

fn default_listen() -> SocketAddr {
    ([127, 0, 0, 1], 8311).into()
}
