use std::net::SocketAddr;
use std::time::Duration;

use serde::Deserialize;
use tandem_core::api::ApiSchema;
use tandem_core::role::Role;
use tandem_core::{Result, RpcError};
use tracing::warn;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PeerConfig {
    pub version: u32,

    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub client: Option<ClientSection>,

    #[serde(default)]
    pub gateway: Option<GatewaySection>,

    #[serde(default)]
    pub api: ApiSchema,
}

impl PeerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(RpcError::Config(format!(
                "unsupported config version {}",
                self.version
            )));
        }

        self.server.validate()?;
        if let Some(client) = &self.client {
            client.validate()?;
        }
        if let Some(gateway) = &self.gateway {
            gateway.validate()?;
        }
        self.api.validate()?;

        Ok(())
    }

    /// The configured api as a config-only peer of `role` can honour it.
    ///
    /// Methods on the remote's side are kept: they drive proxies, broadcast
    /// and the gateway relay. Methods on `role`'s own side need code to
    /// answer them, which a config file cannot supply, so they are dropped
    /// with a warning and the caller merges in its own built-in namespaces.
    pub fn served_api(&self, role: Role) -> ApiSchema {
        if let Some(local) = role.local_side() {
            for path in self.api.paths(local) {
                warn!(%role, %path, "api method has no handler in this process, not served");
            }
        }
        self.api.only(role.remote_side())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default = "default_path")]
    pub path: String,

    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,

    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,

    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,

    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            path: default_path(),
            call_timeout_ms: default_call_timeout_ms(),
            ping_interval_ms: default_ping_interval_ms(),
            idle_timeout_ms: default_idle_timeout_ms(),
            max_frame_bytes: default_max_frame_bytes(),
        }
    }
}

impl ServerSection {
    pub fn validate(&self) -> Result<()> {
        parse_listen("server.listen", &self.listen)?;
        validate_path("server.path", &self.path)?;
        validate_call_timeout("server.call_timeout_ms", self.call_timeout_ms)?;
        if !(1000..=120000).contains(&self.ping_interval_ms) {
            return Err(RpcError::Config(
                "server.ping_interval_ms must be between 1000 and 120000".into(),
            ));
        }
        if self.idle_timeout_ms > 600000 {
            return Err(RpcError::Config(
                "server.idle_timeout_ms must be at most 600000".into(),
            ));
        }
        if self.idle_timeout_ms <= self.ping_interval_ms {
            return Err(RpcError::Config(
                "server.idle_timeout_ms must be greater than ping_interval_ms".into(),
            ));
        }
        if self.max_frame_bytes < 64 {
            return Err(RpcError::Config(
                "server.max_frame_bytes must be at least 64".into(),
            ));
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        parse_listen("server.listen", &self.listen)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientSection {
    pub url: String,

    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
}

impl ClientSection {
    pub fn validate(&self) -> Result<()> {
        if !(self.url.starts_with("ws://") || self.url.starts_with("wss://")) {
            return Err(RpcError::Config(
                "client.url must start with ws:// or wss://".into(),
            ));
        }
        validate_call_timeout("client.call_timeout_ms", self.call_timeout_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

/// Browser-facing endpoint of a gateway process.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewaySection {
    #[serde(default = "default_gateway_listen")]
    pub listen: String,

    #[serde(default = "default_browser_path")]
    pub path: String,
}

impl GatewaySection {
    pub fn validate(&self) -> Result<()> {
        parse_listen("gateway.listen", &self.listen)?;
        validate_path("gateway.path", &self.path)
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        parse_listen("gateway.listen", &self.listen)
    }
}

fn parse_listen(field: &str, listen: &str) -> Result<SocketAddr> {
    listen
        .parse()
        .map_err(|e| RpcError::Config(format!("{field} must be a valid SocketAddr: {e}")))
}

fn validate_path(field: &str, path: &str) -> Result<()> {
    if !path.starts_with('/') {
        return Err(RpcError::Config(format!("{field} must start with '/'")));
    }
    Ok(())
}

fn validate_call_timeout(field: &str, ms: u64) -> Result<()> {
    if !(1..=600000).contains(&ms) {
        return Err(RpcError::Config(format!(
            "{field} must be between 1 and 600000"
        )));
    }
    Ok(())
}

fn default_listen() -> String {
    "0.0.0.0:8080".into()
}
fn default_path() -> String {
    "/ws".into()
}
fn default_call_timeout_ms() -> u64 {
    1000
}
fn default_ping_interval_ms() -> u64 {
    20000
}
fn default_idle_timeout_ms() -> u64 {
    60000
}
fn default_max_frame_bytes() -> usize {
    1 << 20
}
fn default_gateway_listen() -> String {
    "127.0.0.1:8081".into()
}
fn default_browser_path() -> String {
    "/browser".into()
}
