//! Peer config loader (strict parsing).

pub mod schema;

use std::fs;

use tandem_core::{Result, RpcError};

pub use schema::{ClientSection, GatewaySection, PeerConfig, ServerSection};

pub fn load_from_file(path: &str) -> Result<PeerConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| RpcError::Config(format!("read {path} failed: {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<PeerConfig> {
    let cfg: PeerConfig =
        serde_yaml::from_str(s).map_err(|e| RpcError::Config(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
