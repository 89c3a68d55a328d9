use crate::{Error, Result};
use std::env;
use std::net::SocketAddr;

/// Process configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    /// Shared access token; unset means the service is open.
    pub token: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let bind_addr = env::var("LOX_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:7100".to_string());
        let bind_addr = bind_addr
            .parse()
            .map_err(|e| Error::Other(anyhow::anyhow!("Invalid bind address {bind_addr}: {e}")))?;

        let token = env::var("LOX_TOKEN").ok().filter(|token| !token.is_empty());

        Ok(Self { bind_addr, token })
    }
}
