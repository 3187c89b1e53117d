use std::{env, net::SocketAddr, time::Duration};

use thiserror::Error;

use crate::services::net::DEFAULT_NETWORK_ID;

pub const DEFAULT_BIND_PORT: u16 = 5000;
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub bind_port: u16,
    pub network_id: String,
    pub shutdown_timeout: Duration,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("BIND_PORT must be a valid u16")]
    InvalidPort,
    #[error("SHUTDOWN_TIMEOUT_SECS must be a whole number of seconds")]
    InvalidShutdownTimeout,
    #[error("NETWORK_ID must not be empty")]
    EmptyNetworkId,
    #[error("invalid bind address or port")]
    InvalidSocket,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_addr = lookup("BIND_ADDR").unwrap_or_else(|| "127.0.0.1".to_string());
        let bind_port = lookup("BIND_PORT")
            .map(|value| value.trim().parse::<u16>().map_err(|_| ConfigError::InvalidPort))
            .transpose()?
            .unwrap_or(DEFAULT_BIND_PORT);
        let network_id = match lookup("NETWORK_ID") {
            Some(value) if value.trim().is_empty() => return Err(ConfigError::EmptyNetworkId),
            Some(value) => value.trim().to_string(),
            None => DEFAULT_NETWORK_ID.to_string(),
        };
        let shutdown_timeout = lookup("SHUTDOWN_TIMEOUT_SECS")
            .map(|value| {
                value
                    .trim()
                    .parse::<u64>()
                    .map(Duration::from_secs)
                    .map_err(|_| ConfigError::InvalidShutdownTimeout)
            })
            .transpose()?
            .unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);

        let config = Self {
            bind_addr,
            bind_port,
            network_id,
            shutdown_timeout,
        };

        let _ = config.bind_socket()?;
        Ok(config)
    }

    pub fn bind_socket(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.bind_addr, self.bind_port)
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidSocket)
    }
}
