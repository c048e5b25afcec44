use crate::error::AppError;
use config::{Config as Cfg, File};
use serde::Deserialize;

/// Listener settings shared by every service binary.
///
/// Loaded from an optional `configuration.{yaml,toml,json}` file and
/// `APP__`-prefixed environment variables (`APP__PORT=8080`).
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,

    /// gRPC listener port; defaults to `port + 1` when unset.
    #[serde(default)]
    pub grpc_port: Option<u16>,
}

fn default_port() -> u16 {
    8080
}

impl Config {
    pub fn load() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let config = Cfg::builder()
            .add_source(File::with_name("configuration").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Config binding both listeners to ephemeral ports.
    pub fn ephemeral() -> Self {
        Self {
            port: 0,
            grpc_port: Some(0),
        }
    }

    pub fn grpc_port(&self) -> u16 {
        self.grpc_port
            .unwrap_or_else(|| self.port.saturating_add(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grpc_port_defaults_to_next_port() {
        let config = Config {
            port: 8080,
            grpc_port: None,
        };
        assert_eq!(config.grpc_port(), 8081);
    }

    #[test]
    fn ephemeral_config_uses_port_zero_for_both() {
        let config = Config::ephemeral();
        assert_eq!(config.port, 0);
        assert_eq!(config.grpc_port(), 0);
    }
}
