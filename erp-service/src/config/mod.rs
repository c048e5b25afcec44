//! Configuration module for erp-service.

use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct ErpConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub session: SessionConfig,
    pub cache: CacheConfig,
    pub export_dir: PathBuf,
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub base_path: PathBuf,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub ttl_seconds: i64,
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub capacity: usize,
    pub ttl_seconds: u64,
}

/// Administrator account created on startup when it does not exist yet.
#[derive(Clone)]
pub struct BootstrapAdmin {
    pub user_name: String,
    pub password: String,
}

impl std::fmt::Debug for BootstrapAdmin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootstrapAdmin")
            .field("user_name", &self.user_name)
            .field("password", &"********")
            .finish()
    }
}

fn parsed<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl ErpConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let mut common = core_config::Config::load()?;
        if let Some(grpc_port) = env::var("GRPC_PORT").ok().and_then(|s| s.parse().ok()) {
            common.grpc_port = Some(grpc_port);
        }

        let bootstrap_admin = match (
            env::var("BOOTSTRAP_ADMIN_USER"),
            env::var("BOOTSTRAP_ADMIN_PASSWORD"),
        ) {
            (Ok(user_name), Ok(password)) if !user_name.is_empty() && !password.is_empty() => {
                Some(BootstrapAdmin {
                    user_name,
                    password,
                })
            }
            (Ok(_), Err(_)) => {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "BOOTSTRAP_ADMIN_PASSWORD is required with BOOTSTRAP_ADMIN_USER"
                )))
            }
            _ => None,
        };

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME").unwrap_or_else(|_| "erp-service".to_string()),
            service_version: env::var("SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok(),
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite://erp.db?mode=rwc".to_string()),
                max_connections: parsed("DATABASE_MAX_CONNECTIONS", 10),
                min_connections: parsed("DATABASE_MIN_CONNECTIONS", 1),
            },
            storage: StorageConfig {
                base_path: env::var("STORAGE_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("./storage")),
                max_upload_bytes: parsed("MAX_UPLOAD_BYTES", 20 * 1024 * 1024),
            },
            session: SessionConfig {
                ttl_seconds: parsed("SESSION_TTL_SECONDS", 8 * 60 * 60),
            },
            cache: CacheConfig {
                capacity: parsed("CACHE_CAPACITY", 1000),
                ttl_seconds: parsed("CACHE_TTL_SECONDS", 3600),
            },
            export_dir: env::var("EXPORT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| env::temp_dir()),
            bootstrap_admin,
        })
    }
}
