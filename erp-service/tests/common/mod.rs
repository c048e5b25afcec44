//! Common test utilities for erp-service integration tests.

use erp_service::config::{
    BootstrapAdmin, CacheConfig, DatabaseConfig, ErpConfig, SessionConfig, StorageConfig,
};
use erp_service::grpc::proto::security::{
    security_service_client::SecurityServiceClient, LoginRequest,
};
use erp_service::services::password::{hash_password, Password};
use erp_service::startup::Application;
use service_core::config::Config as CommonConfig;
use service_core::grpc::inject_bearer_token;
use std::sync::Once;
use tempfile::TempDir;
use tonic::transport::Channel;

static INIT: Once = Once::new();

pub const ADMIN_USER: &str = "admin";
pub const ADMIN_PASSWORD: &str = "admin-password";
pub const CLERK_USER: &str = "clerk";
pub const CLERK_PASSWORD: &str = "clerk-password";

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,erp_service=debug,sqlx=warn")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

fn test_config(storage: &TempDir, exports: &TempDir) -> ErpConfig {
    ErpConfig {
        common: CommonConfig::ephemeral(),
        service_name: "erp-service-test".to_string(),
        service_version: "test".to_string(),
        log_level: "debug".to_string(),
        otlp_endpoint: None,
        database: DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            min_connections: 1,
        },
        storage: StorageConfig {
            base_path: storage.path().to_path_buf(),
            max_upload_bytes: 1024 * 1024,
        },
        session: SessionConfig { ttl_seconds: 600 },
        cache: CacheConfig {
            capacity: 100,
            ttl_seconds: 60,
        },
        export_dir: exports.path().to_path_buf(),
        bootstrap_admin: Some(BootstrapAdmin {
            user_name: ADMIN_USER.to_string(),
            password: ADMIN_PASSWORD.to_string(),
        }),
    }
}

/// Test application wrapper.
#[allow(dead_code)]
pub struct TestApp {
    pub channel: Channel,
    pub http_port: u16,
    pub grpc_port: u16,
    pub storage_dir: TempDir,
    pub export_dir: TempDir,
}

/// Spawn a fresh application on ephemeral ports with its own in-memory
/// database, the bootstrap administrator and a clerk account.
pub async fn spawn_app() -> TestApp {
    init_tracing();

    let storage_dir = tempfile::tempdir().expect("Failed to create storage dir");
    let export_dir = tempfile::tempdir().expect("Failed to create export dir");
    let config = test_config(&storage_dir, &export_dir);

    let app = Application::build(config)
        .await
        .expect("Failed to build application");

    let clerk_hash = hash_password(&Password::new(CLERK_PASSWORD)).unwrap();
    app.db()
        .create_user(CLERK_USER, &clerk_hash, Some("clerk@example.com"), &[2])
        .await
        .expect("Failed to create clerk");

    let http_port = app.http_port();
    let grpc_port = app.grpc_port();
    let grpc_addr = format!("http://127.0.0.1:{}", grpc_port);

    tokio::spawn(async move {
        app.run_until_stopped().await.ok();
    });

    let channel = {
        let mut attempts = 0;
        loop {
            match Channel::from_shared(grpc_addr.clone())
                .expect("Invalid gRPC address")
                .connect()
                .await
            {
                Ok(channel) => break channel,
                Err(_) if attempts < 20 => {
                    attempts += 1;
                    tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
                }
                Err(e) => panic!("Failed to connect gRPC client after 20 attempts: {}", e),
            }
        }
    };

    TestApp {
        channel,
        http_port,
        grpc_port,
        storage_dir,
        export_dir,
    }
}

#[allow(dead_code)]
impl TestApp {
    /// Log in and return the session token.
    pub async fn login(&self, user_name: &str, password: &str) -> String {
        let mut client = SecurityServiceClient::new(self.channel.clone());
        client
            .run_login(LoginRequest {
                user_name: user_name.to_string(),
                password: password.to_string(),
                ..Default::default()
            })
            .await
            .expect("Login failed")
            .into_inner()
            .uuid
    }

    pub async fn admin_session(&self) -> String {
        self.login(ADMIN_USER, ADMIN_PASSWORD).await
    }

    pub async fn clerk_session(&self) -> String {
        self.login(CLERK_USER, CLERK_PASSWORD).await
    }
}

/// Wrap a message in a request carrying the session token.
pub fn with_session<T>(message: T, token: &str) -> tonic::Request<T> {
    let mut request = tonic::Request::new(message);
    inject_bearer_token(&mut request, token);
    request
}
