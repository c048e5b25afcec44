//! Application startup and lifecycle management.

use crate::config::ErpConfig;
use crate::grpc::proto::{
    attachment::file_management_service_server::FileManagementServiceServer,
    business_partner::business_partner_service_server::BusinessPartnerServiceServer,
    dashboard::dashboard_service_server::DashboardServiceServer,
    issue::issue_service_server::IssueServiceServer,
    payment::payment_service_server::PaymentServiceServer,
    payroll::payroll_service_server::PayrollServiceServer,
    reference::core_service_server::CoreServiceServer,
    report::report_service_server::ReportServiceServer,
    security::security_service_server::SecurityServiceServer,
    user_customization::user_customization_service_server::UserCustomizationServiceServer,
    workflow::workflow_service_server::WorkflowServiceServer, FILE_DESCRIPTOR_SET,
};
use crate::grpc::{
    BusinessPartnerServiceImpl, CoreServiceImpl, CountryCache, DashboardServiceImpl,
    FileManagementServiceImpl, IssueServiceImpl, MenuCache, PaymentServiceImpl,
    PayrollServiceImpl, ReportServiceImpl, SecurityServiceImpl, UserCustomizationServiceImpl,
    WorkflowServiceImpl,
};
use crate::services::password::{hash_password, Password};
use crate::services::{get_metrics, init_metrics, Database, LocalStorage, SessionManager, Storage};
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde_json::json;
use service_core::error::AppError;
use service_core::grpc::trace_context_interceptor;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tonic::transport::Server as GrpcServer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ErpConfig,
    pub db: Arc<Database>,
    pub sessions: SessionManager,
    pub storage: Arc<dyn Storage>,
    pub countries: Arc<CountryCache>,
    pub menus: Arc<MenuCache>,
}

/// State for health check endpoints.
#[derive(Clone)]
struct HealthState {
    db: Arc<Database>,
}

/// Health check endpoint for liveness probes.
async fn health_check(State(state): State<HealthState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(_) => {
            tracing::debug!("Health check passed");
            (
                StatusCode::OK,
                Json(json!({
                    "status": "ok",
                    "service": "erp-service",
                    "version": env!("CARGO_PKG_VERSION")
                })),
            )
        }
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed - database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "service": "erp-service",
                    "error": e.to_string()
                })),
            )
        }
    }
}

/// Readiness check endpoint.
async fn readiness_check(State(state): State<HealthState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// Metrics endpoint for Prometheus scraping.
async fn metrics_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        get_metrics(),
    )
}

async fn bind(port: u16, name: &str) -> Result<(TcpListener, u16), AppError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        tracing::error!(error = %e, addr = %addr, "Failed to bind {} listener", name);
        AppError::from(e)
    })?;
    let port = listener.local_addr()?.port();
    Ok((listener, port))
}

/// Application container for managing server lifecycle.
pub struct Application {
    http_port: u16,
    grpc_port: u16,
    http_listener: TcpListener,
    grpc_listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: ErpConfig) -> Result<Self, AppError> {
        init_metrics();

        let db = Database::new(
            &config.database.url,
            config.database.max_connections,
            config.database.min_connections,
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to SQLite");
            e
        })?;

        db.run_migrations().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to run migrations");
            e
        })?;

        if let Some(admin) = &config.bootstrap_admin {
            let hash = hash_password(&Password::new(admin.password.clone()))?;
            db.ensure_admin_user(&admin.user_name, &hash).await?;
            tracing::info!(user_name = %admin.user_name, "Bootstrap administrator ensured");
        }

        let db = Arc::new(db);
        let storage: Arc<dyn Storage> =
            Arc::new(LocalStorage::new(&config.storage.base_path).await?);
        let cache_ttl = Duration::from_secs(config.cache.ttl_seconds);

        let state = AppState {
            sessions: SessionManager::new(db.clone(), config.session.ttl_seconds),
            countries: Arc::new(CountryCache::new(config.cache.capacity, cache_ttl)),
            menus: Arc::new(MenuCache::new(config.cache.capacity, cache_ttl)),
            storage,
            db,
            config: config.clone(),
        };

        let (http_listener, http_port) = bind(config.common.port, "HTTP").await?;
        let (grpc_listener, grpc_port) = bind(config.common.grpc_port(), "gRPC").await?;

        tracing::info!(
            http_port = http_port,
            grpc_port = grpc_port,
            "ERP service listeners bound"
        );

        Ok(Self {
            http_port,
            grpc_port,
            http_listener,
            grpc_listener,
            state,
        })
    }

    /// Get the HTTP port the server is listening on.
    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    /// Get the gRPC port the server is listening on.
    pub fn grpc_port(&self) -> u16 {
        self.grpc_port
    }

    /// Get a reference to the database.
    pub fn db(&self) -> &Database {
        &self.state.db
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let state = self.state;
        let health_state = HealthState {
            db: state.db.clone(),
        };

        let http_router = Router::new()
            .route("/health", get(health_check))
            .route("/ready", get(readiness_check))
            .route("/metrics", get(metrics_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(health_state);

        let db = &state.db;
        let sessions = &state.sessions;
        let core = CoreServiceImpl::new(db.clone(), sessions.clone(), state.countries.clone());
        let business_partners = BusinessPartnerServiceImpl::new(db.clone(), sessions.clone());
        let payments = PaymentServiceImpl::new(db.clone(), sessions.clone());
        let workflow = WorkflowServiceImpl::new(db.clone(), sessions.clone());
        let issues = IssueServiceImpl::new(db.clone(), sessions.clone());
        let payroll = PayrollServiceImpl::new(db.clone(), sessions.clone());
        let dashboards = DashboardServiceImpl::new(db.clone(), sessions.clone());
        let files = FileManagementServiceImpl::new(
            db.clone(),
            sessions.clone(),
            state.storage.clone(),
            state.config.storage.max_upload_bytes,
        );
        let reports = ReportServiceImpl::new(
            db.clone(),
            sessions.clone(),
            state.config.export_dir.clone(),
        );
        let security = SecurityServiceImpl::new(db.clone(), sessions.clone(), state.menus.clone());
        let customizations = UserCustomizationServiceImpl::new(db.clone(), sessions.clone());

        let (mut health_reporter, grpc_health_service) = tonic_health::server::health_reporter();
        health_reporter
            .set_serving::<CoreServiceServer<CoreServiceImpl>>()
            .await;
        health_reporter
            .set_serving::<BusinessPartnerServiceServer<BusinessPartnerServiceImpl>>()
            .await;
        health_reporter
            .set_serving::<PaymentServiceServer<PaymentServiceImpl>>()
            .await;
        health_reporter
            .set_serving::<SecurityServiceServer<SecurityServiceImpl>>()
            .await;

        let reflection_service = tonic_reflection::server::Builder::configure()
            .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
            .build_v1()
            .map_err(|e| {
                std::io::Error::other(format!("Failed to build reflection service: {}", e))
            })?;

        let grpc_trace_layer = TraceLayer::new_for_grpc()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::DEBUG));

        let incoming = tokio_stream::wrappers::TcpListenerStream::new(self.grpc_listener);
        let grpc_server = GrpcServer::builder()
            .layer(grpc_trace_layer)
            .add_service(grpc_health_service)
            .add_service(reflection_service)
            .add_service(CoreServiceServer::with_interceptor(
                core,
                trace_context_interceptor,
            ))
            .add_service(BusinessPartnerServiceServer::with_interceptor(
                business_partners,
                trace_context_interceptor,
            ))
            .add_service(PaymentServiceServer::with_interceptor(
                payments,
                trace_context_interceptor,
            ))
            .add_service(WorkflowServiceServer::with_interceptor(
                workflow,
                trace_context_interceptor,
            ))
            .add_service(IssueServiceServer::with_interceptor(
                issues,
                trace_context_interceptor,
            ))
            .add_service(PayrollServiceServer::with_interceptor(
                payroll,
                trace_context_interceptor,
            ))
            .add_service(DashboardServiceServer::with_interceptor(
                dashboards,
                trace_context_interceptor,
            ))
            .add_service(FileManagementServiceServer::with_interceptor(
                files,
                trace_context_interceptor,
            ))
            .add_service(ReportServiceServer::with_interceptor(
                reports,
                trace_context_interceptor,
            ))
            .add_service(SecurityServiceServer::with_interceptor(
                security,
                trace_context_interceptor,
            ))
            .add_service(UserCustomizationServiceServer::with_interceptor(
                customizations,
                trace_context_interceptor,
            ))
            .serve_with_incoming(incoming);

        tracing::info!(
            service = "erp-service",
            version = env!("CARGO_PKG_VERSION"),
            http_port = self.http_port,
            grpc_port = self.grpc_port,
            "Service ready to accept connections"
        );

        tokio::select! {
            result = axum::serve(self.http_listener, http_router) => {
                if let Err(e) = result {
                    tracing::error!(error = %e, "HTTP server error");
                    return Err(std::io::Error::other(format!("HTTP server error: {}", e)));
                }
            }
            result = grpc_server => {
                if let Err(e) = result {
                    tracing::error!(error = %e, "gRPC server error");
                    return Err(std::io::Error::other(format!("gRPC server error: {}", e)));
                }
            }
        }

        Ok(())
    }
}
