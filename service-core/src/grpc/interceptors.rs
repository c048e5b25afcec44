//! gRPC interceptors and metadata helpers.
//!
//! Provides:
//! - Trace context and request id logging for incoming calls
//! - Bearer session token extraction

use tonic::metadata::MetadataMap;
use tonic::{Request, Status};

/// gRPC metadata key for W3C traceparent header.
pub const TRACEPARENT_KEY: &str = "traceparent";

/// gRPC metadata key for request ID.
pub const REQUEST_ID_KEY: &str = "x-request-id";

/// gRPC metadata key carrying the session token.
pub const AUTHORIZATION_KEY: &str = "authorization";

/// Interceptor that records trace context and request id of incoming requests.
///
/// # Example
///
/// ```ignore
/// use service_core::grpc::interceptors::trace_context_interceptor;
///
/// let svc = MyServiceServer::with_interceptor(service, trace_context_interceptor);
/// ```
#[allow(clippy::result_large_err)]
pub fn trace_context_interceptor(request: Request<()>) -> Result<Request<()>, Status> {
    if let Some(traceparent) = request.metadata().get(TRACEPARENT_KEY) {
        if let Ok(traceparent_str) = traceparent.to_str() {
            tracing::debug!(traceparent = %traceparent_str, "Received trace context");
        }
    }

    if let Some(request_id) = request.metadata().get(REQUEST_ID_KEY) {
        if let Ok(request_id_str) = request_id.to_str() {
            tracing::Span::current().record("request_id", request_id_str);
        }
    }

    Ok(request)
}

/// Extract trace context from incoming gRPC request metadata.
pub fn extract_traceparent<T>(request: &Request<T>) -> Option<String> {
    request
        .metadata()
        .get(TRACEPARENT_KEY)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

/// Extract request ID from incoming gRPC request metadata.
pub fn extract_request_id<T>(request: &Request<T>) -> Option<String> {
    request
        .metadata()
        .get(REQUEST_ID_KEY)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

/// Extract the bearer token from the `authorization` metadata entry.
///
/// Accepts both `Bearer <token>` and a bare token.
pub fn extract_bearer_token(metadata: &MetadataMap) -> Option<String> {
    let raw = metadata.get(AUTHORIZATION_KEY)?.to_str().ok()?.trim();
    let token = raw
        .strip_prefix("Bearer ")
        .or_else(|| raw.strip_prefix("bearer "))
        .unwrap_or(raw)
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Attach a bearer token to an outgoing request.
pub fn inject_bearer_token<T>(request: &mut Request<T>, token: &str) {
    if let Ok(value) = format!("Bearer {}", token).parse() {
        request.metadata_mut().insert(AUTHORIZATION_KEY, value);
    }
}
