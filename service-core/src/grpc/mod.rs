//! gRPC utilities shared by the ERP services.
//!
//! This module provides:
//! - Error conversion between `AppError` and `tonic::Status`
//! - Interceptors for trace context propagation and session token extraction

pub mod error;
pub mod interceptors;

pub use error::{GrpcResult, IntoStatus};
pub use interceptors::{
    AUTHORIZATION_KEY, REQUEST_ID_KEY, TRACEPARENT_KEY, extract_bearer_token, extract_request_id,
    extract_traceparent, inject_bearer_token, trace_context_interceptor,
};

// Re-export commonly used tonic types
pub use tonic::{Code, Request, Response, Status};
