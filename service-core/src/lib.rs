//! service-core: Shared infrastructure for the ERP gRPC services.
pub mod cache;
pub mod config;
pub mod error;
pub mod filter;
pub mod grpc;
pub mod observability;
pub mod pagination;
pub mod transfer;

pub use tonic;
pub use tracing;
