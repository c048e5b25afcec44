//! Services module for erp-service.

pub mod database;
pub mod metrics;
pub mod password;
pub mod query;
pub mod session;
pub mod storage;

pub use database::Database;
pub use metrics::{get_metrics, init_metrics};
pub use session::{SessionContext, SessionManager};
pub use storage::{LocalStorage, Storage};
