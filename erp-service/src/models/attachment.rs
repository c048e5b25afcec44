//! Attachments and their stored resources.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Attachment header; one per (table, record).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Attachment {
    pub id: i64,
    pub uuid: String,
    pub table_name: String,
    pub record_id: i64,
    pub title: Option<String>,
    pub text_msg: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ResourceReference {
    pub id: i64,
    pub uuid: String,
    pub attachment_id: i64,
    pub file_name: String,
    pub content_type: String,
    pub file_size: i64,
    pub storage_key: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Resource metadata received ahead of an upload.
#[derive(Debug, Clone)]
pub struct NewResource {
    pub table_name: String,
    pub record_id: i64,
    pub file_name: String,
    pub content_type: String,
    pub file_size: i64,
    pub description: Option<String>,
}
