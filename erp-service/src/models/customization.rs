//! Per-user window customizations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WindowCustomization {
    pub id: i64,
    pub uuid: String,
    pub user_id: i64,
    pub window_uuid: String,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct FieldCustomization {
    pub column_name: String,
    pub sequence: i32,
    pub is_displayed: bool,
    pub display_size: i32,
}

#[derive(Debug, Clone)]
pub struct SaveWindowCustomization {
    pub user_id: i64,
    pub window_uuid: String,
    pub name: Option<String>,
    pub fields: Vec<FieldCustomization>,
}
