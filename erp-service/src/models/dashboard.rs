//! Dashboards and favorites.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Dashboard {
    pub id: i64,
    pub uuid: String,
    pub name: String,
    pub description: Option<String>,
    pub dashboard_type: String,
    pub chart_type: Option<String>,
    pub column_no: i32,
    pub line_no: i32,
    pub is_collapsible: bool,
    pub is_open_by_default: bool,
}

/// Menu entry a user marked as favorite.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Favorite {
    pub menu_id: i64,
    pub menu_uuid: String,
    pub menu_name: String,
    pub menu_description: Option<String>,
    pub action: Option<String>,
    pub sequence: i32,
}
