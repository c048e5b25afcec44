//! Users, roles, sessions and menus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Login account. The hash never leaves the service.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub uuid: String,
    pub name: String,
    pub description: Option<String>,
    pub email: Option<String>,
    pub password_hash: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Role {
    pub id: i64,
    pub uuid: String,
    pub name: String,
    pub description: Option<String>,
    pub can_export: bool,
}

/// Session row joined with its user and role.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SessionRecord {
    pub id: i64,
    pub uuid: String,
    pub language: String,
    pub is_active: bool,
    pub expires_at: DateTime<Utc>,
    pub user_id: i64,
    pub user_uuid: String,
    pub user_name: String,
    pub user_description: Option<String>,
    pub user_email: Option<String>,
    pub role_id: i64,
    pub role_uuid: String,
    pub role_name: String,
    pub role_description: Option<String>,
    pub can_export: bool,
}

impl SessionRecord {
    pub fn role(&self) -> Role {
        Role {
            id: self.role_id,
            uuid: self.role_uuid.clone(),
            name: self.role_name.clone(),
            description: self.role_description.clone(),
            can_export: self.can_export,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct MenuEntry {
    pub id: i64,
    pub uuid: String,
    pub parent_id: Option<i64>,
    pub name: String,
    pub description: Option<String>,
    pub action: Option<String>,
    pub is_summary: bool,
    pub sequence: i32,
}
