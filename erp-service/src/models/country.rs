//! Country reference data.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Country {
    pub id: i64,
    pub uuid: String,
    pub code: String,
    pub name: String,
    pub currency_code: Option<String>,
    pub has_region: bool,
}
