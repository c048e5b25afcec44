//! Domain models for erp-service.

pub mod attachment;
pub mod business_partner;
pub mod country;
pub mod customization;
pub mod dashboard;
pub mod issue;
pub mod payment;
pub mod payroll;
pub mod security;
pub mod workflow;

pub use attachment::{Attachment, NewResource, ResourceReference};
pub use business_partner::{
    BusinessPartner, Contact, CreateBusinessPartner, ListBusinessPartnersFilter, Location,
    NewContact, NewLocation, UpdateBusinessPartner,
};
pub use country::Country;
pub use customization::{FieldCustomization, SaveWindowCustomization, WindowCustomization};
pub use dashboard::{Dashboard, Favorite};
pub use issue::{
    CreateIssue, Issue, IssueComment, IssuePriority, IssueStatus, ListIssuesFilter, UpdateIssue,
};
pub use payment::{CreatePayment, ListPaymentsFilter, Payment, TenderType, UpdatePayment};
pub use payroll::{
    ColumnType, CreatePayrollMovement, ListPayrollMovementsFilter, MovementValues,
    PayrollConcept, PayrollMovement, UpdatePayrollMovement,
};
pub use security::{MenuEntry, Role, SessionRecord, User};
pub use workflow::{
    DocumentAction, DocumentActionLog, DocumentRecord, DocumentStatus, DocumentTable,
};

use rust_decimal::Decimal;
use service_core::error::AppError;
use service_core::filter::WhereClause;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::str::FromStr;

/// Reference to a single record: numeric id wins over uuid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordKey {
    Id(i64),
    Uuid(String),
}

impl RecordKey {
    /// Pick the key from an `id`/`uuid` request pair.
    ///
    /// Fails with `MandatoryMissing(field)` when neither is set.
    pub fn resolve(id: i64, uuid: &str, field: &str) -> Result<Self, AppError> {
        Self::optional(id, uuid).ok_or_else(|| AppError::mandatory(field))
    }

    pub fn optional(id: i64, uuid: &str) -> Option<Self> {
        if id > 0 {
            Some(RecordKey::Id(id))
        } else if !uuid.trim().is_empty() {
            Some(RecordKey::Uuid(uuid.trim().to_string()))
        } else {
            None
        }
    }

    /// Append `<alias>.id = ?` or `<alias>.uuid = ?` to a clause.
    pub fn apply(&self, clause: &mut WhereClause, alias: &str) {
        match self {
            RecordKey::Id(id) => clause.eq(&format!("{}.id", alias), *id),
            RecordKey::Uuid(uuid) => clause.eq(&format!("{}.uuid", alias), uuid.clone()),
        };
    }

    pub fn where_clause(&self, alias: &str) -> WhereClause {
        let mut clause = WhereClause::new();
        self.apply(&mut clause, alias);
        clause
    }
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordKey::Id(id) => write!(f, "id {}", id),
            RecordKey::Uuid(uuid) => write!(f, "uuid {}", uuid),
        }
    }
}

/// Trimmed, non-empty string or `None`.
pub fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Decimals live in TEXT columns; parse them on the way out.
pub(crate) fn decimal_column(row: &SqliteRow, column: &str) -> Result<Decimal, sqlx::Error> {
    let raw: String = row.try_get(column)?;
    parse_decimal_column(column, &raw)
}

pub(crate) fn optional_decimal_column(
    row: &SqliteRow,
    column: &str,
) -> Result<Option<Decimal>, sqlx::Error> {
    let raw: Option<String> = row.try_get(column)?;
    raw.map(|raw| parse_decimal_column(column, &raw)).transpose()
}

fn parse_decimal_column(column: &str, raw: &str) -> Result<Decimal, sqlx::Error> {
    Decimal::from_str(raw).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}
