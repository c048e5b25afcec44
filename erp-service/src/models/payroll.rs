//! Payroll concepts and movements.

use super::optional_decimal_column;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use service_core::filter::WhereClause;
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};

/// Which value column a concept's movements carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Quantity,
    Amount,
    Text,
    Date,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Quantity => "QUANTITY",
            ColumnType::Amount => "AMOUNT",
            ColumnType::Text => "TEXT",
            ColumnType::Date => "DATE",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "AMOUNT" => ColumnType::Amount,
            "TEXT" => ColumnType::Text,
            "DATE" => ColumnType::Date,
            _ => ColumnType::Quantity,
        }
    }

    /// Request field that must be filled for this column type.
    pub fn value_field(&self) -> &'static str {
        match self {
            ColumnType::Quantity => "quantity",
            ColumnType::Amount => "amount",
            ColumnType::Text => "text_msg",
            ColumnType::Date => "service_date",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PayrollConcept {
    pub id: i64,
    pub uuid: String,
    pub value: String,
    pub name: String,
    pub description: Option<String>,
    pub column_type: String,
    pub is_active: bool,
}

impl PayrollConcept {
    pub fn column(&self) -> ColumnType {
        ColumnType::from_string(&self.column_type)
    }
}

/// Movement joined with employee and concept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayrollMovement {
    pub id: i64,
    pub uuid: String,
    pub business_partner_id: i64,
    pub business_partner_name: Option<String>,
    pub concept_id: i64,
    pub concept_value: Option<String>,
    pub concept_name: Option<String>,
    pub column_type: Option<String>,
    pub valid_from: NaiveDate,
    pub quantity: Option<Decimal>,
    pub amount: Option<Decimal>,
    pub text_msg: Option<String>,
    pub service_date: Option<NaiveDate>,
    pub description: Option<String>,
    pub processed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, SqliteRow> for PayrollMovement {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            uuid: row.try_get("uuid")?,
            business_partner_id: row.try_get("business_partner_id")?,
            business_partner_name: row.try_get("business_partner_name")?,
            concept_id: row.try_get("concept_id")?,
            concept_value: row.try_get("concept_value")?,
            concept_name: row.try_get("concept_name")?,
            column_type: row.try_get("column_type")?,
            valid_from: row.try_get("valid_from")?,
            quantity: optional_decimal_column(row, "quantity")?,
            amount: optional_decimal_column(row, "amount")?,
            text_msg: row.try_get("text_msg")?,
            service_date: row.try_get("service_date")?,
            description: row.try_get("description")?,
            processed: row.try_get("processed")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Value columns of a movement; exactly the one matching the concept is required.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MovementValues {
    pub quantity: Option<Decimal>,
    pub amount: Option<Decimal>,
    pub text_msg: Option<String>,
    pub service_date: Option<NaiveDate>,
}

impl MovementValues {
    pub fn check(&self, column: ColumnType) -> Result<(), AppError> {
        let present = match column {
            ColumnType::Quantity => self.quantity.is_some(),
            ColumnType::Amount => self.amount.is_some(),
            ColumnType::Text => self.text_msg.is_some(),
            ColumnType::Date => self.service_date.is_some(),
        };
        if present {
            Ok(())
        } else {
            Err(AppError::mandatory(column.value_field()))
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreatePayrollMovement {
    pub business_partner_id: i64,
    pub concept_id: i64,
    pub valid_from: NaiveDate,
    pub values: MovementValues,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdatePayrollMovement {
    pub valid_from: Option<NaiveDate>,
    pub values: MovementValues,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ListPayrollMovementsFilter {
    pub business_partner_id: i64,
    pub concept_id: i64,
    pub valid_from: Option<NaiveDate>,
    pub valid_to: Option<NaiveDate>,
}

impl ListPayrollMovementsFilter {
    pub fn where_clause(&self) -> WhereClause {
        let mut clause = WhereClause::new();
        clause
            .eq_id("m.business_partner_id", self.business_partner_id)
            .eq_id("m.concept_id", self.concept_id)
            .date_from("m.valid_from", self.valid_from)
            .date_to("m.valid_from", self.valid_to);
        clause
    }
}

/// Decimal stored as TEXT; callers bind the rendered string.
pub fn decimal_text(value: Option<Decimal>) -> Option<String> {
    value.map(|d| d.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amount_concept_needs_amount() {
        let values = MovementValues {
            quantity: Some(Decimal::ONE),
            ..Default::default()
        };
        let err = values.check(ColumnType::Amount).unwrap_err();
        assert!(matches!(err, AppError::MandatoryMissing(field) if field == "amount"));
        assert!(values.check(ColumnType::Quantity).is_ok());
    }

    #[test]
    fn date_concept_needs_service_date() {
        let values = MovementValues {
            service_date: NaiveDate::from_ymd_opt(2024, 5, 1),
            ..Default::default()
        };
        assert!(values.check(ColumnType::Date).is_ok());
        assert!(values.check(ColumnType::Text).is_err());
    }
}
