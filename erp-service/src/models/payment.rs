//! Payment model.

use super::{decimal_column, workflow::DocumentStatus};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::filter::WhereClause;
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};

/// How a payment was tendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenderType {
    Cash,
    Check,
    CreditCard,
    DirectDebit,
    DirectDeposit,
}

impl TenderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TenderType::Cash => "X",
            TenderType::Check => "K",
            TenderType::CreditCard => "C",
            TenderType::DirectDebit => "D",
            TenderType::DirectDeposit => "A",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "K" => TenderType::Check,
            "C" => TenderType::CreditCard,
            "D" => TenderType::DirectDebit,
            "A" => TenderType::DirectDeposit,
            _ => TenderType::Cash,
        }
    }
}

/// Payment document joined with its business partner name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: i64,
    pub uuid: String,
    pub document_no: String,
    pub business_partner_id: i64,
    pub business_partner_name: Option<String>,
    pub is_receipt: bool,
    pub tender_type: String,
    pub currency_code: String,
    pub pay_amount: Decimal,
    pub date_trx: NaiveDate,
    pub description: Option<String>,
    pub document_status: String,
    pub processed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn status(&self) -> DocumentStatus {
        DocumentStatus::from_string(&self.document_status)
    }
}

impl<'r> FromRow<'r, SqliteRow> for Payment {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            uuid: row.try_get("uuid")?,
            document_no: row.try_get("document_no")?,
            business_partner_id: row.try_get("business_partner_id")?,
            business_partner_name: row.try_get("business_partner_name")?,
            is_receipt: row.try_get("is_receipt")?,
            tender_type: row.try_get("tender_type")?,
            currency_code: row.try_get("currency_code")?,
            pay_amount: decimal_column(row, "pay_amount")?,
            date_trx: row.try_get("date_trx")?,
            description: row.try_get("description")?,
            document_status: row.try_get("document_status")?,
            processed: row.try_get("processed")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct CreatePayment {
    pub business_partner_id: i64,
    pub document_no: Option<String>,
    pub is_receipt: bool,
    pub tender_type: TenderType,
    pub currency_code: String,
    pub pay_amount: Decimal,
    pub date_trx: NaiveDate,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdatePayment {
    pub tender_type: Option<TenderType>,
    pub currency_code: Option<String>,
    pub pay_amount: Option<Decimal>,
    pub date_trx: Option<NaiveDate>,
    pub description: Option<String>,
}

/// Filter parameters for listing payments.
#[derive(Debug, Clone, Default)]
pub struct ListPaymentsFilter {
    pub search_value: String,
    pub business_partner_id: Option<i64>,
    pub document_status: String,
    pub is_receipt: Option<bool>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

impl ListPaymentsFilter {
    pub fn where_clause(&self) -> WhereClause {
        let mut clause = WhereClause::new();
        clause
            .contains_any(&["p.document_no", "p.description", "bp.name"], &self.search_value)
            .eq_id("p.business_partner_id", self.business_partner_id.unwrap_or(0))
            .eq_text("p.document_status", &self.document_status)
            .eq_bool("p.is_receipt", self.is_receipt)
            .date_from("p.date_trx", self.date_from)
            .date_to("p.date_trx", self.date_to);
        clause
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tender_type_codes_round_trip() {
        for tender in [
            TenderType::Cash,
            TenderType::Check,
            TenderType::CreditCard,
            TenderType::DirectDebit,
            TenderType::DirectDeposit,
        ] {
            assert_eq!(TenderType::from_string(tender.as_str()), tender);
        }
    }

    #[test]
    fn date_range_filter_is_inclusive() {
        let filter = ListPaymentsFilter {
            date_from: NaiveDate::from_ymd_opt(2024, 3, 1),
            date_to: NaiveDate::from_ymd_opt(2024, 3, 31),
            ..Default::default()
        };
        assert_eq!(
            filter.where_clause().to_sql(),
            " WHERE p.date_trx >= ? AND p.date_trx <= ?"
        );
    }
}
