use super::{commit, db_error, Database};
use crate::models::{CreatePayment, ListPaymentsFilter, Payment, RecordKey, UpdatePayment};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::query::ListQuery;
use chrono::Utc;
use service_core::error::AppError;
use service_core::pagination::PageRequest;
use tracing::{info, instrument};
use uuid::Uuid;

pub(crate) const PAYMENT_QUERY: ListQuery = ListQuery {
    columns: "p.id, p.uuid, p.document_no, p.business_partner_id, bp.name AS business_partner_name, \
              p.is_receipt, p.tender_type, p.currency_code, p.pay_amount, p.date_trx, \
              p.description, p.document_status, p.processed, p.created_at, p.updated_at",
    from: "payments p LEFT JOIN business_partners bp ON bp.id = p.business_partner_id",
    order_by: "p.date_trx DESC, p.id DESC",
};

impl Database {
    #[instrument(skip(self, input), fields(business_partner_id = input.business_partner_id))]
    pub async fn create_payment(&self, input: &CreatePayment) -> Result<i64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_payment"])
            .start_timer();

        let mut tx = self.begin().await?;
        let document_no = match &input.document_no {
            Some(document_no) => document_no.clone(),
            None => Self::next_document_no(&mut tx, "payments").await?,
        };
        let now = Utc::now();

        let payment_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO payments (uuid, document_no, business_partner_id, is_receipt, tender_type, currency_code, pay_amount, date_trx, description, document_status, processed, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 'DR', 0, ?, ?)
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&document_no)
        .bind(input.business_partner_id)
        .bind(input.is_receipt)
        .bind(input.tender_type.as_str())
        .bind(&input.currency_code)
        .bind(input.pay_amount.to_string())
        .bind(input.date_trx)
        .bind(&input.description)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error("create payment"))?;

        commit(tx).await?;
        timer.observe_duration();
        info!(payment_id = payment_id, document_no = %document_no, "Payment created");
        Ok(payment_id)
    }

    #[instrument(skip(self))]
    pub async fn get_payment(&self, key: &RecordKey) -> Result<Option<Payment>, AppError> {
        self.fetch_optional_matching("get_payment", &PAYMENT_QUERY, &key.where_clause("p"))
            .await
    }

    #[instrument(skip(self, filter))]
    pub async fn list_payments(
        &self,
        filter: &ListPaymentsFilter,
        page: PageRequest,
    ) -> Result<(Vec<Payment>, i64), AppError> {
        self.fetch_page("list_payments", &PAYMENT_QUERY, &filter.where_clause(), page)
            .await
    }

    /// Every payment matching the filter, for exports.
    pub async fn all_payments(&self, filter: &ListPaymentsFilter) -> Result<Vec<Payment>, AppError> {
        self.fetch_all_matching("export_payments", &PAYMENT_QUERY, &filter.where_clause())
            .await
    }

    /// Update a payment that has not been processed yet.
    ///
    /// The processed check and the write share a transaction.
    #[instrument(skip(self, update))]
    pub async fn update_payment(&self, id: i64, update: &UpdatePayment) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_payment"])
            .start_timer();

        let mut tx = self.begin().await?;
        Self::ensure_payment_unprocessed(&mut tx, id, "updated").await?;

        sqlx::query(
            r#"
            UPDATE payments SET
                tender_type = COALESCE(?, tender_type),
                currency_code = COALESCE(?, currency_code),
                pay_amount = COALESCE(?, pay_amount),
                date_trx = COALESCE(?, date_trx),
                description = COALESCE(?, description),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(update.tender_type.map(|t| t.as_str()))
        .bind(&update.currency_code)
        .bind(update.pay_amount.map(|d| d.to_string()))
        .bind(update.date_trx)
        .bind(&update.description)
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(db_error("update payment"))?;

        commit(tx).await?;
        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn delete_payment(&self, id: i64) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_payment"])
            .start_timer();

        let mut tx = self.begin().await?;
        Self::ensure_payment_unprocessed(&mut tx, id, "deleted").await?;

        sqlx::query("DELETE FROM document_action_logs WHERE table_name = 'payments' AND record_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_error("delete payment logs"))?;
        sqlx::query("DELETE FROM payments WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_error("delete payment"))?;

        commit(tx).await?;
        timer.observe_duration();
        info!(payment_id = id, "Payment deleted");
        Ok(())
    }

    async fn ensure_payment_unprocessed(
        tx: &mut sqlx::Transaction<'static, sqlx::Sqlite>,
        id: i64,
        verb: &str,
    ) -> Result<(), AppError> {
        let processed: bool = sqlx::query_scalar("SELECT processed FROM payments WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(db_error("read payment state"))?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Payment {} not found", id)))?;

        if processed {
            return Err(AppError::InvalidState(anyhow::anyhow!(
                "Payment {} is processed and cannot be {}",
                id,
                verb
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CreateBusinessPartner, TenderType};
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    async fn setup() -> (Database, i64) {
        let db = Database::in_memory().await.unwrap();
        let partner = db
            .create_business_partner(&CreateBusinessPartner {
                value: "CUST-1".to_string(),
                name: "Customer One".to_string(),
                is_customer: true,
                ..Default::default()
            })
            .await
            .unwrap();
        (db, partner)
    }

    fn payment(partner: i64, day: u32) -> CreatePayment {
        CreatePayment {
            business_partner_id: partner,
            document_no: None,
            is_receipt: true,
            tender_type: TenderType::Check,
            currency_code: "USD".to_string(),
            pay_amount: Decimal::from_str("125.50").unwrap(),
            date_trx: NaiveDate::from_ymd_opt(2024, 6, day).unwrap(),
            description: None,
        }
    }

    #[tokio::test]
    async fn created_payment_reads_back() {
        let (db, partner) = setup().await;
        let id = db.create_payment(&payment(partner, 3)).await.unwrap();
        let stored = db.get_payment(&RecordKey::Id(id)).await.unwrap().unwrap();
        assert_eq!(stored.document_no, "PAY-000001");
        assert_eq!(stored.pay_amount, Decimal::from_str("125.50").unwrap());
        assert_eq!(stored.business_partner_name.as_deref(), Some("Customer One"));
        assert_eq!(stored.document_status, "DR");
        assert!(!stored.processed);
    }

    #[tokio::test]
    async fn listing_orders_newest_first() {
        let (db, partner) = setup().await;
        db.create_payment(&payment(partner, 1)).await.unwrap();
        db.create_payment(&payment(partner, 9)).await.unwrap();
        db.create_payment(&payment(partner, 5)).await.unwrap();

        let (rows, count) = db
            .list_payments(&ListPaymentsFilter::default(), PageRequest::first(10))
            .await
            .unwrap();
        assert_eq!(count, 3);
        let days: Vec<u32> = rows.iter().map(|p| chrono::Datelike::day(&p.date_trx)).collect();
        assert_eq!(days, vec![9, 5, 1]);
    }

    #[tokio::test]
    async fn processed_payment_cannot_change() {
        let (db, partner) = setup().await;
        let id = db.create_payment(&payment(partner, 2)).await.unwrap();
        sqlx::query("UPDATE payments SET processed = 1, document_status = 'CO' WHERE id = ?")
            .bind(id)
            .execute(db.pool())
            .await
            .unwrap();

        let err = db.delete_payment(id).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
        let err = db
            .update_payment(id, &UpdatePayment::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
        assert!(db.get_payment(&RecordKey::Id(id)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn partner_with_payments_cannot_be_deleted() {
        let (db, partner) = setup().await;
        db.create_payment(&payment(partner, 2)).await.unwrap();
        let err = db.delete_business_partner(partner).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
    }
}
