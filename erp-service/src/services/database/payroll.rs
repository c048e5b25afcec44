use super::{commit, db_error, Database};
use crate::models::payroll::decimal_text;
use crate::models::{
    CreatePayrollMovement, ListPayrollMovementsFilter, PayrollConcept, PayrollMovement, RecordKey,
    UpdatePayrollMovement,
};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::query::ListQuery;
use chrono::Utc;
use service_core::error::AppError;
use service_core::filter::WhereClause;
use service_core::pagination::PageRequest;
use tracing::{info, instrument};
use uuid::Uuid;

const CONCEPT_QUERY: ListQuery = ListQuery {
    columns: "pc.id, pc.uuid, pc.value, pc.name, pc.description, pc.column_type, pc.is_active",
    from: "payroll_concepts pc",
    order_by: "pc.value, pc.id",
};

const MOVEMENT_QUERY: ListQuery = ListQuery {
    columns: "m.id, m.uuid, m.business_partner_id, bp.name AS business_partner_name, \
              m.concept_id, pc.value AS concept_value, pc.name AS concept_name, \
              pc.column_type, m.valid_from, m.quantity, m.amount, m.text_msg, \
              m.service_date, m.description, m.processed, m.created_at, m.updated_at",
    from: "payroll_movements m \
           LEFT JOIN business_partners bp ON bp.id = m.business_partner_id \
           LEFT JOIN payroll_concepts pc ON pc.id = m.concept_id",
    order_by: "m.valid_from DESC, m.id DESC",
};

impl Database {
    #[instrument(skip(self))]
    pub async fn list_payroll_concepts(
        &self,
        search_value: &str,
        page: PageRequest,
    ) -> Result<(Vec<PayrollConcept>, i64), AppError> {
        let mut clause = WhereClause::new();
        clause
            .eq("pc.is_active", true)
            .contains_any(&["pc.value", "pc.name", "pc.description"], search_value);
        self.fetch_page("list_payroll_concepts", &CONCEPT_QUERY, &clause, page)
            .await
    }

    #[instrument(skip(self))]
    pub async fn get_payroll_concept(
        &self,
        key: &RecordKey,
    ) -> Result<Option<PayrollConcept>, AppError> {
        self.fetch_optional_matching("get_payroll_concept", &CONCEPT_QUERY, &key.where_clause("pc"))
            .await
    }

    #[instrument(skip(self, input), fields(business_partner_id = input.business_partner_id))]
    pub async fn create_payroll_movement(
        &self,
        input: &CreatePayrollMovement,
    ) -> Result<i64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_payroll_movement"])
            .start_timer();

        let now = Utc::now();
        let movement_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO payroll_movements (uuid, business_partner_id, concept_id, valid_from, quantity, amount, text_msg, service_date, description, processed, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(input.business_partner_id)
        .bind(input.concept_id)
        .bind(input.valid_from)
        .bind(decimal_text(input.values.quantity))
        .bind(decimal_text(input.values.amount))
        .bind(&input.values.text_msg)
        .bind(input.values.service_date)
        .bind(&input.description)
        .bind(now)
        .bind(now)
        .fetch_one(self.pool())
        .await
        .map_err(db_error("create payroll movement"))?;

        timer.observe_duration();
        info!(movement_id = movement_id, "Payroll movement created");
        Ok(movement_id)
    }

    #[instrument(skip(self))]
    pub async fn get_payroll_movement(
        &self,
        key: &RecordKey,
    ) -> Result<Option<PayrollMovement>, AppError> {
        self.fetch_optional_matching("get_payroll_movement", &MOVEMENT_QUERY, &key.where_clause("m"))
            .await
    }

    #[instrument(skip(self, filter))]
    pub async fn list_payroll_movements(
        &self,
        filter: &ListPayrollMovementsFilter,
        page: PageRequest,
    ) -> Result<(Vec<PayrollMovement>, i64), AppError> {
        self.fetch_page(
            "list_payroll_movements",
            &MOVEMENT_QUERY,
            &filter.where_clause(),
            page,
        )
        .await
    }

    #[instrument(skip(self, update))]
    pub async fn update_payroll_movement(
        &self,
        id: i64,
        update: &UpdatePayrollMovement,
    ) -> Result<(), AppError> {
        let mut tx = self.begin().await?;
        Self::ensure_movement_unprocessed(&mut tx, id, "updated").await?;

        sqlx::query(
            r#"
            UPDATE payroll_movements SET
                valid_from = COALESCE(?, valid_from),
                quantity = COALESCE(?, quantity),
                amount = COALESCE(?, amount),
                text_msg = COALESCE(?, text_msg),
                service_date = COALESCE(?, service_date),
                description = COALESCE(?, description),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(update.valid_from)
        .bind(decimal_text(update.values.quantity))
        .bind(decimal_text(update.values.amount))
        .bind(&update.values.text_msg)
        .bind(update.values.service_date)
        .bind(&update.description)
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(db_error("update payroll movement"))?;

        commit(tx).await
    }

    #[instrument(skip(self))]
    pub async fn delete_payroll_movement(&self, id: i64) -> Result<(), AppError> {
        let mut tx = self.begin().await?;
        Self::ensure_movement_unprocessed(&mut tx, id, "deleted").await?;

        sqlx::query("DELETE FROM payroll_movements WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_error("delete payroll movement"))?;

        commit(tx).await?;
        info!(movement_id = id, "Payroll movement deleted");
        Ok(())
    }

    async fn ensure_movement_unprocessed(
        tx: &mut sqlx::Transaction<'static, sqlx::Sqlite>,
        id: i64,
        verb: &str,
    ) -> Result<(), AppError> {
        let processed: bool =
            sqlx::query_scalar("SELECT processed FROM payroll_movements WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut **tx)
                .await
                .map_err(db_error("read payroll movement state"))?
                .ok_or_else(|| {
                    AppError::NotFound(anyhow::anyhow!("Payroll movement {} not found", id))
                })?;

        if processed {
            return Err(AppError::InvalidState(anyhow::anyhow!(
                "Payroll movement {} is processed and cannot be {}",
                id,
                verb
            )));
        }
        Ok(())
    }
}
