use super::{commit, db_error, Database};
use crate::models::{
    DocumentAction, DocumentActionLog, DocumentRecord, DocumentStatus, DocumentTable, RecordKey,
};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::query::ListQuery;
use chrono::Utc;
use service_core::error::AppError;
use service_core::filter::WhereClause;
use service_core::pagination::PageRequest;
use tracing::{info, instrument};

const LOG_QUERY: ListQuery = ListQuery {
    columns: "dl.id, dl.table_name, dl.record_id, dl.document_action, dl.status_from, \
              dl.status_to, dl.user_id, u.name AS user_name, dl.created_at",
    from: "document_action_logs dl LEFT JOIN users u ON u.id = dl.user_id",
    order_by: "dl.created_at DESC, dl.id DESC",
};

fn document_query(table: DocumentTable) -> ListQuery {
    match table {
        DocumentTable::Payments => ListQuery {
            columns: "d.id, d.uuid, d.document_no, d.document_status, d.processed",
            from: "payments d",
            order_by: "d.id",
        },
    }
}

impl Database {
    #[instrument(skip(self))]
    pub async fn get_document(
        &self,
        table: DocumentTable,
        key: &RecordKey,
    ) -> Result<Option<DocumentRecord>, AppError> {
        self.fetch_optional_matching("get_document", &document_query(table), &key.where_clause("d"))
            .await
    }

    /// Run a document action: check the transition, move the status, flag the
    /// document processed and write the audit row, all in one transaction.
    #[instrument(skip(self, action), fields(action = action.as_str()))]
    pub async fn run_document_action(
        &self,
        table: DocumentTable,
        id: i64,
        action: DocumentAction,
        user_id: i64,
    ) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["run_document_action"])
            .start_timer();

        let table_name = table.table_name();
        let mut tx = self.begin().await?;

        let current: String = sqlx::query_scalar(&format!(
            "SELECT document_status FROM {} WHERE id = ?",
            table_name
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_error("read document status"))?
        .ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("Document {} in {} not found", id, table_name))
        })?;

        let status = DocumentStatus::from_string(&current);
        if !status.allows(action) {
            return Err(AppError::InvalidState(anyhow::anyhow!(
                "Action {} is not valid for document status {}",
                action.as_str(),
                status.as_str()
            )));
        }
        let target = action.resulting_status();
        let now = Utc::now();

        sqlx::query(&format!(
            "UPDATE {} SET document_status = ?, processed = 1, updated_at = ? WHERE id = ?",
            table_name
        ))
        .bind(target.as_str())
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(db_error("update document status"))?;

        sqlx::query(
            r#"
            INSERT INTO document_action_logs (table_name, record_id, document_action, status_from, status_to, user_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(table_name)
        .bind(id)
        .bind(action.as_str())
        .bind(status.as_str())
        .bind(target.as_str())
        .bind(user_id)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(db_error("write document action log"))?;

        commit(tx).await?;
        timer.observe_duration();
        info!(
            table = table_name,
            record_id = id,
            from = status.as_str(),
            to = target.as_str(),
            "Document action completed"
        );
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn list_document_action_logs(
        &self,
        table: DocumentTable,
        record_id: i64,
        page: PageRequest,
    ) -> Result<(Vec<DocumentActionLog>, i64), AppError> {
        let mut clause = WhereClause::new();
        clause
            .eq("dl.table_name", table.table_name())
            .eq("dl.record_id", record_id);
        self.fetch_page("list_document_action_logs", &LOG_QUERY, &clause, page)
            .await
    }
}
