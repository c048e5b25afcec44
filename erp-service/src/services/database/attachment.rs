use super::{commit, db_error, Database};
use crate::models::{Attachment, NewResource, ResourceReference};
use crate::services::query::ListQuery;
use chrono::Utc;
use service_core::error::AppError;
use service_core::filter::WhereClause;
use sqlx::{Sqlite, Transaction};
use tracing::{info, instrument};
use uuid::Uuid;

const ATTACHMENT_QUERY: ListQuery = ListQuery {
    columns: "a.id, a.uuid, a.table_name, a.record_id, a.title, a.text_msg, a.created_at, \
              a.updated_at",
    from: "attachments a",
    order_by: "a.id",
};

const RESOURCE_QUERY: ListQuery = ListQuery {
    columns: "rr.id, rr.uuid, rr.attachment_id, rr.file_name, rr.content_type, rr.file_size, \
              rr.storage_key, rr.description, rr.created_at",
    from: "resource_references rr",
    order_by: "rr.id",
};

impl Database {
    #[instrument(skip(self))]
    pub async fn get_attachment(
        &self,
        table_name: &str,
        record_id: i64,
    ) -> Result<Option<Attachment>, AppError> {
        let mut clause = WhereClause::new();
        clause
            .eq("a.table_name", table_name)
            .eq("a.record_id", record_id);
        self.fetch_optional_matching("get_attachment", &ATTACHMENT_QUERY, &clause)
            .await
    }

    #[instrument(skip(self))]
    pub async fn list_resource_references(
        &self,
        attachment_id: i64,
    ) -> Result<Vec<ResourceReference>, AppError> {
        let mut clause = WhereClause::new();
        clause.eq("rr.attachment_id", attachment_id);
        self.fetch_all_matching("list_resource_references", &RESOURCE_QUERY, &clause)
            .await
    }

    /// Create the attachment header on demand and return its id.
    async fn ensure_attachment(
        tx: &mut Transaction<'static, Sqlite>,
        table_name: &str,
        record_id: i64,
    ) -> Result<i64, AppError> {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO attachments (uuid, table_name, record_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (table_name, record_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(table_name)
        .bind(record_id)
        .bind(now)
        .bind(now)
        .execute(&mut **tx)
        .await
        .map_err(db_error("create attachment"))?;

        sqlx::query_scalar("SELECT id FROM attachments WHERE table_name = ? AND record_id = ?")
            .bind(table_name)
            .bind(record_id)
            .fetch_one(&mut **tx)
            .await
            .map_err(db_error("read attachment"))
    }

    /// Upsert title and text of the attachment of a record.
    #[instrument(skip(self, title, text_msg))]
    pub async fn set_attachment_description(
        &self,
        table_name: &str,
        record_id: i64,
        title: Option<&str>,
        text_msg: Option<&str>,
    ) -> Result<(), AppError> {
        let mut tx = self.begin().await?;
        let attachment_id = Self::ensure_attachment(&mut tx, table_name, record_id).await?;

        sqlx::query(
            "UPDATE attachments SET title = COALESCE(?, title), text_msg = COALESCE(?, text_msg), \
             updated_at = ? WHERE id = ?",
        )
        .bind(title)
        .bind(text_msg)
        .bind(Utc::now())
        .bind(attachment_id)
        .execute(&mut *tx)
        .await
        .map_err(db_error("update attachment"))?;

        commit(tx).await
    }

    /// Record an uploaded resource under its record's attachment.
    #[instrument(skip(self, resource), fields(file_name = %resource.file_name))]
    pub async fn create_resource_reference(
        &self,
        resource: &NewResource,
        resource_uuid: &str,
        storage_key: &str,
    ) -> Result<(), AppError> {
        let mut tx = self.begin().await?;
        let attachment_id =
            Self::ensure_attachment(&mut tx, &resource.table_name, resource.record_id).await?;

        sqlx::query(
            r#"
            INSERT INTO resource_references (uuid, attachment_id, file_name, content_type, file_size, storage_key, description, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(resource_uuid)
        .bind(attachment_id)
        .bind(&resource.file_name)
        .bind(&resource.content_type)
        .bind(resource.file_size)
        .bind(storage_key)
        .bind(&resource.description)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .map_err(db_error("create resource reference"))?;

        commit(tx).await?;
        info!(attachment_id = attachment_id, resource_uuid = %resource_uuid, "Resource stored");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn get_resource_reference(
        &self,
        uuid: &str,
    ) -> Result<Option<ResourceReference>, AppError> {
        let mut clause = WhereClause::new();
        clause.eq("rr.uuid", uuid);
        self.fetch_optional_matching("get_resource_reference", &RESOURCE_QUERY, &clause)
            .await
    }

    #[instrument(skip(self))]
    pub async fn delete_resource_reference(&self, id: i64) -> Result<(), AppError> {
        sqlx::query("DELETE FROM resource_references WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(db_error("delete resource reference"))?;
        Ok(())
    }
}
