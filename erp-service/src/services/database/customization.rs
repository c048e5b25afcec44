use super::{commit, db_error, Database};
use crate::models::{FieldCustomization, SaveWindowCustomization, WindowCustomization};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::query::ListQuery;
use chrono::Utc;
use service_core::error::AppError;
use service_core::filter::WhereClause;
use service_core::pagination::PageRequest;
use tracing::{info, instrument};
use uuid::Uuid;

const CUSTOMIZATION_QUERY: ListQuery = ListQuery {
    columns: "wc.id, wc.uuid, wc.user_id, wc.window_uuid, wc.name, wc.created_at, wc.updated_at",
    from: "window_customizations wc",
    order_by: "wc.updated_at DESC, wc.id DESC",
};

const FIELD_QUERY: ListQuery = ListQuery {
    columns: "wf.column_name, wf.sequence, wf.is_displayed, wf.display_size",
    from: "window_customization_fields wf",
    order_by: "wf.sequence, wf.id",
};

fn user_window_clause(user_id: i64, window_uuid: &str) -> WhereClause {
    let mut clause = WhereClause::new();
    clause
        .eq("wc.user_id", user_id)
        .eq("wc.window_uuid", window_uuid);
    clause
}

impl Database {
    /// Upsert the customization header of a user's window and replace its
    /// field rows. Nothing is written when a field lacks its column name.
    #[instrument(skip(self, input), fields(user_id = input.user_id, window_uuid = %input.window_uuid))]
    pub async fn save_window_customization(
        &self,
        input: &SaveWindowCustomization,
    ) -> Result<i64, AppError> {
        if input.fields.iter().any(|f| f.column_name.trim().is_empty()) {
            return Err(AppError::mandatory("column_name"));
        }

        let timer = DB_QUERY_DURATION
            .with_label_values(&["save_window_customization"])
            .start_timer();

        let mut tx = self.begin().await?;
        let now = Utc::now();

        let customization_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO window_customizations (uuid, user_id, window_uuid, name, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (user_id, window_uuid)
            DO UPDATE SET name = excluded.name, updated_at = excluded.updated_at
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(input.user_id)
        .bind(&input.window_uuid)
        .bind(&input.name)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error("save window customization"))?;

        sqlx::query("DELETE FROM window_customization_fields WHERE customization_id = ?")
            .bind(customization_id)
            .execute(&mut *tx)
            .await
            .map_err(db_error("clear customization fields"))?;

        for field in &input.fields {
            sqlx::query(
                r#"
                INSERT INTO window_customization_fields (customization_id, column_name, sequence, is_displayed, display_size)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(customization_id)
            .bind(&field.column_name)
            .bind(field.sequence)
            .bind(field.is_displayed)
            .bind(field.display_size)
            .execute(&mut *tx)
            .await
            .map_err(db_error("save customization field"))?;
        }

        commit(tx).await?;
        timer.observe_duration();
        info!(
            customization_id = customization_id,
            fields = input.fields.len(),
            "Window customization saved"
        );
        Ok(customization_id)
    }

    #[instrument(skip(self))]
    pub async fn get_window_customization(
        &self,
        user_id: i64,
        window_uuid: &str,
    ) -> Result<Option<(WindowCustomization, Vec<FieldCustomization>)>, AppError> {
        let header: Option<WindowCustomization> = self
            .fetch_optional_matching(
                "get_window_customization",
                &CUSTOMIZATION_QUERY,
                &user_window_clause(user_id, window_uuid),
            )
            .await?;
        let Some(header) = header else {
            return Ok(None);
        };

        let fields = self.customization_fields(header.id).await?;
        Ok(Some((header, fields)))
    }

    pub async fn customization_fields(
        &self,
        customization_id: i64,
    ) -> Result<Vec<FieldCustomization>, AppError> {
        let mut clause = WhereClause::new();
        clause.eq("wf.customization_id", customization_id);
        self.fetch_all_matching("customization_fields", &FIELD_QUERY, &clause)
            .await
    }

    #[instrument(skip(self))]
    pub async fn list_window_customizations(
        &self,
        user_id: i64,
        search_value: &str,
        page: PageRequest,
    ) -> Result<(Vec<WindowCustomization>, i64), AppError> {
        let mut clause = WhereClause::new();
        clause
            .eq("wc.user_id", user_id)
            .contains_any(&["wc.name", "wc.window_uuid"], search_value);
        self.fetch_page("list_window_customizations", &CUSTOMIZATION_QUERY, &clause, page)
            .await
    }

    /// Returns whether a customization existed.
    #[instrument(skip(self))]
    pub async fn delete_window_customization(
        &self,
        user_id: i64,
        window_uuid: &str,
    ) -> Result<bool, AppError> {
        let mut tx = self.begin().await?;

        let id: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM window_customizations WHERE user_id = ? AND window_uuid = ?",
        )
        .bind(user_id)
        .bind(window_uuid)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_error("read window customization"))?;
        let Some(id) = id else {
            return Ok(false);
        };

        for sql in [
            "DELETE FROM window_customization_fields WHERE customization_id = ?",
            "DELETE FROM window_customizations WHERE id = ?",
        ] {
            sqlx::query(sql)
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(db_error("delete window customization"))?;
        }

        commit(tx).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(column: &str, sequence: i32) -> FieldCustomization {
        FieldCustomization {
            column_name: column.to_string(),
            sequence,
            is_displayed: true,
            display_size: 20,
        }
    }

    async fn setup() -> (Database, i64) {
        let db = Database::in_memory().await.unwrap();
        let user = db.create_user("eve", "hash", None, &[2]).await.unwrap();
        (db, user)
    }

    #[tokio::test]
    async fn saving_twice_replaces_fields() {
        let (db, user) = setup().await;
        let mut input = SaveWindowCustomization {
            user_id: user,
            window_uuid: "win-1".to_string(),
            name: Some("Compact".to_string()),
            fields: vec![field("Name", 10), field("Value", 20)],
        };
        let first = db.save_window_customization(&input).await.unwrap();

        input.fields = vec![field("TaxID", 10)];
        let second = db.save_window_customization(&input).await.unwrap();
        assert_eq!(first, second);

        let (header, fields) = db
            .get_window_customization(user, "win-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(header.name.as_deref(), Some("Compact"));
        assert_eq!(fields, vec![field("TaxID", 10)]);
    }

    #[tokio::test]
    async fn blank_column_saves_nothing() {
        let (db, user) = setup().await;
        let input = SaveWindowCustomization {
            user_id: user,
            window_uuid: "win-2".to_string(),
            name: None,
            fields: vec![field("Name", 10), field(" ", 20)],
        };
        let err = db.save_window_customization(&input).await.unwrap_err();
        assert!(matches!(err, AppError::MandatoryMissing(_)));
        assert!(db
            .get_window_customization(user, "win-2")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn customizations_are_per_user() {
        let (db, user) = setup().await;
        let other = db.create_user("fay", "hash", None, &[2]).await.unwrap();
        for window in ["a", "b"] {
            db.save_window_customization(&SaveWindowCustomization {
                user_id: user,
                window_uuid: window.to_string(),
                name: None,
                fields: vec![],
            })
            .await
            .unwrap();
        }

        let (_, count) = db
            .list_window_customizations(user, "", PageRequest::first(10))
            .await
            .unwrap();
        assert_eq!(count, 2);
        let (_, count) = db
            .list_window_customizations(other, "", PageRequest::first(10))
            .await
            .unwrap();
        assert_eq!(count, 0);

        assert!(db.delete_window_customization(user, "a").await.unwrap());
        assert!(!db.delete_window_customization(other, "b").await.unwrap());
    }
}
