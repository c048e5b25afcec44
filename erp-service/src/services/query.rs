//! Paged query executor.
//!
//! Every list endpoint describes its query as a [`ListQuery`] (columns, FROM
//! with joins, stable ORDER BY) and combines it with a [`WhereClause`]. The
//! executor runs a COUNT over the same FROM and predicates, then fetches one
//! page with LIMIT/OFFSET.

use crate::services::database::Database;
use crate::services::metrics::DB_QUERY_DURATION;
use service_core::error::AppError;
use service_core::filter::{FilterValue, WhereClause};
use service_core::pagination::PageRequest;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Arguments, FromRow};

/// Static shape of a list query.
#[derive(Debug, Clone, Copy)]
pub struct ListQuery {
    pub columns: &'static str,
    pub from: &'static str,
    pub order_by: &'static str,
}

impl ListQuery {
    pub fn count_sql(&self, clause: &WhereClause) -> String {
        format!("SELECT COUNT(*) FROM {}{}", self.from, clause.to_sql())
    }

    pub fn select_sql(&self, clause: &WhereClause) -> String {
        format!(
            "SELECT {} FROM {}{} ORDER BY {}",
            self.columns,
            self.from,
            clause.to_sql(),
            self.order_by
        )
    }

    pub fn page_sql(&self, clause: &WhereClause) -> String {
        format!("{} LIMIT ? OFFSET ?", self.select_sql(clause))
    }
}

fn bind_error(e: sqlx::error::BoxDynError) -> AppError {
    AppError::DatabaseError(anyhow::anyhow!("Failed to bind query parameter: {}", e))
}

/// Bind filter values in placeholder order.
pub fn bind_values(values: &[FilterValue]) -> Result<SqliteArguments<'static>, AppError> {
    let mut args = SqliteArguments::default();
    for value in values {
        let added = match value {
            FilterValue::Text(text) => args.add(text.clone()),
            FilterValue::Integer(number) => args.add(*number),
            FilterValue::Boolean(flag) => args.add(*flag),
            FilterValue::Date(date) => args.add(*date),
        };
        added.map_err(bind_error)?;
    }
    Ok(args)
}

impl Database {
    /// Total number of rows matching `clause`.
    pub async fn count_rows(
        &self,
        operation: &str,
        query: &ListQuery,
        clause: &WhereClause,
    ) -> Result<i64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&[operation])
            .start_timer();

        let sql = query.count_sql(clause);
        let count = sqlx::query_scalar_with::<_, i64, _>(&sql, bind_values(clause.params())?)
            .fetch_one(self.pool())
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to count {}: {}", operation, e))
            })?;

        timer.observe_duration();
        Ok(count)
    }

    /// One page of rows plus the total count.
    pub async fn fetch_page<T>(
        &self,
        operation: &str,
        query: &ListQuery,
        clause: &WhereClause,
        page: PageRequest,
    ) -> Result<(Vec<T>, i64), AppError>
    where
        T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    {
        let record_count = self.count_rows(operation, query, clause).await?;

        let timer = DB_QUERY_DURATION
            .with_label_values(&[operation])
            .start_timer();

        let sql = query.page_sql(clause);
        let mut args = bind_values(clause.params())?;
        args.add(page.limit).map_err(bind_error)?;
        args.add(page.offset()).map_err(bind_error)?;

        let records = sqlx::query_as_with::<_, T, _>(&sql, args)
            .fetch_all(self.pool())
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to list {}: {}", operation, e))
            })?;

        timer.observe_duration();
        Ok((records, record_count))
    }

    /// Every matching row, in query order.
    pub async fn fetch_all_matching<T>(
        &self,
        operation: &str,
        query: &ListQuery,
        clause: &WhereClause,
    ) -> Result<Vec<T>, AppError>
    where
        T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    {
        let timer = DB_QUERY_DURATION
            .with_label_values(&[operation])
            .start_timer();

        let sql = query.select_sql(clause);
        let records = sqlx::query_as_with::<_, T, _>(&sql, bind_values(clause.params())?)
            .fetch_all(self.pool())
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to read {}: {}", operation, e))
            })?;

        timer.observe_duration();
        Ok(records)
    }

    /// First matching row, if any.
    pub async fn fetch_optional_matching<T>(
        &self,
        operation: &str,
        query: &ListQuery,
        clause: &WhereClause,
    ) -> Result<Option<T>, AppError>
    where
        T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    {
        let timer = DB_QUERY_DURATION
            .with_label_values(&[operation])
            .start_timer();

        let sql = format!("{} LIMIT 1", query.select_sql(clause));
        let record = sqlx::query_as_with::<_, T, _>(&sql, bind_values(clause.params())?)
            .fetch_optional(self.pool())
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to get {}: {}", operation, e))
            })?;

        timer.observe_duration();
        Ok(record)
    }
}
