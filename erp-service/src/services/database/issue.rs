use super::{commit, db_error, Database};
use crate::models::{
    CreateIssue, Issue, IssueComment, IssueStatus, ListIssuesFilter, RecordKey, UpdateIssue,
};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::query::ListQuery;
use chrono::Utc;
use service_core::error::AppError;
use service_core::filter::WhereClause;
use service_core::pagination::PageRequest;
use tracing::{info, instrument};
use uuid::Uuid;

const ISSUE_QUERY: ListQuery = ListQuery {
    columns: "i.id, i.uuid, i.document_no, i.subject, i.summary, i.priority, i.status, \
              i.created_by, cu.name AS created_by_name, i.sales_representative_id, \
              sr.name AS sales_representative_name, i.table_name, i.record_id, i.due_date, \
              i.created_at, i.updated_at",
    from: "issues i LEFT JOIN users cu ON cu.id = i.created_by \
           LEFT JOIN users sr ON sr.id = i.sales_representative_id",
    order_by: "i.updated_at DESC, i.id DESC",
};

const COMMENT_QUERY: ListQuery = ListQuery {
    columns: "ic.id, ic.uuid, ic.issue_id, ic.user_id, u.name AS user_name, ic.result, \
              ic.created_at, ic.updated_at",
    from: "issue_comments ic LEFT JOIN users u ON u.id = ic.user_id",
    order_by: "ic.created_at, ic.id",
};

impl Database {
    #[instrument(skip(self, input), fields(created_by = input.created_by))]
    pub async fn create_issue(&self, input: &CreateIssue) -> Result<i64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_issue"])
            .start_timer();

        let mut tx = self.begin().await?;
        let document_no = Self::next_document_no(&mut tx, "issues").await?;
        let now = Utc::now();

        let issue_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO issues (uuid, document_no, subject, summary, priority, status, created_by, sales_representative_id, table_name, record_id, due_date, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&document_no)
        .bind(&input.subject)
        .bind(&input.summary)
        .bind(input.priority.as_str())
        .bind(IssueStatus::Open.as_str())
        .bind(input.created_by)
        .bind(input.sales_representative_id)
        .bind(&input.table_name)
        .bind(input.record_id)
        .bind(input.due_date)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error("create issue"))?;

        commit(tx).await?;
        timer.observe_duration();
        info!(issue_id = issue_id, document_no = %document_no, "Issue created");
        Ok(issue_id)
    }

    #[instrument(skip(self))]
    pub async fn get_issue(&self, key: &RecordKey) -> Result<Option<Issue>, AppError> {
        self.fetch_optional_matching("get_issue", &ISSUE_QUERY, &key.where_clause("i"))
            .await
    }

    #[instrument(skip(self, filter))]
    pub async fn list_issues(
        &self,
        filter: &ListIssuesFilter,
        page: PageRequest,
    ) -> Result<(Vec<Issue>, i64), AppError> {
        self.fetch_page("list_issues", &ISSUE_QUERY, &filter.where_clause(), page)
            .await
    }

    /// Update an issue. A closed issue only accepts being re-opened.
    #[instrument(skip(self, update))]
    pub async fn update_issue(&self, id: i64, update: &UpdateIssue) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_issue"])
            .start_timer();

        let mut tx = self.begin().await?;
        let status = Self::issue_status(&mut tx, id).await?;
        if status == IssueStatus::Closed && !update.is_reopen_only() {
            return Err(AppError::InvalidState(anyhow::anyhow!(
                "Issue {} is closed; it can only be re-opened",
                id
            )));
        }

        sqlx::query(
            r#"
            UPDATE issues SET
                subject = COALESCE(?, subject),
                summary = COALESCE(?, summary),
                priority = COALESCE(?, priority),
                status = COALESCE(?, status),
                sales_representative_id = COALESCE(?, sales_representative_id),
                due_date = COALESCE(?, due_date),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&update.subject)
        .bind(&update.summary)
        .bind(update.priority.map(|p| p.as_str()))
        .bind(update.status.map(|s| s.as_str()))
        .bind(update.sales_representative_id)
        .bind(update.due_date)
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(db_error("update issue"))?;

        commit(tx).await?;
        timer.observe_duration();
        Ok(())
    }

    /// Delete an open issue together with its comments.
    #[instrument(skip(self))]
    pub async fn delete_issue(&self, id: i64) -> Result<(), AppError> {
        let mut tx = self.begin().await?;
        if Self::issue_status(&mut tx, id).await? == IssueStatus::Closed {
            return Err(AppError::InvalidState(anyhow::anyhow!(
                "Issue {} is closed and cannot be deleted",
                id
            )));
        }

        for sql in [
            "DELETE FROM issue_comments WHERE issue_id = ?",
            "DELETE FROM issues WHERE id = ?",
        ] {
            sqlx::query(sql)
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(db_error("delete issue"))?;
        }

        commit(tx).await?;
        info!(issue_id = id, "Issue deleted");
        Ok(())
    }

    async fn issue_status(
        tx: &mut sqlx::Transaction<'static, sqlx::Sqlite>,
        id: i64,
    ) -> Result<IssueStatus, AppError> {
        let status: String = sqlx::query_scalar("SELECT status FROM issues WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(db_error("read issue status"))?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Issue {} not found", id)))?;
        Ok(IssueStatus::from_string(&status))
    }

    #[instrument(skip(self, result))]
    pub async fn create_issue_comment(
        &self,
        issue_id: i64,
        user_id: i64,
        result: &str,
    ) -> Result<i64, AppError> {
        let mut tx = self.begin().await?;
        let now = Utc::now();

        let comment_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO issue_comments (uuid, issue_id, user_id, result, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(issue_id)
        .bind(user_id)
        .bind(result)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error("create issue comment"))?;

        sqlx::query("UPDATE issues SET updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(issue_id)
            .execute(&mut *tx)
            .await
            .map_err(db_error("touch issue"))?;

        commit(tx).await?;
        Ok(comment_id)
    }

    #[instrument(skip(self))]
    pub async fn get_issue_comment(
        &self,
        key: &RecordKey,
    ) -> Result<Option<IssueComment>, AppError> {
        self.fetch_optional_matching("get_issue_comment", &COMMENT_QUERY, &key.where_clause("ic"))
            .await
    }

    #[instrument(skip(self))]
    pub async fn list_issue_comments(
        &self,
        issue_id: i64,
        page: PageRequest,
    ) -> Result<(Vec<IssueComment>, i64), AppError> {
        let mut clause = WhereClause::new();
        clause.eq("ic.issue_id", issue_id);
        self.fetch_page("list_issue_comments", &COMMENT_QUERY, &clause, page)
            .await
    }

    #[instrument(skip(self, result))]
    pub async fn update_issue_comment(&self, id: i64, result: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE issue_comments SET result = ?, updated_at = ? WHERE id = ?")
            .bind(result)
            .bind(Utc::now())
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(db_error("update issue comment"))?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn delete_issue_comment(&self, id: i64) -> Result<(), AppError> {
        sqlx::query("DELETE FROM issue_comments WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(db_error("delete issue comment"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::IssuePriority;

    async fn setup() -> (Database, i64) {
        let db = Database::in_memory().await.unwrap();
        let user = db.create_user("support", "hash", None, &[2]).await.unwrap();
        (db, user)
    }

    fn issue(user: i64, subject: &str) -> CreateIssue {
        CreateIssue {
            subject: subject.to_string(),
            summary: None,
            priority: IssuePriority::High,
            created_by: user,
            sales_representative_id: None,
            table_name: None,
            record_id: None,
            due_date: None,
        }
    }

    #[tokio::test]
    async fn issues_get_sequential_numbers() {
        let (db, user) = setup().await;
        let first = db.create_issue(&issue(user, "Printer")).await.unwrap();
        let second = db.create_issue(&issue(user, "Network")).await.unwrap();
        let first = db.get_issue(&RecordKey::Id(first)).await.unwrap().unwrap();
        let second = db.get_issue(&RecordKey::Id(second)).await.unwrap().unwrap();
        assert_eq!(first.document_no, "ISS-000001");
        assert_eq!(second.document_no, "ISS-000002");
        assert_eq!(first.created_by_name.as_deref(), Some("support"));
        assert_eq!(first.status, "OPEN");
    }

    #[tokio::test]
    async fn closed_issue_only_reopens() {
        let (db, user) = setup().await;
        let id = db.create_issue(&issue(user, "Login fails")).await.unwrap();
        db.update_issue(
            id,
            &UpdateIssue {
                status: Some(IssueStatus::Closed),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let edit = UpdateIssue {
            subject: Some("Edited".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            db.update_issue(id, &edit).await.unwrap_err(),
            AppError::InvalidState(_)
        ));
        assert!(matches!(
            db.delete_issue(id).await.unwrap_err(),
            AppError::InvalidState(_)
        ));

        db.update_issue(
            id,
            &UpdateIssue {
                status: Some(IssueStatus::Open),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        db.delete_issue(id).await.unwrap();
        assert!(db.get_issue(&RecordKey::Id(id)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn deleting_an_issue_drops_its_comments() {
        let (db, user) = setup().await;
        let id = db.create_issue(&issue(user, "Slow report")).await.unwrap();
        db.create_issue_comment(id, user, "Looking into it").await.unwrap();
        db.create_issue_comment(id, user, "Fixed").await.unwrap();

        let (comments, count) = db
            .list_issue_comments(id, PageRequest::first(10))
            .await
            .unwrap();
        assert_eq!(count, 2);
        assert_eq!(comments[0].result, "Looking into it");

        db.delete_issue(id).await.unwrap();
        let (_, count) = db
            .list_issue_comments(id, PageRequest::first(10))
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
