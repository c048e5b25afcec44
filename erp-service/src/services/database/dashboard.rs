use super::{db_error, Database};
use crate::models::{Dashboard, Favorite, RecordKey};
use crate::services::query::{bind_values, ListQuery};
use service_core::error::AppError;
use service_core::filter::WhereClause;
use service_core::pagination::PageRequest;
use tracing::{info, instrument};

const DASHBOARD_QUERY: ListQuery = ListQuery {
    columns: "d.id, d.uuid, d.name, d.description, d.dashboard_type, d.chart_type, \
              d.column_no, d.line_no, d.is_collapsible, d.is_open_by_default",
    from: "dashboards d JOIN role_dashboard_access rda ON rda.dashboard_id = d.id",
    order_by: "d.column_no, d.line_no, d.id",
};

const FAVORITE_QUERY: ListQuery = ListQuery {
    columns: "m.id AS menu_id, m.uuid AS menu_uuid, m.name AS menu_name, \
              m.description AS menu_description, m.action, f.sequence",
    from: "user_favorites f JOIN menus m ON m.id = f.menu_id",
    order_by: "f.sequence, m.id",
};

impl Database {
    /// Active dashboards granted to a role.
    #[instrument(skip(self))]
    pub async fn list_dashboards(
        &self,
        role_id: i64,
        page: PageRequest,
    ) -> Result<(Vec<Dashboard>, i64), AppError> {
        let mut clause = WhereClause::new();
        clause.eq("rda.role_id", role_id).eq("d.is_active", true);
        self.fetch_page("list_dashboards", &DASHBOARD_QUERY, &clause, page)
            .await
    }

    #[instrument(skip(self))]
    pub async fn list_favorites(
        &self,
        user_id: i64,
        page: PageRequest,
    ) -> Result<(Vec<Favorite>, i64), AppError> {
        let mut clause = WhereClause::new();
        clause.eq("f.user_id", user_id);
        self.fetch_page("list_favorites", &FAVORITE_QUERY, &clause, page)
            .await
    }

    #[instrument(skip(self))]
    pub async fn get_favorite(
        &self,
        user_id: i64,
        menu_id: i64,
    ) -> Result<Option<Favorite>, AppError> {
        let mut clause = WhereClause::new();
        clause.eq("f.user_id", user_id).eq("f.menu_id", menu_id);
        self.fetch_optional_matching("get_favorite", &FAVORITE_QUERY, &clause)
            .await
    }

    /// Mark a menu entry as favorite; adding it twice is a no-op.
    #[instrument(skip(self))]
    pub async fn add_favorite(&self, user_id: i64, menu_id: i64) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO user_favorites (user_id, menu_id, sequence)
            VALUES (?, ?, (SELECT COALESCE(MAX(sequence), 0) + 10 FROM user_favorites WHERE user_id = ?))
            ON CONFLICT (user_id, menu_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(menu_id)
        .bind(user_id)
        .execute(self.pool())
        .await
        .map_err(db_error("add favorite"))?;
        info!(user_id = user_id, menu_id = menu_id, "Favorite added");
        Ok(())
    }

    /// Returns whether a favorite was removed.
    #[instrument(skip(self))]
    pub async fn remove_favorite(&self, user_id: i64, menu_id: i64) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM user_favorites WHERE user_id = ? AND menu_id = ?")
            .bind(user_id)
            .bind(menu_id)
            .execute(self.pool())
            .await
            .map_err(db_error("remove favorite"))?;
        Ok(result.rows_affected() > 0)
    }

    /// Resolve a menu reference to its id, restricted to entries the role may see.
    #[instrument(skip(self))]
    pub async fn accessible_menu_id(
        &self,
        role_id: i64,
        key: &RecordKey,
    ) -> Result<Option<i64>, AppError> {
        let mut clause = key.where_clause("m");
        clause.eq("rma.role_id", role_id);
        let sql = format!(
            "SELECT m.id FROM menus m JOIN role_menu_access rma ON rma.menu_id = m.id{}",
            clause.to_sql()
        );
        sqlx::query_scalar_with::<_, i64, _>(&sql, bind_values(clause.params())?)
            .fetch_optional(self.pool())
            .await
            .map_err(db_error("resolve menu"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dashboards_follow_role_and_layout() {
        let db = Database::in_memory().await.unwrap();
        let (admin, count) = db.list_dashboards(1, PageRequest::first(50)).await.unwrap();
        // the inactive dashboard is granted but hidden
        assert_eq!(count, 3);
        let layout: Vec<(i32, i32)> = admin.iter().map(|d| (d.column_no, d.line_no)).collect();
        assert_eq!(layout, vec![(1, 1), (1, 2), (2, 1)]);

        let (_, clerk_count) = db.list_dashboards(2, PageRequest::first(50)).await.unwrap();
        assert_eq!(clerk_count, 1);
    }

    #[tokio::test]
    async fn favorites_add_once_and_remove() {
        let db = Database::in_memory().await.unwrap();
        let user = db.create_user("fav", "hash", None, &[1]).await.unwrap();

        db.add_favorite(user, 5).await.unwrap();
        db.add_favorite(user, 2).await.unwrap();
        db.add_favorite(user, 5).await.unwrap();

        let (favorites, count) = db.list_favorites(user, PageRequest::first(10)).await.unwrap();
        assert_eq!(count, 2);
        assert_eq!(favorites[0].menu_id, 5);
        assert_eq!(favorites[1].sequence, 20);

        assert!(db.remove_favorite(user, 5).await.unwrap());
        assert!(!db.remove_favorite(user, 5).await.unwrap());
    }

    #[tokio::test]
    async fn menu_access_is_checked_per_role() {
        let db = Database::in_memory().await.unwrap();
        let payroll = RecordKey::Uuid("c7d8e9f0-1a2b-4c3d-9e4f-5a6b7c8d9e08".to_string());
        assert_eq!(db.accessible_menu_id(1, &payroll).await.unwrap(), Some(8));
        assert_eq!(db.accessible_menu_id(2, &payroll).await.unwrap(), None);
    }
}
