use super::{commit, db_error, db_error_or_conflict, Database};
use crate::models::{MenuEntry, RecordKey, Role, SessionRecord, User};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::query::ListQuery;
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use service_core::filter::WhereClause;
use service_core::pagination::PageRequest;
use tracing::{info, instrument};
use uuid::Uuid;

const GRANTED_ROLE_QUERY: ListQuery = ListQuery {
    columns: "r.id, r.uuid, r.name, r.description, r.can_export",
    from: "roles r JOIN user_roles ur ON ur.role_id = r.id",
    order_by: "r.id",
};

const SESSION_QUERY: ListQuery = ListQuery {
    columns: "s.id, s.uuid, s.language, s.is_active, s.expires_at, \
              u.id AS user_id, u.uuid AS user_uuid, u.name AS user_name, \
              u.description AS user_description, u.email AS user_email, \
              r.id AS role_id, r.uuid AS role_uuid, r.name AS role_name, \
              r.description AS role_description, r.can_export",
    from: "sessions s JOIN users u ON u.id = s.user_id JOIN roles r ON r.id = s.role_id",
    order_by: "s.id",
};

const MENU_QUERY: ListQuery = ListQuery {
    columns: "m.id, m.uuid, m.parent_id, m.name, m.description, m.action, m.is_summary, \
              m.sequence",
    from: "menus m JOIN role_menu_access rma ON rma.menu_id = m.id",
    order_by: "m.sequence, m.id",
};

fn granted_roles_clause(user_id: i64) -> WhereClause {
    let mut clause = WhereClause::new();
    clause.eq("ur.user_id", user_id).eq("r.is_active", true);
    clause
}

impl Database {
    /// Create a login account and grant it the given roles.
    #[instrument(skip(self, password_hash, role_ids))]
    pub async fn create_user(
        &self,
        name: &str,
        password_hash: &str,
        email: Option<&str>,
        role_ids: &[i64],
    ) -> Result<i64, AppError> {
        let mut tx = self.begin().await?;

        let user_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO users (uuid, name, email, password_hash, is_active, created_at)
            VALUES (?, ?, ?, ?, 1, ?)
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error_or_conflict(
            "create user",
            format!("User {} already exists", name),
        ))?;

        for role_id in role_ids {
            sqlx::query("INSERT INTO user_roles (user_id, role_id) VALUES (?, ?)")
                .bind(user_id)
                .bind(role_id)
                .execute(&mut *tx)
                .await
                .map_err(db_error("grant role"))?;
        }

        commit(tx).await?;
        info!(user_id = user_id, roles = role_ids.len(), "User created");
        Ok(user_id)
    }

    /// Create the bootstrap administrator with every active role, unless the
    /// account already exists.
    #[instrument(skip(self, password_hash))]
    pub async fn ensure_admin_user(&self, name: &str, password_hash: &str) -> Result<(), AppError> {
        if self.get_user_by_name(name).await?.is_some() {
            return Ok(());
        }
        let role_ids: Vec<i64> =
            sqlx::query_scalar("SELECT id FROM roles WHERE is_active = 1 ORDER BY id")
                .fetch_all(self.pool())
                .await
                .map_err(db_error("list roles"))?;
        self.create_user(name, password_hash, None, &role_ids).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn get_user_by_name(&self, name: &str) -> Result<Option<User>, AppError> {
        sqlx::query_as::<_, User>(
            "SELECT id, uuid, name, description, email, password_hash, is_active \
             FROM users WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(self.pool())
        .await
        .map_err(db_error("get user"))
    }

    pub async fn user_exists(&self, user_id: i64) -> Result<bool, AppError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_one(self.pool())
            .await
            .map_err(db_error("check user"))?;
        Ok(count > 0)
    }

    #[instrument(skip(self))]
    pub async fn list_user_roles(
        &self,
        user_id: i64,
        page: PageRequest,
    ) -> Result<(Vec<Role>, i64), AppError> {
        self.fetch_page(
            "list_user_roles",
            &GRANTED_ROLE_QUERY,
            &granted_roles_clause(user_id),
            page,
        )
        .await
    }

    /// The requested role if granted to the user, else the user's first role
    /// when no role was requested.
    #[instrument(skip(self))]
    pub async fn find_granted_role(
        &self,
        user_id: i64,
        role: Option<&RecordKey>,
    ) -> Result<Option<Role>, AppError> {
        let mut clause = granted_roles_clause(user_id);
        if let Some(role) = role {
            role.apply(&mut clause, "r");
        }
        self.fetch_optional_matching("find_granted_role", &GRANTED_ROLE_QUERY, &clause)
            .await
    }

    #[instrument(skip(self))]
    pub async fn create_session(
        &self,
        user_id: i64,
        role_id: i64,
        language: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<String, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_session"])
            .start_timer();

        let session_uuid = Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO sessions (uuid, user_id, role_id, language, is_active, created_at, expires_at)
            VALUES (?, ?, ?, ?, 1, ?, ?)
            "#,
        )
        .bind(&session_uuid)
        .bind(user_id)
        .bind(role_id)
        .bind(language)
        .bind(Utc::now())
        .bind(expires_at)
        .execute(self.pool())
        .await
        .map_err(db_error("create session"))?;

        timer.observe_duration();
        Ok(session_uuid)
    }

    #[instrument(skip(self, session_uuid))]
    pub async fn get_session(&self, session_uuid: &str) -> Result<Option<SessionRecord>, AppError> {
        let mut clause = WhereClause::new();
        clause.eq("s.uuid", session_uuid);
        self.fetch_optional_matching("get_session", &SESSION_QUERY, &clause)
            .await
    }

    #[instrument(skip(self, session_uuid))]
    pub async fn close_session(&self, session_uuid: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE sessions SET is_active = 0 WHERE uuid = ?")
            .bind(session_uuid)
            .execute(self.pool())
            .await
            .map_err(db_error("close session"))?;
        Ok(())
    }

    #[instrument(skip(self, session_uuid))]
    pub async fn update_session_role(
        &self,
        session_uuid: &str,
        role_id: i64,
        language: Option<&str>,
    ) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE sessions SET role_id = ?, language = COALESCE(?, language) WHERE uuid = ?",
        )
        .bind(role_id)
        .bind(language)
        .bind(session_uuid)
        .execute(self.pool())
        .await
        .map_err(db_error("change session role"))?;
        Ok(())
    }

    /// Flat list of the menu entries granted to a role.
    #[instrument(skip(self))]
    pub async fn menu_entries_for_role(&self, role_id: i64) -> Result<Vec<MenuEntry>, AppError> {
        let mut clause = WhereClause::new();
        clause.eq("rma.role_id", role_id);
        self.fetch_all_matching("menu_entries", &MENU_QUERY, &clause)
            .await
    }
}
