//! Session resolution for authenticated RPCs.
//!
//! Clients log in once and then send `authorization: Bearer <session uuid>`
//! on every call. The session uuid doubles as the page-token prefix.

use crate::models::{RecordKey, Role, SessionRecord};
use crate::services::database::Database;
use crate::services::password::{verify_password, Password};
use chrono::{Duration, Utc};
use service_core::error::AppError;
use service_core::grpc::extract_bearer_token;
use std::sync::Arc;
use tonic::metadata::MetadataMap;
use tracing::{info, instrument, warn};

const DEFAULT_LANGUAGE: &str = "en_US";

/// The caller behind a request.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session: SessionRecord,
}

impl SessionContext {
    pub fn session_uuid(&self) -> &str {
        &self.session.uuid
    }

    pub fn user_id(&self) -> i64 {
        self.session.user_id
    }

    pub fn role_id(&self) -> i64 {
        self.session.role_id
    }

    pub fn can_export(&self) -> bool {
        self.session.can_export
    }
}

fn unauthenticated(message: &str) -> AppError {
    AppError::Unauthenticated(anyhow::anyhow!("{}", message))
}

/// Creates, resolves and closes sessions.
#[derive(Clone)]
pub struct SessionManager {
    db: Arc<Database>,
    ttl: Duration,
}

impl SessionManager {
    pub fn new(db: Arc<Database>, ttl_seconds: i64) -> Self {
        Self {
            db,
            ttl: Duration::seconds(ttl_seconds.max(1)),
        }
    }

    /// Resolve the bearer token of a request into a live session.
    pub async fn authenticate(&self, metadata: &MetadataMap) -> Result<SessionContext, AppError> {
        let token = extract_bearer_token(metadata)
            .ok_or_else(|| unauthenticated("Missing session token"))?;
        self.resolve(&token).await
    }

    pub async fn resolve(&self, session_uuid: &str) -> Result<SessionContext, AppError> {
        let session = self
            .db
            .get_session(session_uuid)
            .await?
            .ok_or_else(|| unauthenticated("Unknown session"))?;

        if !session.is_active {
            return Err(unauthenticated("Session is closed"));
        }
        if session.expires_at <= Utc::now() {
            return Err(unauthenticated("Session expired"));
        }
        Ok(SessionContext { session })
    }

    /// Verify credentials and open a session on the requested (or default) role.
    #[instrument(skip(self, password))]
    pub async fn login(
        &self,
        user_name: &str,
        password: &Password,
        role: Option<&RecordKey>,
        language: Option<&str>,
    ) -> Result<SessionContext, AppError> {
        let user = self
            .db
            .get_user_by_name(user_name)
            .await?
            .filter(|u| u.is_active)
            .ok_or_else(|| unauthenticated("Invalid user name or password"))?;

        if let Err(e) = verify_password(password, &user.password_hash) {
            warn!(user_name = %user_name, "Login rejected");
            return Err(e);
        }

        let role = self.granted_role(user.id, role).await?;
        let expires_at = Utc::now() + self.ttl;
        let session_uuid = self
            .db
            .create_session(
                user.id,
                role.id,
                language.unwrap_or(DEFAULT_LANGUAGE),
                expires_at,
            )
            .await?;

        info!(user_id = user.id, role_id = role.id, "Session opened");
        self.resolve(&session_uuid).await
    }

    #[instrument(skip(self, context), fields(session = %context.session_uuid()))]
    pub async fn logout(&self, context: &SessionContext) -> Result<(), AppError> {
        self.db.close_session(context.session_uuid()).await?;
        info!(user_id = context.user_id(), "Session closed");
        Ok(())
    }

    /// Move the session to another role granted to its user.
    #[instrument(skip(self, context), fields(session = %context.session_uuid()))]
    pub async fn change_role(
        &self,
        context: &SessionContext,
        role: &RecordKey,
        language: Option<&str>,
    ) -> Result<SessionContext, AppError> {
        let role = self.granted_role(context.user_id(), Some(role)).await?;
        self.db
            .update_session_role(context.session_uuid(), role.id, language)
            .await?;
        self.resolve(context.session_uuid()).await
    }

    async fn granted_role(&self, user_id: i64, role: Option<&RecordKey>) -> Result<Role, AppError> {
        self.db
            .find_granted_role(user_id, role)
            .await?
            .ok_or_else(|| match role {
                Some(role) => {
                    AppError::AccessDenied(anyhow::anyhow!("Role {} is not granted", role))
                }
                None => AppError::AccessDenied(anyhow::anyhow!("User has no active role")),
            })
    }
}
