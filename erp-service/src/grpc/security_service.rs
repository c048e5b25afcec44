//! SecurityService gRPC implementation: login, sessions, roles and the menu.

use crate::grpc::proto::security::{
    security_service_server::SecurityService, ChangeRoleRequest, GetMenuRequest,
    GetSessionInfoRequest, ListRolesRequest, ListRolesResponse, LoginRequest, LogoutRequest,
    LogoutResponse, Menu, Role as ProtoRole, Session, UserInfo,
};
use crate::grpc::{assemble_page, observe, page_request, timestamp};
use crate::models::{non_empty, MenuEntry, RecordKey, Role};
use crate::services::metrics::record_cache_lookup;
use crate::services::password::Password;
use crate::services::{Database, SessionContext, SessionManager};
use service_core::cache::BoundedCache;
use service_core::error::AppError;
use service_core::grpc::GrpcResult;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tonic::Request;
use tracing::instrument;

/// Menu trees keyed by role id.
pub type MenuCache = BoundedCache<i64, Menu>;

pub struct SecurityServiceImpl {
    db: Arc<Database>,
    sessions: SessionManager,
    menus: Arc<MenuCache>,
}

fn role_to_proto(role: Role) -> ProtoRole {
    ProtoRole {
        id: role.id,
        uuid: role.uuid,
        name: role.name,
        description: role.description.unwrap_or_default(),
        can_export: role.can_export,
    }
}

fn session_to_proto(context: &SessionContext) -> Session {
    let session = &context.session;
    Session {
        uuid: session.uuid.clone(),
        user_info: Some(UserInfo {
            id: session.user_id,
            uuid: session.user_uuid.clone(),
            name: session.user_name.clone(),
            description: session.user_description.clone().unwrap_or_default(),
            email: session.user_email.clone().unwrap_or_default(),
        }),
        role: Some(role_to_proto(session.role())),
        language: session.language.clone(),
        expires_at: timestamp(&session.expires_at),
    }
}

fn menu_node(entry: &MenuEntry, children: Vec<Menu>) -> Menu {
    Menu {
        id: entry.id,
        uuid: entry.uuid.clone(),
        name: entry.name.clone(),
        description: entry.description.clone().unwrap_or_default(),
        action: entry.action.clone().unwrap_or_default(),
        is_summary: entry.is_summary,
        sequence: entry.sequence,
        parent_id: entry.parent_id.unwrap_or_default(),
        children,
    }
}

/// Nest the granted entries by `parent_id` under a synthetic root.
///
/// Entries whose parent is not granted hang directly off the root. Sibling
/// order is the order of `entries`.
fn build_menu_tree(entries: &[MenuEntry]) -> Menu {
    let granted: HashSet<i64> = entries.iter().map(|e| e.id).collect();
    let mut by_parent: HashMap<Option<i64>, Vec<&MenuEntry>> = HashMap::new();
    for entry in entries {
        let parent = entry.parent_id.filter(|p| granted.contains(p));
        by_parent.entry(parent).or_default().push(entry);
    }

    fn children_of(
        parent: Option<i64>,
        by_parent: &HashMap<Option<i64>, Vec<&MenuEntry>>,
    ) -> Vec<Menu> {
        by_parent
            .get(&parent)
            .map(|entries| {
                entries
                    .iter()
                    .map(|entry| menu_node(entry, children_of(Some(entry.id), by_parent)))
                    .collect()
            })
            .unwrap_or_default()
    }

    Menu {
        name: "Menu".to_string(),
        is_summary: true,
        children: children_of(None, &by_parent),
        ..Default::default()
    }
}

fn role_key(role_id: i64, role_uuid: &str) -> Option<RecordKey> {
    RecordKey::optional(role_id, role_uuid)
}

impl SecurityServiceImpl {
    pub fn new(db: Arc<Database>, sessions: SessionManager, menus: Arc<MenuCache>) -> Self {
        Self {
            db,
            sessions,
            menus,
        }
    }

    async fn cached_menu(&self, role_id: i64) -> Result<Menu, AppError> {
        if let Some(menu) = self.menus.get(&role_id).await {
            record_cache_lookup("menu", true);
            return Ok(menu);
        }
        record_cache_lookup("menu", false);

        let entries = self.db.menu_entries_for_role(role_id).await?;
        let menu = build_menu_tree(&entries);
        self.menus.insert(role_id, menu.clone()).await;
        Ok(menu)
    }
}

#[tonic::async_trait]
impl SecurityService for SecurityServiceImpl {
    #[instrument(skip(self, request), fields(service = "erp-service", method = "RunLogin"))]
    async fn run_login(&self, request: Request<LoginRequest>) -> GrpcResult<Session> {
        observe("RunLogin", async {
            let req = request.into_inner();
            let user_name =
                non_empty(&req.user_name).ok_or_else(|| AppError::mandatory("user_name"))?;
            if req.password.is_empty() {
                return Err(AppError::mandatory("password"));
            }
            let password = Password::new(req.password);
            let role = role_key(req.role_id, &req.role_uuid);
            let language = non_empty(&req.language);

            let context = self
                .sessions
                .login(&user_name, &password, role.as_ref(), language.as_deref())
                .await?;
            Ok(session_to_proto(&context))
        })
        .await
    }

    #[instrument(skip(self, request), fields(service = "erp-service", method = "RunLogout"))]
    async fn run_logout(&self, request: Request<LogoutRequest>) -> GrpcResult<LogoutResponse> {
        observe("RunLogout", async {
            let context = self.sessions.authenticate(request.metadata()).await?;
            self.sessions.logout(&context).await?;
            Ok(LogoutResponse {})
        })
        .await
    }

    #[instrument(
        skip(self, request),
        fields(service = "erp-service", method = "GetSessionInfo")
    )]
    async fn get_session_info(
        &self,
        request: Request<GetSessionInfoRequest>,
    ) -> GrpcResult<Session> {
        observe("GetSessionInfo", async {
            let context = self.sessions.authenticate(request.metadata()).await?;
            Ok(session_to_proto(&context))
        })
        .await
    }

    #[instrument(skip(self, request), fields(service = "erp-service", method = "ListRoles"))]
    async fn list_roles(&self, request: Request<ListRolesRequest>) -> GrpcResult<ListRolesResponse> {
        observe("ListRoles", async {
            let context = self.sessions.authenticate(request.metadata()).await?;
            let req = request.into_inner();
            let page = page_request(&context, req.page_size, &req.page_token)?;

            let rows = self.db.list_user_roles(context.user_id(), page).await?;
            let page = assemble_page(&context, page, rows, role_to_proto);
            Ok(ListRolesResponse {
                record_count: page.record_count,
                roles: page.records,
                next_page_token: page.next_page_token,
            })
        })
        .await
    }

    #[instrument(skip(self, request), fields(service = "erp-service", method = "RunChangeRole"))]
    async fn run_change_role(&self, request: Request<ChangeRoleRequest>) -> GrpcResult<Session> {
        observe("RunChangeRole", async {
            let context = self.sessions.authenticate(request.metadata()).await?;
            let req = request.into_inner();
            let role = RecordKey::resolve(req.role_id, &req.role_uuid, "role_id")?;
            let language = non_empty(&req.language);

            let context = self
                .sessions
                .change_role(&context, &role, language.as_deref())
                .await?;
            Ok(session_to_proto(&context))
        })
        .await
    }

    #[instrument(skip(self, request), fields(service = "erp-service", method = "GetMenu"))]
    async fn get_menu(&self, request: Request<GetMenuRequest>) -> GrpcResult<Menu> {
        observe("GetMenu", async {
            let context = self.sessions.authenticate(request.metadata()).await?;
            self.cached_menu(context.role_id()).await
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: i64, parent_id: Option<i64>, sequence: i32) -> MenuEntry {
        MenuEntry {
            id,
            uuid: format!("m-{}", id),
            parent_id,
            name: format!("Menu {}", id),
            description: None,
            action: None,
            is_summary: parent_id.is_none(),
            sequence,
        }
    }

    #[test]
    fn entries_nest_under_their_parents() {
        let entries = vec![
            entry(1, None, 10),
            entry(2, Some(1), 10),
            entry(3, Some(1), 20),
            entry(4, None, 20),
            entry(5, Some(4), 10),
        ];
        let root = build_menu_tree(&entries);
        assert_eq!(root.id, 0);
        let top: Vec<i64> = root.children.iter().map(|m| m.id).collect();
        assert_eq!(top, vec![1, 4]);
        let first: Vec<i64> = root.children[0].children.iter().map(|m| m.id).collect();
        assert_eq!(first, vec![2, 3]);
        assert_eq!(root.children[1].children[0].parent_id, 4);
    }

    #[test]
    fn orphans_attach_to_the_root() {
        let entries = vec![entry(7, Some(99), 10)];
        let root = build_menu_tree(&entries);
        assert_eq!(root.children.len(), 1);
        assert_eq!(root.children[0].id, 7);
        assert!(root.children[0].children.is_empty());
    }

    #[test]
    fn role_key_is_optional_on_login() {
        assert_eq!(role_key(0, ""), None);
        assert_eq!(role_key(2, ""), Some(RecordKey::Id(2)));
    }
}
