//! DashboardService gRPC implementation: role dashboards and user favorites.

use crate::grpc::proto::dashboard::{
    dashboard_service_server::DashboardService, AddFavoriteRequest, Dashboard as ProtoDashboard,
    Favorite as ProtoFavorite, ListDashboardsRequest, ListDashboardsResponse,
    ListFavoritesRequest, ListFavoritesResponse, RemoveFavoriteRequest, RemoveFavoriteResponse,
};
use crate::grpc::{assemble_page, observe, page_request};
use crate::models::{Dashboard, Favorite, RecordKey};
use crate::services::{Database, SessionContext, SessionManager};
use service_core::error::AppError;
use service_core::grpc::GrpcResult;
use std::sync::Arc;
use tonic::Request;
use tracing::instrument;

pub struct DashboardServiceImpl {
    db: Arc<Database>,
    sessions: SessionManager,
}

fn dashboard_to_proto(dashboard: Dashboard) -> ProtoDashboard {
    ProtoDashboard {
        id: dashboard.id,
        uuid: dashboard.uuid,
        name: dashboard.name,
        description: dashboard.description.unwrap_or_default(),
        dashboard_type: dashboard.dashboard_type,
        chart_type: dashboard.chart_type.unwrap_or_default(),
        column_no: dashboard.column_no,
        line_no: dashboard.line_no,
        is_collapsible: dashboard.is_collapsible,
        is_open_by_default: dashboard.is_open_by_default,
    }
}

fn favorite_to_proto(favorite: Favorite) -> ProtoFavorite {
    ProtoFavorite {
        menu_id: favorite.menu_id,
        menu_uuid: favorite.menu_uuid,
        menu_name: favorite.menu_name,
        menu_description: favorite.menu_description.unwrap_or_default(),
        action: favorite.action.unwrap_or_default(),
        sequence: favorite.sequence,
    }
}

impl DashboardServiceImpl {
    pub fn new(db: Arc<Database>, sessions: SessionManager) -> Self {
        Self { db, sessions }
    }

    /// Menu entry visible to the session's role.
    async fn menu_id(
        &self,
        context: &SessionContext,
        menu_id: i64,
        menu_uuid: &str,
    ) -> Result<i64, AppError> {
        let key = RecordKey::resolve(menu_id, menu_uuid, "menu_id")?;
        self.db
            .accessible_menu_id(context.role_id(), &key)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Menu {} not found", key)))
    }
}

#[tonic::async_trait]
impl DashboardService for DashboardServiceImpl {
    #[instrument(
        skip(self, request),
        fields(service = "erp-service", method = "ListDashboards")
    )]
    async fn list_dashboards(
        &self,
        request: Request<ListDashboardsRequest>,
    ) -> GrpcResult<ListDashboardsResponse> {
        observe("ListDashboards", async {
            let context = self.sessions.authenticate(request.metadata()).await?;
            let req = request.into_inner();
            let page = page_request(&context, req.page_size, &req.page_token)?;

            let rows = self.db.list_dashboards(context.role_id(), page).await?;
            let page = assemble_page(&context, page, rows, dashboard_to_proto);
            Ok(ListDashboardsResponse {
                record_count: page.record_count,
                dashboards: page.records,
                next_page_token: page.next_page_token,
            })
        })
        .await
    }

    #[instrument(skip(self, request), fields(service = "erp-service", method = "ListFavorites"))]
    async fn list_favorites(
        &self,
        request: Request<ListFavoritesRequest>,
    ) -> GrpcResult<ListFavoritesResponse> {
        observe("ListFavorites", async {
            let context = self.sessions.authenticate(request.metadata()).await?;
            let req = request.into_inner();
            let page = page_request(&context, req.page_size, &req.page_token)?;

            let rows = self.db.list_favorites(context.user_id(), page).await?;
            let page = assemble_page(&context, page, rows, favorite_to_proto);
            Ok(ListFavoritesResponse {
                record_count: page.record_count,
                favorites: page.records,
                next_page_token: page.next_page_token,
            })
        })
        .await
    }

    #[instrument(skip(self, request), fields(service = "erp-service", method = "AddFavorite"))]
    async fn add_favorite(&self, request: Request<AddFavoriteRequest>) -> GrpcResult<ProtoFavorite> {
        observe("AddFavorite", async {
            let context = self.sessions.authenticate(request.metadata()).await?;
            let req = request.into_inner();
            let menu_id = self.menu_id(&context, req.menu_id, &req.menu_uuid).await?;

            self.db.add_favorite(context.user_id(), menu_id).await?;
            let favorite = self
                .db
                .get_favorite(context.user_id(), menu_id)
                .await?
                .ok_or_else(|| {
                    AppError::InternalError(anyhow::anyhow!("Favorite for menu {} vanished", menu_id))
                })?;
            Ok(favorite_to_proto(favorite))
        })
        .await
    }

    #[instrument(
        skip(self, request),
        fields(service = "erp-service", method = "RemoveFavorite")
    )]
    async fn remove_favorite(
        &self,
        request: Request<RemoveFavoriteRequest>,
    ) -> GrpcResult<RemoveFavoriteResponse> {
        observe("RemoveFavorite", async {
            let context = self.sessions.authenticate(request.metadata()).await?;
            let req = request.into_inner();
            let menu_id = self.menu_id(&context, req.menu_id, &req.menu_uuid).await?;

            if !self.db.remove_favorite(context.user_id(), menu_id).await? {
                return Err(AppError::NotFound(anyhow::anyhow!(
                    "Menu {} is not a favorite",
                    menu_id
                )));
            }
            Ok(RemoveFavoriteResponse {})
        })
        .await
    }
}
