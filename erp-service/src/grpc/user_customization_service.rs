//! UserCustomizationService gRPC implementation: per-user window layouts.

use crate::grpc::proto::user_customization::{
    user_customization_service_server::UserCustomizationService,
    DeleteWindowCustomizationRequest, DeleteWindowCustomizationResponse,
    FieldCustomization as ProtoFieldCustomization, GetWindowCustomizationRequest,
    ListWindowCustomizationsRequest, ListWindowCustomizationsResponse,
    SaveWindowCustomizationRequest, WindowCustomization as ProtoWindowCustomization,
};
use crate::grpc::{assemble_page, observe, page_request, timestamp};
use crate::models::{
    non_empty, FieldCustomization, SaveWindowCustomization, WindowCustomization,
};
use crate::services::{Database, SessionContext, SessionManager};
use service_core::error::AppError;
use service_core::grpc::GrpcResult;
use std::sync::Arc;
use tonic::Request;
use tracing::{info, instrument};

pub struct UserCustomizationServiceImpl {
    db: Arc<Database>,
    sessions: SessionManager,
}

fn field_to_proto(field: FieldCustomization) -> ProtoFieldCustomization {
    ProtoFieldCustomization {
        column_name: field.column_name,
        sequence: field.sequence,
        is_displayed: field.is_displayed,
        display_size: field.display_size,
    }
}

fn field_from_proto(field: ProtoFieldCustomization) -> FieldCustomization {
    FieldCustomization {
        column_name: field.column_name.trim().to_string(),
        sequence: field.sequence,
        is_displayed: field.is_displayed,
        display_size: field.display_size,
    }
}

fn customization_to_proto(
    customization: WindowCustomization,
    fields: Vec<FieldCustomization>,
) -> ProtoWindowCustomization {
    ProtoWindowCustomization {
        id: customization.id,
        uuid: customization.uuid,
        user_id: customization.user_id,
        window_uuid: customization.window_uuid,
        name: customization.name.unwrap_or_default(),
        fields: fields.into_iter().map(field_to_proto).collect(),
        created_at: timestamp(&customization.created_at),
        updated_at: timestamp(&customization.updated_at),
    }
}

fn window_uuid(value: &str) -> Result<String, AppError> {
    non_empty(value).ok_or_else(|| AppError::mandatory("window_uuid"))
}

impl UserCustomizationServiceImpl {
    pub fn new(db: Arc<Database>, sessions: SessionManager) -> Self {
        Self { db, sessions }
    }

    async fn load(
        &self,
        context: &SessionContext,
        window_uuid: &str,
    ) -> Result<ProtoWindowCustomization, AppError> {
        let (customization, fields) = self
            .db
            .get_window_customization(context.user_id(), window_uuid)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!(
                    "No customization for window {}",
                    window_uuid
                ))
            })?;
        Ok(customization_to_proto(customization, fields))
    }
}

#[tonic::async_trait]
impl UserCustomizationService for UserCustomizationServiceImpl {
    #[instrument(
        skip(self, request),
        fields(service = "erp-service", method = "SaveWindowCustomization")
    )]
    async fn save_window_customization(
        &self,
        request: Request<SaveWindowCustomizationRequest>,
    ) -> GrpcResult<ProtoWindowCustomization> {
        observe("SaveWindowCustomization", async {
            let context = self.sessions.authenticate(request.metadata()).await?;
            let req = request.into_inner();
            let window_uuid = window_uuid(&req.window_uuid)?;

            let input = SaveWindowCustomization {
                user_id: context.user_id(),
                window_uuid: window_uuid.clone(),
                name: non_empty(&req.name),
                fields: req.fields.into_iter().map(field_from_proto).collect(),
            };
            let id = self.db.save_window_customization(&input).await?;
            info!(customization_id = id, fields = input.fields.len(), "Window customization saved");

            self.load(&context, &window_uuid).await
        })
        .await
    }

    #[instrument(
        skip(self, request),
        fields(service = "erp-service", method = "GetWindowCustomization")
    )]
    async fn get_window_customization(
        &self,
        request: Request<GetWindowCustomizationRequest>,
    ) -> GrpcResult<ProtoWindowCustomization> {
        observe("GetWindowCustomization", async {
            let context = self.sessions.authenticate(request.metadata()).await?;
            let req = request.into_inner();
            let window_uuid = window_uuid(&req.window_uuid)?;
            self.load(&context, &window_uuid).await
        })
        .await
    }

    #[instrument(
        skip(self, request),
        fields(service = "erp-service", method = "ListWindowCustomizations")
    )]
    async fn list_window_customizations(
        &self,
        request: Request<ListWindowCustomizationsRequest>,
    ) -> GrpcResult<ListWindowCustomizationsResponse> {
        observe("ListWindowCustomizations", async {
            let context = self.sessions.authenticate(request.metadata()).await?;
            let req = request.into_inner();
            let page = page_request(&context, req.page_size, &req.page_token)?;

            let (rows, record_count) = self
                .db
                .list_window_customizations(context.user_id(), &req.search_value, page)
                .await?;
            let mut customizations = Vec::with_capacity(rows.len());
            for customization in rows {
                let fields = self.db.customization_fields(customization.id).await?;
                customizations.push(customization_to_proto(customization, fields));
            }

            let page = assemble_page(&context, page, (customizations, record_count), |c| c);
            Ok(ListWindowCustomizationsResponse {
                record_count: page.record_count,
                customizations: page.records,
                next_page_token: page.next_page_token,
            })
        })
        .await
    }

    #[instrument(
        skip(self, request),
        fields(service = "erp-service", method = "DeleteWindowCustomization")
    )]
    async fn delete_window_customization(
        &self,
        request: Request<DeleteWindowCustomizationRequest>,
    ) -> GrpcResult<DeleteWindowCustomizationResponse> {
        observe("DeleteWindowCustomization", async {
            let context = self.sessions.authenticate(request.metadata()).await?;
            let req = request.into_inner();
            let window_uuid = window_uuid(&req.window_uuid)?;

            if !self
                .db
                .delete_window_customization(context.user_id(), &window_uuid)
                .await?
            {
                return Err(AppError::NotFound(anyhow::anyhow!(
                    "No customization for window {}",
                    window_uuid
                )));
            }
            Ok(DeleteWindowCustomizationResponse {})
        })
        .await
    }
}
