//! WorkflowService gRPC implementation: document actions and their audit log.

use crate::grpc::proto::workflow::{
    workflow_service_server::WorkflowService, DocumentAction as ProtoDocumentAction,
    DocumentActionLog as ProtoDocumentActionLog, DocumentReference, ListDocumentActionLogsRequest,
    ListDocumentActionLogsResponse, ListDocumentActionsRequest, ListDocumentActionsResponse,
    RunDocumentActionRequest,
};
use crate::grpc::{assemble_page, observe, page_request, timestamp};
use crate::models::{DocumentAction, DocumentActionLog, DocumentRecord, DocumentTable, RecordKey};
use crate::services::{Database, SessionManager};
use service_core::error::AppError;
use service_core::grpc::GrpcResult;
use std::sync::Arc;
use tonic::Request;
use tracing::instrument;

pub struct WorkflowServiceImpl {
    db: Arc<Database>,
    sessions: SessionManager,
}

fn action_to_proto(action: DocumentAction) -> ProtoDocumentAction {
    ProtoDocumentAction {
        value: action.as_str().to_string(),
        name: action.display_name().to_string(),
    }
}

fn document_to_proto(table: DocumentTable, document: &DocumentRecord) -> DocumentReference {
    DocumentReference {
        table_name: table.table_name().to_string(),
        id: document.id,
        uuid: document.uuid.clone(),
        document_no: document.document_no.clone(),
        document_status: document.document_status.clone(),
        processed: document.processed,
    }
}

fn log_to_proto(log: &DocumentActionLog) -> ProtoDocumentActionLog {
    ProtoDocumentActionLog {
        id: log.id,
        table_name: log.table_name.clone(),
        record_id: log.record_id,
        document_action: log.document_action.clone(),
        status_from: log.status_from.clone(),
        status_to: log.status_to.clone(),
        user_id: log.user_id,
        user_name: log.user_name.clone().unwrap_or_default(),
        created_at: timestamp(&log.created_at),
    }
}

fn document_table(table_name: &str) -> Result<DocumentTable, AppError> {
    if table_name.trim().is_empty() {
        return Err(AppError::mandatory("table_name"));
    }
    DocumentTable::parse(table_name).ok_or_else(|| {
        AppError::InvalidArgument(anyhow::anyhow!(
            "Table {} does not support document actions",
            table_name
        ))
    })
}

impl WorkflowServiceImpl {
    pub fn new(db: Arc<Database>, sessions: SessionManager) -> Self {
        Self { db, sessions }
    }

    async fn document(
        &self,
        table: DocumentTable,
        id: i64,
        uuid: &str,
    ) -> Result<DocumentRecord, AppError> {
        let key = RecordKey::resolve(id, uuid, "id")?;
        self.db.get_document(table, &key).await?.ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!(
                "Document {} in {} not found",
                key,
                table.table_name()
            ))
        })
    }
}

#[tonic::async_trait]
impl WorkflowService for WorkflowServiceImpl {
    #[instrument(
        skip(self, request),
        fields(service = "erp-service", method = "ListDocumentActions")
    )]
    async fn list_document_actions(
        &self,
        request: Request<ListDocumentActionsRequest>,
    ) -> GrpcResult<ListDocumentActionsResponse> {
        observe("ListDocumentActions", async {
            self.sessions.authenticate(request.metadata()).await?;
            let req = request.into_inner();
            let table = document_table(&req.table_name)?;
            let document = self.document(table, req.id, &req.uuid).await?;

            let status = document.status();
            Ok(ListDocumentActionsResponse {
                document: Some(document_to_proto(table, &document)),
                default_action: status.default_action().map(action_to_proto),
                document_actions: status
                    .valid_actions()
                    .iter()
                    .copied()
                    .map(action_to_proto)
                    .collect(),
            })
        })
        .await
    }

    #[instrument(
        skip(self, request),
        fields(service = "erp-service", method = "RunDocumentAction")
    )]
    async fn run_document_action(
        &self,
        request: Request<RunDocumentActionRequest>,
    ) -> GrpcResult<DocumentReference> {
        observe("RunDocumentAction", async {
            let context = self.sessions.authenticate(request.metadata()).await?;
            let req = request.into_inner();
            let table = document_table(&req.table_name)?;
            if req.document_action.trim().is_empty() {
                return Err(AppError::mandatory("document_action"));
            }
            let action = DocumentAction::parse(&req.document_action).ok_or_else(|| {
                AppError::InvalidArgument(anyhow::anyhow!(
                    "Unknown document action {}",
                    req.document_action
                ))
            })?;

            let document = self.document(table, req.id, &req.uuid).await?;
            self.db
                .run_document_action(table, document.id, action, context.user_id())
                .await?;

            let document = self.document(table, document.id, "").await?;
            Ok(document_to_proto(table, &document))
        })
        .await
    }

    #[instrument(
        skip(self, request),
        fields(service = "erp-service", method = "ListDocumentActionLogs")
    )]
    async fn list_document_action_logs(
        &self,
        request: Request<ListDocumentActionLogsRequest>,
    ) -> GrpcResult<ListDocumentActionLogsResponse> {
        observe("ListDocumentActionLogs", async {
            let context = self.sessions.authenticate(request.metadata()).await?;
            let req = request.into_inner();
            let table = document_table(&req.table_name)?;
            let document = self.document(table, req.id, &req.uuid).await?;
            let page = page_request(&context, req.page_size, &req.page_token)?;

            let rows = self
                .db
                .list_document_action_logs(table, document.id, page)
                .await?;
            let page = assemble_page(&context, page, rows, |l| log_to_proto(&l));
            Ok(ListDocumentActionLogsResponse {
                record_count: page.record_count,
                logs: page.records,
                next_page_token: page.next_page_token,
            })
        })
        .await
    }
}
