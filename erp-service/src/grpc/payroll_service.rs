//! PayrollService gRPC implementation: concepts and employee movements.

use crate::grpc::proto::payroll::{
    payroll_service_server::PayrollService, ColumnType as ProtoColumnType,
    CreatePayrollMovementRequest, DeletePayrollMovementRequest, DeletePayrollMovementResponse,
    ListPayrollConceptsRequest, ListPayrollConceptsResponse, ListPayrollMovementsRequest,
    ListPayrollMovementsResponse, PayrollConcept as ProtoPayrollConcept,
    PayrollMovement as ProtoPayrollMovement, UpdatePayrollMovementRequest,
};
use crate::grpc::{
    assemble_page, format_date, format_decimal, observe, page_request, parse_date, parse_decimal,
    positive, timestamp,
};
use crate::models::{
    non_empty, ColumnType, CreatePayrollMovement, ListPayrollMovementsFilter, MovementValues,
    PayrollConcept, PayrollMovement, RecordKey, UpdatePayrollMovement,
};
use crate::services::{Database, SessionManager};
use service_core::error::AppError;
use service_core::grpc::GrpcResult;
use std::sync::Arc;
use tonic::Request;
use tracing::{info, instrument};

pub struct PayrollServiceImpl {
    db: Arc<Database>,
    sessions: SessionManager,
}

fn column_type_to_proto(column: ColumnType) -> ProtoColumnType {
    match column {
        ColumnType::Quantity => ProtoColumnType::Quantity,
        ColumnType::Amount => ProtoColumnType::Amount,
        ColumnType::Text => ProtoColumnType::Text,
        ColumnType::Date => ProtoColumnType::Date,
    }
}

fn concept_to_proto(concept: &PayrollConcept) -> ProtoPayrollConcept {
    ProtoPayrollConcept {
        id: concept.id,
        uuid: concept.uuid.clone(),
        value: concept.value.clone(),
        name: concept.name.clone(),
        description: concept.description.clone().unwrap_or_default(),
        column_type: column_type_to_proto(concept.column()) as i32,
        is_active: concept.is_active,
    }
}

fn movement_to_proto(movement: &PayrollMovement) -> ProtoPayrollMovement {
    let column_type = movement
        .column_type
        .as_deref()
        .map(|c| column_type_to_proto(ColumnType::from_string(c)))
        .unwrap_or(ProtoColumnType::Unspecified);

    ProtoPayrollMovement {
        id: movement.id,
        uuid: movement.uuid.clone(),
        business_partner_id: movement.business_partner_id,
        business_partner_name: movement.business_partner_name.clone().unwrap_or_default(),
        concept_id: movement.concept_id,
        concept_value: movement.concept_value.clone().unwrap_or_default(),
        concept_name: movement.concept_name.clone().unwrap_or_default(),
        column_type: column_type as i32,
        valid_from: format_date(Some(movement.valid_from)),
        quantity: format_decimal(movement.quantity),
        amount: format_decimal(movement.amount),
        text_msg: movement.text_msg.clone().unwrap_or_default(),
        service_date: format_date(movement.service_date),
        description: movement.description.clone().unwrap_or_default(),
        processed: movement.processed,
        created_at: timestamp(&movement.created_at),
        updated_at: timestamp(&movement.updated_at),
    }
}

fn movement_values(
    quantity: &str,
    amount: &str,
    text_msg: &str,
    service_date: &str,
) -> Result<MovementValues, AppError> {
    Ok(MovementValues {
        quantity: parse_decimal("quantity", quantity)?,
        amount: parse_decimal("amount", amount)?,
        text_msg: non_empty(text_msg),
        service_date: parse_date("service_date", service_date)?,
    })
}

impl PayrollServiceImpl {
    pub fn new(db: Arc<Database>, sessions: SessionManager) -> Self {
        Self { db, sessions }
    }

    async fn movement(&self, key: &RecordKey) -> Result<PayrollMovement, AppError> {
        self.db.get_payroll_movement(key).await?.ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("Payroll movement {} not found", key))
        })
    }

    async fn concept(&self, key: &RecordKey) -> Result<PayrollConcept, AppError> {
        match self.db.get_payroll_concept(key).await? {
            Some(concept) if concept.is_active => Ok(concept),
            _ => Err(AppError::NotFound(anyhow::anyhow!(
                "Payroll concept {} not found",
                key
            ))),
        }
    }
}

#[tonic::async_trait]
impl PayrollService for PayrollServiceImpl {
    #[instrument(
        skip(self, request),
        fields(service = "erp-service", method = "ListPayrollConcepts")
    )]
    async fn list_payroll_concepts(
        &self,
        request: Request<ListPayrollConceptsRequest>,
    ) -> GrpcResult<ListPayrollConceptsResponse> {
        observe("ListPayrollConcepts", async {
            let context = self.sessions.authenticate(request.metadata()).await?;
            let req = request.into_inner();
            let page = page_request(&context, req.page_size, &req.page_token)?;

            let rows = self.db.list_payroll_concepts(&req.search_value, page).await?;
            let page = assemble_page(&context, page, rows, |c| concept_to_proto(&c));
            Ok(ListPayrollConceptsResponse {
                record_count: page.record_count,
                concepts: page.records,
                next_page_token: page.next_page_token,
            })
        })
        .await
    }

    #[instrument(
        skip(self, request),
        fields(service = "erp-service", method = "ListPayrollMovements")
    )]
    async fn list_payroll_movements(
        &self,
        request: Request<ListPayrollMovementsRequest>,
    ) -> GrpcResult<ListPayrollMovementsResponse> {
        observe("ListPayrollMovements", async {
            let context = self.sessions.authenticate(request.metadata()).await?;
            let req = request.into_inner();
            let employee = RecordKey::resolve(
                req.business_partner_id,
                &req.business_partner_uuid,
                "business_partner_id",
            )?;
            let page = page_request(&context, req.page_size, &req.page_token)?;

            let filter = ListPayrollMovementsFilter {
                business_partner_id: self.db.business_partner_id(&employee).await?,
                concept_id: positive(req.concept_id).unwrap_or_default(),
                valid_from: parse_date("valid_from", &req.valid_from)?,
                valid_to: parse_date("valid_to", &req.valid_to)?,
            };
            let rows = self.db.list_payroll_movements(&filter, page).await?;
            let page = assemble_page(&context, page, rows, |m| movement_to_proto(&m));
            Ok(ListPayrollMovementsResponse {
                record_count: page.record_count,
                movements: page.records,
                next_page_token: page.next_page_token,
            })
        })
        .await
    }

    #[instrument(
        skip(self, request),
        fields(service = "erp-service", method = "CreatePayrollMovement")
    )]
    async fn create_payroll_movement(
        &self,
        request: Request<CreatePayrollMovementRequest>,
    ) -> GrpcResult<ProtoPayrollMovement> {
        observe("CreatePayrollMovement", async {
            self.sessions.authenticate(request.metadata()).await?;
            let req = request.into_inner();

            let employee = RecordKey::resolve(
                req.business_partner_id,
                &req.business_partner_uuid,
                "business_partner_id",
            )?;
            let concept = RecordKey::resolve(req.concept_id, &req.concept_uuid, "concept_id")?;
            let valid_from = parse_date("valid_from", &req.valid_from)?
                .ok_or_else(|| AppError::mandatory("valid_from"))?;
            let values =
                movement_values(&req.quantity, &req.amount, &req.text_msg, &req.service_date)?;

            let business_partner_id = self.db.business_partner_id(&employee).await?;
            let concept = self.concept(&concept).await?;
            values.check(concept.column())?;

            let id = self
                .db
                .create_payroll_movement(&CreatePayrollMovement {
                    business_partner_id,
                    concept_id: concept.id,
                    valid_from,
                    values,
                    description: non_empty(&req.description),
                })
                .await?;
            let movement = self.movement(&RecordKey::Id(id)).await?;
            Ok(movement_to_proto(&movement))
        })
        .await
    }

    #[instrument(
        skip(self, request),
        fields(service = "erp-service", method = "UpdatePayrollMovement")
    )]
    async fn update_payroll_movement(
        &self,
        request: Request<UpdatePayrollMovementRequest>,
    ) -> GrpcResult<ProtoPayrollMovement> {
        observe("UpdatePayrollMovement", async {
            self.sessions.authenticate(request.metadata()).await?;
            let req = request.into_inner();
            let key = RecordKey::resolve(req.id, &req.uuid, "id")?;
            let movement = self.movement(&key).await?;

            let update = UpdatePayrollMovement {
                valid_from: parse_date("valid_from", &req.valid_from)?,
                values: movement_values(
                    &req.quantity,
                    &req.amount,
                    &req.text_msg,
                    &req.service_date,
                )?,
                description: non_empty(&req.description),
            };
            self.db.update_payroll_movement(movement.id, &update).await?;
            info!(movement_id = movement.id, "Payroll movement updated");

            let movement = self.movement(&RecordKey::Id(movement.id)).await?;
            Ok(movement_to_proto(&movement))
        })
        .await
    }

    #[instrument(
        skip(self, request),
        fields(service = "erp-service", method = "DeletePayrollMovement")
    )]
    async fn delete_payroll_movement(
        &self,
        request: Request<DeletePayrollMovementRequest>,
    ) -> GrpcResult<DeletePayrollMovementResponse> {
        observe("DeletePayrollMovement", async {
            self.sessions.authenticate(request.metadata()).await?;
            let req = request.into_inner();
            let key = RecordKey::resolve(req.id, &req.uuid, "id")?;
            let movement = self.movement(&key).await?;
            self.db.delete_payroll_movement(movement.id).await?;
            Ok(DeletePayrollMovementResponse {})
        })
        .await
    }
}
