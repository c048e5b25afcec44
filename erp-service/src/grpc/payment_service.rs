//! PaymentService gRPC implementation.

use crate::grpc::proto::payment::{
    payment_service_server::PaymentService, CreatePaymentRequest, DeletePaymentRequest,
    DeletePaymentResponse, GetPaymentRequest, ListPaymentsRequest, ListPaymentsResponse,
    Payment as ProtoPayment, TenderType as ProtoTenderType, UpdatePaymentRequest,
};
use crate::grpc::{
    assemble_page, format_date, format_decimal, observe, page_request, parse_date, parse_decimal,
    timestamp,
};
use crate::models::{
    non_empty, CreatePayment, ListPaymentsFilter, Payment, RecordKey, TenderType, UpdatePayment,
};
use crate::services::{Database, SessionManager};
use chrono::Utc;
use rust_decimal::Decimal;
use service_core::error::AppError;
use service_core::grpc::GrpcResult;
use std::sync::Arc;
use tonic::Request;
use tracing::{info, instrument};

pub struct PaymentServiceImpl {
    db: Arc<Database>,
    sessions: SessionManager,
}

fn tender_type_from_proto(value: i32) -> Option<TenderType> {
    match ProtoTenderType::try_from(value).ok()? {
        ProtoTenderType::Unspecified => None,
        ProtoTenderType::Cash => Some(TenderType::Cash),
        ProtoTenderType::Check => Some(TenderType::Check),
        ProtoTenderType::CreditCard => Some(TenderType::CreditCard),
        ProtoTenderType::DirectDebit => Some(TenderType::DirectDebit),
        ProtoTenderType::DirectDeposit => Some(TenderType::DirectDeposit),
    }
}

fn tender_type_to_proto(tender_type: TenderType) -> ProtoTenderType {
    match tender_type {
        TenderType::Cash => ProtoTenderType::Cash,
        TenderType::Check => ProtoTenderType::Check,
        TenderType::CreditCard => ProtoTenderType::CreditCard,
        TenderType::DirectDebit => ProtoTenderType::DirectDebit,
        TenderType::DirectDeposit => ProtoTenderType::DirectDeposit,
    }
}

fn payment_to_proto(payment: &Payment) -> ProtoPayment {
    ProtoPayment {
        id: payment.id,
        uuid: payment.uuid.clone(),
        document_no: payment.document_no.clone(),
        business_partner_id: payment.business_partner_id,
        business_partner_name: payment.business_partner_name.clone().unwrap_or_default(),
        is_receipt: payment.is_receipt,
        tender_type: tender_type_to_proto(TenderType::from_string(&payment.tender_type)) as i32,
        currency_code: payment.currency_code.clone(),
        pay_amount: format_decimal(Some(payment.pay_amount)),
        date_trx: format_date(Some(payment.date_trx)),
        description: payment.description.clone().unwrap_or_default(),
        document_status: payment.document_status.clone(),
        processed: payment.processed,
        created_at: timestamp(&payment.created_at),
        updated_at: timestamp(&payment.updated_at),
    }
}

/// A supplied amount must be strictly positive.
fn positive_amount(value: &str) -> Result<Option<Decimal>, AppError> {
    let amount = parse_decimal("pay_amount", value)?;
    if let Some(amount) = amount {
        if amount <= Decimal::ZERO {
            return Err(AppError::InvalidArgument(anyhow::anyhow!(
                "pay_amount must be greater than zero"
            )));
        }
    }
    Ok(amount)
}

impl PaymentServiceImpl {
    pub fn new(db: Arc<Database>, sessions: SessionManager) -> Self {
        Self { db, sessions }
    }

    async fn load(&self, key: &RecordKey) -> Result<ProtoPayment, AppError> {
        self.db
            .get_payment(key)
            .await?
            .map(|p| payment_to_proto(&p))
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Payment {} not found", key)))
    }

    async fn payment_id(&self, id: i64, uuid: &str) -> Result<i64, AppError> {
        let key = RecordKey::resolve(id, uuid, "id")?;
        self.db
            .get_payment(&key)
            .await?
            .map(|p| p.id)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Payment {} not found", key)))
    }
}

#[tonic::async_trait]
impl PaymentService for PaymentServiceImpl {
    #[instrument(skip(self, request), fields(service = "erp-service", method = "CreatePayment"))]
    async fn create_payment(
        &self,
        request: Request<CreatePaymentRequest>,
    ) -> GrpcResult<ProtoPayment> {
        observe("CreatePayment", async {
            self.sessions.authenticate(request.metadata()).await?;
            let req = request.into_inner();

            let partner = RecordKey::resolve(
                req.business_partner_id,
                &req.business_partner_uuid,
                "business_partner_id",
            )?;
            let pay_amount =
                positive_amount(&req.pay_amount)?.ok_or_else(|| AppError::mandatory("pay_amount"))?;
            let tender_type = tender_type_from_proto(req.tender_type)
                .ok_or_else(|| AppError::mandatory("tender_type"))?;
            let currency_code = non_empty(&req.currency_code)
                .ok_or_else(|| AppError::mandatory("currency_code"))?
                .to_ascii_uppercase();
            let date_trx =
                parse_date("date_trx", &req.date_trx)?.unwrap_or_else(|| Utc::now().date_naive());

            let business_partner_id = self.db.business_partner_id(&partner).await?;
            let input = CreatePayment {
                business_partner_id,
                document_no: non_empty(&req.document_no),
                is_receipt: req.is_receipt.unwrap_or(true),
                tender_type,
                currency_code,
                pay_amount,
                date_trx,
                description: non_empty(&req.description),
            };

            let id = self.db.create_payment(&input).await?;
            self.load(&RecordKey::Id(id)).await
        })
        .await
    }

    #[instrument(skip(self, request), fields(service = "erp-service", method = "GetPayment"))]
    async fn get_payment(&self, request: Request<GetPaymentRequest>) -> GrpcResult<ProtoPayment> {
        observe("GetPayment", async {
            self.sessions.authenticate(request.metadata()).await?;
            let req = request.into_inner();
            let key = RecordKey::resolve(req.id, &req.uuid, "id")?;
            self.load(&key).await
        })
        .await
    }

    #[instrument(skip(self, request), fields(service = "erp-service", method = "ListPayments"))]
    async fn list_payments(
        &self,
        request: Request<ListPaymentsRequest>,
    ) -> GrpcResult<ListPaymentsResponse> {
        observe("ListPayments", async {
            let context = self.sessions.authenticate(request.metadata()).await?;
            let req = request.into_inner();
            let page = page_request(&context, req.page_size, &req.page_token)?;

            let business_partner_id =
                match RecordKey::optional(req.business_partner_id, &req.business_partner_uuid) {
                    Some(key) => Some(self.db.business_partner_id(&key).await?),
                    None => None,
                };
            let filter = ListPaymentsFilter {
                search_value: req.search_value,
                business_partner_id,
                document_status: req.document_status,
                is_receipt: req.is_receipt,
                date_from: parse_date("date_from", &req.date_from)?,
                date_to: parse_date("date_to", &req.date_to)?,
            };

            let rows = self.db.list_payments(&filter, page).await?;
            let page = assemble_page(&context, page, rows, |p| payment_to_proto(&p));
            Ok(ListPaymentsResponse {
                record_count: page.record_count,
                payments: page.records,
                next_page_token: page.next_page_token,
            })
        })
        .await
    }

    #[instrument(skip(self, request), fields(service = "erp-service", method = "UpdatePayment"))]
    async fn update_payment(
        &self,
        request: Request<UpdatePaymentRequest>,
    ) -> GrpcResult<ProtoPayment> {
        observe("UpdatePayment", async {
            self.sessions.authenticate(request.metadata()).await?;
            let req = request.into_inner();
            let id = self.payment_id(req.id, &req.uuid).await?;

            let update = UpdatePayment {
                tender_type: tender_type_from_proto(req.tender_type),
                currency_code: non_empty(&req.currency_code).map(|c| c.to_ascii_uppercase()),
                pay_amount: positive_amount(&req.pay_amount)?,
                date_trx: parse_date("date_trx", &req.date_trx)?,
                description: non_empty(&req.description),
            };
            self.db.update_payment(id, &update).await?;
            info!(payment_id = id, "Payment updated");
            self.load(&RecordKey::Id(id)).await
        })
        .await
    }

    #[instrument(skip(self, request), fields(service = "erp-service", method = "DeletePayment"))]
    async fn delete_payment(
        &self,
        request: Request<DeletePaymentRequest>,
    ) -> GrpcResult<DeletePaymentResponse> {
        observe("DeletePayment", async {
            self.sessions.authenticate(request.metadata()).await?;
            let req = request.into_inner();
            let id = self.payment_id(req.id, &req.uuid).await?;
            self.db.delete_payment(id).await?;
            Ok(DeletePaymentResponse {})
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tender_types_map_both_ways() {
        for tender in [
            TenderType::Cash,
            TenderType::Check,
            TenderType::CreditCard,
            TenderType::DirectDebit,
            TenderType::DirectDeposit,
        ] {
            let wire = tender_type_to_proto(tender) as i32;
            assert_eq!(tender_type_from_proto(wire), Some(tender));
        }
        assert_eq!(tender_type_from_proto(0), None);
        assert_eq!(tender_type_from_proto(99), None);
    }

    #[test]
    fn amounts_must_be_positive() {
        assert!(matches!(
            positive_amount("0").unwrap_err(),
            AppError::InvalidArgument(_)
        ));
        assert!(matches!(
            positive_amount("-5.00").unwrap_err(),
            AppError::InvalidArgument(_)
        ));
        assert_eq!(positive_amount("").unwrap(), None);
        assert_eq!(positive_amount("10.25").unwrap(), Some(Decimal::new(1025, 2)));
    }
}
