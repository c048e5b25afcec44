//! gRPC module for erp-service: one tonic service per capability plus the
//! helpers every handler shares.

mod attachment_service;
mod business_partner_service;
mod core_service;
mod dashboard_service;
mod issue_service;
mod payment_service;
mod payroll_service;
mod report_service;
mod security_service;
mod user_customization_service;
mod workflow_service;

pub use attachment_service::FileManagementServiceImpl;
pub use business_partner_service::BusinessPartnerServiceImpl;
pub use core_service::{CoreServiceImpl, CountryCache};
pub use dashboard_service::DashboardServiceImpl;
pub use issue_service::IssueServiceImpl;
pub use payment_service::PaymentServiceImpl;
pub use payroll_service::PayrollServiceImpl;
pub use report_service::ReportServiceImpl;
pub use security_service::{MenuCache, SecurityServiceImpl};
pub use user_customization_service::UserCustomizationServiceImpl;
pub use workflow_service::WorkflowServiceImpl;

use crate::services::metrics::{record_error, record_grpc_request, GRPC_REQUEST_DURATION};
use crate::services::SessionContext;
use chrono::{DateTime, NaiveDate, Utc};
use prost_types::Timestamp;
use rust_decimal::Decimal;
use service_core::error::AppError;
use service_core::grpc::{GrpcResult, IntoStatus};
use service_core::pagination::{Page, PageRequest};
use std::future::Future;
use std::str::FromStr;
use tonic::Response;

/// Generated protobuf code.
pub mod proto {
    /// `erp.core.v1`: reference data.
    pub mod reference {
        tonic::include_proto!("erp.core.v1");
    }
    pub mod business_partner {
        tonic::include_proto!("erp.business_partner.v1");
    }
    pub mod payment {
        tonic::include_proto!("erp.payment.v1");
    }
    pub mod workflow {
        tonic::include_proto!("erp.workflow.v1");
    }
    pub mod issue {
        tonic::include_proto!("erp.issue.v1");
    }
    pub mod payroll {
        tonic::include_proto!("erp.payroll.v1");
    }
    pub mod dashboard {
        tonic::include_proto!("erp.dashboard.v1");
    }
    pub mod attachment {
        tonic::include_proto!("erp.attachment.v1");
    }
    pub mod report {
        tonic::include_proto!("erp.report.v1");
    }
    pub mod security {
        tonic::include_proto!("erp.security.v1");
    }
    pub mod user_customization {
        tonic::include_proto!("erp.user_customization.v1");
    }

    pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("erp_descriptor");
}

/// Run a handler body, recording duration, outcome and error kind, and map
/// its `AppError` to a status.
pub(crate) async fn observe<T, F>(method: &'static str, call: F) -> GrpcResult<T>
where
    F: Future<Output = Result<T, AppError>>,
{
    let timer = GRPC_REQUEST_DURATION
        .with_label_values(&[method])
        .start_timer();
    let result = call.await;
    timer.observe_duration();

    match result {
        Ok(value) => {
            record_grpc_request(method, "ok");
            Ok(Response::new(value))
        }
        Err(err) => {
            record_grpc_request(method, err.kind());
            record_error(err.kind());
            Err(err.into_status())
        }
    }
}

/// Page position of a list request issued under `context`.
pub(crate) fn page_request(
    context: &SessionContext,
    page_size: i32,
    page_token: &str,
) -> Result<PageRequest, AppError> {
    PageRequest::from_request(context.session_uuid(), page_size, page_token)
}

/// Attach the page bookkeeping to fetched rows and convert them.
pub(crate) fn assemble_page<T, U>(
    context: &SessionContext,
    page: PageRequest,
    (rows, record_count): (Vec<T>, i64),
    convert: impl FnMut(T) -> U,
) -> Page<U> {
    let next_page_token = page.next_page_token(context.session_uuid(), record_count);
    Page::new(rows, record_count, next_page_token).map(convert)
}

pub(crate) fn timestamp(at: &DateTime<Utc>) -> Option<Timestamp> {
    Some(Timestamp {
        seconds: at.timestamp(),
        nanos: at.timestamp_subsec_nanos() as i32,
    })
}

/// Decimal without trailing zeros, `""` when absent.
pub(crate) fn format_decimal(value: Option<Decimal>) -> String {
    value.map(|d| d.normalize().to_string()).unwrap_or_default()
}

pub(crate) fn format_date(value: Option<NaiveDate>) -> String {
    value.map(|d| d.format("%F").to_string()).unwrap_or_default()
}

/// Parse an optional `YYYY-MM-DD` field; blank means absent.
pub(crate) fn parse_date(field: &str, value: &str) -> Result<Option<NaiveDate>, AppError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    NaiveDate::parse_from_str(value, "%F").map(Some).map_err(|_| {
        AppError::InvalidArgument(anyhow::anyhow!("{} must be a date (YYYY-MM-DD)", field))
    })
}

/// Parse an optional decimal field; blank means absent.
pub(crate) fn parse_decimal(field: &str, value: &str) -> Result<Option<Decimal>, AppError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    Decimal::from_str(value)
        .map(Some)
        .map_err(|_| AppError::InvalidArgument(anyhow::anyhow!("{} must be a decimal", field)))
}

/// Positive id as `Some`, anything else as `None`.
pub(crate) fn positive(id: i64) -> Option<i64> {
    (id > 0).then_some(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimals_drop_trailing_zeros() {
        assert_eq!(format_decimal(Some(Decimal::new(12550, 2))), "125.5");
        assert_eq!(format_decimal(Some(Decimal::new(300, 0))), "300");
        assert_eq!(format_decimal(None), "");
    }

    #[test]
    fn blank_fields_parse_as_absent() {
        assert_eq!(parse_date("date_trx", " ").unwrap(), None);
        assert_eq!(parse_decimal("pay_amount", "").unwrap(), None);
        assert_eq!(
            parse_date("date_trx", "2024-02-29").unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 29)
        );
    }

    #[test]
    fn malformed_fields_are_invalid_arguments() {
        assert!(matches!(
            parse_date("date_trx", "29/02/2024").unwrap_err(),
            AppError::InvalidArgument(_)
        ));
        assert!(matches!(
            parse_decimal("pay_amount", "ten").unwrap_err(),
            AppError::InvalidArgument(_)
        ));
    }
}
