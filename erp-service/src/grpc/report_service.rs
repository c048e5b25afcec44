//! ReportService gRPC implementation: flat CSV/TSV exports streamed in chunks.

use crate::grpc::proto::report::{
    export_report_response, report_service_server::ReportService, ExportReportRequest,
    ExportReportResponse, ReportFormat as ProtoReportFormat, ReportMetadata,
    ReportType as ProtoReportType,
};
use crate::grpc::{format_date, format_decimal, observe};
use crate::models::{BusinessPartner, ListBusinessPartnersFilter, ListPaymentsFilter, Payment};
use crate::services::{Database, SessionManager};
use chrono::Utc;
use service_core::error::AppError;
use service_core::grpc::GrpcResult;
use service_core::transfer::chunk_bytes;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Status};
use tracing::{info, instrument};

type ExportStream =
    Pin<Box<dyn futures::Stream<Item = Result<ExportReportResponse, Status>> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExportFormat {
    Csv,
    Tsv,
}

impl ExportFormat {
    fn from_proto(value: i32) -> Result<Self, AppError> {
        match ProtoReportFormat::try_from(value) {
            Ok(ProtoReportFormat::Csv) => Ok(ExportFormat::Csv),
            Ok(ProtoReportFormat::Tsv) => Ok(ExportFormat::Tsv),
            Ok(ProtoReportFormat::Unspecified) => Err(AppError::mandatory("format")),
            Err(_) => Err(AppError::InvalidArgument(anyhow::anyhow!(
                "Unknown report format {}",
                value
            ))),
        }
    }

    fn delimiter(&self) -> u8 {
        match self {
            ExportFormat::Csv => b',',
            ExportFormat::Tsv => b'\t',
        }
    }

    fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Tsv => "tsv",
        }
    }

    fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv",
            ExportFormat::Tsv => "text/tab-separated-values",
        }
    }
}

/// Header row plus one row per record.
struct Table {
    name: &'static str,
    header: &'static [&'static str],
    rows: Vec<Vec<String>>,
}

fn business_partner_table(partners: Vec<BusinessPartner>) -> Table {
    Table {
        name: "business_partners",
        header: &[
            "value",
            "name",
            "name2",
            "tax_id",
            "description",
            "is_customer",
            "is_vendor",
        ],
        rows: partners
            .into_iter()
            .map(|bp| {
                vec![
                    bp.value,
                    bp.name,
                    bp.name2.unwrap_or_default(),
                    bp.tax_id.unwrap_or_default(),
                    bp.description.unwrap_or_default(),
                    bp.is_customer.to_string(),
                    bp.is_vendor.to_string(),
                ]
            })
            .collect(),
    }
}

fn payment_table(payments: Vec<Payment>) -> Table {
    Table {
        name: "payments",
        header: &[
            "document_no",
            "business_partner",
            "date_trx",
            "tender_type",
            "currency_code",
            "pay_amount",
            "is_receipt",
            "document_status",
        ],
        rows: payments
            .into_iter()
            .map(|p| {
                vec![
                    p.document_no,
                    p.business_partner_name.unwrap_or_default(),
                    format_date(Some(p.date_trx)),
                    p.tender_type,
                    p.currency_code,
                    format_decimal(Some(p.pay_amount)),
                    p.is_receipt.to_string(),
                    p.document_status,
                ]
            })
            .collect(),
    }
}

/// Write the table into a temporary file under `dir` and read it back.
fn render(table: &Table, format: ExportFormat, dir: &Path) -> Result<Vec<u8>, AppError> {
    let mut file = tempfile::Builder::new()
        .prefix(table.name)
        .suffix(&format!(".{}", format.extension()))
        .tempfile_in(dir)?;

    {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(format.delimiter())
            .from_writer(file.as_file_mut());
        writer.write_record(table.header).map_err(export_error)?;
        for row in &table.rows {
            writer.write_record(row).map_err(export_error)?;
        }
        writer.flush()?;
    }
    file.as_file_mut().flush()?;

    let data = std::fs::read(file.path())?;
    Ok(data)
}

fn export_error(err: csv::Error) -> AppError {
    AppError::StorageError(anyhow::anyhow!("Failed to write export: {}", err))
}

pub struct ReportServiceImpl {
    db: Arc<Database>,
    sessions: SessionManager,
    export_dir: PathBuf,
}

impl ReportServiceImpl {
    pub fn new(db: Arc<Database>, sessions: SessionManager, export_dir: PathBuf) -> Self {
        Self {
            db,
            sessions,
            export_dir,
        }
    }

    async fn table(&self, report: i32, search_value: String) -> Result<Table, AppError> {
        match ProtoReportType::try_from(report) {
            Ok(ProtoReportType::BusinessPartners) => {
                let filter = ListBusinessPartnersFilter {
                    search_value,
                    ..Default::default()
                };
                let partners = self.db.all_business_partners(&filter).await?;
                Ok(business_partner_table(partners))
            }
            Ok(ProtoReportType::Payments) => {
                let filter = ListPaymentsFilter {
                    search_value,
                    ..Default::default()
                };
                let payments = self.db.all_payments(&filter).await?;
                Ok(payment_table(payments))
            }
            Ok(ProtoReportType::Unspecified) => Err(AppError::mandatory("report_type")),
            Err(_) => Err(AppError::InvalidArgument(anyhow::anyhow!(
                "Unknown report type {}",
                report
            ))),
        }
    }
}

#[tonic::async_trait]
impl ReportService for ReportServiceImpl {
    type ExportReportStream = ExportStream;

    #[instrument(skip(self, request), fields(service = "erp-service", method = "ExportReport"))]
    async fn export_report(
        &self,
        request: Request<ExportReportRequest>,
    ) -> GrpcResult<Self::ExportReportStream> {
        observe("ExportReport", async {
            let context = self.sessions.authenticate(request.metadata()).await?;
            if !context.can_export() {
                return Err(AppError::AccessDenied(anyhow::anyhow!(
                    "Role {} may not export reports",
                    context.role_id()
                )));
            }
            let req = request.into_inner();
            let format = ExportFormat::from_proto(req.format)?;
            let table = self.table(req.report_type, req.search_value).await?;
            let record_count = table.rows.len() as i64;

            let dir = self.export_dir.clone();
            let (name, data) = tokio::task::spawn_blocking(move || {
                render(&table, format, &dir).map(|data| (table.name, data))
            })
            .await
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Export task failed: {}", e)))??;

            let metadata = ReportMetadata {
                file_name: format!(
                    "{}_{}.{}",
                    name,
                    Utc::now().format("%Y%m%d%H%M%S"),
                    format.extension()
                ),
                content_type: format.content_type().to_string(),
                file_size: data.len() as i64,
                record_count,
            };
            info!(
                report = name,
                records = record_count,
                bytes = data.len(),
                "Report exported"
            );

            let (tx, rx) = mpsc::channel(32);
            tokio::spawn(async move {
                let first = ExportReportResponse {
                    data: Some(export_report_response::Data::Metadata(metadata)),
                };
                if tx.send(Ok(first)).await.is_err() {
                    return;
                }
                for chunk in chunk_bytes(&data) {
                    let message = ExportReportResponse {
                        data: Some(export_report_response::Data::Chunk(chunk)),
                    };
                    if tx.send(Ok(message)).await.is_err() {
                        return;
                    }
                }
            });

            let stream: Self::ExportReportStream = Box::pin(ReceiverStream::new(rx));
            Ok(stream)
        })
        .await
    }
}
