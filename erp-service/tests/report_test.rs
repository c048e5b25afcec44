//! Report exports streamed back as metadata followed by file chunks.

mod common;

use common::{spawn_app, with_session};
use erp_service::grpc::proto::business_partner::{
    business_partner_service_client::BusinessPartnerServiceClient, CreateBusinessPartnerRequest,
};
use erp_service::grpc::proto::report::{
    export_report_response, report_service_client::ReportServiceClient, ExportReportRequest,
    ReportFormat, ReportMetadata, ReportType,
};
use tonic::Code;

async fn seed_partners(app: &common::TestApp, token: &str) {
    let mut client = BusinessPartnerServiceClient::new(app.channel.clone());
    for (value, name) in [("C-1", "Acme, Inc."), ("C-2", "Beta Traders")] {
        client
            .create_business_partner(with_session(
                CreateBusinessPartnerRequest {
                    value: value.to_string(),
                    name: name.to_string(),
                    is_customer: true,
                    ..Default::default()
                },
                token,
            ))
            .await
            .unwrap();
    }
}

async fn export(
    app: &common::TestApp,
    token: &str,
    request: ExportReportRequest,
) -> Result<(ReportMetadata, String), tonic::Status> {
    let mut stream = ReportServiceClient::new(app.channel.clone())
        .export_report(with_session(request, token))
        .await?
        .into_inner();

    let mut metadata = None;
    let mut body = Vec::new();
    while let Some(message) = stream.message().await? {
        match message.data {
            Some(export_report_response::Data::Metadata(m)) => {
                assert!(metadata.is_none(), "metadata sent twice");
                metadata = Some(m);
            }
            Some(export_report_response::Data::Chunk(chunk)) => {
                assert!(metadata.is_some(), "chunk before metadata");
                body.extend_from_slice(&chunk);
            }
            None => panic!("empty message"),
        }
    }
    Ok((metadata.unwrap(), String::from_utf8(body).unwrap()))
}

#[tokio::test]
async fn admin_exports_business_partners_as_csv() {
    let app = spawn_app().await;
    let token = app.admin_session().await;
    seed_partners(&app, &token).await;

    let (metadata, body) = export(
        &app,
        &token,
        ExportReportRequest {
            report_type: ReportType::BusinessPartners as i32,
            format: ReportFormat::Csv as i32,
            search_value: String::new(),
        },
    )
    .await
    .unwrap();

    assert!(metadata.file_name.starts_with("business_partners_"));
    assert!(metadata.file_name.ends_with(".csv"));
    assert_eq!(metadata.content_type, "text/csv");
    assert_eq!(metadata.record_count, 2);
    assert_eq!(metadata.file_size, body.len() as i64);

    let mut lines = body.lines();
    assert!(lines.next().unwrap().starts_with("value,name,"));
    assert!(body.contains("\"Acme, Inc.\""));
    assert_eq!(lines.count(), 2);
}

#[tokio::test]
async fn search_narrows_tsv_export() {
    let app = spawn_app().await;
    let token = app.admin_session().await;
    seed_partners(&app, &token).await;

    let (metadata, body) = export(
        &app,
        &token,
        ExportReportRequest {
            report_type: ReportType::BusinessPartners as i32,
            format: ReportFormat::Tsv as i32,
            search_value: "beta".to_string(),
        },
    )
    .await
    .unwrap();

    assert!(metadata.file_name.ends_with(".tsv"));
    assert_eq!(metadata.record_count, 1);
    assert!(body.lines().next().unwrap().starts_with("value\tname\t"));
    assert!(body.contains("C-2\tBeta Traders"));
}

#[tokio::test]
async fn export_needs_permission_and_format() {
    let app = spawn_app().await;
    let clerk = app.clerk_session().await;
    let admin = app.admin_session().await;

    let status = export(
        &app,
        &clerk,
        ExportReportRequest {
            report_type: ReportType::Payments as i32,
            format: ReportFormat::Csv as i32,
            search_value: String::new(),
        },
    )
    .await
    .unwrap_err();
    assert_eq!(status.code(), Code::Internal);
    assert!(status.message().contains("may not export reports"), "{}", status.message());

    let status = export(
        &app,
        &admin,
        ExportReportRequest {
            report_type: ReportType::Payments as i32,
            format: ReportFormat::Unspecified as i32,
            search_value: String::new(),
        },
    )
    .await
    .unwrap_err();
    assert_eq!(status.code(), Code::Internal);
    assert!(status.message().contains("Field is mandatory: format"), "{}", status.message());
}

#[tokio::test]
async fn empty_payment_export_has_only_a_header() {
    let app = spawn_app().await;
    let token = app.admin_session().await;

    let (metadata, body) = export(
        &app,
        &token,
        ExportReportRequest {
            report_type: ReportType::Payments as i32,
            format: ReportFormat::Csv as i32,
            search_value: String::new(),
        },
    )
    .await
    .unwrap();

    assert_eq!(metadata.record_count, 0);
    assert_eq!(body, "document_no,business_partner,date_trx,tender_type,currency_code,pay_amount,is_receipt,document_status\n");
}
