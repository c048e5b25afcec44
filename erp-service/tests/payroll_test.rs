//! Payroll concepts and movements over gRPC.

mod common;

use common::{spawn_app, with_session};
use erp_service::grpc::proto::business_partner::{
    business_partner_service_client::BusinessPartnerServiceClient, CreateBusinessPartnerRequest,
    DeleteBusinessPartnerRequest,
};
use erp_service::grpc::proto::payroll::{
    payroll_service_client::PayrollServiceClient, ColumnType, CreatePayrollMovementRequest,
    DeletePayrollMovementRequest, ListPayrollConceptsRequest, ListPayrollMovementsRequest,
    UpdatePayrollMovementRequest,
};
use tonic::Code;

async fn employee(app: &common::TestApp, token: &str) -> i64 {
    BusinessPartnerServiceClient::new(app.channel.clone())
        .create_business_partner(with_session(
            CreateBusinessPartnerRequest {
                value: "EMP-7".to_string(),
                name: "Jane Employee".to_string(),
                ..Default::default()
            },
            token,
        ))
        .await
        .unwrap()
        .into_inner()
        .id
}

#[tokio::test]
async fn concepts_list_with_column_types() {
    let app = spawn_app().await;
    let token = app.clerk_session().await;

    let concepts = PayrollServiceClient::new(app.channel.clone())
        .list_payroll_concepts(with_session(ListPayrollConceptsRequest::default(), &token))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(concepts.record_count, 4);

    let bonus = concepts
        .concepts
        .iter()
        .find(|c| c.value == "BONUS")
        .unwrap();
    assert_eq!(bonus.column_type, ColumnType::Amount as i32);
}

#[tokio::test]
async fn movement_value_must_match_concept() {
    let app = spawn_app().await;
    let token = app.clerk_session().await;
    let employee = employee(&app, &token).await;
    let mut client = PayrollServiceClient::new(app.channel.clone());

    let status = client
        .create_payroll_movement(with_session(
            CreatePayrollMovementRequest {
                business_partner_id: employee,
                concept_id: 2,
                valid_from: "2024-05-01".to_string(),
                quantity: "3".to_string(),
                ..Default::default()
            },
            &token,
        ))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::Internal);
    assert!(status.message().contains("amount"));

    let status = client
        .create_payroll_movement(with_session(
            CreatePayrollMovementRequest {
                business_partner_id: employee,
                concept_id: 99,
                valid_from: "2024-05-01".to_string(),
                amount: "3".to_string(),
                ..Default::default()
            },
            &token,
        ))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::Internal);
    assert!(status.message().contains("not found"), "{}", status.message());

    let movements = client
        .list_payroll_movements(with_session(
            ListPayrollMovementsRequest {
                business_partner_id: employee,
                ..Default::default()
            },
            &token,
        ))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(movements.record_count, 0);
}

#[tokio::test]
async fn movement_lifecycle() {
    let app = spawn_app().await;
    let token = app.clerk_session().await;
    let employee = employee(&app, &token).await;
    let mut client = PayrollServiceClient::new(app.channel.clone());

    let created = client
        .create_payroll_movement(with_session(
            CreatePayrollMovementRequest {
                business_partner_id: employee,
                concept_id: 2,
                valid_from: "2024-05-01".to_string(),
                amount: "250.50".to_string(),
                ..Default::default()
            },
            &token,
        ))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(created.concept_value, "BONUS");
    assert_eq!(created.business_partner_name, "Jane Employee");
    assert_eq!(created.amount, "250.5");
    assert_eq!(created.quantity, "");
    assert!(!created.processed);

    let updated = client
        .update_payroll_movement(with_session(
            UpdatePayrollMovementRequest {
                id: created.id,
                amount: "300".to_string(),
                description: "Q2 bonus".to_string(),
                ..Default::default()
            },
            &token,
        ))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(updated.amount, "300");
    assert_eq!(updated.description, "Q2 bonus");
    assert_eq!(updated.valid_from, "2024-05-01");

    let status = BusinessPartnerServiceClient::new(app.channel.clone())
        .delete_business_partner(with_session(
            DeleteBusinessPartnerRequest {
                id: employee,
                ..Default::default()
            },
            &token,
        ))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::Internal);
    assert!(status.message().contains("is referenced by"), "{}", status.message());

    client
        .delete_payroll_movement(with_session(
            DeletePayrollMovementRequest {
                uuid: created.uuid.clone(),
                ..Default::default()
            },
            &token,
        ))
        .await
        .unwrap();
    let movements = client
        .list_payroll_movements(with_session(
            ListPayrollMovementsRequest {
                business_partner_id: employee,
                ..Default::default()
            },
            &token,
        ))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(movements.record_count, 0);
}

#[tokio::test]
async fn movements_require_an_employee() {
    let app = spawn_app().await;
    let token = app.clerk_session().await;

    let status = PayrollServiceClient::new(app.channel.clone())
        .list_payroll_movements(with_session(ListPayrollMovementsRequest::default(), &token))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::Internal);
    assert!(status.message().contains("Field is mandatory"), "{}", status.message());
}
