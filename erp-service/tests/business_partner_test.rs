//! Business partner, payment and document workflow integration tests.

mod common;

use common::{spawn_app, with_session};
use erp_service::grpc::proto::business_partner::{
    business_partner_service_client::BusinessPartnerServiceClient, ContactInput,
    CreateBusinessPartnerRequest, DeleteBusinessPartnerRequest, GetBusinessPartnerRequest,
    ListBusinessPartnersRequest, LocationInput, UpdateBusinessPartnerRequest,
};
use erp_service::grpc::proto::payment::{
    payment_service_client::PaymentServiceClient, CreatePaymentRequest, DeletePaymentRequest,
    GetPaymentRequest, ListPaymentsRequest, TenderType,
};
use erp_service::grpc::proto::workflow::{
    workflow_service_client::WorkflowServiceClient, ListDocumentActionLogsRequest,
    ListDocumentActionsRequest, RunDocumentActionRequest,
};
use tonic::transport::Channel;
use tonic::Code;

fn acme() -> CreateBusinessPartnerRequest {
    CreateBusinessPartnerRequest {
        value: "ACME".to_string(),
        name: "Acme Corporation".to_string(),
        tax_id: "99-1234567".to_string(),
        is_customer: true,
        location: Some(LocationInput {
            address1: "1 Main Street".to_string(),
            city: "Springfield".to_string(),
            postal_code: "12345".to_string(),
            country_code: "us".to_string(),
            ..Default::default()
        }),
        contact: Some(ContactInput {
            name: "Wile Coyote".to_string(),
            email: "wile@acme.test".to_string(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

async fn create_payment(channel: Channel, token: &str, partner_id: i64, amount: &str) -> i64 {
    PaymentServiceClient::new(channel)
        .create_payment(with_session(
            CreatePaymentRequest {
                business_partner_id: partner_id,
                tender_type: TenderType::Check as i32,
                currency_code: "usd".to_string(),
                pay_amount: amount.to_string(),
                date_trx: "2024-03-01".to_string(),
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
async fn create_then_get_returns_supplied_values() {
    let app = spawn_app().await;
    let token = app.clerk_session().await;
    let mut client = BusinessPartnerServiceClient::new(app.channel.clone());

    let created = client
        .create_business_partner(with_session(acme(), &token))
        .await
        .unwrap()
        .into_inner();

    let fetched = client
        .get_business_partner(with_session(
            GetBusinessPartnerRequest {
                uuid: created.uuid.clone(),
                ..Default::default()
            },
            &token,
        ))
        .await
        .unwrap()
        .into_inner();

    assert_eq!(fetched, created);
    assert_eq!(fetched.value, "ACME");
    assert_eq!(fetched.tax_id, "99-1234567");
    assert_eq!(fetched.name2, "");
    assert!(fetched.is_customer);
    assert!(!fetched.is_vendor);
    assert_eq!(fetched.locations.len(), 1);
    assert_eq!(fetched.locations[0].country_code, "US");
    assert_eq!(fetched.locations[0].address2, "");
    assert_eq!(fetched.contacts[0].email, "wile@acme.test");
}

#[tokio::test]
async fn duplicate_value_is_rejected() {
    let app = spawn_app().await;
    let token = app.clerk_session().await;
    let mut client = BusinessPartnerServiceClient::new(app.channel.clone());

    client
        .create_business_partner(with_session(acme(), &token))
        .await
        .unwrap();
    let status = client
        .create_business_partner(with_session(acme(), &token))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::Internal);
    assert!(status.message().contains("already exists"), "{}", status.message());
}

#[tokio::test]
async fn failed_create_leaves_no_rows() {
    let app = spawn_app().await;
    let token = app.clerk_session().await;
    let mut client = BusinessPartnerServiceClient::new(app.channel.clone());

    let mut request = acme();
    if let Some(location) = request.location.as_mut() {
        location.country_code = "QQ".to_string();
    }
    let status = client
        .create_business_partner(with_session(request, &token))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::Internal);
    assert!(status.message().contains("Country QQ not found"), "{}", status.message());

    let listed = client
        .list_business_partners(with_session(ListBusinessPartnersRequest::default(), &token))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(listed.record_count, 0);
}

#[tokio::test]
async fn list_filters_on_contacts_and_flags() {
    let app = spawn_app().await;
    let token = app.clerk_session().await;
    let mut client = BusinessPartnerServiceClient::new(app.channel.clone());

    client
        .create_business_partner(with_session(acme(), &token))
        .await
        .unwrap();
    client
        .create_business_partner(with_session(
            CreateBusinessPartnerRequest {
                value: "GLOBEX".to_string(),
                name: "Globex".to_string(),
                is_vendor: true,
                ..Default::default()
            },
            &token,
        ))
        .await
        .unwrap();

    let by_email = client
        .list_business_partners(with_session(
            ListBusinessPartnersRequest {
                email: "WILE@ACME.TEST".to_string(),
                ..Default::default()
            },
            &token,
        ))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(by_email.record_count, 1);
    assert_eq!(by_email.business_partners[0].value, "ACME");
    assert_eq!(by_email.business_partners[0].contacts.len(), 1);

    let by_contact = client
        .list_business_partners(with_session(
            ListBusinessPartnersRequest {
                contact_name: "coyote".to_string(),
                ..Default::default()
            },
            &token,
        ))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(by_contact.record_count, 1);

    let vendors = client
        .list_business_partners(with_session(
            ListBusinessPartnersRequest {
                is_vendor: Some(true),
                ..Default::default()
            },
            &token,
        ))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(vendors.record_count, 1);
    assert_eq!(vendors.business_partners[0].value, "GLOBEX");

    let all = client
        .list_business_partners(with_session(
            ListBusinessPartnersRequest {
                page_size: 1,
                ..Default::default()
            },
            &token,
        ))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(all.record_count, 2);
    assert_eq!(all.business_partners.len(), 1);
    assert!(!all.next_page_token.is_empty());
}

#[tokio::test]
async fn update_overwrites_only_supplied_fields() {
    let app = spawn_app().await;
    let token = app.clerk_session().await;
    let mut client = BusinessPartnerServiceClient::new(app.channel.clone());

    let created = client
        .create_business_partner(with_session(acme(), &token))
        .await
        .unwrap()
        .into_inner();
    let updated = client
        .update_business_partner(with_session(
            UpdateBusinessPartnerRequest {
                id: created.id,
                name2: "Acme Holdings".to_string(),
                is_vendor: Some(true),
                ..Default::default()
            },
            &token,
        ))
        .await
        .unwrap()
        .into_inner();

    assert_eq!(updated.name, "Acme Corporation");
    assert_eq!(updated.name2, "Acme Holdings");
    assert!(updated.is_customer);
    assert!(updated.is_vendor);
}

#[tokio::test]
async fn processed_payment_blocks_deletes() {
    let app = spawn_app().await;
    let token = app.clerk_session().await;
    let partner = BusinessPartnerServiceClient::new(app.channel.clone())
        .create_business_partner(with_session(acme(), &token))
        .await
        .unwrap()
        .into_inner();
    let payment_id = create_payment(app.channel.clone(), &token, partner.id, "150.00").await;

    let mut payments = PaymentServiceClient::new(app.channel.clone());
    let mut workflow = WorkflowServiceClient::new(app.channel.clone());

    let payment = payments
        .get_payment(with_session(
            GetPaymentRequest {
                id: payment_id,
                ..Default::default()
            },
            &token,
        ))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(payment.document_no, "PAY-000001");
    assert_eq!(payment.pay_amount, "150");
    assert_eq!(payment.currency_code, "USD");
    assert!(payment.is_receipt);
    assert_eq!(payment.document_status, "DR");

    let actions = workflow
        .list_document_actions(with_session(
            ListDocumentActionsRequest {
                table_name: "C_Payment".to_string(),
                id: payment_id,
                ..Default::default()
            },
            &token,
        ))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(actions.default_action.unwrap().value, "CO");
    let values: Vec<String> = actions.document_actions.into_iter().map(|a| a.value).collect();
    assert_eq!(values, vec!["CO".to_string(), "VO".to_string()]);

    let completed = workflow
        .run_document_action(with_session(
            RunDocumentActionRequest {
                table_name: "payments".to_string(),
                id: payment_id,
                document_action: "CO".to_string(),
                ..Default::default()
            },
            &token,
        ))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(completed.document_status, "CO");
    assert!(completed.processed);

    let status = payments
        .delete_payment(with_session(
            DeletePaymentRequest {
                id: payment_id,
                ..Default::default()
            },
            &token,
        ))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::Internal);
    assert!(status.message().contains("is processed"), "{}", status.message());

    let status = BusinessPartnerServiceClient::new(app.channel.clone())
        .delete_business_partner(with_session(
            DeleteBusinessPartnerRequest {
                id: partner.id,
                ..Default::default()
            },
            &token,
        ))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::Internal);
    assert!(status.message().contains("is referenced by"), "{}", status.message());

    // still there, log intact
    payments
        .get_payment(with_session(
            GetPaymentRequest {
                id: payment_id,
                ..Default::default()
            },
            &token,
        ))
        .await
        .unwrap();
    let logs = workflow
        .list_document_action_logs(with_session(
            ListDocumentActionLogsRequest {
                table_name: "payments".to_string(),
                id: payment_id,
                ..Default::default()
            },
            &token,
        ))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(logs.record_count, 1);
    assert_eq!(logs.logs[0].user_name, "clerk");
}

#[tokio::test]
async fn invalid_transition_is_rejected() {
    let app = spawn_app().await;
    let token = app.clerk_session().await;
    let partner = BusinessPartnerServiceClient::new(app.channel.clone())
        .create_business_partner(with_session(acme(), &token))
        .await
        .unwrap()
        .into_inner();
    let payment_id = create_payment(app.channel.clone(), &token, partner.id, "10").await;

    let status = WorkflowServiceClient::new(app.channel.clone())
        .run_document_action(with_session(
            RunDocumentActionRequest {
                table_name: "payments".to_string(),
                id: payment_id,
                document_action: "RC".to_string(),
                ..Default::default()
            },
            &token,
        ))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::Internal);
    assert!(status.message().contains("is not valid for document status"), "{}", status.message());
}

#[tokio::test]
async fn payment_validation() {
    let app = spawn_app().await;
    let token = app.clerk_session().await;
    let partner = BusinessPartnerServiceClient::new(app.channel.clone())
        .create_business_partner(with_session(acme(), &token))
        .await
        .unwrap()
        .into_inner();
    let mut payments = PaymentServiceClient::new(app.channel.clone());

    let status = payments
        .create_payment(with_session(
            CreatePaymentRequest {
                business_partner_id: partner.id,
                tender_type: TenderType::Cash as i32,
                currency_code: "USD".to_string(),
                pay_amount: "-5".to_string(),
                ..Default::default()
            },
            &token,
        ))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::Internal);
    assert!(status.message().contains("greater than zero"), "{}", status.message());

    let status = payments
        .create_payment(with_session(
            CreatePaymentRequest {
                tender_type: TenderType::Cash as i32,
                currency_code: "USD".to_string(),
                pay_amount: "5".to_string(),
                ..Default::default()
            },
            &token,
        ))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::Internal);
    assert!(status.message().contains("business_partner_id"));

    let status = payments
        .create_payment(with_session(
            CreatePaymentRequest {
                business_partner_id: partner.id + 1000,
                tender_type: TenderType::Cash as i32,
                currency_code: "USD".to_string(),
                pay_amount: "5".to_string(),
                ..Default::default()
            },
            &token,
        ))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::Internal);
    assert!(status.message().contains("not found"), "{}", status.message());

    let listed = payments
        .list_payments(with_session(
            ListPaymentsRequest {
                business_partner_id: partner.id,
                ..Default::default()
            },
            &token,
        ))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(listed.record_count, 0);
}
