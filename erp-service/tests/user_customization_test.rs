//! Per-user window customizations over gRPC.

mod common;

use common::{spawn_app, with_session};
use erp_service::grpc::proto::user_customization::{
    user_customization_service_client::UserCustomizationServiceClient,
    DeleteWindowCustomizationRequest, FieldCustomization, GetWindowCustomizationRequest,
    ListWindowCustomizationsRequest, SaveWindowCustomizationRequest,
};
use tonic::Code;

const WINDOW: &str = "a4f1c2d0-0000-4000-8000-000000000123";

fn field(column_name: &str, sequence: i32) -> FieldCustomization {
    FieldCustomization {
        column_name: column_name.to_string(),
        sequence,
        is_displayed: true,
        display_size: 20,
    }
}

#[tokio::test]
async fn save_replaces_fields_per_user() {
    let app = spawn_app().await;
    let clerk = app.clerk_session().await;
    let admin = app.admin_session().await;
    let mut client = UserCustomizationServiceClient::new(app.channel.clone());

    client
        .save_window_customization(with_session(
            SaveWindowCustomizationRequest {
                window_uuid: WINDOW.to_string(),
                name: "Compact".to_string(),
                fields: vec![field("Name", 20), field("Value", 10), field("TaxID", 30)],
            },
            &clerk,
        ))
        .await
        .unwrap();
    let saved = client
        .save_window_customization(with_session(
            SaveWindowCustomizationRequest {
                window_uuid: WINDOW.to_string(),
                name: "Compact".to_string(),
                fields: vec![field("Name", 20), field("Value", 10)],
            },
            &clerk,
        ))
        .await
        .unwrap()
        .into_inner();
    let columns: Vec<&str> = saved.fields.iter().map(|f| f.column_name.as_str()).collect();
    assert_eq!(columns, vec!["Value", "Name"]);

    let fetched = client
        .get_window_customization(with_session(
            GetWindowCustomizationRequest {
                window_uuid: WINDOW.to_string(),
            },
            &clerk,
        ))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(fetched, saved);

    let status = client
        .get_window_customization(with_session(
            GetWindowCustomizationRequest {
                window_uuid: WINDOW.to_string(),
            },
            &admin,
        ))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::Internal);
    assert!(status.message().contains("not found"), "{}", status.message());

    let listed = client
        .list_window_customizations(with_session(
            ListWindowCustomizationsRequest {
                search_value: "compact".to_string(),
                ..Default::default()
            },
            &clerk,
        ))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(listed.record_count, 1);
    assert_eq!(listed.customizations[0].fields.len(), 2);
}

#[tokio::test]
async fn blank_column_name_persists_nothing() {
    let app = spawn_app().await;
    let token = app.clerk_session().await;
    let mut client = UserCustomizationServiceClient::new(app.channel.clone());

    let status = client
        .save_window_customization(with_session(
            SaveWindowCustomizationRequest {
                window_uuid: WINDOW.to_string(),
                name: String::new(),
                fields: vec![field("Name", 10), field("  ", 20)],
            },
            &token,
        ))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::Internal);
    assert!(status.message().contains("Field is mandatory: column_name"), "{}", status.message());

    let listed = client
        .list_window_customizations(with_session(
            ListWindowCustomizationsRequest::default(),
            &token,
        ))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(listed.record_count, 0);
}

#[tokio::test]
async fn delete_twice_is_not_found() {
    let app = spawn_app().await;
    let token = app.clerk_session().await;
    let mut client = UserCustomizationServiceClient::new(app.channel.clone());

    client
        .save_window_customization(with_session(
            SaveWindowCustomizationRequest {
                window_uuid: WINDOW.to_string(),
                name: "Mine".to_string(),
                fields: vec![field("Name", 10)],
            },
            &token,
        ))
        .await
        .unwrap();

    let delete = || DeleteWindowCustomizationRequest {
        window_uuid: WINDOW.to_string(),
    };
    client
        .delete_window_customization(with_session(delete(), &token))
        .await
        .unwrap();
    let status = client
        .delete_window_customization(with_session(delete(), &token))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::Internal);
    assert!(status.message().contains("not found"), "{}", status.message());
}
