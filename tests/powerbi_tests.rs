use std::collections::HashMap;
use std::time::Duration;
use serde_json::json;
use tokio_test::{assert_err, assert_ok};
use wiremock::matchers::{
  body_json, body_string_contains, header, method, path,
};
use wiremock::{Mock, MockServer, ResponseTemplate};

use azchat::powerbi::{
  AccessToken, ExportFormat, ExportStatus, PowerBiClient, PowerBiConfig,
  CLIENT_SECRET_VAR, REPORT_ID_VAR,
};
use azchat::Error;

const TENANT: &str = "tenant-1";
const WORKSPACE: &str = "ws-1";
const REPORT: &str = "rep-1";
const GROUP_PATH: &str = "/v1.0/myorg/groups/ws-1";

fn config_for(server: &MockServer) -> PowerBiConfig
{   let config = assert_ok!(
      PowerBiConfig::new(TENANT, "client-1", "s3cret", WORKSPACE)
    );
    let config = assert_ok!(config.with_authority(&server.uri()));
    let config = assert_ok!(
      config.with_api_base(&format!("{}/v1.0/myorg", server.uri()))
    );
    config.with_poll_interval(Duration::from_millis(5))
}

fn token() -> AccessToken
{   AccessToken::new("tok-123")
}

#[tokio::test]
async fn test_access_token_uses_client_credentials_form()
{   let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/tenant-1/oauth2/v2.0/token"))
      .and(header("content-type", "application/x-www-form-urlencoded"))
      .and(body_string_contains("grant_type=client_credentials"))
      .and(body_string_contains("client_id=client-1"))
      .and(body_string_contains("client_secret=s3cret"))
      .and(body_string_contains(
        "scope=https%3A%2F%2Fanalysis.windows.net%2Fpowerbi%2Fapi%2F.default"
      ))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "token_type": "Bearer",
        "expires_in": 3599,
        "access_token": "tok-123"
      })))
      .expect(1)
      .mount(&server)
      .await;

    let client = PowerBiClient::new(config_for(&server));
    let token = assert_ok!(client.access_token().await);
    assert_eq!(token.expose(), "tok-123");
    assert!(!format!("{:?}", token).contains("tok-123"));
}

#[tokio::test]
async fn test_rejected_credentials_are_token_error()
{   let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/tenant-1/oauth2/v2.0/token"))
      .respond_with(ResponseTemplate::new(401).set_body_json(json!({
        "error": "invalid_client",
        "error_description": "AADSTS7000215: Invalid client secret provided."
      })))
      .mount(&server)
      .await;

    let client = PowerBiClient::new(config_for(&server));
    match assert_err!(client.access_token().await)
    {   Error::TokenError(msg) => {
          assert!(msg.starts_with("invalid_client: AADSTS7000215"), "{}", msg);
        }
      , other => panic!("unexpected error: {:?}", other)
    }
}

#[tokio::test]
async fn test_report_then_dataset_tables()
{   let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path(format!("{}/reports/{}", GROUP_PATH, REPORT)))
      .and(header("authorization", "Bearer tok-123"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "id": REPORT,
        "name": "Port Throughput",
        "datasetId": "ds-9",
        "webUrl": "https://app.powerbi.com/groups/ws-1/reports/rep-1"
      })))
      .expect(1)
      .mount(&server)
      .await;
    Mock::given(method("GET"))
      .and(path(format!("{}/datasets/ds-9/tables", GROUP_PATH)))
      .and(header("authorization", "Bearer tok-123"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "value": [
          {
            "name": "Vessels",
            "columns": [
              { "name": "Imo", "dataType": "Int64" },
              { "name": "Name", "dataType": "String" }
            ]
          },
          { "name": "Berths" }
        ]
      })))
      .expect(1)
      .mount(&server)
      .await;

    let client = PowerBiClient::new(config_for(&server));
    let report = assert_ok!(client.get_report(&token(), REPORT).await);
    assert_eq!(report.dataset_id, "ds-9");
    assert_eq!(report.name.as_deref(), Some("Port Throughput"));

    let tables = assert_ok!(
      client.get_dataset_tables(&token(), &report.dataset_id).await
    );
    assert_eq!(tables.len(), 2);
    assert_eq!(tables[0].columns[1].data_type.as_deref(), Some("String"));
    assert!(tables[1].columns.is_empty());
}

#[tokio::test]
async fn test_missing_report_is_api_error()
{   let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path(format!("{}/reports/nope", GROUP_PATH)))
      .respond_with(ResponseTemplate::new(404).set_body_json(json!({
        "error": { "code": "ItemNotFound", "message": "Report not found" }
      })))
      .mount(&server)
      .await;

    let client = PowerBiClient::new(config_for(&server));
    let err = assert_err!(client.get_report(&token(), "nope").await);
    assert_eq!(
      err
    , Error::ApiError
      {   status: 404
        , message: "Report not found (ItemNotFound)".to_string()
      }
    );
}

#[tokio::test]
async fn test_export_polls_until_succeeded_then_downloads()
{   let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path(format!("{}/reports/{}/ExportTo", GROUP_PATH, REPORT)))
      .and(header("authorization", "Bearer tok-123"))
      .and(body_json(json!({ "format": "PDF" })))
      .respond_with(ResponseTemplate::new(202).set_body_json(json!({
        "id": "exp-7", "status": "NotStarted", "percentComplete": 0
      })))
      .expect(1)
      .mount(&server)
      .await;

    let status_path = format!("{}/reports/{}/exports/exp-7", GROUP_PATH, REPORT);
    // Mounted first, so it answers the first two polls
    Mock::given(method("GET"))
      .and(path(status_path.clone()))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "id": "exp-7", "status": "Running", "percentComplete": 40
      })))
      .up_to_n_times(2)
      .expect(2)
      .mount(&server)
      .await;
    Mock::given(method("GET"))
      .and(path(status_path.clone()))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "id": "exp-7", "status": "Succeeded", "percentComplete": 100
      })))
      .expect(1)
      .mount(&server)
      .await;
    Mock::given(method("GET"))
      .and(path(format!("{}/file", status_path)))
      .respond_with(
        ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.7 fake".to_vec())
      )
      .expect(1)
      .mount(&server)
      .await;

    let client = PowerBiClient::new(config_for(&server));
    let bytes = assert_ok!(
      client.export_report(&token(), REPORT, ExportFormat::Pdf).await
    );
    assert_eq!(bytes, b"%PDF-1.7 fake".to_vec());
}

#[tokio::test]
async fn test_failed_export_stops_polling()
{   let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path(format!("{}/reports/{}/exports/exp-8", GROUP_PATH, REPORT)))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "id": "exp-8", "status": "Failed"
      })))
      .expect(1)
      .mount(&server)
      .await;

    let client = PowerBiClient::new(config_for(&server));
    let err = assert_err!(
      client.wait_for_export(&token(), REPORT, "exp-8").await
    );
    assert_eq!(err, Error::ExportFailed("exp-8".to_string()));
}

#[tokio::test]
async fn test_export_gives_up_after_max_polls()
{   let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path(format!("{}/reports/{}/exports/exp-9", GROUP_PATH, REPORT)))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "id": "exp-9", "status": "Running"
      })))
      .expect(3)
      .mount(&server)
      .await;

    let client = PowerBiClient::new(config_for(&server).with_max_polls(3));
    let err = assert_err!(
      client.wait_for_export(&token(), REPORT, "exp-9").await
    );
    assert_eq!(err, Error::ExportTimedOut(3));
}

#[tokio::test]
async fn test_unknown_status_keeps_polling()
{   let server = MockServer::start().await;
    let status_path = format!("{}/reports/{}/exports/exp-10", GROUP_PATH, REPORT);
    Mock::given(method("GET"))
      .and(path(status_path.clone()))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "id": "exp-10", "status": "Queued"
      })))
      .up_to_n_times(1)
      .mount(&server)
      .await;
    Mock::given(method("GET"))
      .and(path(status_path))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "id": "exp-10", "status": "Succeeded"
      })))
      .mount(&server)
      .await;

    let client = PowerBiClient::new(config_for(&server));
    let job = assert_ok!(
      client.wait_for_export(&token(), REPORT, "exp-10").await
    );
    assert_eq!(job.status, ExportStatus::Succeeded);
}

#[test]
fn test_config_from_lookup()
{   let vars: HashMap<&str, &str> = [
      ("TENANT_ID", "t")
    , ("CLIENT_ID", "c")
    , ("CLIENT_SECRET", "s")
    , ("WORKSPACE_ID", "w")
    , (REPORT_ID_VAR, "r")
    ].into_iter().collect();

    let config = assert_ok!(PowerBiConfig::from_lookup(
      |name: &str| vars.get(name).map(|v| v.to_string())
    ));
    assert_eq!(config.workspace_id(), "w");
    assert_eq!(config.report_id(), Some("r"));
    assert_eq!(
      assert_ok!(config.token_url()).as_str()
    , "https://login.microsoftonline.com/t/oauth2/v2.0/token"
    );
    assert_eq!(
      assert_ok!(config.workspace_url(&["reports", "r"])).as_str()
    , "https://api.powerbi.com/v1.0/myorg/groups/w/reports/r"
    );
    assert!(!format!("{:?}", config).contains("\"s\""));
}

#[test]
fn test_config_requires_client_secret()
{   let err = assert_err!(PowerBiConfig::from_lookup(|name: &str| {
      match name
      {   "TENANT_ID" | "CLIENT_ID" | "WORKSPACE_ID" => Some("x".to_string())
        , _ => None
      }
    }));
    assert_eq!(err, Error::MissingApiKey(CLIENT_SECRET_VAR.to_string()));
}

#[test]
fn test_export_format_parsing()
{   assert_eq!(assert_ok!("PDF".parse::<ExportFormat>()), ExportFormat::Pdf);
    assert_eq!(assert_ok!("pptx".parse::<ExportFormat>()), ExportFormat::Pptx);
    assert_eq!(ExportFormat::Png.extension(), "png");
    assert!(matches!(
      "docx".parse::<ExportFormat>()
    , Err(Error::InvalidConfiguration(_))
    ));
}
