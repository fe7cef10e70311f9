//! HTTP contract tests for the RHSM client
//!
//! Tests cover:
//! - Refresh token exchange (success and rejected token)
//! - 404 on lookups, 401 on any call
//! - Export job status mapping (202 pending, 200 ready)
//! - Manifest download with the bearer token
//! - A full manifest export against a mocked API
//! - GET-only retries

use std::sync::Arc;
use std::time::Duration;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use rhsm_provider::rhsm_models::ExportJobStatus;
use rhsm_provider::{ExportPolicy, ManifestExporter, RhsmApi, RhsmClient, RhsmConfig, RhsmError};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ALLOC: &str = "11111111-1111-1111-1111-111111111111";
const API: &str = "/management/v1";

fn config(server: &MockServer) -> RhsmConfig {
    let mut cfg = RhsmConfig::new("offline-token");
    cfg.api_url = format!("{}{API}", server.uri());
    cfg.token_url = format!("{}/token", server.uri());
    cfg.timeout_ms = 5_000;
    cfg
}

fn client(server: &MockServer) -> RhsmClient {
    RhsmClient::with_access_token(config(server), "access-1").unwrap()
}

fn allocation_body() -> serde_json::Value {
    json!({
        "body": {
            "uuid": ALLOC,
            "name": "sat-prod",
            "type": "Satellite",
            "version": "6.14",
            "createdDate": "2024-01-01T00:00:00.000Z",
            "createdBy": "admin",
            "lastModified": "2024-02-01T00:00:00.000Z",
            "entitlementsAttachedQuantity": 5,
            "entitlementsAttached": {
                "reason": "",
                "valid": true,
                "value": [{
                    "id": "ent-1",
                    "sku": "RH00001",
                    "contractNumber": "12345",
                    "entitlementQuantity": 5
                }]
            }
        }
    })
}

#[tokio::test]
async fn test_connect_exchanges_refresh_token() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("client_id=rhsm-api"))
        .and(body_string_contains("refresh_token=offline-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access-1",
            "token_type": "Bearer",
            "expires_in": 900
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("{API}/allocations/{ALLOC}")))
        .and(query_param("include", "entitlements"))
        .and(header("authorization", "Bearer access-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(allocation_body()))
        .expect(1)
        .mount(&server)
        .await;

    let client = RhsmClient::connect(config(&server)).await.unwrap();
    let alloc = client.show_allocation(ALLOC).await.unwrap().unwrap();

    assert_eq!(alloc.name, "sat-prod");
    assert_eq!(alloc.allocation_type, "Satellite");
    assert_eq!(alloc.entitlements_attached_quantity, 5);
    assert_eq!(alloc.entitlements()[0].contract_number, "12345");
}

#[tokio::test]
async fn test_rejected_refresh_token_is_auth_expired() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Offline user session not found"
        })))
        .mount(&server)
        .await;

    let err = RhsmClient::connect(config(&server)).await.err().unwrap();
    assert!(matches!(err, RhsmError::AuthExpired { .. }));
}

#[tokio::test]
async fn test_missing_allocation_is_none() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(format!("{API}/allocations/{ALLOC}")))
        .respond_with(ResponseTemplate::new(404).set_body_string("{}"))
        .mount(&server)
        .await;

    assert!(client(&server).show_allocation(ALLOC).await.unwrap().is_none());
}

#[tokio::test]
async fn test_unauthorized_is_auth_expired() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(format!("{API}/cloud_access_providers/enabled")))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = client(&server)
        .list_enabled_cloud_access_providers()
        .await
        .unwrap_err();
    assert!(matches!(err, RhsmError::AuthExpired { .. }));
}

#[tokio::test]
async fn test_export_job_status_mapping() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(format!("{API}/allocations/{ALLOC}/exportJob/job-pending")))
        .respond_with(ResponseTemplate::new(202))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("{API}/allocations/{ALLOC}/exportJob/job-ready")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "body": { "exportID": "exp-1", "href": "https://example.invalid/manifest.zip" }
        })))
        .mount(&server)
        .await;

    let client = client(&server);
    assert_eq!(
        client.export_job_status(ALLOC, "job-pending").await.unwrap(),
        ExportJobStatus::Pending
    );
    assert_eq!(
        client.export_job_status(ALLOC, "job-ready").await.unwrap(),
        ExportJobStatus::Ready {
            href: "https://example.invalid/manifest.zip".to_string()
        }
    );
}

#[tokio::test]
async fn test_download_uses_bearer_token() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/files/manifest.zip"))
        .and(header("authorization", "Bearer access-1"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"PK\x03\x04".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/files/broken.zip"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = client(&server);
    let bytes = client
        .download_manifest(&format!("{}/files/manifest.zip", server.uri()))
        .await
        .unwrap();
    assert_eq!(bytes, b"PK\x03\x04");

    let err = client
        .download_manifest(&format!("{}/files/broken.zip", server.uri()))
        .await
        .unwrap_err();
    assert!(matches!(err, RhsmError::DownloadFailed { .. }));
}

#[tokio::test]
async fn test_manifest_export_end_to_end() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(format!("{API}/allocations/{ALLOC}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(allocation_body()))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("{API}/allocations/{ALLOC}/export")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "body": { "exportJobID": "job-9", "href": format!("/allocations/{ALLOC}/exportJob/job-9") }
        })))
        .expect(1)
        .mount(&server)
        .await;

    // Two pending answers, then ready.
    Mock::given(method("GET"))
        .and(path(format!("{API}/allocations/{ALLOC}/exportJob/job-9")))
        .respond_with(ResponseTemplate::new(202))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("{API}/allocations/{ALLOC}/exportJob/job-9")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "body": { "exportID": "exp-9", "href": format!("/allocations/{ALLOC}/export/exp-9") }
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("{API}/allocations/{ALLOC}/export/exp-9")))
        .and(header("authorization", "Bearer access-1"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"manifest-bytes".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let api: Arc<dyn RhsmApi> = Arc::new(client(&server));
    let exporter = ManifestExporter::new(
        api,
        ExportPolicy::fixed(Duration::from_millis(10), Duration::from_secs(5)),
    );

    let export = exporter
        .export(ALLOC, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(export.polls, 3);
    assert_eq!(export.export_job_id, "job-9");
    assert_eq!(export.manifest, STANDARD.encode(b"manifest-bytes"));
    assert_eq!(export.manifest_last_modified, "2024-02-01T00:00:00.000Z");
}

#[tokio::test]
async fn test_get_is_retried_but_post_is_not() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(format!("{API}/allocations/{ALLOC}/pools")))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("{API}/allocations/{ALLOC}/pools")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "body": [{ "id": "pool-A", "sku": "RH00001", "contractNumber": "12345", "entitlementsAvailable": 10 }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(format!("{API}/allocations/{ALLOC}/entitlements")))
        .and(query_param("pool", "pool-A"))
        .and(query_param("quantity", "5"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let mut cfg = config(&server);
    cfg.retry_max = 2;
    cfg.retry_backoff_ms = 1;
    let client = RhsmClient::with_access_token(cfg, "access-1").unwrap();

    let pools = client.list_allocation_pools(ALLOC, false).await.unwrap();
    assert_eq!(pools[0].sku, "RH00001");

    let err = client
        .attach_entitlement(ALLOC, "pool-A", 5)
        .await
        .unwrap_err();
    match err {
        RhsmError::Api { status, .. } => assert_eq!(status.as_u16(), 503),
        other => panic!("expected api error, got {other:?}"),
    }
}
