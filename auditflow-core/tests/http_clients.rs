//! HTTP-level tests for the UAA, Cloud Controller and Splunk clients
//!
//! Each test stands up a local canned responder and checks both the request
//! the client sent and how it interpreted the response.

mod common;

use auditflow_core::auth::Authenticator;
use auditflow_core::collector::{first_page_link, AuditEventClient, PageSource};
use auditflow_core::config::{CloudFoundryConfig, ShipperConfig, UaaConfig};
use auditflow_core::shipper::{EventSink, SplunkClient};
use auditflow_core::Error;
use common::{event_json, CannedServer};

fn uaa_config(server: &CannedServer) -> UaaConfig {
    UaaConfig {
        url: Some(server.url()),
        client_id: Some("auditflow".to_string()),
        client_secret: Some("s3cret".to_string()),
        ..Default::default()
    }
}

// ============================================
// Authenticator
// ============================================

#[tokio::test]
async fn test_client_credentials_exchange() {
    let server = CannedServer::start(vec![(
        200,
        r#"{"access_token":"tok-123","token_type":"bearer","expires_in":43199}"#.to_string(),
    )])
    .await;

    let mut auth = Authenticator::new(&uaa_config(&server)).unwrap();
    auth.authenticate().await.unwrap();
    assert_eq!(auth.access_token(), "tok-123");

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.method, "POST");
    assert_eq!(request.target, "/oauth/token");
    assert_eq!(request.header("authorization"), Some("Basic YXVkaXRmbG93OnMzY3JldA=="));
    assert_eq!(request.header("accept"), Some("application/json"));
    assert_eq!(
        request.header("content-type"),
        Some("application/x-www-form-urlencoded")
    );
    assert!(request.body.contains("grant_type=client_credentials"));
    assert!(request.body.contains("scopes=cloud_controller.admin_read_only"));
}

#[tokio::test]
async fn test_missing_access_token_is_auth_error() {
    let server = CannedServer::start(vec![(200, r#"{"token_type":"bearer"}"#.to_string())]).await;

    let mut auth = Authenticator::new(&uaa_config(&server)).unwrap();
    assert!(matches!(auth.authenticate().await, Err(Error::Auth(_))));
    assert_eq!(auth.access_token(), "");
}

#[tokio::test]
async fn test_rejected_credentials_are_auth_error() {
    let server = CannedServer::start(vec![(
        401,
        r#"{"error":"unauthorized","error_description":"Bad credentials"}"#.to_string(),
    )])
    .await;

    let mut auth = Authenticator::new(&uaa_config(&server)).unwrap();
    match auth.authenticate().await {
        Err(Error::Auth(msg)) => assert!(msg.contains("401")),
        other => panic!("expected auth error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unparseable_token_response_is_auth_error() {
    let server = CannedServer::start(vec![(200, "<html>login</html>".to_string())]).await;

    let mut auth = Authenticator::new(&uaa_config(&server)).unwrap();
    assert!(matches!(auth.authenticate().await, Err(Error::Auth(_))));
}

// ============================================
// Audit event client
// ============================================

#[tokio::test]
async fn test_fetch_page_sends_bearer_token() {
    let page = serde_json::json!({
        "pagination": { "next": { "href": "/v3/audit_events?order_by=-created_at&page=2&per_page=500" } },
        "resources": [event_json("g2", 1), event_json("g1", 2)]
    });
    let server = CannedServer::start(vec![(200, page.to_string())]).await;

    let config = CloudFoundryConfig {
        url: Some(server.url()),
        ..Default::default()
    };
    let client = AuditEventClient::new(&config, "tok-123").unwrap();
    let page = client.fetch_page(&first_page_link(500)).await.unwrap();

    assert_eq!(page.resources.len(), 2);
    assert_eq!(page.resources[0].guid, "g2");
    assert_eq!(
        page.next_link(),
        Some("/v3/audit_events?order_by=-created_at&page=2&per_page=500")
    );

    let requests = server.requests();
    assert_eq!(requests[0].method, "GET");
    assert_eq!(
        requests[0].target,
        "/v3/audit_events?order_by=-created_at&per_page=500"
    );
    assert_eq!(requests[0].header("authorization"), Some("bearer tok-123"));
}

#[tokio::test]
async fn test_error_status_is_transient_api_error() {
    let server = CannedServer::start(vec![(502, "bad gateway".to_string())]).await;

    let config = CloudFoundryConfig {
        url: Some(server.url()),
        ..Default::default()
    };
    let client = AuditEventClient::new(&config, "tok").unwrap();
    let err = client.fetch_page(&first_page_link(500)).await.unwrap_err();

    assert!(matches!(err, Error::Api(_)));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_malformed_page_is_transient_api_error() {
    let server = CannedServer::start(vec![(200, r#"{"resources": "nope"}"#.to_string())]).await;

    let config = CloudFoundryConfig {
        url: Some(server.url()),
        ..Default::default()
    };
    let client = AuditEventClient::new(&config, "tok").unwrap();
    let err = client.fetch_page(&first_page_link(500)).await.unwrap_err();
    assert!(err.is_transient());
}

// ============================================
// Splunk client
// ============================================

fn shipper_config(server: &CannedServer, max_retries: usize) -> ShipperConfig {
    ShipperConfig {
        url: Some(server.url()),
        token: Some("hec-token".to_string()),
        max_retries,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_deliver_posts_hec_envelopes() {
    let server = CannedServer::start(vec![(200, r#"{"text":"Success","code":0}"#.to_string())]).await;

    let client = SplunkClient::new(&shipper_config(&server, 0)).unwrap();
    let batch = vec![
        serde_json::to_vec(&event_json("g2", 1)).unwrap(),
        serde_json::to_vec(&event_json("g1", 2)).unwrap(),
    ];
    client.deliver(&batch).await.unwrap();

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.method, "POST");
    assert_eq!(request.target, "/services/collector/event");
    assert_eq!(request.header("authorization"), Some("Splunk hec-token"));
    assert!(request.header("x-splunk-request-channel").is_some());

    let lines: Vec<serde_json::Value> = request
        .body
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["event"]["guid"], "g2");
    assert_eq!(lines[1]["sourcetype"], "cf:audit");
}

#[tokio::test]
async fn test_deliver_retries_server_errors() {
    let server = CannedServer::start(vec![
        (503, r#"{"text":"Server is busy","code":9}"#.to_string()),
        (200, r#"{"text":"Success","code":0}"#.to_string()),
    ])
    .await;

    let client = SplunkClient::new(&shipper_config(&server, 1)).unwrap();
    client.deliver(&[b"{}".to_vec()]).await.unwrap();
    assert_eq!(server.requests().len(), 2);
}

#[tokio::test]
async fn test_deliver_does_not_retry_bad_token() {
    let server = CannedServer::start(vec![
        (403, r#"{"text":"Invalid token","code":4}"#.to_string()),
        (200, r#"{"text":"Success","code":0}"#.to_string()),
    ])
    .await;

    let client = SplunkClient::new(&shipper_config(&server, 3)).unwrap();
    let err = client.deliver(&[b"{}".to_vec()]).await.unwrap_err();
    assert!(err.to_string().contains("403"));
    assert_eq!(server.requests().len(), 1);
}
