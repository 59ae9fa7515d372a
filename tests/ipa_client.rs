//! Integration tests for the FreeIPA JSON-RPC client using wiremock.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_json, body_partial_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use freeipa_provider::schema::DiagnosticSeverity;
use freeipa_provider::testing::ProviderTester;
use freeipa_provider::{
    BackoffPolicy, DirectoryClient, FreeIpaProvider, IpaClient, ProviderConfig, ProviderError,
    ProviderService,
};

const SESSION_COOKIE: &str = "ipa_session=MagBearerToken%3Dabc123";

// =============================================================================
// Test Helpers
// =============================================================================

fn config(server: &MockServer) -> ProviderConfig {
    ProviderConfig::new(server.uri(), "admin", "Secret123").with_replication_timeout(Duration::ZERO)
}

async fn mount_login(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/ipa/session/login_password"))
        .and(body_string_contains("user=admin"))
        .and(body_string_contains("password=Secret123"))
        .and(header("referer", format!("{}/ipa", server.uri()).as_str()))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", format!("{}; Path=/ipa; HttpOnly", SESSION_COOKIE).as_str()),
        )
        .mount(server)
        .await;
}

fn rpc_result(result: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "result": result,
        "error": null,
        "id": 0,
        "principal": "admin@EXAMPLE.COM",
        "version": "4.10.1"
    }))
}

fn rpc_error(code: i64, name: &str, message: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "result": null,
        "error": {"code": code, "name": name, "message": message, "data": {}},
        "id": 0,
        "principal": "admin@EXAMPLE.COM",
        "version": "4.10.1"
    }))
}

fn service_result(name: &str) -> serde_json::Value {
    json!({
        "result": {
            "dn": format!("krbprincipalname={}@EXAMPLE.COM,cn=services,cn=accounts,dc=example,dc=com", name),
            "krbcanonicalname": [format!("{}@EXAMPLE.COM", name)],
            "krbprincipalname": [format!("{}@EXAMPLE.COM", name)],
            "managedby_host": ["web.example.com"]
        },
        "value": format!("{}@EXAMPLE.COM", name),
        "summary": null
    })
}

// =============================================================================
// Session Tests
// =============================================================================

#[tokio::test]
async fn test_login_and_show_uses_session_cookie() {
    let server = MockServer::start().await;
    mount_login(&server).await;

    Mock::given(method("POST"))
        .and(path("/ipa/session/json"))
        .and(header("cookie", SESSION_COOKIE))
        .and(body_json(json!({
            "id": 0,
            "method": "service_show",
            "params": [["HTTP/web.example.com"], {"version": "2.251"}]
        })))
        .respond_with(rpc_result(service_result("HTTP/web.example.com")))
        .expect(1)
        .mount(&server)
        .await;

    let client = IpaClient::connect(&config(&server)).await.unwrap();
    let entry = client.service_show("HTTP/web.example.com").await.unwrap();

    assert_eq!(
        entry.krbcanonicalname,
        vec!["HTTP/web.example.com@EXAMPLE.COM".to_string()]
    );
    assert_eq!(entry.managedby_host, vec!["web.example.com".to_string()]);
}

#[tokio::test]
async fn test_login_rejected() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/ipa/session/login_password"))
        .respond_with(
            ResponseTemplate::new(401).insert_header("x-ipa-rejection-reason", "invalid-password"),
        )
        .mount(&server)
        .await;

    let err = IpaClient::connect(&config(&server)).await.unwrap_err();
    match err {
        ProviderError::PermissionDenied(msg) => assert!(msg.contains("invalid-password")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_server_error_is_unavailable() {
    let server = MockServer::start().await;
    mount_login(&server).await;

    Mock::given(method("POST"))
        .and(path("/ipa/session/json"))
        .respond_with(ResponseTemplate::new(503).set_body_string("Service Unavailable"))
        .mount(&server)
        .await;

    let client = IpaClient::connect(&config(&server)).await.unwrap();
    let err = client.service_show("HTTP/web.example.com").await.unwrap_err();
    assert!(matches!(err, ProviderError::Unavailable(_)));
}

#[tokio::test]
async fn test_expired_session_logs_in_again() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/ipa/session/login_password"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", format!("{}; Path=/ipa; HttpOnly", SESSION_COOKIE).as_str()),
        )
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/ipa/session/json"))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/ipa/session/json"))
        .respond_with(rpc_result(service_result("HTTP/web.example.com")))
        .expect(1)
        .mount(&server)
        .await;

    let client = IpaClient::connect(&config(&server)).await.unwrap();
    let entry = client.service_show("HTTP/web.example.com").await.unwrap();
    assert_eq!(entry.managedby_host, vec!["web.example.com".to_string()]);
}

#[tokio::test]
async fn test_session_rejected_after_fresh_login() {
    let server = MockServer::start().await;
    mount_login(&server).await;

    Mock::given(method("POST"))
        .and(path("/ipa/session/json"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;

    let client = IpaClient::connect(&config(&server)).await.unwrap();
    let err = client.service_show("HTTP/web.example.com").await.unwrap_err();
    assert!(matches!(err, ProviderError::PermissionDenied(_)));
}

// =============================================================================
// TLS Option Tests
// =============================================================================

#[tokio::test]
async fn test_missing_ca_certificate_is_configuration_error() {
    let server = MockServer::start().await;
    let mut config = config(&server);
    config.ca_certificate = Some("/nonexistent/freeipa/ca.crt".into());

    let err = IpaClient::connect(&config).await.unwrap_err();
    match err {
        ProviderError::Configuration(msg) => assert!(msg.contains("/nonexistent/freeipa/ca.crt")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_invalid_ca_certificate_is_configuration_error() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ca.crt");
    std::fs::write(&path, "this is not a certificate").unwrap();

    let mut config = config(&server);
    config.ca_certificate = Some(path);

    let err = IpaClient::connect(&config).await.unwrap_err();
    assert!(matches!(err, ProviderError::Configuration(_)));
}

#[tokio::test]
async fn test_insecure_configure_warns() {
    let server = MockServer::start().await;
    mount_login(&server).await;

    let provider = FreeIpaProvider::new();
    let diagnostics = provider
        .configure(json!({
            "host": server.uri(),
            "username": "admin",
            "password": "Secret123",
            "insecure": true
        }))
        .await
        .unwrap();

    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].severity, DiagnosticSeverity::Warning);
    assert_eq!(diagnostics[0].attribute.as_deref(), Some("insecure"));
}

// =============================================================================
// Command Tests
// =============================================================================

#[tokio::test]
async fn test_service_add_sends_force() {
    let server = MockServer::start().await;
    mount_login(&server).await;

    Mock::given(method("POST"))
        .and(path("/ipa/session/json"))
        .and(body_json(json!({
            "id": 0,
            "method": "service_add",
            "params": [["HTTP/web.example.com"], {"force": true, "version": "2.251"}]
        })))
        .respond_with(rpc_result(service_result("HTTP/web.example.com")))
        .expect(1)
        .mount(&server)
        .await;

    let client = IpaClient::connect(&config(&server)).await.unwrap();
    client.service_add("HTTP/web.example.com", true).await.unwrap();
}

#[tokio::test]
async fn test_service_del_sends_name_list() {
    let server = MockServer::start().await;
    mount_login(&server).await;

    Mock::given(method("POST"))
        .and(path("/ipa/session/json"))
        .and(body_json(json!({
            "id": 0,
            "method": "service_del",
            "params": [[["HTTP/web.example.com"]], {"version": "2.251"}]
        })))
        .respond_with(rpc_result(json!({
            "result": {"failed": []},
            "value": ["HTTP/web.example.com"],
            "summary": "Deleted service \"HTTP/web.example.com\""
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = IpaClient::connect(&config(&server)).await.unwrap();
    client
        .service_del(&["HTTP/web.example.com".to_string()])
        .await
        .unwrap();
}

#[tokio::test]
async fn test_error_codes_are_mapped() {
    let server = MockServer::start().await;
    mount_login(&server).await;

    Mock::given(method("POST"))
        .and(path("/ipa/session/json"))
        .and(body_partial_json(json!({"method": "service_show"})))
        .respond_with(rpc_error(4001, "NotFound", "HTTP/web.example.com: service not found"))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/ipa/session/json"))
        .and(body_partial_json(json!({"method": "service_mod"})))
        .respond_with(rpc_error(4202, "EmptyModlist", "no modifications to be performed"))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/ipa/session/json"))
        .and(body_partial_json(json!({"method": "service_add"})))
        .respond_with(rpc_error(2100, "ACIError", "Insufficient access"))
        .mount(&server)
        .await;

    let client = IpaClient::connect(&config(&server)).await.unwrap();

    let err = client.service_show("HTTP/web.example.com").await.unwrap_err();
    assert!(err.is_not_found());

    let err = client.service_mod("HTTP/web.example.com").await.unwrap_err();
    assert!(matches!(err, ProviderError::EmptyModlist(_)));

    let err = client.service_add("HTTP/web.example.com", false).await.unwrap_err();
    match err {
        ProviderError::Directory { code, name, message } => {
            assert_eq!(code, 2100);
            assert_eq!(name, "ACIError");
            assert_eq!(message, "Insufficient access");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

// =============================================================================
// Provider Tests
// =============================================================================

#[tokio::test]
async fn test_provider_against_server() {
    let server = MockServer::start().await;
    mount_login(&server).await;

    Mock::given(method("POST"))
        .and(path("/ipa/session/json"))
        .and(body_partial_json(json!({"method": "service_add"})))
        .respond_with(rpc_result(service_result("HTTP/web.example.com")))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/ipa/session/json"))
        .and(body_partial_json(json!({"method": "service_show"})))
        .respond_with(rpc_result(service_result("HTTP/web.example.com")))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/ipa/session/json"))
        .and(body_partial_json(json!({"method": "service_del"})))
        .respond_with(rpc_result(json!({"result": {"failed": []}, "value": ["HTTP/web.example.com"]})))
        .expect(1)
        .mount(&server)
        .await;

    let tester = ProviderTester::new(FreeIpaProvider::new());
    tester
        .configure(json!({
            "host": server.uri(),
            "username": "admin",
            "password": "Secret123",
            "replication_timeout_secs": 0
        }))
        .await
        .unwrap();

    let state = tester
        .lifecycle_create(
            "freeipa_service",
            json!({"service": "HTTP", "host": "web.example.com"}),
        )
        .await
        .unwrap();
    assert_eq!(state["id"], "HTTP/web.example.com");

    tester.delete("freeipa_service", state).await.unwrap();
}

#[tokio::test]
async fn test_replication_override_applies_at_configure() {
    let server = MockServer::start().await;
    mount_login(&server).await;

    Mock::given(method("POST"))
        .and(path("/ipa/session/json"))
        .and(body_partial_json(json!({"method": "service_add"})))
        .respond_with(rpc_result(service_result("HTTP/web.example.com")))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/ipa/session/json"))
        .and(body_partial_json(json!({"method": "service_show"})))
        .respond_with(rpc_error(4001, "NotFound", "HTTP/web.example.com: service not found"))
        .expect(0)
        .mount(&server)
        .await;

    let provider = FreeIpaProvider::new().with_replication(BackoffPolicy::disabled());
    provider
        .configure(json!({
            "host": server.uri(),
            "username": "admin",
            "password": "Secret123",
            "replication_timeout_secs": 30
        }))
        .await
        .unwrap();

    let state = provider
        .create(
            "freeipa_service",
            json!({"service": "HTTP", "host": "web.example.com"}),
        )
        .await
        .unwrap();
    assert_eq!(state["id"], "HTTP/web.example.com");
}
