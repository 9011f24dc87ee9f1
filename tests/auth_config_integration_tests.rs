//! Workspace auth config resolution over HTTP

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tre_controlplane::config::TreConfig;
use tre_controlplane::workspaces::{AuthConfigError, TreApiClient, WorkspaceAuthConfigService};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const WORKSPACE_ID: &str = "0d4f4f1e-8a2b-4c6d-9e0f-1a2b3c4d5e6f";

async fn mock_workspace(server: &MockServer, properties: serde_json::Value, expected_calls: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/api/workspaces/{WORKSPACE_ID}")))
        .and(header("authorization", "Bearer core-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "workspace": {"id": WORKSPACE_ID, "properties": properties}
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

fn service(server: &MockServer, ttl: Duration) -> WorkspaceAuthConfigService {
    let client = TreApiClient::new(reqwest::Client::new(), server.uri());
    WorkspaceAuthConfigService::new(
        Arc::new(client),
        "https://login.microsoftonline.com",
        Some("tre-tenant".to_string()),
        ttl,
        100,
    )
}

#[tokio::test]
async fn test_auth_config_derived_and_cached() {
    let server = MockServer::start().await;
    mock_workspace(
        &server,
        json!({"client_id": "ws-client", "scope_id": "api://ws-client", "auth_tenant_id": "ws-tenant"}),
        1,
    )
    .await;

    let service = service(&server, Duration::from_secs(300));
    let first = service
        .get_workspace_auth_config(WORKSPACE_ID, "core-token")
        .await
        .unwrap();
    let second = service
        .get_workspace_auth_config(WORKSPACE_ID, "core-token")
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(first.client_id(), "ws-client");
    assert_eq!(first.scope_id(), "api://ws-client");
    assert_eq!(first.issuer(), "https://login.microsoftonline.com/ws-tenant/v2.0");
    assert_eq!(
        first.jwks_endpoint(),
        "https://login.microsoftonline.com/ws-tenant/discovery/v2.0/keys"
    );
}

#[tokio::test]
async fn test_json_shape_uses_camel_case() {
    let server = MockServer::start().await;
    mock_workspace(&server, json!({"client_id": "c", "scope_id": "s"}), 1).await;

    let config = service(&server, Duration::from_secs(300))
        .get_workspace_auth_config(WORKSPACE_ID, "core-token")
        .await
        .unwrap();

    assert_eq!(
        serde_json::to_value(&config).unwrap(),
        json!({
            "clientId": "c",
            "scopeId": "s",
            "issuer": "https://login.microsoftonline.com/tre-tenant/v2.0",
            "jwksEndpoint": "https://login.microsoftonline.com/tre-tenant/discovery/v2.0/keys"
        })
    );
}

#[tokio::test]
async fn test_expired_entries_are_refetched() {
    let server = MockServer::start().await;
    mock_workspace(&server, json!({"client_id": "c", "scope_id": "s"}), 2).await;

    let service = service(&server, Duration::from_millis(200));
    service
        .get_workspace_auth_config(WORKSPACE_ID, "core-token")
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    service
        .get_workspace_auth_config(WORKSPACE_ID, "core-token")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_clear_all_cache_forces_refetch() {
    let server = MockServer::start().await;
    mock_workspace(&server, json!({"client_id": "c", "scope_id": "s"}), 2).await;

    let service = service(&server, Duration::from_secs(300));
    service
        .get_workspace_auth_config(WORKSPACE_ID, "core-token")
        .await
        .unwrap();
    service.clear_all_cache();
    service
        .get_workspace_auth_config(WORKSPACE_ID, "core-token")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_api_failure_surfaces_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/api/workspaces/{WORKSPACE_ID}")))
        .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
        .mount(&server)
        .await;

    let err = service(&server, Duration::from_secs(300))
        .get_workspace_auth_config(WORKSPACE_ID, "core-token")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthConfigError::Workspace(_)));
    assert!(err.to_string().contains("401"));
}

#[tokio::test]
async fn test_from_config_without_tenant_fails_for_tenantless_workspace() {
    let server = MockServer::start().await;
    mock_workspace(&server, json!({"client_id": "c"}), 1).await;

    let mut config = TreConfig::default();
    config.api.base_url = server.uri();
    let client = TreApiClient::from_config(&config.api, &config.http).unwrap();
    let service = WorkspaceAuthConfigService::from_config(Arc::new(client), &config);

    assert!(matches!(
        service
            .get_workspace_auth_config(WORKSPACE_ID, "core-token")
            .await,
        Err(AuthConfigError::MissingTenant { .. })
    ));
}
