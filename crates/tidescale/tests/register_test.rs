//! registration endpoint behaviour over http.

mod common;

use axum::http::StatusCode;
use tidescale_proto::{CapabilityVersion, RegisterRequest, RegisterResponse};
use tidescale_types::{AuthKeyToken, MachineKey, NodeKey, RegistrationId};

use common::{TestServer, json_body, register_request, text_body};

#[tokio::test]
async fn test_register_with_auth_key() {
    let server = TestServer::new().await;
    let token = server.auth_key(|k| k.pre_authorized = true).await;
    let client = server.join("laptop", &token).await;

    let node = server.node(&client).await;
    assert_eq!(node.name(), "laptop");
    assert_eq!(node.user_id(), server.user.id);
    assert!(node.ipv4().is_some());
    assert!(node.ipv6().is_some());
}

#[tokio::test]
async fn test_register_response_names_user() {
    let server = TestServer::new().await;
    let token = server.auth_key(|_| {}).await;
    let req = register_request(NodeKey::random(), "laptop", Some(&token));
    let response = server
        .post("/machine/register", Some(MachineKey::random()), &req)
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let resp: RegisterResponse = json_body(response).await;
    assert_eq!(resp.user.login_name, "alice@example.com");
    assert!(resp.auth_url.is_empty());
}

#[tokio::test]
async fn test_unknown_auth_key_is_rejected() {
    let server = TestServer::new().await;
    let token = AuthKeyToken::generate();
    let req = register_request(NodeKey::random(), "laptop", Some(&token));
    let response = server
        .post("/machine/register", Some(MachineKey::random()), &req)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unauthenticated_connection_is_rejected() {
    let server = TestServer::new().await;
    let token = server.auth_key(|_| {}).await;
    let req = register_request(NodeKey::random(), "laptop", Some(&token));
    let response = server.post("/machine/register", None, &req).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_old_client_must_upgrade() {
    let server = TestServer::new().await;
    let token = server.auth_key(|_| {}).await;
    let req = RegisterRequest {
        version: CapabilityVersion(CapabilityVersion::MIN.0 - 1),
        ..register_request(NodeKey::random(), "laptop", Some(&token))
    };
    let response = server
        .post("/machine/register", Some(MachineKey::random()), &req)
        .await;
    assert_eq!(response.status(), StatusCode::UPGRADE_REQUIRED);
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let server = TestServer::new().await;
    let response = server
        .post("/machine/register", Some(MachineKey::random()), &"not a request")
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_interactive_registration_is_pending() {
    let server = TestServer::new().await;
    let req = register_request(NodeKey::random(), "laptop", None);
    let response = server
        .post("/machine/register", Some(MachineKey::random()), &req)
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let resp: RegisterResponse = json_body(response).await;
    assert!(!resp.machine_authorized);
    assert!(resp.auth_url.starts_with("https://ts.example.com/a/"));

    let path = resp.auth_url.trim_start_matches("https://ts.example.com");
    let page = server.get(path).await;
    assert_eq!(page.status(), StatusCode::OK);
    assert!(text_body(page).await.contains("pending"));
}

#[tokio::test]
async fn test_unknown_registration_code() {
    let server = TestServer::new().await;
    let page = server.get("/a/doesnotexist").await;
    assert_eq!(page.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_interactive_registration_completes_on_followup() {
    let server = TestServer::new().await;
    let machine_key = MachineKey::random();
    let node_key = NodeKey::random();

    let req = register_request(node_key, "laptop", None);
    let resp: RegisterResponse =
        json_body(server.post("/machine/register", Some(machine_key), &req).await).await;
    let code = resp.auth_url.rsplit('/').next().unwrap().to_string();

    server
        .state
        .registrar
        .complete_registration(&RegistrationId::from(code.clone()), server.user.id)
        .await
        .unwrap();
    let page = server.get(&format!("/a/{code}")).await;
    assert!(text_body(page).await.contains("complete"));

    let followup = RegisterRequest {
        followup: resp.auth_url.clone(),
        ..register_request(node_key, "laptop", None)
    };
    let response = server
        .post("/machine/register", Some(machine_key), &followup)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let resp: RegisterResponse = json_body(response).await;
    assert!(resp.machine_authorized);
    assert_eq!(resp.user.login_name, "alice@example.com");
}
