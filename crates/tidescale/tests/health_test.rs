mod common;

use axum::http::{StatusCode, header};

use common::{TestServer, json_body};

#[tokio::test]
async fn test_health_endpoint() {
    let server = TestServer::new().await;
    let response = server.get("/health").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/health+json; charset=utf-8"
    );

    let body: serde_json::Value = json_body(response).await;
    assert_eq!(body["status"], "pass");
}
