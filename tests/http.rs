// Router-level tests exercising the shipped contract document and the
// global middleware stack through tower's oneshot driver.
mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

use admin_api_rust::app;
use admin_api_rust::contract::ContractDocument;
use admin_api_rust::database::SchemaGuard;
use admin_api_rust::pipeline::{Pipeline, ValidationPolicy};

use common::*;

async fn test_router() -> axum::Router {
    let contract = Arc::new(
        ContractDocument::from_file("openapi.yaml")
            .unwrap()
            .compile()
            .unwrap(),
    );
    let store = StubSchemaStore::at_version(1);
    let guard = Arc::new(SchemaGuard::new(store).await.unwrap());
    let pipeline = Arc::new(Pipeline::new(
        contract,
        test_gate(),
        Some(guard),
        Arc::new(CountingBroker::new()),
        ValidationPolicy::default(),
    ));
    app::router(pipeline)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn root_reports_service_metadata_with_no_cache() {
    let router = test_router().await;
    let response = router
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CACHE_CONTROL).unwrap(),
        "no-cache, no-store, max-age=1"
    );

    let body = body_json(response).await;
    assert_eq!(body["name"], "Admin API");
    assert!(body["apiVersion"].is_string());
    assert!(body["serverVersion"].is_string());
}

#[tokio::test]
async fn status_reports_store_health() {
    let router = test_router().await;
    let response = router
        .oneshot(Request::builder().uri("/api/v1/status").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], true);
    assert_eq!(body["schemaVersion"], 1);
}

#[tokio::test]
async fn session_requires_credentials() {
    let router = test_router().await;
    let response = router
        .oneshot(Request::builder().uri("/api/v1/session").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["message"], "Access denied");
    assert_eq!(body["error"], "credentials_missing");
}

#[tokio::test]
async fn session_resolves_bearer_identity() {
    let router = test_router().await;
    let (token, _) = issue_session("admin");

    let response = router
        .oneshot(
            Request::builder()
                .uri("/api/v1/session")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["username"], "admin");
    assert!(body["session"].is_string());
}

#[tokio::test]
async fn unknown_route_is_not_served() {
    let router = test_router().await;
    let response = router
        .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
