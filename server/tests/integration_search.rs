use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use lodestone_core::{
    Document, InvertedIndex, Metrics, SearchService, SemanticIndex, SemanticOptions,
};
use lodestone_server::{build_app, AppState};

fn test_app() -> Router {
    let index = Arc::new(InvertedIndex::new());
    let semantic = Arc::new(SemanticIndex::new(SemanticOptions {
        dimension: 64,
        hyperplane_count: 16,
        seed: 99,
    }));
    for doc in [
        Document::new(
            "doc-vectors",
            "https://example.com/vectors",
            "Vector Search",
            "Vector search uses embeddings and approximate nearest neighbors.",
        ),
        Document::new(
            "doc-breakers",
            "https://example.com/breakers",
            "Circuit Breakers",
            "Circuit breakers protect distributed systems from cascading failures.",
        ),
    ] {
        index.add_document(doc.clone());
        semantic.add_document(&doc);
    }

    build_app(AppState {
        search: Arc::new(SearchService::new(index, Some(semantic))),
        metrics: Arc::new(Metrics::new()),
        default_top_k: 10,
    })
}

async fn get(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, body.to_vec())
}

#[tokio::test]
async fn search_returns_ranked_json_array() {
    let (status, body) = get(test_app(), "/search?q=vector%20search&k=5").await;
    assert_eq!(status, StatusCode::OK);

    let json: Value = serde_json::from_slice(&body).unwrap();
    let results = json.as_array().unwrap();
    assert!(!results.is_empty());
    assert_eq!(results[0]["doc_id"], "doc-vectors");
    assert_eq!(results[0]["title"], "Vector Search");
    assert_eq!(results[0]["url"], "https://example.com/vectors");
    assert!(results[0]["score"].as_f64().unwrap() > 0.0);
    assert!(results[0]["snippet"].as_str().unwrap().contains("search"));
}

#[tokio::test]
async fn unmatched_and_empty_queries_yield_empty_arrays() {
    let (status, body) = get(test_app(), "/search?q=zzznothing").await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert!(json.as_array().unwrap().is_empty());

    let (status, body) = get(test_app(), "/search?q=").await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert!(json.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn health_endpoint_responds() {
    let (status, body) = get(test_app(), "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"ok");
}

#[tokio::test]
async fn metrics_endpoint_counts_search_requests() {
    let app = test_app();
    let response = app
        .clone()
        .oneshot(
            Request::get("/search?q=vector")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let (status, body) = get(app, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(body).unwrap();
    assert!(text.contains(r#"search_requests_total{status="ok"} 1"#));
    assert!(text.contains("search_latency_seconds_count 1"));
}
