use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use lodestone_core::{Metrics, SearchHit, SearchService};

#[derive(Clone)]
pub struct AppState {
    pub search: Arc<SearchService>,
    pub metrics: Arc<Metrics>,
    pub default_top_k: usize,
}

#[derive(Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
    pub k: Option<usize>,
}

pub fn build_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/search", get(search_handler))
        .route("/healthz", get(|| async { "ok" }))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
        .layer(cors)
}

/// Returns the ranked results as a bare JSON array. Search itself never
/// fails; empty or unmatched queries yield `[]`.
async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Json<Vec<SearchHit>> {
    let start = Instant::now();
    let top_k = params.k.unwrap_or(state.default_top_k).clamp(1, 100);
    let results = state.search.search(&params.q, top_k);
    info!(
        q = %params.q,
        count = results.len(),
        latency_ms = start.elapsed().as_millis() as u64,
        "search"
    );
    state.metrics.observe_search("ok", start.elapsed());
    Json(results)
}

async fn metrics_handler(State(state): State<AppState>) -> String {
    state.metrics.render()
}
