// HTTP routes: version + history query

mod http;

use axum::{Router, routing::get};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::query::QueryEngine;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) query_engine: Arc<QueryEngine>,
}

pub fn app(query_engine: Arc<QueryEngine>) -> Router {
    let state = AppState { query_engine };
    Router::new()
        .route("/version", get(http::version_handler)) // GET /version
        .route("/api/history", get(http::history_handler)) // GET /api/history
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}
