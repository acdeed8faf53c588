// GET handlers: version, api/history

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;

use super::AppState;
use crate::query::HistoryQuery;
use crate::version::{NAME, VERSION};

/// GET /version — returns service name and version (from Cargo.toml at build time).
pub(super) async fn version_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "name": NAME,
        "version": VERSION,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct HistoryParams {
    system_id: String,
    configuration_id: String,
    /// Unix ms, inclusive.
    from: i64,
    /// Unix ms, exclusive.
    to: i64,
    points: Option<u32>,
    #[serde(default)]
    include_aggregated_result: bool,
}

/// GET /api/history — bucketed history for one assignment.
pub(super) async fn history_handler(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> impl IntoResponse {
    if params.to <= params.from {
        return (StatusCode::BAD_REQUEST, "to must be after from").into_response();
    }
    let query = HistoryQuery {
        system_id: params.system_id,
        configuration_id: params.configuration_id,
        start: params.from,
        end: params.to,
        target_points: params.points,
    };
    match state
        .query_engine
        .get_aggregated_history(&query, params.include_aggregated_result)
        .await
    {
        Ok(history) => axum::Json(history).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "history query failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "history query failed").into_response()
        }
    }
}
