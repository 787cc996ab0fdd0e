//! Request handlers for the public endpoints.

use std::collections::HashMap;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde_json::json;
use tracing::warn;

use super::{gate, AppState};
use crate::fixtures;

/// Protected search endpoint.
///
/// The gate has already admitted the request by the time this handler runs.
/// The payload itself is fixture data standing in for the upstream API.
pub async fn search(Query(params): Query<HashMap<String, String>>) -> Response {
    let query = params.get("q").cloned().unwrap_or_default();
    Json(fixtures::search_results(&query)).into_response()
}

/// Read-only window status for the calling client.
///
/// Applies the same credential and availability screening as the gate, but
/// never consumes quota: the projection is load-only and persists nothing.
pub async fn rate_limit_status(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if !state.engine.store_ready().await {
        return gate::store_unavailable();
    }

    let Some(client_id) = gate::client_key(&headers) else {
        return gate::bad_authentication();
    };

    match state.engine.peek(&client_id, Utc::now().timestamp()).await {
        Ok(status) => Json(status).into_response(),
        Err(e) => {
            warn!(error = %e, "Window status projection failed");
            gate::store_unavailable()
        }
    }
}

/// Gateway liveness endpoint.
pub async fn health(State(state): State<AppState>) -> Response {
    let store_ready = state.engine.store_ready().await;
    Json(json!({
        "status": if store_ready { "healthy" } else { "degraded" },
        "store_ready": store_ready,
        "timestamp": Utc::now().to_rfc3339(),
    }))
    .into_response()
}
