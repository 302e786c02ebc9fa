use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, HeaderName, Method},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};

use crate::error::AppResult;
use crate::services::sync::{SyncOutcome, NO_ROOMS_MESSAGE};
use crate::AppState;

const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/", get(get_data)).layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::OPTIONS])
            .allow_headers(Any),
    )
}

#[derive(Debug, Default, Deserialize)]
pub struct DataQuery {
    refresh: Option<String>,
}

impl DataQuery {
    /// `?refresh`, `?refresh=1`, `?refresh=true` and `?refresh=yes` bypass the cache.
    pub fn force_refresh(&self) -> bool {
        match self.refresh.as_deref().map(str::trim) {
            Some(v) => v.is_empty() || ["1", "true", "yes"].iter().any(|t| v.eq_ignore_ascii_case(t)),
            None => false,
        }
    }
}

async fn get_data(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DataQuery>,
) -> AppResult<Response> {
    let outcome = state.sync.get_or_sync(query.force_refresh()).await?;

    let response = match outcome {
        SyncOutcome::Payload { body, cache, .. } => (
            [
                (header::CONTENT_TYPE, "application/json"),
                (X_CACHE, cache.as_str()),
            ],
            body.to_string(),
        )
            .into_response(),
        SyncOutcome::NoRooms => Json(json!({
            "status": "success",
            "message": NO_ROOMS_MESSAGE,
        }))
        .into_response(),
    };

    Ok(response)
}
