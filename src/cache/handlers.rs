use axum::{
    Json, Router,
    extract::{Extension, Path, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::Value;
use std::sync::Arc;

use super::manager::CacheRingManager;
use crate::replication::protocol::{
    ENDPOINT_HEALTH, ENDPOINT_INTERNAL_KEYS, ENDPOINT_INTERNAL_NODES, ENDPOINT_INTERNAL_REFRESH,
    ENDPOINT_KEYS, ErrorResponse, MessageResponse, PutKeyRequest, StatusResponse,
};

/// Every route a node serves, bound to its manager.
pub fn router(manager: Arc<CacheRingManager>) -> Router {
    Router::new()
        .route(ENDPOINT_HEALTH, get(handle_health))
        .route(
            &format!("{}/:key", ENDPOINT_KEYS),
            get(handle_get_key).put(handle_put_key),
        )
        .route(
            &format!("{}/:key", ENDPOINT_INTERNAL_KEYS),
            get(handle_get_internal_key).put(handle_put_internal_key),
        )
        .route(ENDPOINT_INTERNAL_REFRESH, post(handle_refresh))
        .route(ENDPOINT_INTERNAL_NODES, get(handle_nodes))
        .layer(Extension(manager))
}

pub async fn handle_health(
    Extension(manager): Extension<Arc<CacheRingManager>>,
) -> (StatusCode, Json<StatusResponse>) {
    match manager.renew_heartbeat().await {
        Ok(()) => (StatusCode::OK, Json(StatusResponse::ok())),
        Err(e) => {
            tracing::error!("Heartbeat renewal failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(StatusResponse::unavailable()),
            )
        }
    }
}

pub async fn handle_get_key(
    Extension(manager): Extension<Arc<CacheRingManager>>,
    Path(key): Path<String>,
) -> Json<Value> {
    Json(manager.get(&key, false).await.unwrap_or(Value::Null))
}

pub async fn handle_get_internal_key(
    Extension(manager): Extension<Arc<CacheRingManager>>,
    Path(key): Path<String>,
) -> Json<Value> {
    Json(manager.get(&key, true).await.unwrap_or(Value::Null))
}

pub async fn handle_put_key(
    Extension(manager): Extension<Arc<CacheRingManager>>,
    Path(key): Path<String>,
    body: Result<Json<PutKeyRequest>, JsonRejection>,
) -> Response {
    let (value, expiration) = match parse_put_body(body) {
        Ok(parsed) => parsed,
        Err(rejection) => return rejection,
    };

    match manager.set(&key, value, expiration, false).await {
        Ok(()) => (
            StatusCode::OK,
            Json(MessageResponse {
                message: format!("key data for {} stored successfully.", key),
            }),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Failed to persist {}: {}", key, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new(format!("failed to persist {}", key))),
            )
                .into_response()
        }
    }
}

pub async fn handle_put_internal_key(
    Extension(manager): Extension<Arc<CacheRingManager>>,
    Path(key): Path<String>,
    body: Result<Json<PutKeyRequest>, JsonRejection>,
) -> Response {
    let (value, expiration) = match parse_put_body(body) {
        Ok(parsed) => parsed,
        Err(rejection) => return rejection,
    };

    match manager.set(&key, value, expiration, true).await {
        Ok(()) => (StatusCode::OK, Json(StatusResponse::ok())).into_response(),
        Err(e) => {
            tracing::error!("Failed to store replica of {}: {}", key, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new(format!("failed to store {}", key))),
            )
                .into_response()
        }
    }
}

pub async fn handle_refresh(
    Extension(manager): Extension<Arc<CacheRingManager>>,
) -> (StatusCode, Json<StatusResponse>) {
    match manager.refresh_cache().await {
        Ok(_) => (StatusCode::OK, Json(StatusResponse::ok())),
        Err(e) => {
            tracing::error!("Requested refresh failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(StatusResponse::error()),
            )
        }
    }
}

pub async fn handle_nodes(
    Extension(manager): Extension<Arc<CacheRingManager>>,
) -> Json<Vec<String>> {
    Json(manager.live_nodes().await)
}

fn parse_put_body(
    body: Result<Json<PutKeyRequest>, JsonRejection>,
) -> Result<(Value, chrono::DateTime<chrono::Utc>), Response> {
    let Json(request) = body.map_err(|rejection| {
        tracing::warn!("Rejected write body: {}", rejection);
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(rejection.body_text())),
        )
            .into_response()
    })?;

    let Some(expiration) = request.expiration() else {
        tracing::warn!("Rejected expiration_date {:?}", request.expiration_date);
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(format!(
                "invalid expiration_date: {}",
                request.expiration_date
            ))),
        )
            .into_response());
    };

    Ok((request.data, expiration))
}
