use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use mealswap_core::{ChangeSet, EntityKind, Filter, StoreError};
use serde::Serialize;

use super::{AppState, AuthUser};

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Error body for failed requests
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: &'static str,
    pub message: String,
}

impl ApiError {
    fn response(status: StatusCode, error: &'static str, message: impl Into<String>) -> Response {
        (
            status,
            Json(ApiError {
                error,
                message: message.into(),
            }),
        )
            .into_response()
    }
}

fn store_failure(e: StoreError) -> Response {
    let (status, error) = match e {
        StoreError::Rejected(_) => (StatusCode::CONFLICT, "conflict"),
        StoreError::Connection(_) | StoreError::Status { .. } => {
            (StatusCode::BAD_GATEWAY, "store_error")
        }
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "store_error"),
    };
    ApiError::response(status, error, e.to_string())
}

/// Health check endpoint (no auth required)
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn list_entities(
    State(state): State<AppState>,
    Extension(client): Extension<AuthUser>,
    Path(kind): Path<String>,
    Query(filter): Query<Filter>,
) -> Response {
    let Some(kind) = EntityKind::parse(&kind) else {
        return ApiError::response(
            StatusCode::NOT_FOUND,
            "unknown_kind",
            format!("Unknown entity kind '{}'", kind),
        );
    };

    match state.store.fetch_all(kind, &filter).await {
        Ok(entities) => {
            tracing::debug!(client = %client.label, %kind, count = entities.len(), "Fetched entities");
            Json(entities).into_response()
        }
        Err(e) => {
            tracing::warn!(client = %client.label, %kind, error = %e, "Fetch failed");
            store_failure(e)
        }
    }
}

pub async fn commit_changes(
    State(state): State<AppState>,
    Extension(client): Extension<AuthUser>,
    Json(changes): Json<ChangeSet>,
) -> Response {
    match state.store.commit(&changes).await {
        Ok(()) => {
            tracing::info!(client = %client.label, records = changes.len(), "Committed change set");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => {
            tracing::warn!(client = %client.label, error = %e, "Commit failed");
            store_failure(e)
        }
    }
}
