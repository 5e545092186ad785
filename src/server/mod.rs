//! HTTP front for a [`Store`].
//!
//! # Endpoints
//!
//! - `GET /health`: Health check endpoint (no auth required)
//! - `GET /entities/{kind}`: Records of one kind, filtered by the
//!   `id`, `meal_id`, `user_id` and `email` query parameters
//! - `POST /changes`: Applies a change set, all or nothing

mod auth;
mod routes;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use mealswap_core::Store;
use std::sync::Arc;

pub use auth::{auth_middleware, ApiKeyEntry, ApiKeyStore, AuthUser};
pub use routes::{ApiError, HealthResponse};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub api_keys: Arc<ApiKeyStore>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, api_keys: ApiKeyStore) -> Self {
        Self {
            store,
            api_keys: Arc::new(api_keys),
        }
    }
}

/// Builds the router. Tracing layers are left to the caller.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new().route("/health", get(routes::health));

    let protected_routes = Router::new()
        .route("/entities/{kind}", get(routes::list_entities))
        .route("/changes", post(routes::commit_changes))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
