//! Rate-limited HTTP gateway in front of the personnel tracking API.
//!
//! Every `/api/{resource}` call is checked against a per-caller fixed-window
//! quota ([`rate_limit::RateLimiter`]) before it is forwarded to one of the
//! personnel API backends. Limiter state is in-memory and per-process.

pub mod clock;
pub mod config;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod load_balancer;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod rate_limit;
pub mod state;

use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::get,
};
use std::sync::Arc;

use crate::handlers::{collection_handler, health_handler, item_handler, metrics_handler};
use crate::middleware::enforce_rate_limit;
use crate::state::AppState;

// Routes: /health and /metrics are open, everything under /api is rate limited
pub fn app(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route(
            "/api/{resource}",
            get(collection_handler)
                .post(collection_handler)
                .put(collection_handler)
                .patch(collection_handler)
                .delete(collection_handler),
        )
        .route(
            "/api/{resource}/{id}",
            get(item_handler)
                .post(item_handler)
                .put(item_handler)
                .patch(item_handler)
                .delete(item_handler),
        )
        .route_layer(from_fn_with_state(state.clone(), enforce_rate_limit));

    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .merge(api)
        .with_state(state)
}
