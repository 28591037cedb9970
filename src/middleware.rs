//! Rate limit enforcement for the `/api` routes.
//!
//! Runs before every resource handler: the caller is identified, the limiter
//! consulted with the configured quota, and the request either rejected with
//! `429 Too Many Requests` or passed on with the advisory headers attached to
//! whatever the handler returns.

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::debug;

use crate::error::{AppError, apply_rate_limit_headers};
use crate::identity::identify;
use crate::metrics::{RATE_LIMITED_TOTAL, REQUEST_TOTAL, TRACKED_WINDOWS};
use crate::state::AppState;

/// Admit or reject the request under the caller's fixed-window quota.
///
/// ```ignore
/// Router::new()
///     .route("/api/{resource}", get(collection_handler))
///     .route_layer(from_fn_with_state(state.clone(), enforce_rate_limit))
/// ```
#[tracing::instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn enforce_rate_limit(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    REQUEST_TOTAL.inc();

    let connect_info = request.extensions().get::<ConnectInfo<SocketAddr>>();
    let identifier = identify(request.headers(), connect_info, state.trust_proxy);

    let decision = state.rate_limiter.check(&identifier, state.quota)?;
    TRACKED_WINDOWS.set(state.rate_limiter.tracked() as f64);

    if !decision.allowed {
        RATE_LIMITED_TOTAL.inc();
        let retry_after = decision.retry_after_secs(state.rate_limiter.now_millis());
        debug!(
            identifier = %identifier,
            reset_time = decision.reset_time,
            retry_after,
            "Rate limit exceeded"
        );
        return Err(AppError::RateLimited {
            decision,
            retry_after,
        });
    }

    debug!(
        identifier = %identifier,
        remaining = decision.remaining_requests,
        "Request admitted"
    );
    let mut response = next.run(request).await;
    apply_rate_limit_headers(response.headers_mut(), &decision);
    Ok(response)
}
