use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, Method, Uri, header},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{debug, warn};
use crate::error::AppError;
use crate::metrics::{UPSTREAM_ERRORS, UPSTREAM_LATENCY};
use crate::models::Resource;
use crate::state::AppState;

// Request headers passed through to the backend; the session cookie is what
// authenticates the caller there
const FORWARDED_REQUEST_HEADERS: [header::HeaderName; 4] = [
    header::CONTENT_TYPE,
    header::ACCEPT,
    header::AUTHORIZATION,
    header::COOKIE,
];

const RELAYED_RESPONSE_HEADERS: [header::HeaderName; 3] = [
    header::CONTENT_TYPE,
    header::SET_COOKIE,
    header::LOCATION,
];

// /api/{resource}
pub async fn collection_handler(
    State(state): State<Arc<AppState>>,
    Path(resource): Path<String>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let resource = parse_resource(&resource)?;
    forward(&state, resource, method, &uri, &headers, body).await
}

// /api/{resource}/{id}
pub async fn item_handler(
    State(state): State<Arc<AppState>>,
    Path((resource, _id)): Path<(String, String)>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let resource = parse_resource(&resource)?;
    forward(&state, resource, method, &uri, &headers, body).await
}

fn parse_resource(name: &str) -> Result<Resource, AppError> {
    name.parse()
        .map_err(|_| AppError::UnknownResource(name.to_string()))
}

async fn forward(
    state: &AppState,
    resource: Resource,
    method: Method,
    uri: &Uri,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let backend = state
        .load_balancer
        .get_backend()
        .ok_or(AppError::NoHealthyBackend)?;

    let path = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());
    let url = format!("{}{}", backend.url, path);
    debug!(%resource, %method, backend = %backend.url, "Forwarding request");

    let mut request = state.client.request(method, &url).body(body);
    for name in &FORWARDED_REQUEST_HEADERS {
        for value in headers.get_all(name) {
            request = request.header(name, value);
        }
    }

    let timer = UPSTREAM_LATENCY.start_timer();
    let upstream = match request.send().await {
        Ok(res) => res,
        // Marking backend as unhealthy until the health checker sees it again
        Err(e) => {
            UPSTREAM_ERRORS.inc();
            backend.set_healthy(false);
            warn!(backend = %backend.url, error = %e, "Backend request failed, marked unhealthy");
            return Err(AppError::Upstream(e));
        }
    };

    let status = upstream.status();
    let mut relayed = HeaderMap::new();
    for name in &RELAYED_RESPONSE_HEADERS {
        for value in upstream.headers().get_all(name) {
            relayed.append(name.clone(), value.clone());
        }
    }

    let bytes = upstream.bytes().await.inspect_err(|_| UPSTREAM_ERRORS.inc())?;
    timer.observe_duration();

    let mut response = (status, bytes).into_response();
    for name in &RELAYED_RESPONSE_HEADERS {
        response.headers_mut().remove(name);
    }
    response.headers_mut().extend(relayed);
    Ok(response)
}
