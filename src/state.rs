use std::sync::Arc;
use crate::load_balancer::LoadBalancer;
use crate::rate_limit::{Quota, RateLimiter};
// app's shared state

pub struct AppState {
    pub client: reqwest::Client,
    pub load_balancer: Arc<LoadBalancer>,
    pub rate_limiter: Arc<RateLimiter>,
    pub quota: Quota,        // applied to every /api request
    pub trust_proxy: bool,   // read client address from proxy headers
}
