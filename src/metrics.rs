use lazy_static::lazy_static;
use prometheus::{Counter, Gauge, Histogram, register_counter, register_gauge, register_histogram};


lazy_static! {
    pub static ref REQUEST_TOTAL: Counter =
        register_counter!("roster_api_requests_total", "Total number of API requests").unwrap();
    pub static ref RATE_LIMITED_TOTAL: Counter =
        register_counter!("roster_rate_limited_total", "API requests rejected by the rate limiter").unwrap();
    pub static ref UPSTREAM_ERRORS: Counter =
        register_counter!("roster_upstream_errors_total", "Failed calls to personnel API backends").unwrap();
    pub static ref UPSTREAM_LATENCY: Histogram = register_histogram!(
        "roster_upstream_latency_seconds",
        "Backend round-trip latency in seconds"
    )
    .unwrap();
    pub static ref TRACKED_WINDOWS: Gauge =
        register_gauge!("roster_rate_limit_windows", "Rate limit windows currently held in memory").unwrap();
}
