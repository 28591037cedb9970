use clap::Parser;

use crate::rate_limit::{DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW_MS, Quota, RateLimitError};

// CLI argument structure, every flag can also come from the environment
#[derive(Parser, Debug, Clone)]
#[command(name = "roster-gateway")]
#[command(about = "Rate-limited gateway for the personnel tracking API")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, env = "ROSTER_PORT", default_value_t = 8080)]
    pub port: u16,

    // Personnel API backends (comma-separated)
    // Example: "localhost:3000,localhost:3001"
    #[arg(short, long, env = "ROSTER_BACKENDS", default_value = "localhost:3000")]
    pub backends: String,

    // Max requests per identifier per window
    #[arg(long, env = "ROSTER_RATE_LIMIT", default_value_t = DEFAULT_MAX_REQUESTS)]
    pub rate_limit: u32,

    // Window length in milliseconds
    #[arg(long, env = "ROSTER_RATE_WINDOW_MS", default_value_t = DEFAULT_WINDOW_MS)]
    pub rate_window_ms: u64,

    // Minimum gap between request-path sweeps, 0 sweeps on every request
    #[arg(long, env = "ROSTER_SWEEP_INTERVAL_MS", default_value_t = 0)]
    pub sweep_interval_ms: u64,

    // Background reaper period, 0 disables it
    #[arg(long, env = "ROSTER_REAPER_INTERVAL_MS", default_value_t = 0)]
    pub reaper_interval_ms: u64,

    // Backend health check interval in seconds
    #[arg(long, env = "ROSTER_HEALTH_INTERVAL", default_value_t = 30)]
    pub health_interval: u64,

    // Path polled on each backend by the health checker
    #[arg(long, env = "ROSTER_HEALTH_PATH", default_value = "/health")]
    pub health_path: String,

    // Take client address from X-Forwarded-For / X-Real-IP
    #[arg(long, env = "ROSTER_TRUST_PROXY")]
    pub trust_proxy: bool,

    // Emit logs as JSON lines
    #[arg(long, env = "ROSTER_LOG_JSON")]
    pub log_json: bool,
}

impl Args {
    pub fn quota(&self) -> Result<Quota, RateLimitError> {
        Quota::new(self.rate_limit, self.rate_window_ms)
    }
}
