use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::time::{Duration, interval};
use tracing::{info, warn};

use crate::error::AppError;

// Single personnel API backend

pub struct Backend {
    pub url: String,
    healthy: AtomicBool,
}

impl Backend {
    pub fn new(url: String) -> Self {
        Self {
            url,
            healthy: AtomicBool::new(true),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::Relaxed);
    }
}

// Round-robin over the healthy backends

pub struct LoadBalancer {
    backends: Vec<Arc<Backend>>,
    current: AtomicUsize,
}

impl LoadBalancer {
    // Build from comma-separated urls "localhost:3000, localhost:3001"
    pub fn new(backends_str: &str) -> Result<Self, AppError> {
        let backends: Vec<Arc<Backend>> = backends_str
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|url| {
                let full_url = if url.starts_with("http://") || url.starts_with("https://") {
                    url.trim_end_matches('/').to_string()
                } else {
                    format!("http://{}", url.trim_end_matches('/'))
                };
                Arc::new(Backend::new(full_url))
            })
            .collect();
        if backends.is_empty() {
            return Err(AppError::Config(
                "at least one backend is required".to_string(),
            ));
        }

        info!(count = backends.len(), "Load balancer initialized");
        for (i, b) in backends.iter().enumerate() {
            info!(index = i + 1, url = %b.url, "Backend registered");
        }

        Ok(Self {
            backends,
            current: AtomicUsize::new(0),
        })
    }

    // Next healthy backend, round-robin
    pub fn get_backend(&self) -> Option<Arc<Backend>> {
        let len = self.backends.len();
        let start = self.current.fetch_add(1, Ordering::Relaxed) % len;

        (0..len)
            .map(|i| &self.backends[(start + i) % len])
            .find(|backend| backend.is_healthy())
            .map(Arc::clone)
    }

    pub fn all_backends(&self) -> &[Arc<Backend>] {
        &self.backends
    }

    pub fn healthy_count(&self) -> usize {
        self.backends.iter().filter(|b| b.is_healthy()).count()
    }
}

// Polls every backend's health path and flips its flag

pub async fn health_checker(
    load_balancer: Arc<LoadBalancer>,
    client: reqwest::Client,
    check_interval: Duration,
    health_path: String,
) {
    let mut interval = interval(check_interval);

    info!(interval = ?check_interval, path = %health_path, "Health checker started");

    loop {
        interval.tick().await;

        for backend in load_balancer.all_backends() {
            let url = format!("{}{}", backend.url, health_path);
            let was_healthy = backend.is_healthy();

            let is_healthy = match client.get(&url).timeout(Duration::from_secs(5)).send().await {
                Ok(res) => res.status().is_success(),
                Err(_) => false,
            };
            backend.set_healthy(is_healthy);

            if was_healthy != is_healthy {
                if is_healthy {
                    info!(backend = %backend.url, "Backend is now healthy");
                } else {
                    warn!(backend = %backend.url, "Backend is now unhealthy");
                }
            }
        }
    }
}
