//! Fixed-window rate limiting keyed by caller identifier.
//!
//! Every identifier gets at most one window. The first request opens it with a
//! count of 1 and a reset instant `window_ms` in the future; later requests
//! increment the count until the quota is used up, after which requests are
//! rejected until the reset instant passes. Rejections never touch the window.
//!
//! State lives in memory only. A restart forgets every window, and separate
//! processes do not share quotas.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use dashmap::DashMap;
use prometheus::Gauge;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info};

use crate::clock::{Clock, SystemClock};

pub const DEFAULT_MAX_REQUESTS: u32 = 10;
pub const DEFAULT_WINDOW_MS: u64 = 60_000;
/// One year. Keeps every reset instant inside the timestamp range headers can express.
pub const MAX_WINDOW_MS: u64 = 365 * 24 * 60 * 60 * 1000;

pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";
pub const RESET_HEADER: &str = "x-ratelimit-reset";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RateLimitError {
    #[error("max_requests must be greater than zero")]
    InvalidMaxRequests,
    #[error("rate limit window must be greater than zero")]
    InvalidWindow,
    #[error("rate limit window must not exceed {MAX_WINDOW_MS} ms")]
    WindowTooLarge,
    #[error("rate limit identifier must not be empty")]
    EmptyIdentifier,
}

/// Validated quota: how many requests fit in one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    max_requests: u32,
    window_ms: u64,
}

impl Quota {
    pub fn new(max_requests: u32, window_ms: u64) -> Result<Self, RateLimitError> {
        if max_requests == 0 {
            return Err(RateLimitError::InvalidMaxRequests);
        }
        if window_ms == 0 {
            return Err(RateLimitError::InvalidWindow);
        }
        if window_ms > MAX_WINDOW_MS {
            return Err(RateLimitError::WindowTooLarge);
        }
        Ok(Self {
            max_requests,
            window_ms,
        })
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }
}

impl Default for Quota {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_MAX_REQUESTS,
            window_ms: DEFAULT_WINDOW_MS,
        }
    }
}

/// Counter state for one identifier (the map key).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindow {
    pub count: u32,
    /// Milliseconds since the Unix epoch.
    pub reset_time: i64,
}

impl RateWindow {
    fn open(now: i64, window_ms: u64) -> Self {
        let window_ms = i64::try_from(window_ms).unwrap_or(i64::MAX);
        Self {
            count: 0,
            reset_time: now.saturating_add(window_ms),
        }
    }

    pub fn is_expired(&self, now: i64) -> bool {
        self.reset_time < now
    }
}

/// Outcome of a single rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub remaining_requests: u32,
    /// Milliseconds since the Unix epoch.
    pub reset_time: i64,
    pub limit: u32,
}

impl Decision {
    /// Whole seconds until the window resets, rounded up and never below 1.
    pub fn retry_after_secs(&self, now: i64) -> u64 {
        let millis = self.reset_time.saturating_sub(now).max(0) as u64;
        millis.div_ceil(1000).max(1)
    }
}

/// In-memory fixed-window limiter.
///
/// Each check holds the identifier's shard lock across the read, cap check
/// and increment, so concurrent requests for one identifier can never be
/// admitted past the quota. Different identifiers on different shards do not
/// contend.
///
/// Expired windows are dropped by a sweep over the whole map. With the default
/// `sweep_interval` of zero the sweep runs on every check, costing
/// O(tracked identifiers). A non-zero interval runs it at most once per
/// interval; expired windows found on lookup are still replaced, so the sweep
/// only bounds memory and never affects decisions.
pub struct RateLimiter {
    windows: DashMap<String, RateWindow>,
    clock: Arc<dyn Clock>,
    sweep_interval_ms: i64,
    last_sweep: AtomicI64,
    tracked_gauge: Option<Gauge>,
}

impl RateLimiter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            windows: DashMap::new(),
            clock,
            sweep_interval_ms: 0,
            last_sweep: AtomicI64::new(i64::MIN),
            tracked_gauge: None,
        }
    }

    pub fn with_sweep_interval(mut self, every: Duration) -> Self {
        self.sweep_interval_ms = i64::try_from(every.as_millis()).unwrap_or(i64::MAX);
        self
    }

    /// Report the number of held windows to `gauge` after every sweep.
    pub fn with_tracked_gauge(mut self, gauge: Gauge) -> Self {
        self.tracked_gauge = Some(gauge);
        self
    }

    /// Check and record one request for `identifier`.
    pub fn check(&self, identifier: &str, quota: Quota) -> Result<Decision, RateLimitError> {
        if identifier.is_empty() {
            return Err(RateLimitError::EmptyIdentifier);
        }

        let now = self.clock.now_millis();
        // Must run before the entry guard below is taken: retain locks every shard.
        self.maybe_sweep(now);

        let max = quota.max_requests;
        let mut window = self
            .windows
            .entry(identifier.to_owned())
            .or_insert_with(|| RateWindow::open(now, quota.window_ms));

        if window.is_expired(now) {
            *window = RateWindow::open(now, quota.window_ms);
        }

        if window.count >= max {
            return Ok(Decision {
                allowed: false,
                remaining_requests: 0,
                reset_time: window.reset_time,
                limit: max,
            });
        }

        window.count += 1;
        Ok(Decision {
            allowed: true,
            remaining_requests: max - window.count,
            reset_time: window.reset_time,
            limit: max,
        })
    }

    /// Check with raw quota values, failing fast on zero or oversized values.
    pub fn check_rate_limit(
        &self,
        identifier: &str,
        max_requests: u32,
        window_ms: u64,
    ) -> Result<Decision, RateLimitError> {
        self.check(identifier, Quota::new(max_requests, window_ms)?)
    }

    /// Evict every expired window. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now_millis();
        self.last_sweep.store(now, Ordering::Relaxed);
        self.sweep_at(now)
    }

    /// Number of windows currently held, expired or not.
    pub fn tracked(&self) -> usize {
        self.windows.len()
    }

    pub fn now_millis(&self) -> i64 {
        self.clock.now_millis()
    }

    /// Sweep on a timer so the request path can run with a long sweep interval.
    pub fn spawn_reaper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = interval(every);
            info!(interval = ?every, "Rate limit reaper started");
            loop {
                ticker.tick().await;
                limiter.sweep();
            }
        })
    }

    fn maybe_sweep(&self, now: i64) {
        if self.sweep_interval_ms > 0 {
            let last = self.last_sweep.load(Ordering::Relaxed);
            if now.saturating_sub(last) < self.sweep_interval_ms {
                return;
            }
            // Only one caller wins the slot; the rest skip this round.
            if self
                .last_sweep
                .compare_exchange(last, now, Ordering::AcqRel, Ordering::Relaxed)
                .is_err()
            {
                return;
            }
        }
        self.sweep_at(now);
    }

    fn sweep_at(&self, now: i64) -> usize {
        let mut evicted = 0;
        self.windows.retain(|_, window| {
            let keep = !window.is_expired(now);
            if !keep {
                evicted += 1;
            }
            keep
        });
        let remaining = self.windows.len();
        if let Some(gauge) = &self.tracked_gauge {
            gauge.set(remaining as f64);
        }
        if evicted > 0 {
            debug!(evicted, remaining, "Swept expired rate limit windows");
        }
        evicted
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

/// Project a decision into advisory response headers: the remaining count and
/// the reset instant as an RFC 3339 UTC timestamp.
pub fn get_rate_limit_headers(decision: &Decision) -> BTreeMap<&'static str, String> {
    let reset = DateTime::<Utc>::from_timestamp_millis(decision.reset_time)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
        .to_rfc3339_opts(SecondsFormat::Millis, true);

    BTreeMap::from([
        (REMAINING_HEADER, decision.remaining_requests.to_string()),
        (RESET_HEADER, reset),
    ])
}
