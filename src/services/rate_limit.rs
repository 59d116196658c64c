//! Fixed-window request counters keyed by `(policy, source address)`.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;

use crate::clock::Clock;
use crate::config::RateLimitConfig;
use crate::error::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RatePolicy {
    Auth,
    Upload,
    Download,
}

impl RatePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RatePolicy::Auth => "auth",
            RatePolicy::Upload => "upload",
            RatePolicy::Download => "download",
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started_at: DateTime<Utc>,
    count: u32,
}

pub struct RateLimiter {
    windows: DashMap<(RatePolicy, String), Window>,
    window: Duration,
    auth_max: u32,
    upload_max: u32,
    download_max: u32,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            windows: DashMap::new(),
            window: Duration::seconds(config.window_secs as i64),
            auth_max: config.auth_max,
            upload_max: config.upload_max,
            download_max: config.download_max,
            clock,
        }
    }

    pub fn ceiling(&self, policy: RatePolicy) -> u32 {
        match policy {
            RatePolicy::Auth => self.auth_max,
            RatePolicy::Upload => self.upload_max,
            RatePolicy::Download => self.download_max,
        }
    }

    /// Admit one request from `source`, or fail with `RateLimited`
    pub fn check(&self, policy: RatePolicy, source: &str) -> Result<()> {
        let now = self.clock.now();
        let ceiling = self.ceiling(policy);

        let mut entry = self
            .windows
            .entry((policy, source.to_string()))
            .or_insert(Window {
                started_at: now,
                count: 0,
            });

        let window = entry.value_mut();
        if now >= window.started_at + self.window {
            window.started_at = now;
            window.count = 0;
        }

        if window.count >= ceiling {
            let resets_at = window.started_at + self.window;
            // Whole seconds, rounded up
            let remaining_ms = (resets_at - now).num_milliseconds().max(0);
            let retry_after_secs = ((remaining_ms + 999) / 1000).max(1) as u64;
            return Err(AppError::RateLimited { retry_after_secs });
        }

        window.count += 1;
        Ok(())
    }

    /// Drop windows that have already lapsed
    pub fn retain_recent(&self) {
        let now = self.clock.now();
        let window = self.window;
        self.windows.retain(|_, w| now < w.started_at + window);
    }

    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }
}

/// Spawn a background task that periodically forgets lapsed windows.
pub fn spawn_window_cleanup(limiter: Arc<RateLimiter>, every: std::time::Duration) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(every).await;
            let before = limiter.tracked_keys();
            limiter.retain_recent();
            tracing::debug!(
                "Rate limiter cleanup: {} -> {} tracked sources",
                before,
                limiter.tracked_keys()
            );
        }
    });
}
