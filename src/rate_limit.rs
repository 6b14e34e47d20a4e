//! Rate Limiting
//!
//! Fixed-window request counters keyed by client address. State lives in
//! process memory and is lost on restart.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use axum::http::{HeaderMap, HeaderName, HeaderValue};

use crate::config::RateLimitSettings;

const RATELIMIT_LIMIT: &str = "ratelimit-limit";
const RATELIMIT_REMAINING: &str = "ratelimit-remaining";
const RATELIMIT_RESET: &str = "ratelimit-reset";

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    hits: u32,
}

/// Budget left for a key after an admission decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    pub limit: u32,
    pub remaining: u32,
    /// Time until the key's window closes
    pub reset_after: Duration,
}

impl Quota {
    /// Seconds until reset, rounded up
    pub fn reset_secs(&self) -> u64 {
        let secs = self.reset_after.as_secs();
        if self.reset_after.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs
        }
    }

    /// Write the `RateLimit-*` headers
    pub fn apply(&self, headers: &mut HeaderMap) {
        headers.insert(
            HeaderName::from_static(RATELIMIT_LIMIT),
            HeaderValue::from(self.limit),
        );
        headers.insert(
            HeaderName::from_static(RATELIMIT_REMAINING),
            HeaderValue::from(self.remaining),
        );
        headers.insert(
            HeaderName::from_static(RATELIMIT_RESET),
            HeaderValue::from(self.reset_secs()),
        );
    }
}

/// Outcome of counting one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Counted; the request may proceed
    Allowed(Quota),
    /// Threshold already reached in this window; nothing was counted
    Limited(Quota),
}

/// Fixed-window counter per key.
///
/// A key's window opens at its first request and lasts `window`; once it
/// has elapsed the next request starts a fresh window.
#[derive(Debug)]
pub struct FixedWindowLimiter {
    window: Duration,
    max_requests: u32,
    windows: Mutex<HashMap<String, Window>>,
}

impl FixedWindowLimiter {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_settings(settings: &RateLimitSettings) -> Self {
        Self::new(settings.window, settings.max_requests)
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Count a request for `key` now
    pub fn admit(&self, key: &str) -> Admission {
        self.admit_at(key, Instant::now())
    }

    /// Count a request for `key` at `now`.
    ///
    /// Compare and increment happen under one lock, so concurrent callers
    /// for the same key never undercount.
    pub fn admit_at(&self, key: &str, now: Instant) -> Admission {
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);

        let entry = windows.entry(key.to_string()).or_insert(Window {
            started: now,
            hits: 0,
        });

        if now.duration_since(entry.started) >= self.window {
            *entry = Window {
                started: now,
                hits: 0,
            };
        }

        let reset_after = self.window.saturating_sub(now.duration_since(entry.started));

        if entry.hits >= self.max_requests {
            return Admission::Limited(Quota {
                limit: self.max_requests,
                remaining: 0,
                reset_after,
            });
        }

        entry.hits += 1;
        Admission::Allowed(Quota {
            limit: self.max_requests,
            remaining: self.max_requests - entry.hits,
            reset_after,
        })
    }

    /// Drop windows that have fully elapsed. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    pub fn purge_expired_at(&self, now: Instant) -> usize {
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        let before = windows.len();
        windows.retain(|_, window| now.duration_since(window.started) < self.window);
        before - windows.len()
    }

    /// Number of keys currently tracked
    pub fn tracked_keys(&self) -> usize {
        self.windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Periodically purge expired windows so idle clients don't accumulate
pub async fn run_purge_loop(limiter: std::sync::Arc<FixedWindowLimiter>) {
    let mut interval = tokio::time::interval(limiter.window());
    // The first tick completes immediately
    interval.tick().await;

    loop {
        interval.tick().await;
        let removed = limiter.purge_expired();
        if removed > 0 {
            tracing::debug!(removed = removed, "Purged expired rate limit windows");
        }
    }
}
