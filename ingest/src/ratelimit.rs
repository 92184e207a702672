//! Per-IP webhook rate limiting.
//!
//! Two independent fixed-window counters per source IP: a minute window and
//! an hour window. A request is allowed only when both counters are under
//! their ceiling. Windows are fixed, not sliding - the first request in a
//! window stamps the expiry, later requests increment without touching it,
//! so bursts at window boundaries are possible and accepted.

use std::net::IpAddr;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::{debug, warn};

/// Max requests per minute per IP.
pub const MAX_REQUESTS_PER_MINUTE: u32 = 300;

/// Max requests per hour per IP.
pub const MAX_REQUESTS_PER_HOUR: u32 = 3000;

struct Counter {
    count: u32,
    expires_at: Instant,
}

struct Window {
    counters: DashMap<IpAddr, Counter>,
    limit: u32,
    length: Duration,
}

impl Window {
    fn new(limit: u32, length: Duration) -> Self {
        Self {
            counters: DashMap::new(),
            limit,
            length,
        }
    }

    /// Increment-and-check. The entry guard holds the shard lock for the
    /// whole read-modify-write, so concurrent increments are never lost.
    fn allow(&self, ip: IpAddr) -> bool {
        let now = Instant::now();
        let mut entry = self.counters.entry(ip).or_insert_with(|| Counter {
            count: 0,
            expires_at: now + self.length,
        });

        if entry.expires_at <= now {
            // Window elapsed: start a fresh one.
            entry.count = 1;
            entry.expires_at = now + self.length;
            return true;
        }

        if entry.count >= self.limit {
            return false;
        }

        entry.count += 1;
        true
    }

    fn count(&self, ip: IpAddr) -> u32 {
        self.counters
            .get(&ip)
            .filter(|c| c.expires_at > Instant::now())
            .map(|c| c.count)
            .unwrap_or(0)
    }

    fn clear(&self, ip: IpAddr) {
        self.counters.remove(&ip);
    }

    fn purge_expired(&self) {
        let now = Instant::now();
        self.counters.retain(|_, c| c.expires_at > now);
    }
}

/// Snapshot of one window's usage, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowStatus {
    pub count: u32,
    pub limit: u32,
}

/// Combined minute/hour usage for an IP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub minute: WindowStatus,
    pub hour: WindowStatus,
}

/// Sliding-window request throttle keyed by source IP.
pub struct RateLimiter {
    minute: Window,
    hour: Window,
}

impl RateLimiter {
    /// Limiter with the production ceilings.
    pub fn new() -> Self {
        Self::with_limits(
            MAX_REQUESTS_PER_MINUTE,
            Duration::from_secs(60),
            MAX_REQUESTS_PER_HOUR,
            Duration::from_secs(3600),
        )
    }

    /// Limiter with explicit ceilings and window lengths.
    pub fn with_limits(
        minute_limit: u32,
        minute_window: Duration,
        hour_limit: u32,
        hour_window: Duration,
    ) -> Self {
        Self {
            minute: Window::new(minute_limit, minute_window),
            hour: Window::new(hour_limit, hour_window),
        }
    }

    /// Check whether a request from `ip` is allowed, consuming budget if so.
    ///
    /// The minute window is consulted first; a minute increment is not
    /// rolled back if the hour window then denies.
    pub fn allow(&self, ip: IpAddr) -> bool {
        if !self.minute.allow(ip) {
            warn!(ip = %ip, "rate_limit_exceeded_minute");
            return false;
        }

        if !self.hour.allow(ip) {
            warn!(ip = %ip, "rate_limit_exceeded_hour");
            return false;
        }

        true
    }

    /// Current usage for an IP across both windows.
    pub fn status(&self, ip: IpAddr) -> RateLimitStatus {
        RateLimitStatus {
            minute: WindowStatus {
                count: self.minute.count(ip),
                limit: self.minute.limit,
            },
            hour: WindowStatus {
                count: self.hour.count(ip),
                limit: self.hour.limit,
            },
        }
    }

    /// Drop all counters for an IP (admin override).
    pub fn clear(&self, ip: IpAddr) {
        self.minute.clear(ip);
        self.hour.clear(ip);
        debug!(ip = %ip, "rate_limit_cleared");
    }

    /// Drop counters whose window has elapsed.
    pub fn purge_expired(&self) {
        self.minute.purge_expired();
        self.hour.purge_expired();
    }

    /// Number of IPs currently tracked in the minute window.
    pub fn tracked_ips(&self) -> usize {
        self.minute.counters.len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

/// Background task that periodically drops elapsed counters.
pub async fn purge_task(limiter: std::sync::Arc<RateLimiter>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        limiter.purge_expired();
    }
}
