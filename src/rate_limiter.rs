use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Fixed-window admission policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    /// Requests admitted per window
    pub limit: u64,
    #[serde(with = "humantime_serde")]
    pub window: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            limit: 30,
            window: Duration::from_secs(60),
        }
    }
}

/// Millisecond wall clock. Injected so tests can pin time.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_millis: u64) -> Self {
        Self {
            now: AtomicU64::new(start_millis),
        }
    }

    pub fn set(&self, millis: u64) {
        self.now.store(millis, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Per-client window state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitEntry {
    pub window_start: u64,
    pub count: u64,
}

/// Outcome of a single admission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed { remaining: u64 },
    Rejected { retry_after: Duration },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed { .. })
    }
}

/// In-memory fixed-window limiter keyed by client id.
///
/// The whole increment-and-compare runs under one write lock, so concurrent
/// requests from the same client cannot slip past the limit.
#[derive(Clone)]
pub struct RateLimiter {
    policy: RateLimitPolicy,
    entries: Arc<RwLock<HashMap<String, RateLimitEntry>>>,
}

impl RateLimiter {
    pub fn new(policy: RateLimitPolicy) -> Self {
        RateLimiter {
            policy,
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn policy(&self) -> RateLimitPolicy {
        self.policy
    }

    /// Record a request from `client_id` at `now` (ms) and decide whether it is admitted.
    pub fn admit(&self, client_id: &str, now: u64) -> Admission {
        let window_ms = self.window_millis();

        // A panic elsewhere must not lock every client out, so poisoning is ignored.
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);

        let entry = entries
            .entry(client_id.to_string())
            .or_insert(RateLimitEntry {
                window_start: now,
                count: 0,
            });

        if entry.count == 0 || now.saturating_sub(entry.window_start) > window_ms {
            entry.window_start = now;
            entry.count = 1;
        } else {
            entry.count = entry.count.saturating_add(1);
        }

        if entry.count <= self.policy.limit {
            Admission::Allowed {
                remaining: self.policy.limit - entry.count,
            }
        } else {
            let window_end = entry.window_start.saturating_add(window_ms);
            Admission::Rejected {
                retry_after: Duration::from_millis(window_end.saturating_sub(now) + 1),
            }
        }
    }

    /// Current entry for a client, if any.
    pub fn entry(&self, client_id: &str) -> Option<RateLimitEntry> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(client_id).copied()
    }

    pub fn tracked_clients(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Drop every entry whose window has elapsed; returns how many were removed.
    pub fn cleanup_expired(&self, now: u64) -> usize {
        let window_ms = self.window_millis();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);

        let initial_count = entries.len();
        entries.retain(|_, entry| now.saturating_sub(entry.window_start) <= window_ms);

        initial_count - entries.len()
    }

    fn window_millis(&self) -> u64 {
        self.policy.window.as_millis() as u64
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitPolicy::default())
    }
}
