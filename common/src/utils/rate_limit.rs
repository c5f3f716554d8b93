use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Interval between lazy sweeps of stale keys.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub remaining: usize,
    pub retry_after_ms: u64,
}

struct RateLimiterState {
    entries: HashMap<String, Vec<Instant>>,
    last_sweep: Instant,
}

/// In-memory sliding-window rate limiter keyed by `user+scope`.
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    state: Mutex<RateLimiterState>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            state: Mutex::new(RateLimiterState {
                entries: HashMap::new(),
                last_sweep: Instant::now(),
            }),
        }
    }

    /// Limiter for RAG queries: 10 requests per rolling 60 seconds.
    pub fn for_rag_queries() -> Self {
        Self::new(10, Duration::from_secs(60))
    }

    pub fn check(&self, key: &str) -> RateDecision {
        let now = Instant::now();
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if now.duration_since(state.last_sweep) >= SWEEP_INTERVAL {
            let window = self.window;
            state
                .entries
                .retain(|_, hits| hits.iter().any(|t| now.duration_since(*t) < window));
            state.last_sweep = now;
        }

        let hits = state.entries.entry(key.to_string()).or_default();
        hits.retain(|t| now.duration_since(*t) < self.window);

        if hits.len() >= self.max_requests {
            let oldest = hits.iter().min().copied().unwrap_or(now);
            let retry_after = (oldest + self.window).saturating_duration_since(now);
            return RateDecision {
                allowed: false,
                remaining: 0,
                retry_after_ms: retry_after.as_millis().max(1) as u64,
            };
        }

        hits.push(now);
        RateDecision {
            allowed: true,
            remaining: self.max_requests - hits.len(),
            retry_after_ms: 0,
        }
    }
}
