//! Process-wide IP rate limiter
//!
//! Fixed-window counter keyed by client IP, applied before the pipeline.
//! Exceeding the limit short-circuits the request with
//! `RATE_LIMIT_EXCEEDED` and consumes no other resources.

use dashmap::DashMap;
use std::time::{Duration, Instant};
use veilgate_core::{GatewayError, Result};

struct WindowSlot {
    started: Instant,
    count: u32,
}

/// Fixed-window rate limiter shared across all request handlers.
pub struct RateLimiter {
    window: Duration,
    max_requests: u32,
    slots: DashMap<String, WindowSlot>,
}

impl RateLimiter {
    pub fn new(window_ms: u64, max_requests: u32) -> Self {
        Self {
            window: Duration::from_millis(window_ms),
            max_requests,
            slots: DashMap::new(),
        }
    }

    /// Count one hit for the key; `RateLimited` once the window is full.
    pub fn check(&self, key: &str) -> Result<()> {
        let mut slot = self.slots.entry(key.to_string()).or_insert(WindowSlot {
            started: Instant::now(),
            count: 0,
        });

        if slot.started.elapsed() >= self.window {
            slot.started = Instant::now();
            slot.count = 0;
        }

        if slot.count >= self.max_requests {
            return Err(GatewayError::RateLimited);
        }
        slot.count += 1;
        Ok(())
    }
}
