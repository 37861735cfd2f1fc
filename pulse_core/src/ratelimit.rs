use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Which limiter a request is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpClass {
    /// The mutating apply-metrics operation (strict window).
    Apply,
    /// Everything else (generous window).
    General,
}

/// Outcome of a limiter check.
#[derive(Debug, Clone, Copy)]
pub struct Decision {
    pub allowed: bool,
    pub remaining: u32,
    /// Time until the current window resets.
    pub retry_after: Duration,
}

#[derive(Debug, Clone, Copy)]
struct WindowState {
    started: Instant,
    count: u32,
}

/// Per-client fixed-window counter.
///
/// State is per-process and in-memory: horizontally scaled deployments get
/// independent limits per instance.
pub struct FixedWindowLimiter {
    limit: u32,
    window: Duration,
    windows: Mutex<HashMap<IpAddr, WindowState>>,
}

impl FixedWindowLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Human-readable limit description, e.g. `3 per 15m`.
    pub fn describe(&self) -> String {
        format!("{} per {}", self.limit, humantime::format_duration(self.window))
    }

    pub async fn check(&self, client: IpAddr) -> Decision {
        self.check_at(client, Instant::now()).await
    }

    /// Clock-injected variant of [`check`](Self::check).
    pub async fn check_at(&self, client: IpAddr, now: Instant) -> Decision {
        let mut windows = self.windows.lock().await;
        let state = windows.entry(client).or_insert(WindowState {
            started: now,
            count: 0,
        });

        // Fixed window: the counter resets atomically at the boundary.
        if now.duration_since(state.started) >= self.window {
            state.started = now;
            state.count = 0;
        }

        let elapsed = now.duration_since(state.started);
        let retry_after = self.window.saturating_sub(elapsed);

        if state.count < self.limit {
            state.count += 1;
            Decision {
                allowed: true,
                remaining: self.limit - state.count,
                retry_after,
            }
        } else {
            Decision {
                allowed: false,
                remaining: 0,
                retry_after,
            }
        }
    }
}

/// The strict apply limiter paired with the generous general limiter.
pub struct RateLimiters {
    pub apply: FixedWindowLimiter,
    pub general: FixedWindowLimiter,
}

impl RateLimiters {
    pub fn new(apply: FixedWindowLimiter, general: FixedWindowLimiter) -> Self {
        Self { apply, general }
    }

    pub async fn allow(&self, client: IpAddr, class: OpClass) -> Decision {
        match class {
            OpClass::Apply => self.apply.check(client).await,
            OpClass::General => self.general.check(client).await,
        }
    }

    pub fn limiter(&self, class: OpClass) -> &FixedWindowLimiter {
        match class {
            OpClass::Apply => &self.apply,
            OpClass::General => &self.general,
        }
    }
}
