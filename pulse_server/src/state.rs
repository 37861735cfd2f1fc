use pulse_core::{
    FixedWindowLimiter, MetricsBackend, RateLimiters, Settings, Validator, APPLY_WINDOW,
    GENERAL_WINDOW,
};
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub backend: Arc<MetricsBackend>,
    pub limiters: Arc<RateLimiters>,
    pub validator: Arc<Validator>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(settings: Settings, backend: Arc<MetricsBackend>) -> Self {
        let limiters = RateLimiters::new(
            FixedWindowLimiter::new(settings.apply_changes_per_window, APPLY_WINDOW),
            FixedWindowLimiter::new(settings.general_requests_per_minute, GENERAL_WINDOW),
        );
        let validator = Validator::new(settings.limits());

        Self {
            settings: Arc::new(settings),
            backend,
            limiters: Arc::new(limiters),
            validator: Arc::new(validator),
            start_time: Instant::now(),
        }
    }
}
