use std::sync::Arc;

use crate::core::{AdmissionGate, AppConfig, InMemoryRateLimiter};

pub struct AppState {
    pub config: AppConfig,
    // Admission gates are injected so deployments can swap the
    // backing store and tests can tighten the limits.
    pub chat_gate: Arc<dyn AdmissionGate>,
    pub calendar_gate: Arc<dyn AdmissionGate>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let chat_gate = Arc::new(InMemoryRateLimiter::new(config.chat_rate_limit));
        let calendar_gate = Arc::new(InMemoryRateLimiter::new(config.calendar_rate_limit));
        Self::with_gates(config, chat_gate, calendar_gate)
    }

    pub fn with_gates(
        config: AppConfig,
        chat_gate: Arc<dyn AdmissionGate>,
        calendar_gate: Arc<dyn AdmissionGate>,
    ) -> Self {
        Self {
            config,
            chat_gate,
            calendar_gate,
        }
    }
}
