pub mod config;
pub mod ratelimit;

pub use config::AppConfig;
pub use ratelimit::{AdmissionGate, InMemoryRateLimiter, RateLimitDecision};
