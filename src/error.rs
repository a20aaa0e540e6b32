// src/error.rs
use thiserror::Error;

/// Faults raised while processing a frame. These never stop the session:
/// the fault boundary in `PrayerSession` turns them into an `error_message`
/// on the published snapshot and keeps the last valid state.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrackingError {
    #[error("timestamp went backwards: {now_ms}ms after {last_ms}ms")]
    ClockRegression { now_ms: u64, last_ms: u64 },

    #[error("feature `{0}` is not a finite number")]
    NonFiniteFeature(&'static str),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("total_rakaats must be greater than zero")]
    ZeroRakaats,

    #[error("smoothing alpha must be in (0, 1], got {0}")]
    InvalidAlpha(f64),

    #[error("min_visibility must be in [0, 1), got {0}")]
    InvalidVisibility(f64),

    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}
