use std::time::Duration;

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long a hold blocks units before the reaper expires it
    pub hold_duration: Duration,
    /// How often the reaper garbage-collects terminal hold records
    pub sweep_interval: Duration,
    /// How long terminal holds stay queryable before eviction
    pub terminal_retention: Duration,
    /// Capacity of the hold event broadcast channel
    pub event_channel_capacity: usize,
}

/// 默认 5 分钟支付窗口
const DEFAULT_HOLD_DURATION_SECS: u64 = 300;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
const DEFAULT_TERMINAL_RETENTION_SECS: u64 = 600;
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 1024;

impl EngineConfig {
    pub fn from_env() -> Self {
        Self {
            hold_duration: std::env::var("HOLD_DURATION_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(Duration::from_secs(DEFAULT_HOLD_DURATION_SECS)),
            sweep_interval: std::env::var("REAPER_SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS)),
            terminal_retention: std::env::var("TERMINAL_RETENTION_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(Duration::from_secs(DEFAULT_TERMINAL_RETENTION_SECS)),
            event_channel_capacity: std::env::var("EVENT_CHANNEL_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_EVENT_CHANNEL_CAPACITY),
        }
    }

    /// Config with a custom hold duration (tests use short windows)
    pub fn with_hold_duration(hold_duration: Duration) -> Self {
        Self {
            hold_duration,
            ..Self::default()
        }
    }

    /// Hold duration as a chrono offset for deadline arithmetic
    pub fn hold_duration_chrono(&self) -> chrono::Duration {
        // Out-of-range std durations clamp to a century
        chrono::Duration::from_std(self.hold_duration)
            .unwrap_or_else(|_| chrono::Duration::days(36500))
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            hold_duration: Duration::from_secs(DEFAULT_HOLD_DURATION_SECS),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            terminal_retention: Duration::from_secs(DEFAULT_TERMINAL_RETENTION_SECS),
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
        }
    }
}
