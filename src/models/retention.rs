// Per-assignment retention windows; assignments without a stored row use the defaults.

use serde::{Deserialize, Serialize};

/// Retention windows (days) for one system+configuration assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    #[serde(default = "default_raw_retention_days")]
    pub raw_retention_days: u32,
    #[serde(default = "default_hourly_retention_days")]
    pub hourly_retention_days: u32,
    #[serde(default = "default_daily_retention_days")]
    pub daily_retention_days: u32,
}

fn default_raw_retention_days() -> u32 {
    7
}

fn default_hourly_retention_days() -> u32 {
    30
}

fn default_daily_retention_days() -> u32 {
    365
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        RetentionPolicy {
            raw_retention_days: default_raw_retention_days(),
            hourly_retention_days: default_hourly_retention_days(),
            daily_retention_days: default_daily_retention_days(),
        }
    }
}
