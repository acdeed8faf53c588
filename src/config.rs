use serde::Deserialize;

use crate::models::RetentionPolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetentionConfig {
    /// Optional cron expression for the retention job (e.g. "0 0 4 * * *" = 04:00 daily). Local time.
    #[serde(default)]
    pub schedule: Option<String>,
    /// Fixed fallback interval when schedule is not set.
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
    /// Default retention windows for assignments without a stored config.
    #[serde(default)]
    pub defaults: RetentionPolicy,
}

fn default_tick_interval_secs() -> u64 {
    86_400
}

impl Default for RetentionConfig {
    fn default() -> Self {
        RetentionConfig {
            schedule: None,
            tick_interval_secs: default_tick_interval_secs(),
            defaults: RetentionPolicy::default(),
        }
    }
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        let s = std::fs::read_to_string(&path)?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        anyhow::ensure!(
            !self.database.path.is_empty(),
            "database.path must be non-empty"
        );
        anyhow::ensure!(
            self.retention.tick_interval_secs > 0,
            "retention.tick_interval_secs must be > 0, got {}",
            self.retention.tick_interval_secs
        );
        anyhow::ensure!(
            self.retention.defaults.raw_retention_days > 0,
            "retention.defaults.raw_retention_days must be > 0, got {}",
            self.retention.defaults.raw_retention_days
        );
        anyhow::ensure!(
            self.retention.defaults.hourly_retention_days >= self.retention.defaults.raw_retention_days,
            "retention.defaults.hourly_retention_days must be >= raw_retention_days, got {} < {}",
            self.retention.defaults.hourly_retention_days,
            self.retention.defaults.raw_retention_days
        );
        anyhow::ensure!(
            self.retention.defaults.daily_retention_days >= self.retention.defaults.hourly_retention_days,
            "retention.defaults.daily_retention_days must be >= hourly_retention_days, got {} < {}",
            self.retention.defaults.daily_retention_days,
            self.retention.defaults.hourly_retention_days
        );
        if let Some(ref schedule) = self.retention.schedule {
            anyhow::ensure!(
                !schedule.trim().is_empty(),
                "retention.schedule must be a cron expression or absent"
            );
        }
        Ok(())
    }
}
