use std::env;

use anyhow::Context;
use chrono_tz::Tz;

use crate::scheduling::{ScheduleSettings, TimeOfDay, TimeWindow};

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_port: u16,
    pub database_url: String,
    /// Timezone used for users whose preferences don't name one.
    pub default_timezone: Tz,
    /// Working hours for weekdays without a preferred-time entry.
    pub workday: TimeWindow,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    pub fn from_env() -> anyhow::Result<Self> {
        let api_port = env_or("API_PORT", "3000")
            .parse()
            .context("API_PORT must be a valid port number")?;
        let database_url = env_or("DATABASE_URL", "sqlite:data/scheduler.db?mode=rwc");
        let default_timezone = env_or("DEFAULT_TIMEZONE", "UTC")
            .parse::<Tz>()
            .map_err(|e| anyhow::anyhow!("DEFAULT_TIMEZONE is not a known timezone: {e}"))?;
        let start: TimeOfDay = env_or("WORKDAY_START", "09:00")
            .parse()
            .context("WORKDAY_START must look like HH:MM")?;
        let end: TimeOfDay = env_or("WORKDAY_END", "17:00")
            .parse()
            .context("WORKDAY_END must look like HH:MM")?;
        if start >= end {
            anyhow::bail!("WORKDAY_START must be earlier than WORKDAY_END");
        }

        Ok(Self {
            api_port,
            database_url,
            default_timezone,
            workday: TimeWindow { start, end },
        })
    }

    pub fn schedule_settings(&self) -> ScheduleSettings {
        ScheduleSettings {
            default_timezone: self.default_timezone,
            workday: self.workday,
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_fields_exist() {
        // Whatever env is currently set must still produce a usable config
        // (avoids env var race conditions between tests).
        let config = Config::from_env().unwrap();
        assert!(config.api_port > 0);
        assert!(!config.database_url.is_empty());
        assert!(config.workday.start < config.workday.end);
    }
}
