//! # Feature: Configuration System
//!
//! Service configuration from a YAML file with environment variable
//! interpolation, or from plain environment variables.
//!
//! - **Version**: 1.1.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.1.0: Add rollover_policy and REST settings
//! - 1.0.0: Initial environment variable configuration

use crate::habit_service::{HabitRules, RolloverPolicy};
use crate::notifications::DailyTime;
use anyhow::{Context, Result};
use log::info;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Telegram bot token (required)
    pub telegram_bot_token: String,

    /// HMAC key for REST access tokens (required)
    pub secret_key: String,

    #[serde(default = "default_database_path")]
    pub database_path: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Local wall-clock time of the daily reminder, HH:MM
    #[serde(default = "default_notification_time")]
    pub notification_time: String,

    /// Completions that form a habit
    #[serde(default = "default_completion_days")]
    pub habit_completion_days: u32,

    #[serde(default)]
    pub rollover_policy: RolloverPolicy,

    #[serde(default = "default_api_bind_addr")]
    pub api_bind_addr: String,

    #[serde(default = "default_token_expire_minutes")]
    pub access_token_expire_minutes: i64,
}

// Default value functions for serde
fn default_database_path() -> String {
    "habits.db".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_notification_time() -> String {
    "09:00".to_string()
}

fn default_completion_days() -> u32 {
    21
}

fn default_api_bind_addr() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_token_expire_minutes() -> i64 {
    30
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let config = Config {
            telegram_bot_token: env::var("TELEGRAM_BOT_TOKEN")
                .map_err(|_| anyhow::anyhow!("TELEGRAM_BOT_TOKEN environment variable not set"))?,
            secret_key: env::var("SECRET_KEY")
                .map_err(|_| anyhow::anyhow!("SECRET_KEY environment variable not set"))?,
            database_path: env::var("DATABASE_PATH").unwrap_or_else(|_| default_database_path()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| default_log_level()),
            notification_time: env::var("NOTIFICATION_TIME").unwrap_or_else(|_| default_notification_time()),
            habit_completion_days: match env::var("HABIT_COMPLETION_DAYS") {
                Ok(days) => days
                    .trim()
                    .parse::<u32>()
                    .with_context(|| format!("Invalid HABIT_COMPLETION_DAYS '{days}'"))?,
                Err(_) => default_completion_days(),
            },
            rollover_policy: match env::var("ROLLOVER_POLICY") {
                Ok(policy) => policy.parse::<RolloverPolicy>()?,
                Err(_) => RolloverPolicy::default(),
            },
            api_bind_addr: env::var("API_BIND_ADDR").unwrap_or_else(|_| default_api_bind_addr()),
            access_token_expire_minutes: match env::var("ACCESS_TOKEN_EXPIRE_MINUTES") {
                Ok(minutes) => minutes
                    .trim()
                    .parse::<i64>()
                    .with_context(|| format!("Invalid ACCESS_TOKEN_EXPIRE_MINUTES '{minutes}'"))?,
                Err(_) => default_token_expire_minutes(),
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file.
    ///
    /// Supports `${VAR_NAME}` syntax for environment variable substitution.
    /// Example: `telegram_bot_token: "${TELEGRAM_BOT_TOKEN}"`
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let interpolated = interpolate_env_vars(&content)?;

        let config: Config = serde_yaml::from_str(&interpolated)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;

        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Auto-detect and load configuration
    ///
    /// Priority order:
    /// 1. If CONFIG_FILE env var is set, load from that file
    /// 2. If config.yaml exists in current directory, load from it
    /// 3. Fall back to environment variables
    pub fn auto_load() -> Result<Self> {
        if let Ok(config_path) = env::var("CONFIG_FILE") {
            info!("Loading config from CONFIG_FILE: {}", config_path);
            return Self::from_file(&config_path);
        }

        let default_config_path = "config.yaml";
        if Path::new(default_config_path).exists() {
            info!("Loading config from {}", default_config_path);
            return Self::from_file(default_config_path);
        }

        info!("No config file found, using environment variables");
        Self::from_env()
    }

    pub fn validate(&self) -> Result<()> {
        if self.telegram_bot_token.trim().is_empty() {
            anyhow::bail!("telegram_bot_token is required");
        }
        if self.secret_key.is_empty() {
            anyhow::bail!("secret_key is required");
        }
        if self.habit_completion_days == 0 {
            anyhow::bail!("habit_completion_days must be greater than 0");
        }
        if self.access_token_expire_minutes <= 0 {
            anyhow::bail!("access_token_expire_minutes must be greater than 0");
        }
        self.reminder_time()?;
        Ok(())
    }

    pub fn reminder_time(&self) -> Result<DailyTime> {
        self.notification_time
            .parse::<DailyTime>()
            .with_context(|| format!("Invalid notification_time '{}'", self.notification_time))
    }

    pub fn habit_rules(&self) -> HabitRules {
        HabitRules {
            completion_threshold: self.habit_completion_days,
            rollover_policy: self.rollover_policy,
        }
    }
}

/// Interpolate environment variables in a string
///
/// Supports `${VAR_NAME}`. If a variable is not set, returns an error.
/// Use `${VAR_NAME:-default}` for default values.
fn interpolate_env_vars(content: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
        .context("Invalid interpolation pattern")?;

    let mut result = content.to_string();
    let mut errors = Vec::new();

    for cap in re.captures_iter(content) {
        let Some(full_match) = cap.get(0).map(|m| m.as_str()) else {
            continue;
        };
        let var_name = &cap[1];
        let default_value = cap.get(2).map(|m| m.as_str());

        let value = match (env::var(var_name), default_value) {
            (Ok(v), _) => v,
            (Err(_), Some(default)) => default.to_string(),
            (Err(_), None) => {
                errors.push(format!("Environment variable '{}' is not set", var_name));
                continue;
            }
        };

        result = result.replace(full_match, &value);
    }

    if !errors.is_empty() {
        anyhow::bail!("Missing environment variables:\n  - {}", errors.join("\n  - "));
    }

    Ok(result)
}
