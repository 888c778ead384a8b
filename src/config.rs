use crate::components::scheduler::{default_rules, ReminderRule};
use crate::error::{config_error, BotResult};
use chrono_tz::Tz;
use dotenvy::dotenv;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;

/// Timezone events are entered and displayed in, unless overridden
pub const DEFAULT_TIMEZONE: &str = "America/Argentina/Buenos_Aires";

/// Main configuration structure for the bot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Redis connection URL for the durable event store
    pub redis_url: String,
    /// Store backend: "redis" (durable) or "memory" (volatile)
    pub store_backend: String,
    /// Timezone for parsing and displaying event times
    pub timezone: String,
    /// Webhook URL notifications are relayed to; logged when unset
    pub notify_webhook_url: Option<String>,
    /// Minutes an abandoned event draft survives before being purged
    pub draft_ttl_minutes: i64,
    /// Lead times and messages for advance notifications
    pub reminder_rules: Vec<ReminderRule>,
}

/// Shape of the optional `config/reminders.toml` override file
#[derive(Debug, Deserialize)]
struct RulesFile {
    #[serde(default)]
    rules: Vec<ReminderRule>,
}

impl Config {
    /// Load configuration from environment and the optional rules file
    pub fn load() -> BotResult<Self> {
        // Load .env file if it exists
        dotenv().ok();

        let redis_url =
            env::var("REDIS_URL").unwrap_or_else(|_| String::from("redis://127.0.0.1:6379"));
        let store_backend = env::var("STORE_BACKEND").unwrap_or_else(|_| String::from("redis"));
        let timezone = env::var("TIMEZONE").unwrap_or_else(|_| String::from(DEFAULT_TIMEZONE));
        let notify_webhook_url = env::var("NOTIFY_WEBHOOK_URL").ok();

        let draft_ttl_minutes = match env::var("DRAFT_TTL_MINUTES") {
            Ok(value) => value
                .parse::<i64>()
                .map_err(|_| config_error("Invalid DRAFT_TTL_MINUTES format"))?,
            Err(_) => 15,
        };

        // Built-in rules unless the override file provides a set
        let mut reminder_rules = default_rules();
        if let Ok(content) = fs::read_to_string("config/reminders.toml") {
            let file: RulesFile = toml::from_str(&content)?;
            if !file.rules.is_empty() {
                reminder_rules = file.rules;
            }
        }

        let config = Config {
            redis_url,
            store_backend,
            timezone,
            notify_webhook_url,
            draft_ttl_minutes,
            reminder_rules,
        };
        config.tz()?;

        Ok(config)
    }

    /// Parse the configured timezone
    pub fn tz(&self) -> BotResult<Tz> {
        self.timezone
            .parse()
            .map_err(|_| config_error(&format!("Unknown timezone: {}", self.timezone)))
    }
}
