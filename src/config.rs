use std::env;

use crate::error::AppError;
use crate::state::Settings;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub event_buffer_size: usize,
    pub dispatch_fanout: usize,
    pub dispatch_entry_ttl_minutes: i64,
    pub quote_window_hours: i64,
    pub sweep_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            dispatch_fanout: parse_or_default("DISPATCH_FANOUT", 5)?,
            dispatch_entry_ttl_minutes: parse_or_default("DISPATCH_ENTRY_TTL_MINUTES", 10)?,
            quote_window_hours: parse_or_default("QUOTE_WINDOW_HOURS", 12)?,
            sweep_interval_secs: parse_or_default("SWEEP_INTERVAL_SECS", 3600)?,
        })
    }

    pub fn settings(&self) -> Settings {
        Settings {
            dispatch_fanout: self.dispatch_fanout,
            dispatch_entry_ttl: chrono::Duration::minutes(self.dispatch_entry_ttl_minutes),
            quote_window: chrono::Duration::hours(self.quote_window_hours),
        }
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
