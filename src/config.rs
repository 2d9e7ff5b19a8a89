use std::{env, fmt::Display, str::FromStr};

use log::{info, warn};
use thiserror::Error;

#[derive(Error, Debug)]
#[error("invalid value for {key}: {reason}")]
pub struct ConfigError {
    key: &'static str,
    reason: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,
    pub port: u16,
    pub pool_size: u32,
    pub page_size: i64,
    pub max_page_size: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "foodgram.sqlite3".to_string(),
            bind_address: "127.0.0.1".to_string(),
            port: 8080,
            pool_size: 8,
            page_size: 6,
            max_page_size: 100,
        }
    }
}

impl Config {
    /// Reads the process environment, after `.env` has been merged into it.
    pub fn load() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            database_url: try_load("DATABASE_URL", defaults.database_url)?,
            bind_address: try_load("BIND_ADDRESS", defaults.bind_address)?,
            port: try_load("PORT", defaults.port)?,
            pool_size: try_load("DB_POOL_SIZE", defaults.pool_size)?,
            page_size: try_load("PAGE_SIZE", defaults.page_size)?,
            max_page_size: try_load("MAX_PAGE_SIZE", defaults.max_page_size)?,
        };

        if config.pool_size == 0 {
            return Err(ConfigError {
                key: "DB_POOL_SIZE",
                reason: "must be at least 1".to_string(),
            });
        }
        if config.page_size < 1 || config.page_size > config.max_page_size {
            return Err(ConfigError {
                key: "PAGE_SIZE",
                reason: format!("must be between 1 and {}", config.max_page_size),
            });
        }
        Ok(config)
    }
}

fn try_load<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr + Display,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| {
            warn!("Invalid {key} value: {e}");
            ConfigError {
                key,
                reason: e.to_string(),
            }
        }),
        Err(_) => {
            info!("{key} not set, using default: {default}");
            Ok(default)
        }
    }
}
