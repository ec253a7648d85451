use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context};

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub store_timeout: Duration,
    pub retry_backoff: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        Ok(Config {
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            max_connections: parse_or(&lookup, "ANALYTICS_MAX_CONNECTIONS", 5)?,
            store_timeout: Duration::from_secs(parse_or(
                &lookup,
                "ANALYTICS_STORE_TIMEOUT_SECS",
                10,
            )?),
            retry_backoff: Duration::from_millis(parse_or(
                &lookup,
                "ANALYTICS_RETRY_BACKOFF_MS",
                250,
            )?),
        })
    }

    pub fn require_database_url(&self) -> anyhow::Result<&str> {
        self.database_url
            .as_deref()
            .ok_or_else(|| {
                anyhow!("DATABASE_URL must be set to a Postgres instance (or pass --csv)")
            })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} must be a number, got `{raw}`")),
        None => Ok(default),
    }
}
