use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_BIND: &str = "0.0.0.0:8080";
pub const DEFAULT_DB_PATH: &str = "trading_journal.db";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} is required")]
    Missing { key: &'static str },

    #[error("{key} has an invalid value '{value}'")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind: SocketAddr,
    pub db_path: String,
    /// Passphrase for API secret encryption
    pub master_key: String,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    /// None disables background sync
    pub sync_interval: Option<Duration>,
}

impl Config {
    /// Reads the process environment after loading `.env` if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind_raw = env("JOURNAL_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind = bind_raw.parse::<SocketAddr>().map_err(|_| ConfigError::Invalid {
            key: "JOURNAL_BIND",
            value: bind_raw.clone(),
        })?;

        let db_path = env("JOURNAL_DB_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.to_string());

        let master_key = match env("JOURNAL_MASTER_KEY") {
            Some(key) => key,
            // Secrets in a throwaway database only need to survive this process
            None if db_path == ":memory:" => uuid::Uuid::new_v4().to_string(),
            None => return Err(ConfigError::Missing { key: "JOURNAL_MASTER_KEY" }),
        };

        let sync_interval = match env("JOURNAL_SYNC_INTERVAL_SECS") {
            None => None,
            Some(raw) => {
                let secs = raw.parse::<u64>().map_err(|_| ConfigError::Invalid {
                    key: "JOURNAL_SYNC_INTERVAL_SECS",
                    value: raw.clone(),
                })?;
                (secs > 0).then(|| Duration::from_secs(secs))
            }
        };

        Ok(Self {
            bind,
            db_path,
            master_key,
            gemini_api_key: env("GEMINI_API_KEY"),
            gemini_model: env("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            sync_interval,
        })
    }
}
