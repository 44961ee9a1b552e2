//! Configuration module for wabot.
//!
//! Loads configuration from environment variables.

use std::env;
use std::path::PathBuf;

use thiserror::Error;
use url::Url;

use crate::events::jid;
use crate::socket::BotIdentity;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Where persistent state lives.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StoreBackend {
    #[default]
    Json,
    Sqlite,
    Mongo {
        uri: String,
        database: String,
    },
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    // Bridge
    pub bridge_url: Url,
    pub bridge_token: Option<String>,
    /// Identity fields that win over what the bridge reports.
    pub identity: BotIdentity,

    // Event feed
    pub feed_port: u16,
    pub feed_secret: Option<String>,

    // Plugins
    pub plugin_dir: PathBuf,
    pub hot_reload: bool,

    // Storage
    pub data_dir: PathBuf,
    pub store: StoreBackend,

    // Dispatch
    pub prefixes: Vec<String>,
    /// Owner jids (OWNER_IDS, numbers expanded to user jids)
    pub owner_ids: Vec<String>,
    pub recent_window: usize,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through `lookup`, which returns a variable's value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bridge_url = var("BRIDGE_URL").ok_or(ConfigError::Missing("BRIDGE_URL"))?;
        // Url::join drops the last segment unless the base ends with a slash.
        let bridge_url = if bridge_url.ends_with('/') {
            bridge_url
        } else {
            format!("{}/", bridge_url)
        };
        let bridge_url = Url::parse(&bridge_url).map_err(|e| ConfigError::Invalid {
            name: "BRIDGE_URL",
            reason: e.to_string(),
        })?;

        let store = match var("STORE_BACKEND")
            .unwrap_or_else(|| "json".to_string())
            .to_lowercase()
            .as_str()
        {
            "json" => StoreBackend::Json,
            "sqlite" => StoreBackend::Sqlite,
            "mongo" | "mongodb" => StoreBackend::Mongo {
                uri: var("MONGODB_URI").ok_or(ConfigError::Missing("MONGODB_URI"))?,
                database: var("MONGODB_DATABASE").unwrap_or_else(|| "wabot".to_string()),
            },
            other => {
                return Err(ConfigError::Invalid {
                    name: "STORE_BACKEND",
                    reason: format!("unknown backend {}", other),
                });
            }
        };

        let prefixes = var("PREFIXES")
            .unwrap_or_else(|| ". /".to_string())
            .split_whitespace()
            .map(str::to_string)
            .collect();

        // Parse owner IDs
        let owner_ids = var("OWNER_IDS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                if s.contains('@') {
                    jid::normalize(s)
                } else {
                    jid::from_number(s)
                }
            })
            .collect();

        Ok(Self {
            bridge_url,
            bridge_token: var("BRIDGE_TOKEN"),
            identity: BotIdentity {
                id: var("BOT_JID"),
                lid: var("BOT_LID"),
                name: None,
            },
            feed_port: parse_or("FEED_PORT", var("FEED_PORT"), 8787)?,
            feed_secret: var("FEED_SECRET"),
            plugin_dir: PathBuf::from(var("PLUGIN_DIR").unwrap_or_else(|| "plugins".to_string())),
            hot_reload: parse_bool("HOT_RELOAD", var("HOT_RELOAD"), true)?,
            data_dir: PathBuf::from(var("DATA_DIR").unwrap_or_else(|| "data".to_string())),
            store,
            prefixes,
            owner_ids,
            recent_window: parse_or("RECENT_ID_WINDOW", var("RECENT_ID_WINDOW"), 100)?,
        })
    }
}

fn parse_or<T>(name: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn parse_bool(name: &'static str, value: Option<String>, default: bool) -> Result<bool, ConfigError> {
    match value.map(|v| v.to_lowercase()).as_deref() {
        None => Ok(default),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => Err(ConfigError::Invalid {
            name,
            reason: format!("expected a boolean, got {}", other),
        }),
    }
}
