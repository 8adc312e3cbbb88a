use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind: SocketAddr,
    pub admin_username: String,
    pub admin_password: String,
    pub persist_path: Option<PathBuf>,
    pub allow_wishlist_edits_after_shuffle: bool,
    pub shuffle_seed: Option<u64>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind = parse(&lookup, "EXCHANGE_BIND", "0.0.0.0:3000", |v| {
            v.parse::<SocketAddr>().ok()
        })?;
        let allow_wishlist_edits_after_shuffle = parse(
            &lookup,
            "ALLOW_WISHLIST_EDITS_AFTER_SHUFFLE",
            "true",
            parse_bool,
        )?;
        let shuffle_seed = match lookup("SHUFFLE_SEED") {
            Some(raw) => Some(raw.trim().parse::<u64>().map_err(|_| ConfigError::Invalid {
                key: "SHUFFLE_SEED",
                value: raw,
            })?),
            None => None,
        };

        Ok(Self {
            bind,
            admin_username: lookup("ADMIN_USERNAME").unwrap_or_else(|| "admin".to_string()),
            admin_password: lookup("ADMIN_PASSWORD").unwrap_or_else(|| "changeme".to_string()),
            persist_path: lookup("PERSIST_PATH")
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
            allow_wishlist_edits_after_shuffle,
            shuffle_seed,
        })
    }
}

fn parse<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: &str,
    parser: impl Fn(&str) -> Option<T>,
) -> Result<T, ConfigError> {
    let raw = lookup(key).unwrap_or_else(|| default.to_string());
    parser(raw.trim()).ok_or(ConfigError::Invalid { key, value: raw })
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}
