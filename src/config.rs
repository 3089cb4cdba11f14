// Runtime configuration, read once at start-up and passed down explicitly.
// Required values fail fast so the bot never half-starts without a store.

use crate::core::sessions::ReconnectPolicy;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing {0} environment variable")]
    Missing(&'static str),

    #[error("Invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Postgres address: a `postgres://` URL or `host[:port]`.
    pub db_address: String,
    pub db_password: String,
    pub db_name: String,
    pub db_pool_size: u32,
    pub discord_token: String,
    /// Upper bound on any single store call made while handling a command.
    pub store_timeout: Duration,
    pub reconnect: ReconnectPolicy,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key/value source (the environment in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |key: &'static str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .ok_or(ConfigError::Missing(key))
        };

        let db_address = required("DB")?;
        let db_password = required("DBPASS")?;
        let discord_token = required("DISCORD_TOKEN")?;

        let db_name = lookup("DB_NAME").unwrap_or_else(|| "overstats".to_string());
        let db_pool_size = parse_or(&lookup, "DB_POOL_SIZE", 10)?;
        let store_timeout = Duration::from_secs(parse_or(&lookup, "STORE_TIMEOUT_SECS", 5)?);

        let reconnect = match lookup("STREAM_RECONNECT").as_deref().map(str::trim) {
            None | Some("") | Some("exit") => ReconnectPolicy::Exit,
            Some("retry") => ReconnectPolicy::Retry {
                max_backoff: Duration::from_secs(parse_or(
                    &lookup,
                    "STREAM_RECONNECT_MAX_BACKOFF_SECS",
                    60,
                )?),
            },
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "STREAM_RECONNECT",
                    value: other.to_string(),
                })
            }
        };

        Ok(Self {
            db_address,
            db_password,
            db_name,
            db_pool_size,
            discord_token,
            store_timeout,
            reconnect,
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| env.get(key).cloned())
    }

    const REQUIRED: [(&str, &str); 3] = [
        ("DB", "localhost:5432"),
        ("DBPASS", "secret"),
        ("DISCORD_TOKEN", "token"),
    ];

    #[test]
    fn defaults_apply_when_only_required_values_are_set() {
        let config = config_from(&REQUIRED).unwrap();
        assert_eq!(config.db_address, "localhost:5432");
        assert_eq!(config.db_name, "overstats");
        assert_eq!(config.db_pool_size, 10);
        assert_eq!(config.store_timeout, Duration::from_secs(5));
        assert_eq!(config.reconnect, ReconnectPolicy::Exit);
    }

    #[test]
    fn missing_store_credentials_fail_fast() {
        assert_eq!(
            config_from(&[("DBPASS", "x"), ("DISCORD_TOKEN", "t")]).unwrap_err(),
            ConfigError::Missing("DB")
        );
        assert_eq!(
            config_from(&[("DB", "h"), ("DBPASS", " "), ("DISCORD_TOKEN", "t")]).unwrap_err(),
            ConfigError::Missing("DBPASS")
        );
    }

    #[test]
    fn retry_policy_reads_its_backoff() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("STREAM_RECONNECT", "retry"));
        pairs.push(("STREAM_RECONNECT_MAX_BACKOFF_SECS", "30"));
        let config = config_from(&pairs).unwrap();
        assert_eq!(
            config.reconnect,
            ReconnectPolicy::Retry {
                max_backoff: Duration::from_secs(30)
            }
        );
    }

    #[test]
    fn bad_values_are_rejected() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("STORE_TIMEOUT_SECS", "soon"));
        assert!(matches!(
            config_from(&pairs),
            Err(ConfigError::Invalid {
                key: "STORE_TIMEOUT_SECS",
                ..
            })
        ));

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("STREAM_RECONNECT", "forever"));
        assert!(config_from(&pairs).is_err());
    }
}
