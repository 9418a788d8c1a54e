//! Process configuration read from the environment.

use std::net::SocketAddr;
use std::time::Duration;

use leasekeep_core::OwnerToken;

use crate::jobs::JobSettings;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{key}: invalid value '{value}': {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(key: &'static str, value: &str, reason: impl ToString) -> Self {
        Self::Invalid {
            key,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Settings for one instance.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Postgres URL; `None` selects the in-memory stores.
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub bind_addr: SocketAddr,
    /// Owner token written into every lease this instance takes.
    pub instance_id: OwnerToken,
    pub seed_demo_data: bool,
    pub jobs: JobSettings,
}

impl AppConfig {
    pub const DEFAULT_BIND_ADDR: &'static str = "0.0.0.0:8080";
    pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;
    pub const MAX_RETENTION_SECS: u64 = 10 * 365 * 24 * 60 * 60;

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind_raw = get("BIND_ADDR").unwrap_or_else(|| Self::DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_raw
            .parse()
            .map_err(|e| ConfigError::invalid("BIND_ADDR", &bind_raw, e))?;

        let instance_id = match get("INSTANCE_ID") {
            Some(raw) => OwnerToken::new(raw.trim()).map_err(|e| ConfigError::invalid("INSTANCE_ID", &raw, e))?,
            None => OwnerToken::generate(),
        };

        let seed_demo_data = match get("SEED_DEMO_DATA") {
            Some(raw) => parse_bool("SEED_DEMO_DATA", &raw)?,
            None => true,
        };

        let defaults = JobSettings::default();
        let processing_delay = match get("PROCESSING_DELAY_MS") {
            Some(raw) => Duration::from_millis(parse_number("PROCESSING_DELAY_MS", &raw)?),
            None => defaults.processing_delay,
        };
        let retention = match get("CLEANUP_RETENTION_SECS") {
            Some(raw) => {
                let secs: u64 = parse_number("CLEANUP_RETENTION_SECS", &raw)?;
                if secs > Self::MAX_RETENTION_SECS {
                    return Err(ConfigError::invalid(
                        "CLEANUP_RETENTION_SECS",
                        &raw,
                        format!("must be at most {} (10 years)", Self::MAX_RETENTION_SECS),
                    ));
                }
                Duration::from_secs(secs)
            }
            None => defaults.retention,
        };

        let db_max_connections = match get("DB_MAX_CONNECTIONS") {
            Some(raw) => {
                let n: u32 = parse_number("DB_MAX_CONNECTIONS", &raw)?;
                if n == 0 {
                    return Err(ConfigError::invalid("DB_MAX_CONNECTIONS", &raw, "must be at least 1"));
                }
                n
            }
            None => Self::DEFAULT_MAX_CONNECTIONS,
        };

        Ok(Self {
            database_url: get("DATABASE_URL"),
            db_max_connections,
            bind_addr,
            instance_id,
            seed_demo_data,
            jobs: JobSettings {
                processing_delay,
                retention,
            },
        })
    }
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::invalid(key, raw, "expected true or false")),
    }
}

fn parse_number<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e| ConfigError::invalid(key, raw, e))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.database_url, None);
        assert_eq!(cfg.bind_addr, "0.0.0.0:8080".parse::<SocketAddr>().unwrap());
        assert!(cfg.seed_demo_data);
        assert_eq!(cfg.jobs.processing_delay, Duration::from_millis(2000));
        assert_eq!(cfg.jobs.retention, Duration::from_secs(3600));
        assert_eq!(cfg.db_max_connections, 5);
        assert!(!cfg.instance_id.as_str().is_empty());
    }

    #[test]
    fn overrides() {
        let cfg = config(&[
            ("DATABASE_URL", "postgres://localhost/leasekeep"),
            ("BIND_ADDR", "127.0.0.1:9000"),
            ("INSTANCE_ID", "node-a"),
            ("SEED_DEMO_DATA", "false"),
            ("PROCESSING_DELAY_MS", "10"),
            ("CLEANUP_RETENTION_SECS", "60"),
            ("DB_MAX_CONNECTIONS", "12"),
        ])
        .unwrap();

        assert_eq!(cfg.database_url.as_deref(), Some("postgres://localhost/leasekeep"));
        assert_eq!(cfg.bind_addr.port(), 9000);
        assert_eq!(cfg.instance_id.as_str(), "node-a");
        assert!(!cfg.seed_demo_data);
        assert_eq!(cfg.jobs.processing_delay, Duration::from_millis(10));
        assert_eq!(cfg.jobs.retention, Duration::from_secs(60));
        assert_eq!(cfg.db_max_connections, 12);
    }

    #[test]
    fn empty_database_url_means_in_memory() {
        assert_eq!(config(&[("DATABASE_URL", "  ")]).unwrap().database_url, None);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            config(&[("BIND_ADDR", "nowhere")]),
            Err(ConfigError::Invalid { key: "BIND_ADDR", .. })
        ));
        assert!(config(&[("SEED_DEMO_DATA", "maybe")]).is_err());
        assert!(config(&[("PROCESSING_DELAY_MS", "-1")]).is_err());
        assert!(config(&[("DB_MAX_CONNECTIONS", "0")]).is_err());
    }

    #[test]
    fn retention_is_bounded() {
        assert!(matches!(
            config(&[("CLEANUP_RETENTION_SECS", "18446744073709551615")]),
            Err(ConfigError::Invalid { key: "CLEANUP_RETENTION_SECS", .. })
        ));
        let max = AppConfig::MAX_RETENTION_SECS.to_string();
        let cfg = config(&[("CLEANUP_RETENTION_SECS", max.as_str())]).unwrap();
        assert_eq!(cfg.jobs.retention, Duration::from_secs(AppConfig::MAX_RETENTION_SECS));
    }
}
