// src/config.rs

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::sys::poller::PollPolicy;

pub const DEFAULT_ROLE: &str = "Key Vault Secrets User";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Clone, Debug)]
pub struct AccessConfig {
    // 🛡️ Least privilege: the single data-plane role requested
    pub role_name: String,

    // ⏳ Eventual-consistency windows
    pub poll: PollPolicy,
    pub role_settle: Duration,
    pub lock_settle: Duration,

    // 📂 Local state for the selection UI
    pub cache_dir: PathBuf,
    pub cache_ttl: chrono::Duration,

    pub log_format: LogFormat,
}

impl AccessConfig {
    pub fn load() -> Result<Self, String> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup. Numeric values are parsed
    /// strictly: a malformed value refuses to start instead of defaulting.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secs = |key: &str, default: u64| -> Result<u64, String> {
            match lookup(key) {
                None => Ok(default),
                Some(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| format!("{} must be a whole number of seconds, got '{}'", key, raw)),
            }
        };

        let interval = secs("KARI_VAULT_POLL_INTERVAL_SECS", 5)?;
        let timeout = secs("KARI_VAULT_POLL_TIMEOUT_SECS", 300)?;
        if interval == 0 {
            return Err("KARI_VAULT_POLL_INTERVAL_SECS must be greater than zero".into());
        }
        if interval > timeout {
            return Err(format!(
                "Poll interval ({}s) cannot exceed poll timeout ({}s)",
                interval, timeout
            ));
        }

        let ttl_days = match lookup("KARI_VAULT_CACHE_TTL_DAYS") {
            None => 30,
            Some(raw) => raw
                .trim()
                .parse::<i64>()
                .ok()
                .filter(|days| *days >= 0)
                .ok_or_else(|| format!("KARI_VAULT_CACHE_TTL_DAYS must be a non-negative integer, got '{}'", raw))?,
        };

        let log_format = match lookup("KARI_LOG_FORMAT").as_deref().map(str::trim) {
            None | Some("") | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => return Err(format!("KARI_LOG_FORMAT must be 'text' or 'json', got '{}'", other)),
        };

        Ok(Self {
            role_name: lookup("KARI_VAULT_ROLE")
                .filter(|role| !role.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_ROLE.to_string()),

            poll: PollPolicy {
                interval: Duration::from_secs(interval),
                timeout: Duration::from_secs(timeout),
            },
            role_settle: Duration::from_secs(secs("KARI_VAULT_ROLE_SETTLE_SECS", 5)?),
            lock_settle: Duration::from_secs(secs("KARI_VAULT_LOCK_SETTLE_SECS", 3)?),

            cache_dir: lookup("KARI_VAULT_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(default_cache_dir),
            cache_ttl: chrono::Duration::days(ttl_days),

            log_format,
        })
    }
}

fn default_cache_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(env::temp_dir)
        .join(".kari")
        .join("vault-access")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AccessConfig, String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AccessConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_match_documented_policy() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.role_name, DEFAULT_ROLE);
        assert_eq!(config.poll, PollPolicy::default());
        assert_eq!(config.role_settle, Duration::from_secs(5));
        assert_eq!(config.lock_settle, Duration::from_secs(3));
        assert_eq!(config.cache_ttl, chrono::Duration::days(30));
        assert_eq!(config.log_format, LogFormat::Text);
        assert!(config.cache_dir.ends_with(".kari/vault-access"));
    }

    #[test]
    fn overrides_are_applied() {
        let config = config_from(&[
            ("KARI_VAULT_ROLE", "Key Vault Secrets Officer"),
            ("KARI_VAULT_POLL_INTERVAL_SECS", "2"),
            ("KARI_VAULT_POLL_TIMEOUT_SECS", "10"),
            ("KARI_VAULT_CACHE_DIR", "/tmp/kv-cache"),
            ("KARI_VAULT_CACHE_TTL_DAYS", "7"),
            ("KARI_LOG_FORMAT", "json"),
        ])
        .unwrap();
        assert_eq!(config.role_name, "Key Vault Secrets Officer");
        assert_eq!(config.poll.max_attempts(), 5);
        assert_eq!(config.cache_dir, PathBuf::from("/tmp/kv-cache"));
        assert_eq!(config.cache_ttl, chrono::Duration::days(7));
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn malformed_numbers_refuse_to_start() {
        assert!(config_from(&[("KARI_VAULT_POLL_TIMEOUT_SECS", "five")]).is_err());
        assert!(config_from(&[("KARI_VAULT_LOCK_SETTLE_SECS", "-1")]).is_err());
        assert!(config_from(&[("KARI_VAULT_CACHE_TTL_DAYS", "-3")]).is_err());
    }

    #[test]
    fn interval_must_fit_timeout() {
        assert!(config_from(&[("KARI_VAULT_POLL_INTERVAL_SECS", "0")]).is_err());
        assert!(config_from(&[
            ("KARI_VAULT_POLL_INTERVAL_SECS", "30"),
            ("KARI_VAULT_POLL_TIMEOUT_SECS", "10"),
        ])
        .is_err());
    }

    #[test]
    fn unknown_log_format_rejected() {
        assert!(config_from(&[("KARI_LOG_FORMAT", "xml")]).is_err());
    }
}
