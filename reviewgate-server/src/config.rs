use anyhow::{bail, Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use reviewgate_core::DEFAULT_LOCK_TTL;

/// Where work items are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Sqlite,
    Memory,
}

#[derive(Clone)]
pub struct Config {
    pub port: u16,
    /// Directory for persistent state (SQLite database).
    /// Defaults to current working directory.
    pub state_dir: PathBuf,
    pub storage: StorageBackend,
    pub lock_ttl: Duration,
    pub lock_sweep_interval: Duration,
    /// Optional bearer token for the /api routes.
    /// If set, requests must include `Authorization: Bearer <token>`.
    /// If not set, the API is open.
    pub api_auth_token: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .context("PORT must be a valid number")?;

        let state_dir = env::var("STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));

        let storage = parse_storage_backend(env::var("STORAGE").ok())?;

        let lock_ttl = parse_seconds(
            "LOCK_TTL_SECS",
            env::var("LOCK_TTL_SECS").ok(),
            DEFAULT_LOCK_TTL,
        )?;

        let lock_sweep_interval = parse_seconds(
            "LOCK_SWEEP_INTERVAL_SECS",
            env::var("LOCK_SWEEP_INTERVAL_SECS").ok(),
            Duration::from_secs(30),
        )?;

        let api_auth_token = parse_api_auth_token(env::var("API_AUTH_TOKEN").ok());

        Ok(Config {
            port,
            state_dir,
            storage,
            lock_ttl,
            lock_sweep_interval,
            api_auth_token,
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.state_dir.join("reviewgate.db")
    }
}

/// Parse API_AUTH_TOKEN from an optional string value.
///
/// Returns None if the value is missing, empty, or contains only whitespace.
/// An empty token must never be accepted as a valid credential.
pub fn parse_api_auth_token(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

pub fn parse_storage_backend(value: Option<String>) -> Result<StorageBackend> {
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(StorageBackend::Sqlite),
        Some(v) if v.eq_ignore_ascii_case("sqlite") => Ok(StorageBackend::Sqlite),
        Some(v) if v.eq_ignore_ascii_case("memory") => Ok(StorageBackend::Memory),
        Some(other) => bail!("STORAGE must be 'sqlite' or 'memory', got '{}'", other),
    }
}

/// A positive whole number of seconds, or `default` when unset.
pub fn parse_seconds(name: &str, value: Option<String>, default: Duration) -> Result<Duration> {
    let Some(raw) = value.filter(|s| !s.trim().is_empty()) else {
        return Ok(default);
    };
    let secs = raw
        .trim()
        .parse::<u64>()
        .with_context(|| format!("{} must be a whole number of seconds", name))?;
    if secs == 0 {
        bail!("{} must be greater than zero", name);
    }
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_api_auth_token_none() {
        assert_eq!(parse_api_auth_token(None), None);
    }

    #[test]
    fn test_parse_api_auth_token_whitespace_only() {
        assert_eq!(parse_api_auth_token(Some("".to_string())), None);
        assert_eq!(parse_api_auth_token(Some(" \t\n".to_string())), None);
    }

    #[test]
    fn test_parse_api_auth_token_not_trimmed() {
        assert_eq!(
            parse_api_auth_token(Some("  token  ".to_string())),
            Some("  token  ".to_string())
        );
    }

    #[test]
    fn test_parse_storage_backend() {
        assert_eq!(parse_storage_backend(None).unwrap(), StorageBackend::Sqlite);
        assert_eq!(
            parse_storage_backend(Some("Memory".to_string())).unwrap(),
            StorageBackend::Memory
        );
        assert!(parse_storage_backend(Some("postgres".to_string())).is_err());
    }

    #[test]
    fn test_parse_seconds_defaults_and_rejects_zero() {
        let default = Duration::from_secs(90);
        assert_eq!(parse_seconds("X", None, default).unwrap(), default);
        assert_eq!(parse_seconds("X", Some(" ".to_string()), default).unwrap(), default);
        assert_eq!(
            parse_seconds("X", Some("5".to_string()), default).unwrap(),
            Duration::from_secs(5)
        );
        assert!(parse_seconds("X", Some("0".to_string()), default).is_err());
        assert!(parse_seconds("X", Some("soon".to_string()), default).is_err());
    }
}
