use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};

/// Secrets that ship in sample `.env` files and must never reach production.
const PLACEHOLDER_SECRETS: &[&str] = &["", "change-me", "dev-secret-change-me", "secret"];

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub token_ttl: chrono::Duration,
    pub store_timeout: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("POKIE_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port = parse_or(&lookup, "POKIE_PORT", 8000u16)?;
        let db_path = PathBuf::from(lookup("POKIE_DB_PATH").unwrap_or_else(|| "pokie.db".into()));

        let jwt_secret = lookup("POKIE_JWT_SECRET").context("POKIE_JWT_SECRET must be set")?;
        if PLACEHOLDER_SECRETS.contains(&jwt_secret.trim()) {
            bail!("POKIE_JWT_SECRET is a placeholder value, set a real secret");
        }

        let ttl_minutes = parse_or(&lookup, "POKIE_TOKEN_TTL_MINUTES", 30i64)?;
        if ttl_minutes <= 0 {
            bail!("POKIE_TOKEN_TTL_MINUTES must be positive");
        }
        let store_timeout_ms = parse_or(&lookup, "POKIE_STORE_TIMEOUT_MS", 5000u64)?;
        if store_timeout_ms == 0 {
            bail!("POKIE_STORE_TIMEOUT_MS must be positive");
        }

        Ok(Self {
            host,
            port,
            db_path,
            jwt_secret,
            token_ttl: chrono::Duration::minutes(ttl_minutes),
            store_timeout: Duration::from_millis(store_timeout_ms),
        })
    }

    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {:?}", key, raw)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_secret_is_set() {
        let config = load(&[("POKIE_JWT_SECRET", "s3cr3t-for-tests")]).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8000);
        assert_eq!(config.db_path, PathBuf::from("pokie.db"));
        assert_eq!(config.token_ttl, chrono::Duration::minutes(30));
        assert_eq!(config.store_timeout, Duration::from_millis(5000));
        assert_eq!(config.addr().unwrap().port(), 8000);
    }

    #[test]
    fn overrides_are_read() {
        let config = load(&[
            ("POKIE_JWT_SECRET", "s3cr3t-for-tests"),
            ("POKIE_HOST", "127.0.0.1"),
            ("POKIE_PORT", "9100"),
            ("POKIE_DB_PATH", "/tmp/poker.db"),
            ("POKIE_TOKEN_TTL_MINUTES", "5"),
            ("POKIE_STORE_TIMEOUT_MS", "250"),
        ])
        .unwrap();
        assert_eq!(config.addr().unwrap().to_string(), "127.0.0.1:9100");
        assert_eq!(config.db_path, PathBuf::from("/tmp/poker.db"));
        assert_eq!(config.token_ttl, chrono::Duration::minutes(5));
        assert_eq!(config.store_timeout, Duration::from_millis(250));
    }

    #[test]
    fn missing_or_placeholder_secret_is_rejected() {
        assert!(load(&[]).is_err());
        assert!(load(&[("POKIE_JWT_SECRET", "dev-secret-change-me")]).is_err());
        assert!(load(&[("POKIE_JWT_SECRET", "  ")]).is_err());
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        assert!(load(&[("POKIE_JWT_SECRET", "s3cr3t"), ("POKIE_PORT", "eighty")]).is_err());
        assert!(load(&[("POKIE_JWT_SECRET", "s3cr3t"), ("POKIE_TOKEN_TTL_MINUTES", "0")]).is_err());
        assert!(load(&[("POKIE_JWT_SECRET", "s3cr3t"), ("POKIE_STORE_TIMEOUT_MS", "-1")]).is_err());
    }
}
