use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::policy::TTL_SECONDS;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    /// Overridden by `DATABASE_URL`
    #[serde(default)]
    pub postgres_url: Option<String>,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub money_requests: MoneyRequestConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_connections: 20,
            acquire_timeout_secs: 5,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TransferConfig {
    /// Stamped on every transaction row
    pub currency: String,
    /// 0 disables the settings cache
    pub settings_cache_ttl_secs: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            currency: "EGP".to_string(),
            settings_cache_ttl_secs: TTL_SECONDS,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NotificationConfig {
    /// Push gateway; log-only delivery when unset
    #[serde(default)]
    pub push_endpoint: Option<String>,
    pub timeout_ms: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            push_endpoint: None,
            timeout_ms: 2000,
        }
    }
}

impl NotificationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MoneyRequestConfig {
    pub expire_after_hours: u64,
    pub sweep_interval_secs: u64,
}

impl Default for MoneyRequestConfig {
    fn default() -> Self {
        Self {
            expire_after_hours: 72,
            sweep_interval_secs: 300,
        }
    }
}

impl AppConfig {
    /// Load `config/<env>.yaml`, then apply `DATABASE_URL`
    pub fn load(env: &str) -> anyhow::Result<Self> {
        let mut config = Self::from_file(format!("config/{}.yaml", env))?;
        if let Ok(url) = std::env::var("DATABASE_URL")
            && !url.trim().is_empty()
        {
            config.postgres_url = Some(url);
        }
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
log_level: info
log_dir: ./logs
log_file: transfer_core.log
use_json: false
rotation: daily
"#;

    #[test]
    fn test_nested_sections_default() {
        let config = AppConfig::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.postgres_url, None);
        assert_eq!(config.database.max_connections, 20);
        assert_eq!(config.transfer.currency, "EGP");
        assert_eq!(config.transfer.settings_cache_ttl_secs, TTL_SECONDS);
        assert_eq!(config.notifications.push_endpoint, None);
        assert_eq!(config.money_requests.expire_after_hours, 72);
    }

    #[test]
    fn test_nested_sections_override() {
        let yaml = format!(
            "{}\ntransfer:\n  currency: USD\n  settings_cache_ttl_secs: 0\nnotifications:\n  push_endpoint: http://localhost:8081/push\n  timeout_ms: 500\n",
            MINIMAL
        );
        let config = AppConfig::from_yaml(&yaml).unwrap();
        assert_eq!(config.transfer.currency, "USD");
        assert_eq!(config.transfer.settings_cache_ttl_secs, 0);
        assert_eq!(
            config.notifications.push_endpoint.as_deref(),
            Some("http://localhost:8081/push")
        );
        assert_eq!(config.notifications.timeout(), Duration::from_millis(500));
    }

    #[test]
    fn test_missing_required_field_is_error() {
        assert!(AppConfig::from_yaml("log_level: info\n").is_err());
    }

    #[test]
    fn test_missing_file_is_error() {
        let err = AppConfig::from_file("config/does-not-exist.yaml").unwrap_err();
        assert!(err.to_string().contains("does-not-exist"));
    }
}
