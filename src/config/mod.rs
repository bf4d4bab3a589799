//! Service configuration.
//!
//! Loaded from a JSON file (default `~/.fitquota/config.json`) and then
//! overridden by `FITQUOTA_*` environment variables. Every section is
//! `#[serde(default)]`, so a partial file or no file at all yields a usable
//! configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{QuotaError, Result};
use crate::quota::{DayBoundary, QuotaConfig};

/// Environment variable naming an alternate config file.
pub const CONFIG_PATH_ENV: &str = "FITQUOTA_CONFIG";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub quota: QuotaConfig,
    pub log: LogConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (default: 127.0.0.1).
    pub bind: String,
    /// Listen port (default: 8080).
    pub port: u16,
    /// Allowed CORS origins. Empty means any origin.
    pub cors_origins: Vec<String>,
    /// Maximum accepted request body in bytes.
    pub body_limit_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8080,
            cors_origins: Vec::new(),
            body_limit_bytes: 64 * 1024,
        }
    }
}

/// SQLite store settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds when another connection holds the lock.
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: Config::dir().join("fitquota.db"),
            busy_timeout_ms: 5_000,
        }
    }
}

/// Credential settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HS256 secret shared with the identity provider that issues user tokens.
    pub jwt_secret: String,
    /// Static bearer token for the admin route. `None` disables the route.
    pub admin_token: Option<String>,
}

/// Output format for the tracing subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable single-line output (default).
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default `EnvFilter` directive when `RUST_LOG` is unset.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl Config {
    /// Base directory for FitQuota state: `~/.fitquota`.
    pub fn dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".fitquota")
    }

    /// Config file location, honouring `FITQUOTA_CONFIG`.
    pub fn path() -> PathBuf {
        std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::dir().join("config.json"))
    }

    /// Load from `path` without environment overrides.
    ///
    /// A missing file yields the defaults; an unreadable or unparsable one is
    /// an error.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        serde_json::from_str(&data)
            .map_err(|e| QuotaError::Config(format!("{}: {e}", path.display())))
    }

    /// Apply `FITQUOTA_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Vec<String> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    ///
    /// A value that fails to parse leaves its setting unchanged and is
    /// reported in the returned list; the remaining overrides still apply.
    pub fn apply_overrides_from<F>(&mut self, get: F) -> Vec<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut ignored = Vec::new();
        let mut reject = |key: &str, value: &str| {
            ignored.push(format!("ignoring invalid {key}={value:?}"));
        };

        if let Some(v) = get("FITQUOTA_BIND") {
            self.server.bind = v;
        }
        if let Some(v) = get("FITQUOTA_PORT") {
            match v.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => reject("FITQUOTA_PORT", &v),
            }
        }
        if let Some(v) = get("FITQUOTA_DATABASE_PATH") {
            self.database.path = PathBuf::from(v);
        }
        if let Some(v) = get("FITQUOTA_JWT_SECRET") {
            self.auth.jwt_secret = v;
        }
        if let Some(v) = get("FITQUOTA_ADMIN_TOKEN") {
            self.auth.admin_token = if v.is_empty() { None } else { Some(v) };
        }
        if let Some(v) = get("FITQUOTA_FREE_DAILY_LIMIT") {
            match v.parse() {
                Ok(limit) => self.quota.free_daily_limit = limit,
                Err(_) => reject("FITQUOTA_FREE_DAILY_LIMIT", &v),
            }
        }
        if let Some(v) = get("FITQUOTA_DAY_BOUNDARY") {
            match v.to_lowercase().as_str() {
                "utc" => self.quota.day_boundary = DayBoundary::Utc,
                "local" => self.quota.day_boundary = DayBoundary::Local,
                _ => reject("FITQUOTA_DAY_BOUNDARY", &v),
            }
        }
        if let Some(v) = get("FITQUOTA_LOG_LEVEL") {
            self.log.level = v;
        }
        if let Some(v) = get("FITQUOTA_LOG_FORMAT") {
            match v.to_lowercase().as_str() {
                "json" => self.log.format = LogFormat::Json,
                "pretty" => self.log.format = LogFormat::Pretty,
                _ => reject("FITQUOTA_LOG_FORMAT", &v),
            }
        }
        ignored
    }

    /// Check invariants required before serving traffic.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(QuotaError::Config("server.port must be non-zero".into()));
        }
        if self.auth.jwt_secret.trim().is_empty() {
            return Err(QuotaError::Config(
                "auth.jwt_secret is required (set FITQUOTA_JWT_SECRET)".into(),
            ));
        }
        if self.quota.free_daily_limit < 0 {
            return Err(QuotaError::Config(
                "quota.free_daily_limit must not be negative".into(),
            ));
        }
        if matches!(&self.auth.admin_token, Some(t) if t.trim().is_empty()) {
            return Err(QuotaError::Config(
                "auth.admin_token must not be blank when set".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn valid_config() -> Config {
        let mut cfg = Config::default();
        cfg.auth.jwt_secret = "secret".into();
        cfg
    }

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.server.bind, "127.0.0.1");
        assert_eq!(cfg.server.port, 8080);
        assert!(cfg.server.cors_origins.is_empty());
        assert_eq!(cfg.quota.free_daily_limit, 5);
        assert_eq!(cfg.quota.day_boundary, DayBoundary::Utc);
        assert_eq!(cfg.log.format, LogFormat::Pretty);
        assert!(cfg.auth.admin_token.is_none());
        assert!(cfg.database.path.ends_with("fitquota.db"));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let tmp = TempDir::new().unwrap();
        let cfg = Config::load_from_path(&tmp.path().join("nope.json")).unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"server": {"port": 9000}, "quota": {"day_boundary": "local"}}"#,
        )
        .unwrap();

        let cfg = Config::load_from_path(&path).unwrap();
        assert_eq!(cfg.server.port, 9000);
        assert_eq!(cfg.server.bind, "127.0.0.1");
        assert_eq!(cfg.quota.day_boundary, DayBoundary::Local);
        assert_eq!(cfg.quota.free_daily_limit, 5);
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            Config::load_from_path(&path),
            Err(QuotaError::Config(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("FITQUOTA_PORT", "7070"),
            ("FITQUOTA_JWT_SECRET", "s3cret"),
            ("FITQUOTA_ADMIN_TOKEN", "admin-tok"),
            ("FITQUOTA_FREE_DAILY_LIMIT", "10"),
            ("FITQUOTA_DAY_BOUNDARY", "LOCAL"),
            ("FITQUOTA_LOG_FORMAT", "json"),
            ("FITQUOTA_DATABASE_PATH", "/tmp/q.db"),
        ]
        .into_iter()
        .collect();

        let mut cfg = Config::default();
        let ignored = cfg.apply_overrides_from(|k| vars.get(k).map(|v| v.to_string()));
        assert!(ignored.is_empty(), "{ignored:?}");

        assert_eq!(cfg.server.port, 7070);
        assert_eq!(cfg.auth.jwt_secret, "s3cret");
        assert_eq!(cfg.auth.admin_token.as_deref(), Some("admin-tok"));
        assert_eq!(cfg.quota.free_daily_limit, 10);
        assert_eq!(cfg.quota.day_boundary, DayBoundary::Local);
        assert_eq!(cfg.log.format, LogFormat::Json);
        assert_eq!(cfg.database.path, PathBuf::from("/tmp/q.db"));
    }

    #[test]
    fn test_invalid_env_values_are_ignored() {
        let mut cfg = Config::default();
        let ignored = cfg.apply_overrides_from(|k| match k {
            "FITQUOTA_PORT" => Some("not-a-port".into()),
            "FITQUOTA_DAY_BOUNDARY" => Some("mars".into()),
            _ => None,
        });
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.quota.day_boundary, DayBoundary::Utc);
        assert_eq!(ignored.len(), 2);
    }

    #[test]
    fn test_invalid_limit_is_reported_not_silently_dropped() {
        let mut cfg = Config::default();
        let ignored = cfg.apply_overrides_from(|k| match k {
            "FITQUOTA_FREE_DAILY_LIMIT" => Some("ten".into()),
            "FITQUOTA_JWT_SECRET" => Some("s".into()),
            _ => None,
        });
        assert_eq!(cfg.quota.free_daily_limit, 5);
        assert_eq!(cfg.auth.jwt_secret, "s");
        assert_eq!(ignored, vec![r#"ignoring invalid FITQUOTA_FREE_DAILY_LIMIT="ten""#]);
    }

    #[test]
    fn test_validate_requires_jwt_secret() {
        assert!(matches!(
            Config::default().validate(),
            Err(QuotaError::Config(_))
        ));
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_negative_limit() {
        let mut cfg = valid_config();
        cfg.quota.free_daily_limit = -1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_blank_admin_token() {
        let mut cfg = valid_config();
        cfg.auth.admin_token = Some("   ".into());
        assert!(cfg.validate().is_err());
    }
}
