//! Command-line interface for FitQuota.

mod quota;
mod serve;
mod token;
mod user;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use fitquota::config::{Config, LogConfig, LogFormat};
use fitquota::quota::QuotaService;
use fitquota::store::Database;

/// Daily quota metering for AI video analysis.
#[derive(Parser, Debug)]
#[command(name = "fitquota", version, about)]
pub(crate) struct Cli {
    /// Config file (default: ~/.fitquota/config.json or $FITQUOTA_CONFIG)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Commands {
    /// Run the HTTP API server
    Serve,
    /// Manage accounts
    User {
        #[command(subcommand)]
        action: UserAction,
    },
    /// Inspect or record usage for an account
    Quota {
        #[command(subcommand)]
        action: QuotaAction,
    },
    /// Mint a user JWT for local testing
    Token {
        /// External identity to place in `sub`
        external_id: String,
        /// Lifetime in seconds
        #[arg(long, default_value_t = 3600)]
        ttl: u64,
    },
}

#[derive(Subcommand, Debug)]
pub(crate) enum UserAction {
    /// Provision an account (no-op if it exists)
    Add {
        external_id: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        name: Option<String>,
    },
    /// Show an account
    Show { external_id: String },
    /// Set the paid flag: `set-paid <id> true|false`
    SetPaid {
        external_id: String,
        #[arg(action = ArgAction::Set)]
        paid: bool,
    },
}

#[derive(Subcommand, Debug)]
pub(crate) enum QuotaAction {
    /// Usage summary for today
    Status { external_id: String },
    /// Whether one more analysis is allowed today
    Check { external_id: String },
    /// Record one analysis for today
    Increment { external_id: String },
}

/// Load configuration from `path` (or the default location) and apply
/// environment overrides. Also returns the overrides that were ignored.
pub(crate) fn load_config(path: Option<&Path>) -> Result<(Config, Vec<String>)> {
    load_config_with(path, |key| std::env::var(key).ok())
}

fn load_config_with<F>(path: Option<&Path>, get: F) -> Result<(Config, Vec<String>)>
where
    F: Fn(&str) -> Option<String>,
{
    let path = path.map(Path::to_path_buf).unwrap_or_else(Config::path);
    let mut config = Config::load_from_path(&path)
        .with_context(|| format!("failed to load config from {}", path.display()))?;
    let ignored = config.apply_overrides_from(get);
    Ok((config, ignored))
}

/// Install the global tracing subscriber. `RUST_LOG` wins over the
/// configured level. Output goes to stderr so command output stays clean.
pub(crate) fn init_tracing(log: &LogConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match log.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

fn open_service(config: &Config) -> Result<QuotaService> {
    let db = Database::open(&config.database).with_context(|| {
        format!(
            "failed to open database at {}",
            config.database.path.display()
        )
    })?;
    Ok(QuotaService::with_database(db, &config.quota))
}

/// Dispatch a parsed command.
pub(crate) async fn run(command: Commands, config: Config) -> Result<()> {
    match command {
        Commands::Serve => serve::cmd_serve(config).await,
        Commands::User { action } => user::cmd_user(&open_service(&config)?, action).await,
        Commands::Quota { action } => quota::cmd_quota(&open_service(&config)?, action).await,
        Commands::Token { external_id, ttl } => token::cmd_token(&config, &external_id, ttl),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_parse_serve() {
        let cli = Cli::try_parse_from(["fitquota", "serve"]).unwrap();
        assert!(matches!(cli.command, Commands::Serve));
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_parse_global_config_after_subcommand() {
        let cli =
            Cli::try_parse_from(["fitquota", "quota", "status", "u1", "--config", "/tmp/c.json"])
                .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.json")));
        assert!(matches!(
            cli.command,
            Commands::Quota {
                action: QuotaAction::Status { ref external_id }
            } if external_id == "u1"
        ));
    }

    #[test]
    fn test_parse_set_paid_bool() {
        let cli = Cli::try_parse_from(["fitquota", "user", "set-paid", "u2", "false"]).unwrap();
        match cli.command {
            Commands::User {
                action: UserAction::SetPaid { external_id, paid },
            } => {
                assert_eq!(external_id, "u2");
                assert!(!paid);
            }
            other => panic!("unexpected command: {other:?}"),
        }
        assert!(Cli::try_parse_from(["fitquota", "user", "set-paid", "u2", "yes"]).is_err());
    }

    #[test]
    fn test_parse_token_default_ttl() {
        let cli = Cli::try_parse_from(["fitquota", "token", "u1"]).unwrap();
        assert!(matches!(cli.command, Commands::Token { ttl: 3600, .. }));
    }

    #[test]
    fn test_load_config_from_explicit_path() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, r#"{"quota": {"free_daily_limit": 2}}"#).unwrap();
        let (config, ignored) = load_config_with(Some(&path), |_| None).unwrap();
        assert_eq!(config.quota.free_daily_limit, 2);
        assert!(ignored.is_empty());
    }

    #[test]
    fn test_load_config_env_overrides_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, r#"{"quota": {"free_daily_limit": 2}}"#).unwrap();
        let vars: HashMap<&str, &str> = [("FITQUOTA_FREE_DAILY_LIMIT", "7")].into_iter().collect();
        let (config, _) =
            load_config_with(Some(&path), |k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.quota.free_daily_limit, 7);
    }

    #[test]
    fn test_load_config_returns_ignored_overrides() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        let (config, ignored) = load_config_with(Some(&path), |k| {
            (k == "FITQUOTA_FREE_DAILY_LIMIT").then(|| "ten".to_string())
        })
        .unwrap();
        assert_eq!(config.quota.free_daily_limit, 5);
        assert_eq!(ignored.len(), 1);
        assert!(ignored[0].contains("FITQUOTA_FREE_DAILY_LIMIT"));
    }

    #[test]
    fn test_load_config_malformed_is_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, "{").unwrap();
        assert!(load_config_with(Some(&path), |_| None).is_err());
    }
}
