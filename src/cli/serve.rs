//! `fitquota serve`: run the HTTP API until interrupted.

use anyhow::{Context, Result};
use tracing::{info, warn};

use fitquota::api::{start_server, AppState};
use fitquota::config::Config;

pub(crate) async fn cmd_serve(config: Config) -> Result<()> {
    config.validate().context("invalid configuration")?;
    if config.auth.admin_token.is_none() {
        warn!("no admin token configured; the paid-status route will answer 403");
    }

    let state = AppState::from_config(&config).with_context(|| {
        format!(
            "failed to open database at {}",
            config.database.path.display()
        )
    })?;
    info!(
        database = %config.database.path.display(),
        free_daily_limit = config.quota.free_daily_limit,
        day_boundary = ?config.quota.day_boundary,
        "starting quota service"
    );

    start_server(&config.server, state, shutdown_signal())
        .await
        .context("API server failed")?;
    Ok(())
}

/// Resolves on SIGINT or SIGTERM (Ctrl-C only on non-Unix targets).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received");
}
