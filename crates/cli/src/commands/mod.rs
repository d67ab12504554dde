//! Command implementations.

mod demux;
mod info;
mod run;
mod validate;

pub use demux::run_demux;
pub use info::run_info;
pub use run::run_replay;
pub use validate::run_validate;

use std::path::Path;

use anyhow::{Context, Result};
use contracts::ReplayBlueprint;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::ReplayOverrides;

/// Load the configuration, apply CLI overrides and re-validate
fn load_blueprint(path: &Path, overrides: &ReplayOverrides) -> Result<ReplayBlueprint> {
    info!(config = %path.display(), "Loading configuration");

    if !path.exists() {
        anyhow::bail!("Configuration file not found: {}", path.display());
    }

    let mut blueprint = config_loader::ConfigLoader::load_from_path(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;

    if !overrides.is_empty() {
        info!(?overrides, "Applying replay overrides from CLI");
        overrides.apply(&mut blueprint.replay);
        config_loader::ConfigLoader::validate(&blueprint)
            .context("Configuration invalid after CLI overrides")?;
    }

    Ok(blueprint)
}

/// Start the Prometheus endpoint unless disabled
fn start_metrics(port: u16) -> Result<()> {
    if port != 0 {
        observability::init_metrics_only(port)?;
    }
    Ok(())
}

/// Cancel `token` on Ctrl+C or SIGTERM
fn cancel_on_shutdown_signal(token: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            _ = shutdown_signal() => {
                warn!("Received shutdown signal, stopping replay...");
                token.cancel();
            }
            _ = token.cancelled() => {}
        }
    });
}

/// Setup Ctrl+C and SIGTERM signal handlers
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
