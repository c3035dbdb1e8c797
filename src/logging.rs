//! Logging setup with journald support on Linux.
//!
//! Log level is read from `POLATHERMAL_LOG` (`debug`, `info`, `warn`,
//! `error`; default `info`). With `verbose` set, events are written to
//! stderr. Otherwise they go to systemd-journald on Linux when it is
//! reachable, or to a daily log file in `log_dir`.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_ENV: &str = "POLATHERMAL_LOG";

pub fn init(log_dir: Option<PathBuf>, verbose: bool) -> Result<()> {
    let env_filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| {
        EnvFilter::new(if verbose { "debug" } else { "info" })
    });

    if verbose {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .try_init()
            .context("Failed to set tracing subscriber")?;
        return Ok(());
    }

    #[cfg(target_os = "linux")]
    {
        if let Ok(journald_layer) = tracing_journald::layer() {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(journald_layer)
                .try_init()
                .context("Failed to set tracing subscriber")?;

            tracing::info!("Logging initialized with journald backend");
            return Ok(());
        }
    }

    let log_dir = log_dir.unwrap_or_else(|| {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("polathermal")
            .join("logs")
    });

    std::fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, "polathermal.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // The worker flushes until the guard drops; keep it for the process lifetime.
    static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
        std::sync::OnceLock::new();
    let _ = GUARD.set(guard);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .try_init()
        .context("Failed to set tracing subscriber")?;

    tracing::info!("Logging initialized with file backend at {:?}", log_dir);
    Ok(())
}
