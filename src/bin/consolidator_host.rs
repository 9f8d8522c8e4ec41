//! Headless consolidation host.
//!
//! Reads lifecycle events as newline-delimited JSON from stdin and writes
//! outcome, error and wake messages to stdout. The config path is the first
//! argument, or the default `config.toml` under the config directory.
//!
//! `consolidator-host init [path]` writes a default config file (consolidation
//! disabled) if none exists yet, then exits.
//!
//! All tracing/diagnostic output goes to stderr so that stdout remains a
//! clean JSON protocol channel.

use consolidator::config::HookConfig;
use consolidator::host::stdio::run_stdio_bridge;
use std::path::{Path, PathBuf};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args_os().skip(1).peekable();
    let init = args.peek().is_some_and(|arg| arg == "init");
    if init {
        args.next();
    }
    let config_path = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(consolidator::paths::config_file);

    if init {
        return write_default_config(&config_path);
    }

    tracing::info!(config = %config_path.display(), "consolidator-host starting");

    run_stdio_bridge(config_path).await.map_err(|e| {
        tracing::error!(error = %e, "consolidator-host exited with error");
        anyhow::anyhow!("consolidator-host failed: {e}")
    })?;

    tracing::info!("consolidator-host shut down cleanly");
    Ok(())
}

fn write_default_config(path: &Path) -> anyhow::Result<()> {
    if path.exists() {
        tracing::info!(config = %path.display(), "config already exists; leaving it unchanged");
        return Ok(());
    }
    HookConfig::default()
        .save_to_file(path)
        .map_err(|e| anyhow::anyhow!("cannot write {}: {e}", path.display()))?;
    tracing::info!(config = %path.display(), "wrote default config");
    Ok(())
}
