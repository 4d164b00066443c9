pub mod config;

pub use config::{ConsoleOutput, LogFormat, LoggingConfig};

use crate::Result;
use anyhow::{anyhow, Context};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

static LOGGER_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Initialize the tracing subscriber for a CLI invocation.
///
/// `RUST_LOG` wins over the configured level; `verbose` raises the
/// configured level to debug. Errors when called twice per process unless
/// tests reset the guard.
pub fn init(config_path: Option<&Path>, verbose: bool) -> Result<LoggingConfig> {
    if LOGGER_INITIALIZED
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return Err(anyhow!("logging already initialized"));
    }

    let mut config = LoggingConfig::load(config_path)?;
    if verbose {
        config.default_level = "debug".to_string();
    }

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.default_level))
        .context("failed to configure tracing level")?;

    let writer = match config.console_output {
        ConsoleOutput::Stdout => BoxMakeWriter::new(std::io::stdout),
        ConsoleOutput::Stderr => BoxMakeWriter::new(std::io::stderr),
        ConsoleOutput::None => BoxMakeWriter::new(std::io::sink),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(writer)
        .with_target(false);
    let installed = match config.format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|err| anyhow!("failed to install tracing subscriber: {}", err))?;

    Ok(config)
}

#[cfg(test)]
/// Reset the initialization guard so tests can reconfigure logging multiple times.
pub fn reset_for_tests() {
    LOGGER_INITIALIZED.store(false, Ordering::SeqCst);
}
