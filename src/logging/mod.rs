//! Tracing setup and the JSONL event journal.

mod jsonl;

pub use jsonl::{Journal, JournalEntry, JournalEvent, JsonlWriter, ShutdownSource};

use anyhow::Result;

use crate::config::{LogFormat, LoggingConfig};

/// Initialize the tracing subscriber from the logging config.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    match config.format {
        LogFormat::Pretty => registry
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .try_init()?,
        LogFormat::Json => registry.with(fmt::layer().json()).try_init()?,
    }

    Ok(())
}
