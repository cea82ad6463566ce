//! idlewatch daemon entry point.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use idlewatch::config::Config;
use idlewatch::idle;
use idlewatch::logging::{self, Journal, JournalEvent};
use idlewatch::monitor::{InactivityMonitor, MonitorExit};
use idlewatch::power::{CommandShutdown, ShutdownAction};
use idlewatch::server::{self, AppState};
use idlewatch::threshold::ThresholdStore;

/// Application version.
const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> Result<()> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);

    let config = Config::load(config_path.as_deref())?;
    config.validate()?;

    logging::init_tracing(&config.logging)?;

    info!("Starting idlewatch v{}", VERSION);

    let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
    runtime.block_on(run(config))
}

async fn run(config: Config) -> Result<()> {
    let (journal, journal_task) = if config.logging.journal {
        let logs_dir = config.logging.logs_dir();
        let (journal, task) = Journal::spawn(logs_dir.clone())
            .with_context(|| format!("Failed to open journal in {:?}", logs_dir))?;
        info!("Writing event journal to {:?}", logs_dir);
        (journal, Some(task))
    } else {
        (Journal::disabled(), None)
    };
    journal.record(JournalEvent::SessionStart {
        version: VERSION.to_string(),
    });

    let store = Arc::new(match config.initial_limit()? {
        Some(limit) => {
            info!("Starting with configured idle limit {}", limit);
            ThresholdStore::with_limit(limit)
        }
        None => {
            info!("No idle limit configured, waiting for the control surface");
            ThresholdStore::new()
        }
    });

    let probe = idle::system_probe();
    match probe.sample() {
        Ok(idle) => info!("Idle probe ready, current idle time {:?}", idle),
        Err(e) => warn!("Idle probe not available yet, will keep retrying: {}", e),
    }

    let shutdown = CommandShutdown::from_config(&config.shutdown);
    if config.shutdown.dry_run {
        warn!("Dry run enabled, power-off will only be logged");
    }
    info!("Power-off command: {:?}", shutdown.argv());
    let action: Arc<dyn ShutdownAction> = Arc::new(shutdown);

    let monitor = InactivityMonitor::new(
        store.clone(),
        probe.clone(),
        action.clone(),
        config.monitor.poll_interval(),
    )
    .with_journal(journal.clone());

    let state = AppState {
        store,
        probe,
        action,
        monitor_state: monitor.subscribe(),
        journal: journal.clone(),
    };

    let cancel = CancellationToken::new();
    let monitor_task = tokio::spawn(monitor.run(cancel.clone()));

    let interrupt = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received, stopping");
                interrupt.cancel();
            }
            Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    let served = server::serve(&config.server, state, cancel.clone()).await;
    cancel.cancel();

    match monitor_task.await {
        Ok(MonitorExit::ShutdownTriggered) => info!("Monitor finished after issuing power-off"),
        Ok(MonitorExit::ShutdownFailed(e)) => error!("Monitor finished, power-off failed: {}", e),
        Ok(MonitorExit::Cancelled) => info!("Monitor stopped"),
        Err(e) => error!("Monitor task failed: {}", e),
    }

    journal.record(JournalEvent::SessionEnd);
    drop(journal);
    if let Some(task) = journal_task {
        let _ = task.await;
    }

    info!("idlewatch shutdown complete");
    served
}
