//! Host power-off action.

use std::process::Command;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::ShutdownConfig;
use crate::error::{Error, Result};

/// An irreversible request to power the host off.
pub trait ShutdownAction: Send + Sync {
    fn trigger(&self) -> Result<()>;
}

/// Run `action` on the blocking pool.
///
/// Power-off commands wait on a child process, so they never run on an
/// async worker. A panicking action counts as a failed shutdown.
pub async fn trigger_blocking(action: &Arc<dyn ShutdownAction>) -> Result<()> {
    let action = action.clone();
    tokio::task::spawn_blocking(move || action.trigger())
        .await
        .map_err(|e| Error::ShutdownFailed(format!("shutdown task failed: {e}")))?
}

/// Power-off command for the platform this binary was built for.
pub fn default_command() -> Vec<String> {
    let argv: &[&str] = if cfg!(target_os = "windows") {
        &["shutdown", "/s", "/t", "0"]
    } else if cfg!(target_os = "linux") {
        &["systemctl", "poweroff"]
    } else {
        &["shutdown", "-h", "now"]
    };
    argv.iter().map(|s| s.to_string()).collect()
}

/// Runs an external power-off command, or only logs it in dry-run mode.
#[derive(Debug, Clone)]
pub struct CommandShutdown {
    argv: Vec<String>,
    dry_run: bool,
}

impl CommandShutdown {
    pub fn new(argv: Vec<String>, dry_run: bool) -> Self {
        Self { argv, dry_run }
    }

    pub fn from_config(config: &ShutdownConfig) -> Self {
        let argv = config.command.clone().unwrap_or_else(default_command);
        Self::new(argv, config.dry_run)
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }
}

impl ShutdownAction for CommandShutdown {
    fn trigger(&self) -> Result<()> {
        let (program, args) = self
            .argv
            .split_first()
            .ok_or_else(|| Error::ShutdownFailed("empty shutdown command".to_string()))?;

        if self.dry_run {
            warn!(command = ?self.argv, "Dry run: skipping power-off command");
            return Ok(());
        }

        info!(command = ?self.argv, "Issuing power-off command");
        let status = Command::new(program)
            .args(args)
            .status()
            .map_err(|e| Error::ShutdownFailed(format!("failed to run {program}: {e}")))?;

        if status.success() {
            Ok(())
        } else {
            Err(Error::ShutdownFailed(format!("{program} exited with {status}")))
        }
    }
}
