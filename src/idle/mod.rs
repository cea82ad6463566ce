//! Operator idle-time probes with platform-specific implementations.

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "macos")]
mod macos;
#[cfg(target_os = "windows")]
mod windows;

use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};

#[cfg(target_os = "linux")]
pub use linux::X11IdleProbe as SystemIdleProbe;
#[cfg(target_os = "macos")]
pub use macos::HidIdleProbe as SystemIdleProbe;
#[cfg(target_os = "windows")]
pub use windows::LastInputProbe as SystemIdleProbe;

/// Source of "time since last keyboard or mouse input".
///
/// Implementations hold no state between calls; every sample is fresh.
pub trait IdleProbe: Send + Sync {
    fn sample(&self) -> Result<Duration>;
}

/// Take a sample on the blocking pool.
///
/// Platform probes make synchronous system calls (an X11 round trip on
/// Linux) that must not stall an async worker.
pub async fn sample_blocking(probe: &Arc<dyn IdleProbe>) -> Result<Duration> {
    let probe = probe.clone();
    tokio::task::spawn_blocking(move || probe.sample())
        .await
        .map_err(|e| Error::ProbeUnavailable(format!("idle sample task failed: {e}")))?
}

/// Probe for targets without a known idle-time API.
#[derive(Debug, Default)]
pub struct UnsupportedProbe;

impl IdleProbe for UnsupportedProbe {
    fn sample(&self) -> Result<Duration> {
        Err(Error::ProbeUnavailable(format!(
            "idle time is not supported on {}",
            std::env::consts::OS
        )))
    }
}

/// The idle probe for the platform this binary was built for.
#[cfg(any(target_os = "linux", target_os = "macos", target_os = "windows"))]
pub fn system_probe() -> Arc<dyn IdleProbe> {
    Arc::new(SystemIdleProbe::default())
}

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
pub fn system_probe() -> Arc<dyn IdleProbe> {
    Arc::new(UnsupportedProbe)
}
