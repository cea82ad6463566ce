//! Idle time for Linux using the X11 XScreenSaver extension.

use std::time::Duration;

use x11rb::connection::Connection;
use x11rb::protocol::screensaver::ConnectionExt as ScreensaverConnectionExt;
use x11rb::rust_connection::RustConnection;

use super::IdleProbe;
use crate::error::{Error, Result};

/// Queries `ms_since_user_input` from the XScreenSaver extension.
///
/// A fresh display connection is opened per sample so a restarted X server
/// or a late `DISPLAY` export is picked up on the next cycle.
#[derive(Debug, Default)]
pub struct X11IdleProbe;

impl IdleProbe for X11IdleProbe {
    fn sample(&self) -> Result<Duration> {
        let (conn, screen_num) = RustConnection::connect(None).map_err(|e| {
            Error::ProbeUnavailable(format!("failed to connect to X11 display: {e}"))
        })?;
        let screen = &conn.setup().roots[screen_num];

        let reply = conn
            .screensaver_query_info(screen.root)
            .map_err(|e| Error::ProbeUnavailable(format!("XScreenSaver extension not available: {e}")))?
            .reply()
            .map_err(|e| Error::ProbeUnavailable(format!("failed to query XScreenSaver info: {e}")))?;

        Ok(Duration::from_millis(u64::from(reply.ms_since_user_input)))
    }
}
