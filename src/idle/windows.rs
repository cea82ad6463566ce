//! Idle time for Windows using the GetLastInputInfo Win32 API.

use std::time::Duration;

use windows::Win32::System::SystemInformation::GetTickCount;
use windows::Win32::UI::Input::KeyboardAndMouse::{GetLastInputInfo, LASTINPUTINFO};

use super::IdleProbe;
use crate::error::{Error, Result};

#[derive(Debug, Default)]
pub struct LastInputProbe;

impl IdleProbe for LastInputProbe {
    fn sample(&self) -> Result<Duration> {
        let mut last_input = LASTINPUTINFO {
            cbSize: std::mem::size_of::<LASTINPUTINFO>() as u32,
            dwTime: 0,
        };

        // SAFETY: `last_input` is a properly sized, initialised LASTINPUTINFO;
        // GetTickCount has no preconditions.
        let (ok, current_tick) = unsafe {
            let ok = GetLastInputInfo(&mut last_input).as_bool();
            (ok, GetTickCount())
        };
        if !ok {
            return Err(Error::ProbeUnavailable("GetLastInputInfo failed".to_string()));
        }

        // Tick count wraps every ~49.7 days
        let idle_ms = current_tick.wrapping_sub(last_input.dwTime);
        Ok(Duration::from_millis(u64::from(idle_ms)))
    }
}
