//! idlewatch - inactivity watchdog with an HTTP control surface.
//!
//! Polls operator idle time and powers the host off once it reaches a
//! limit set over HTTP by a companion application.

pub mod config;
pub mod error;
pub mod idle;
pub mod logging;
pub mod monitor;
pub mod power;
pub mod server;
pub mod threshold;

pub use error::{Error, Result};
