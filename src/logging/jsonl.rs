//! JSONL event journal for watchdog activity.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::Result;

/// Who asked for the power-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShutdownSource {
    Monitor,
    Manual,
}

/// Journal event types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JournalEvent {
    SessionStart {
        version: String,
    },
    LimitChanged {
        limit_seconds: f64,
    },
    MonitorArmed {
        limit_seconds: f64,
    },
    ShutdownRequested {
        source: ShutdownSource,
        /// Idle time that crossed the limit; absent for manual requests.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        idle_seconds: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit_seconds: Option<f64>,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    SessionEnd,
}

/// One line in the journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: JournalEvent,
}

/// Appends entries to `<logs_dir>/YYYY-MM-DD.jsonl`, rotating daily.
pub struct JsonlWriter {
    logs_dir: PathBuf,
    current_file: Option<BufWriter<File>>,
    current_date: Option<String>,
}

impl JsonlWriter {
    pub fn new(logs_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&logs_dir)?;

        Ok(Self {
            logs_dir,
            current_file: None,
            current_date: None,
        })
    }

    /// Get or create the log file for today.
    fn get_writer(&mut self) -> Result<&mut BufWriter<File>> {
        let today = Local::now().format("%Y-%m-%d").to_string();

        if self.current_date.as_ref() != Some(&today) || self.current_file.is_none() {
            let log_path = self.logs_dir.join(format!("{}.jsonl", today));

            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_path)?;

            self.current_file = Some(BufWriter::new(file));
            self.current_date = Some(today);

            debug!("Opened journal file: {:?}", log_path);
        }

        let writer = self
            .current_file
            .as_mut()
            .ok_or_else(|| std::io::Error::other("no journal file available"))?;
        Ok(writer)
    }

    /// Write a single entry and flush it.
    pub fn write_entry(&mut self, entry: &JournalEntry) -> Result<()> {
        let line = serde_json::to_string(entry).map_err(std::io::Error::from)?;
        let writer = self.get_writer()?;
        writeln!(writer, "{}", line)?;
        writer.flush()?;
        Ok(())
    }
}

impl Drop for JsonlWriter {
    fn drop(&mut self) {
        if let Some(ref mut writer) = self.current_file {
            let _ = writer.flush();
        }
    }
}

/// Cloneable handle for recording journal events.
///
/// Events are handed to a single writer task over a channel. A disabled
/// journal drops every event.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    tx: Option<mpsc::UnboundedSender<JournalEntry>>,
}

impl Journal {
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// A journal whose entries are delivered to the returned receiver.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<JournalEntry>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// Start a writer task appending to `logs_dir`.
    ///
    /// The task ends once every clone of the returned handle is dropped.
    pub fn spawn(logs_dir: PathBuf) -> Result<(Self, JoinHandle<()>)> {
        let mut writer = JsonlWriter::new(logs_dir)?;
        let (journal, mut rx) = Self::channel();

        let handle = tokio::spawn(async move {
            while let Some(entry) = rx.recv().await {
                if let Err(e) = writer.write_entry(&entry) {
                    warn!("Failed to write journal entry: {}", e);
                }
            }
            debug!("Journal writer exiting");
        });

        Ok((journal, handle))
    }

    pub fn record(&self, event: JournalEvent) {
        if let Some(tx) = &self.tx {
            let entry = JournalEntry {
                timestamp: Utc::now(),
                event,
            };
            if tx.send(entry).is_err() {
                debug!("Journal writer gone, event dropped");
            }
        }
    }
}
