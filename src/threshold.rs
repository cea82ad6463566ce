//! Shared, concurrently mutable idle limit.
//!
//! The limit is stored as the bit pattern of an `f64` inside a single
//! `AtomicU64`, so every read observes one complete write. NaN is never a
//! valid limit, which frees its bit pattern to mean "unset".

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::error::{Error, Result};

/// Bit pattern marking a store that has never been configured.
const UNSET: u64 = 0x7ff8_0000_0000_0000; // quiet NaN

/// A validated idle limit in seconds: finite and non-negative.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct IdleLimit(f64);

impl IdleLimit {
    pub fn new(seconds: f64) -> Result<Self> {
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(Error::InvalidLimit(seconds));
        }
        // Normalise -0.0 so it never compares differently from 0.0 downstream.
        Ok(Self(seconds + 0.0))
    }

    pub fn seconds(self) -> f64 {
        self.0
    }

    /// Returns true once `idle` has reached or passed this limit.
    pub fn is_reached_by(self, idle: Duration) -> bool {
        idle.as_secs_f64() >= self.0
    }
}

impl fmt::Display for IdleLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0)
    }
}

/// Holds the current idle limit, readable and writable from any task.
#[derive(Debug)]
pub struct ThresholdStore {
    bits: AtomicU64,
}

impl ThresholdStore {
    /// Create an unconfigured store.
    pub fn new() -> Self {
        Self {
            bits: AtomicU64::new(UNSET),
        }
    }

    /// Create a store already holding `limit`.
    pub fn with_limit(limit: IdleLimit) -> Self {
        Self {
            bits: AtomicU64::new(limit.0.to_bits()),
        }
    }

    /// Current limit, or `None` if no limit has been set yet.
    pub fn get(&self) -> Option<IdleLimit> {
        let bits = self.bits.load(Ordering::SeqCst);
        if bits == UNSET {
            None
        } else {
            Some(IdleLimit(f64::from_bits(bits)))
        }
    }

    /// Validate `seconds` and replace the stored limit with it.
    ///
    /// The store is left untouched when validation fails.
    pub fn set(&self, seconds: f64) -> Result<IdleLimit> {
        let limit = IdleLimit::new(seconds)?;
        self.bits.store(limit.0.to_bits(), Ordering::SeqCst);
        Ok(limit)
    }
}

impl Default for ThresholdStore {
    fn default() -> Self {
        Self::new()
    }
}
