//! Process-wide settings: region capacity and protocol timeouts.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

/// Default capacity of a region's data area (1 MiB).
pub const DEFAULT_CAPACITY: usize = 0x10_0000;

/// Capacity used when the configured value is zero or negative.
pub const MIN_CAPACITY: usize = 0x100;

/// Largest capacity whose region size and cursors still fit in an `i32`.
pub const MAX_CAPACITY: usize = i32::MAX as usize - 8;

static CAPACITY: AtomicI64 = AtomicI64::new(DEFAULT_CAPACITY as i64);

/// Sets the process-wide capacity used by channels constructed afterwards.
///
/// Values `<= 0` fall back to [`MIN_CAPACITY`] when read back through
/// [`capacity`]. Channels already constructed keep the capacity they captured.
pub fn set_capacity(bytes: i64) {
    CAPACITY.store(bytes, Ordering::Relaxed);
}

/// Returns the effective process-wide capacity.
pub fn capacity() -> usize {
    effective_capacity(CAPACITY.load(Ordering::Relaxed))
}

fn effective_capacity(raw: i64) -> usize {
    if raw <= 0 {
        MIN_CAPACITY
    } else {
        (raw as u64).min(MAX_CAPACITY as u64) as usize
    }
}

/// Per-channel configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Size of each region's data area in bytes (one byte is always kept free).
    pub capacity: usize,
}

impl Config {
    /// Creates a configuration with an explicit capacity.
    ///
    /// The same clamping as [`set_capacity`] applies.
    pub const fn new(capacity: usize) -> Self {
        let capacity = if capacity == 0 {
            MIN_CAPACITY
        } else if capacity > MAX_CAPACITY {
            MAX_CAPACITY
        } else {
            capacity
        };
        Self { capacity }
    }

    /// Returns the data capacity.
    #[inline]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the full region size: data area plus head and tail cursors.
    #[inline]
    pub const fn region_size(&self) -> usize {
        self.capacity + crate::ring::CURSORS_SIZE
    }
}

impl Default for Config {
    /// Snapshots the process-wide capacity.
    fn default() -> Self {
        Self::new(capacity())
    }
}

/// Timeouts shared by the launcher and protocols built on top of channels.
///
/// Only `process_launch` is enforced in this workspace; the others are
/// carried for higher-level protocols.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// How long to wait for a launched process to open its end.
    pub process_launch: Duration,
    /// How long to wait for a busy channel to drain.
    pub busy: Duration,
    /// How long to wait for an acknowledge.
    pub acknowledge: Duration,
    /// How long to wait for new data.
    pub idle: Duration,
}

impl Timeouts {
    /// Default values.
    pub const DEFAULT: Self = Self {
        process_launch: Duration::from_secs(5),
        busy: Duration::from_secs(5),
        acknowledge: Duration::from_secs(10),
        idle: Duration::from_secs(60),
    };

    /// Returns the current process-wide timeouts.
    pub fn current() -> Self {
        match TIMEOUTS.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Replaces the process-wide timeouts.
    pub fn set(timeouts: Self) {
        match TIMEOUTS.write() {
            Ok(mut guard) => *guard = timeouts,
            Err(poisoned) => *poisoned.into_inner() = timeouts,
        }
    }

    /// Restores the process-wide timeouts to [`Timeouts::DEFAULT`].
    pub fn reset() {
        Self::set(Self::DEFAULT);
    }

    /// Sets the process launch timeout.
    pub fn with_process_launch(mut self, timeout: Duration) -> Self {
        self.process_launch = timeout;
        self
    }

    /// Sets the busy timeout.
    pub fn with_busy(mut self, timeout: Duration) -> Self {
        self.busy = timeout;
        self
    }

    /// Sets the acknowledge timeout.
    pub fn with_acknowledge(mut self, timeout: Duration) -> Self {
        self.acknowledge = timeout;
        self
    }

    /// Sets the idle timeout.
    pub fn with_idle(mut self, timeout: Duration) -> Self {
        self.idle = timeout;
        self
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self::DEFAULT
    }
}

static TIMEOUTS: RwLock<Timeouts> = RwLock::new(Timeouts::DEFAULT);
