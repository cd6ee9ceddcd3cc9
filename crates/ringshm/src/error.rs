//! Error types for channel operations.

use crate::Mode;
use thiserror::Error;

/// Errors returned by [`Channel`](crate::Channel) and
/// [`MultiChannel`](crate::MultiChannel) operations.
///
/// Two tiers share this type. Contract violations (operating on a closed
/// channel, opening twice, bad slot index, wrong mode) are programmer errors
/// and are never retried internally. Environment failures (peer not ready,
/// region already exists, no free slot, buffer full) are expected while
/// processes come and go, and callers may retry or back off.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// The channel has not been opened, or has been closed.
    #[error("channel is not open")]
    NotOpen,

    /// `open()` was called on a channel that is already open.
    #[error("channel is already open")]
    AlreadyOpen,

    /// The operation is only valid for the other direction.
    #[error("operation requires {expected} mode")]
    WrongMode {
        /// The mode the operation requires.
        expected: Mode,
    },

    /// A slot index outside `0..count`.
    #[error("slot index {index} is out of range (count: {count})")]
    OutOfRange {
        /// The offending index.
        index: usize,
        /// The effective slot count.
        count: usize,
    },

    /// The slot exists but this handle has no region attached to it.
    #[error("slot {index} is not connected")]
    NotConnected {
        /// The slot index.
        index: usize,
    },

    /// Not enough free space for the whole write. Nothing was written.
    #[error("not enough free space: {requested} bytes requested, {free} free")]
    CapacityExceeded {
        /// Length of the rejected write.
        requested: usize,
        /// Free bytes at the time of the write.
        free: usize,
    },

    /// Every slot of a multi-slot channel is claimed by another sender.
    #[error("out of slots (tried {tried})")]
    OutOfSlots {
        /// Number of slots that were tried.
        tried: usize,
    },

    /// Cursors read from shared memory are outside the data region.
    #[error("corrupted cursors: head {head}, tail {tail}, capacity {capacity}")]
    Corrupted {
        /// Head cursor as read.
        head: i32,
        /// Tail cursor as read.
        tail: i32,
        /// Capacity of the region.
        capacity: usize,
    },

    /// An OS resource could not be created or opened.
    #[error("{0}")]
    Unavailable(String),
}

impl ChannelError {
    /// Returns `true` for environment failures a caller may retry later.
    #[inline]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Unavailable(_) | Self::OutOfSlots { .. } | Self::CapacityExceeded { .. }
        )
    }

    /// Returns `true` for programmer errors that retrying cannot fix.
    #[inline]
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Self::NotOpen
                | Self::AlreadyOpen
                | Self::WrongMode { .. }
                | Self::OutOfRange { .. }
                | Self::NotConnected { .. }
        )
    }
}
