//! RingShm - Inter-Process Byte Channels over Shared Memory
//!
//! Processes on the same host exchange raw bytes through circular buffers
//! placed in named shared memory regions. Each region carries one
//! single-producer single-consumer ring, so no locks are taken on the data
//! path.
//!
//! # Key Features
//!
//! - [`Channel`]: one sender, one receiver, one region
//! - [`MultiChannel`]: N senders, one receiver, one region per sender,
//!   with cross-process slot claiming
//! - All-or-nothing writes, drain-everything reads
//! - Region names derived from a 128-bit [`ChannelId`], so both sides only
//!   need to agree on the id
//!
//! The receiver creates the regions, senders open them. A handle starts
//! closed, and a failed `open()` can simply be retried until the peer is up
//! (see the `ringshm-remote` crate for launch-and-wait helpers).
//!
//! # Example
//!
//! ```no_run
//! use ringshm_rs::{Channel, ChannelId, Endpoint, Mode};
//!
//! let id = ChannelId::CLIENT_TO_SERVER;
//! let mut rx = Channel::new(id, Mode::Receive);
//! let mut tx = Channel::new(id, Mode::Send);
//! rx.open().unwrap();
//! tx.open().unwrap();
//!
//! tx.write(b"hello").unwrap();
//! assert_eq!(rx.try_read().unwrap().as_deref(), Some(&b"hello"[..]));
//! ```

mod channel;
mod config;
mod endpoint;
mod error;
mod id;
mod invariants;
mod multi_channel;
mod region;
mod ring;
mod stats;

pub use channel::Channel;
pub use config::{
    capacity, set_capacity, Config, Timeouts, DEFAULT_CAPACITY, MAX_CAPACITY, MIN_CAPACITY,
};
pub use endpoint::{Endpoint, Mode};
pub use error::ChannelError;
pub use id::{ChannelId, ParseChannelIdError};
pub use multi_channel::MultiChannel;
pub use ring::{free_len, used_len, RingBuffer, CURSORS_SIZE};
pub use stats::ChannelStats;
