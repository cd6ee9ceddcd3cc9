//! Launch a companion process and open a ringshm channel to it.
//!
//! Starting a process is slow, so the channel cannot be opened right after
//! spawning it. Two ways to wait are provided:
//!
//! - **Poll**: [`LaunchState::poll`] makes one non-blocking attempt per call
//!   and remembers progress in caller-owned state. After the launch timeout
//!   it fails stickily until [`LaunchState::reset`].
//! - **Async**: [`open_with_retry`] / [`launch_and_open`] loop inside one
//!   call, sleeping between attempts, until success, timeout or
//!   cancellation.
//!
//! # Example
//!
//! ```no_run
//! use ringshm_remote::{launch_and_open_channel, sibling_path, LaunchRequest, LaunchState};
//! use ringshm_rs::{ChannelId, Endpoint};
//! use std::time::Duration;
//!
//! let request = LaunchRequest::new(sibling_path("peer").unwrap()).arg("false");
//! let mut state = LaunchState::new();
//!
//! let mut channel = loop {
//!     if let Some(channel) = launch_and_open_channel(&mut state, &request, ChannelId::CLIENT_TO_SERVER) {
//!         break channel;
//!     }
//!     if state.is_expired() {
//!         panic!("peer did not start");
//!     }
//!     std::thread::sleep(Duration::from_millis(50));
//! };
//! channel.write(b"hello").unwrap();
//! ```

#![warn(missing_docs)]

mod cancel;
mod launch;
mod request;
mod wait;

pub use cancel::CancelSignal;
pub use launch::{launch_and_open_channel, launch_and_open_multi_channel, LaunchState};
pub use request::{sibling_path, LaunchRequest, ProcessSpawner, Spawner};
pub use wait::{
    launch_and_open, launch_and_open_channel_async, launch_and_open_multi_channel_async,
    open_with_retry, WaitOptions, DEFAULT_RETRY_INTERVAL,
};
