//! Poll-style launch: start a companion process once, then try to open a
//! channel to it on every call until a deadline.

use crate::request::{LaunchRequest, ProcessSpawner, Spawner};
use ringshm_rs::{Channel, ChannelId, Endpoint, Mode, MultiChannel, Timeouts};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Memoized progress of one launch, owned by the caller and passed to every
/// [`poll`](LaunchState::poll).
///
/// The first poll starts the process and the stopwatch. Each poll makes one
/// non-blocking open attempt on a handle kept across calls. Once the
/// timeout has elapsed without an open handle, the state is expired: every
/// later poll returns `None` without touching the OS until
/// [`reset`](LaunchState::reset).
#[derive(Debug)]
pub struct LaunchState<C> {
    started: Option<Instant>,
    pending: Option<C>,
    expired: bool,
    attempts: u32,
    timeout: Option<Duration>,
}

impl<C> Default for LaunchState<C> {
    fn default() -> Self {
        Self {
            started: None,
            pending: None,
            expired: false,
            attempts: 0,
            timeout: None,
        }
    }
}

impl<C: Endpoint> LaunchState<C> {
    /// Creates a state that follows `Timeouts::current().process_launch`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a state with its own launch timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..Self::default()
        }
    }

    /// The launch timeout in effect.
    pub fn timeout(&self) -> Duration {
        self.timeout
            .unwrap_or_else(|| Timeouts::current().process_launch)
    }

    /// Time since the first poll, or `None` before it.
    pub fn elapsed(&self) -> Option<Duration> {
        self.started.map(|t| t.elapsed())
    }

    /// Number of open attempts made since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Returns `true` once the deadline passed without success.
    pub fn is_expired(&self) -> bool {
        self.expired
    }

    /// Forgets the stopwatch and the pending handle. The next poll starts
    /// the process again.
    pub fn reset(&mut self) {
        *self = Self {
            timeout: self.timeout,
            ..Self::default()
        };
    }

    /// Makes at most one open attempt.
    ///
    /// On the first call after a reset, `spawner` starts `request` (a spawn
    /// failure is logged, not fatal). `make` builds the handle the first
    /// time one is needed; the same handle is retried until it opens, then
    /// handed to the caller.
    ///
    /// A poll after a success builds and opens another handle through
    /// `make`, without spawning again. With a [`MultiChannel`] that claims
    /// the next free slot. A second sending [`Channel`] on the same id is a
    /// second writer on one ring, so stop polling or call
    /// [`reset`](LaunchState::reset) once a channel has been handed out.
    pub fn poll<S, F>(&mut self, spawner: &S, request: &LaunchRequest, make: F) -> Option<C>
    where
        S: Spawner + ?Sized,
        F: FnOnce() -> C,
    {
        let started = match self.started {
            Some(started) => started,
            None => {
                let now = Instant::now();
                self.started = Some(now);
                info!(program = %request.program().display(), "launching process");
                if let Err(e) = spawner.spawn(request) {
                    warn!(program = %request.program().display(), error = %e, "process spawn failed");
                }
                now
            }
        };

        if self.expired {
            return None;
        }

        let timeout = self.timeout();
        if started.elapsed() >= timeout {
            self.expired = true;
            self.pending = None;
            warn!(
                timeout_ms = timeout.as_millis() as u64,
                attempts = self.attempts,
                "launch deadline expired"
            );
            return None;
        }

        let handle = self.pending.get_or_insert_with(make);
        self.attempts += 1;
        match handle.open() {
            Ok(()) => {
                debug!(attempt = self.attempts, id = %handle.id(), "launch channel open");
                self.pending.take()
            }
            Err(e) => {
                debug!(attempt = self.attempts, error = %e, "launch channel not ready");
                None
            }
        }
    }
}

/// Launches `request` and opens a sending [`Channel`] on `id`.
///
/// Call repeatedly with the same `state` until it returns a channel or
/// `state.is_expired()`.
pub fn launch_and_open_channel(
    state: &mut LaunchState<Channel>,
    request: &LaunchRequest,
    id: ChannelId,
) -> Option<Channel> {
    state.poll(&ProcessSpawner, request, || Channel::new(id, Mode::Send))
}

/// Launches `request` and opens a sending [`MultiChannel`] on `id`.
pub fn launch_and_open_multi_channel(
    state: &mut LaunchState<MultiChannel>,
    request: &LaunchRequest,
    id: ChannelId,
    channel_count: usize,
) -> Option<MultiChannel> {
    state.poll(&ProcessSpawner, request, || {
        MultiChannel::new(id, Mode::Send, channel_count)
    })
}
