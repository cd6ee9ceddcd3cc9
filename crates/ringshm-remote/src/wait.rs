//! Async launch: one call that waits for the channel to open.

use crate::cancel::CancelSignal;
use crate::request::{LaunchRequest, ProcessSpawner, Spawner};
use ringshm_rs::{Channel, ChannelId, Endpoint, Mode, MultiChannel, Timeouts};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

/// Default pause between open attempts.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Bounds of an async wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    /// Give up after this long.
    pub timeout: Duration,
    /// Sleep between failed attempts.
    pub retry_interval: Duration,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout: Timeouts::current().process_launch,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}

impl WaitOptions {
    /// Sets how long to keep retrying before giving up.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the pause between failed open attempts.
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }
}

/// Opens a handle built by `make`, retrying every `retry_interval` until it
/// succeeds, `timeout` elapses, or `cancel` fires.
///
/// Nothing is memoized between calls: each call has its own deadline.
pub async fn open_with_retry<C, F>(options: WaitOptions, make: F, cancel: &CancelSignal) -> Option<C>
where
    C: Endpoint,
    F: FnOnce() -> C,
{
    let deadline = Instant::now() + options.timeout;
    let mut handle = make();
    let mut attempts = 0u32;

    loop {
        if cancel.is_cancelled() {
            debug!(attempts, "open wait cancelled");
            return None;
        }

        attempts += 1;
        match handle.open() {
            Ok(()) => {
                debug!(attempts, id = %handle.id(), "channel open");
                return Some(handle);
            }
            Err(e) => debug!(attempts, error = %e, "channel not ready"),
        }

        if Instant::now() >= deadline {
            warn!(
                timeout_ms = options.timeout.as_millis() as u64,
                attempts,
                "open wait timed out"
            );
            return None;
        }

        tokio::select! {
            () = sleep(options.retry_interval) => {}
            () = cancel.cancelled() => {
                debug!(attempts, "open wait cancelled");
                return None;
            }
        }
    }
}

/// Starts `request` (best effort) and waits for the handle built by `make`
/// to open.
pub async fn launch_and_open<C, S, F>(
    spawner: &S,
    request: &LaunchRequest,
    options: WaitOptions,
    make: F,
    cancel: &CancelSignal,
) -> Option<C>
where
    C: Endpoint,
    S: Spawner + ?Sized,
    F: FnOnce() -> C,
{
    info!(program = %request.program().display(), "launching process");
    if let Err(e) = spawner.spawn(request) {
        warn!(program = %request.program().display(), error = %e, "process spawn failed");
    }
    open_with_retry(options, make, cancel).await
}

/// Async counterpart of [`launch_and_open_channel`](crate::launch_and_open_channel).
pub async fn launch_and_open_channel_async(
    request: &LaunchRequest,
    id: ChannelId,
    options: WaitOptions,
    cancel: &CancelSignal,
) -> Option<Channel> {
    launch_and_open(&ProcessSpawner, request, options, || Channel::new(id, Mode::Send), cancel).await
}

/// Async counterpart of
/// [`launch_and_open_multi_channel`](crate::launch_and_open_multi_channel).
pub async fn launch_and_open_multi_channel_async(
    request: &LaunchRequest,
    id: ChannelId,
    channel_count: usize,
    options: WaitOptions,
    cancel: &CancelSignal,
) -> Option<MultiChannel> {
    launch_and_open(
        &ProcessSpawner,
        request,
        options,
        || MultiChannel::new(id, Mode::Send, channel_count),
        cancel,
    )
    .await
}
