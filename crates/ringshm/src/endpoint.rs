use crate::{ChannelError, ChannelId};
use std::fmt;

/// Direction of a channel handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Opens existing regions and writes to them.
    Send,
    /// Creates regions and reads from them.
    Receive,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Send => f.write_str("send"),
            Self::Receive => f.write_str("receive"),
        }
    }
}

/// Capabilities shared by [`Channel`](crate::Channel) and
/// [`MultiChannel`](crate::MultiChannel).
///
/// Reads are not part of the trait: a single channel yields bytes, a
/// multi-slot channel yields bytes plus the slot they came from.
pub trait Endpoint {
    /// The channel identifier both ends agree on.
    fn id(&self) -> ChannelId;

    /// The direction of this handle.
    fn mode(&self) -> Mode;

    /// Acquires the OS resources.
    ///
    /// Returns [`ChannelError::AlreadyOpen`] without side effects if the
    /// handle is open. Any other error leaves the handle closed with every
    /// partially acquired resource released, and is also recorded in
    /// [`last_error`](Endpoint::last_error), so callers can simply retry.
    fn open(&mut self) -> Result<(), ChannelError>;

    /// Releases the OS resources. No-op when already closed.
    fn close(&mut self);

    /// Returns `true` while the handle holds its resources.
    fn is_open(&self) -> bool;

    /// Text of the last failed `open()`, empty if none.
    fn last_error(&self) -> &str;

    /// Writes the whole slice or fails with
    /// [`ChannelError::CapacityExceeded`].
    fn write(&mut self, data: &[u8]) -> Result<(), ChannelError>;

    /// Free bytes in this handle's own region.
    fn free_len(&self) -> Result<usize, ChannelError>;

    /// Used bytes in this handle's own region.
    fn used_len(&self) -> Result<usize, ChannelError>;

    /// Debug line for this handle's own region, labelled with `name`.
    fn stats(&self, name: &str) -> Result<String, ChannelError>;
}
