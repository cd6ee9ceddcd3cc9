use crate::region::SharedRegion;
use crate::{ChannelError, ChannelId, Config, Endpoint, Mode, RingBuffer};
use tracing::{debug, warn};

/// Single-region channel between one sender and one receiver.
///
/// The receiver creates the region (named after the id), the sender opens
/// it. The handle starts closed; `open()` may be retried until the peer is
/// up, and the region is released on `close()` or drop.
pub struct Channel {
    id: ChannelId,
    mode: Mode,
    config: Config,
    region: Option<SharedRegion>,
    last_error: String,
}

impl Channel {
    /// Creates a closed handle using the process-wide capacity.
    pub fn new(id: ChannelId, mode: Mode) -> Self {
        Self::with_config(id, mode, Config::default())
    }

    /// Creates a closed handle with an explicit configuration.
    pub fn with_config(id: ChannelId, mode: Mode, config: Config) -> Self {
        Self {
            id,
            mode,
            config,
            region: None,
            last_error: String::new(),
        }
    }

    /// Data capacity captured at construction.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.config.capacity()
    }

    fn ring(&self) -> Result<RingBuffer<'_>, ChannelError> {
        let region = self.region.as_ref().ok_or(ChannelError::NotOpen)?;
        // SAFETY: the region is config.region_size() bytes and stays mapped
        // while the returned view borrows self.
        Ok(unsafe { RingBuffer::from_raw(region.as_ptr(), self.config.capacity()) })
    }

    /// Drains all pending bytes, or `None` if nothing was written since the
    /// last read. Requires receive mode.
    pub fn try_read(&mut self) -> Result<Option<Vec<u8>>, ChannelError> {
        let ring = self.ring()?;
        if self.mode != Mode::Receive {
            return Err(ChannelError::WrongMode {
                expected: Mode::Receive,
            });
        }
        ring.try_read()
    }
}

impl Endpoint for Channel {
    fn id(&self) -> ChannelId {
        self.id
    }

    fn mode(&self) -> Mode {
        self.mode
    }

    fn open(&mut self) -> Result<(), ChannelError> {
        if self.region.is_some() {
            return Err(ChannelError::AlreadyOpen);
        }

        let name = self.id.region_name();
        let size = self.config.region_size();
        let attached = match self.mode {
            Mode::Receive => SharedRegion::create(&name, size),
            Mode::Send => SharedRegion::open(&name, size),
        };

        match attached {
            Ok(region) => {
                debug!(%name, size = region.len(), mode = %self.mode, "channel open");
                self.region = Some(region);
                self.last_error.clear();
                Ok(())
            }
            Err(e) => {
                let verb = match self.mode {
                    Mode::Receive => "create",
                    Mode::Send => "open",
                };
                self.last_error = format!("cannot {} region {}: {}", verb, name, e);
                warn!(error = %self.last_error, "channel open failed");
                Err(ChannelError::Unavailable(self.last_error.clone()))
            }
        }
    }

    fn close(&mut self) {
        if self.region.take().is_some() {
            debug!(id = %self.id, mode = %self.mode, "channel closed");
        }
    }

    fn is_open(&self) -> bool {
        self.region.is_some()
    }

    fn last_error(&self) -> &str {
        &self.last_error
    }

    fn write(&mut self, data: &[u8]) -> Result<(), ChannelError> {
        let ring = self.ring()?;
        if self.mode != Mode::Send {
            return Err(ChannelError::WrongMode {
                expected: Mode::Send,
            });
        }
        ring.write(data)
    }

    fn free_len(&self) -> Result<usize, ChannelError> {
        self.ring()?.free_len()
    }

    fn used_len(&self) -> Result<usize, ChannelError> {
        self.ring()?.used_len()
    }

    fn stats(&self, name: &str) -> Result<String, ChannelError> {
        Ok(self.ring()?.stats()?.describe(name))
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .field("capacity", &self.config.capacity())
            .field("open", &self.is_open())
            .finish()
    }
}
