use crate::region::{ClaimToken, SharedRegion};
use crate::{ChannelError, ChannelId, Config, Endpoint, Mode, RingBuffer};
use std::io;
use std::mem;
use std::slice;
use std::sync::atomic::{AtomicI32, Ordering};
use tracing::{debug, warn};

const FREE: i32 = 0;
const CLAIMED: i32 = 1;

/// Many senders, one receiver, one ring per sender.
///
/// The receiver creates `effective_channel_count()` data regions plus a claim
/// table. Each sender binds to exactly one unclaimed slot at open time and
/// gives it back on close. This is the cross-process version of ring
/// decomposition: senders never share a ring, so each region stays SPSC.
///
/// Slot claiming has two layers:
/// - the claim table, one atomic flag per slot, flipped with compare-and-swap
///   to pick the slot a sender tries first;
/// - a named exclusive token per slot (`-Mutex<i>`), locked by at most one
///   sender. Holding the token is what makes the slot yours. The lock dies
///   with its process, and the receiver removes every token name when it
///   opens or closes, so a vanished sender never keeps a slot.
pub struct MultiChannel {
    id: ChannelId,
    mode: Mode,
    channel_count: usize,
    config: Config,
    claim_table: Option<SharedRegion>,
    slots: Vec<Option<SharedRegion>>,
    token: Option<ClaimToken>,
    sending_index: Option<usize>,
    next_read: usize,
    last_error: String,
}

impl MultiChannel {
    /// Creates a closed handle using the process-wide capacity.
    ///
    /// A `channel_count` of 0 is treated as 1.
    pub fn new(id: ChannelId, mode: Mode, channel_count: usize) -> Self {
        Self::with_config(id, mode, channel_count, Config::default())
    }

    /// Creates a closed handle with an explicit configuration.
    pub fn with_config(id: ChannelId, mode: Mode, channel_count: usize, config: Config) -> Self {
        let effective = channel_count.max(1);
        Self {
            id,
            mode,
            channel_count,
            config,
            claim_table: None,
            slots: (0..effective).map(|_| None).collect(),
            token: None,
            sending_index: None,
            next_read: 0,
            last_error: String::new(),
        }
    }

    /// The slot count as requested.
    #[inline]
    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    /// The slot count actually used: `max(channel_count, 1)`.
    #[inline]
    pub fn effective_channel_count(&self) -> usize {
        self.slots.len()
    }

    /// Data capacity of each slot, captured at construction.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.config.capacity()
    }

    /// Slot this sender claimed, if open in send mode.
    #[inline]
    pub fn sending_index(&self) -> Option<usize> {
        self.sending_index
    }

    fn claim_table_size(&self) -> usize {
        self.effective_channel_count() * mem::size_of::<i32>()
    }

    fn flags(&self) -> Option<&[AtomicI32]> {
        self.claim_table.as_ref().map(|table| {
            // SAFETY: the table is mapped page-aligned, sized for one i32 per
            // slot, only accessed atomically, and outlives the borrow.
            unsafe {
                slice::from_raw_parts(
                    table.as_ptr().as_ptr().cast::<AtomicI32>(),
                    self.effective_channel_count(),
                )
            }
        })
    }

    fn check_index(&self, index: usize) -> Result<(), ChannelError> {
        let count = self.effective_channel_count();
        if index < count {
            Ok(())
        } else {
            Err(ChannelError::OutOfRange { index, count })
        }
    }

    fn ring_at(&self, index: usize) -> Result<RingBuffer<'_>, ChannelError> {
        self.check_index(index)?;
        let region = self.slots[index]
            .as_ref()
            .ok_or(ChannelError::NotConnected { index })?;
        // SAFETY: every slot region is config.region_size() bytes and stays
        // mapped while the view borrows self.
        Ok(unsafe { RingBuffer::from_raw(region.as_ptr(), self.config.capacity()) })
    }

    fn own_ring(&self) -> Result<RingBuffer<'_>, ChannelError> {
        if self.mode != Mode::Send {
            return Err(ChannelError::WrongMode {
                expected: Mode::Send,
            });
        }
        let index = self.sending_index.ok_or(ChannelError::NotOpen)?;
        self.ring_at(index)
    }

    fn fail_open(&mut self, error: ChannelError) -> Result<(), ChannelError> {
        self.last_error = error.to_string();
        warn!(id = %self.id, mode = %self.mode, error = %self.last_error, "multi-channel open failed");
        Err(error)
    }

    // ---------------------------------------------------------------------
    // OPEN
    // ---------------------------------------------------------------------

    /// Creates every data region and then the claim table. All or nothing:
    /// on failure, regions created so far are dropped (and unlinked).
    ///
    /// Claim tokens left by an earlier pool are removed before the table
    /// exists, while no sender of this pool can have claimed a slot.
    fn open_receiving(&mut self) -> Result<(), ChannelError> {
        let size = self.config.region_size();
        let mut created = Vec::with_capacity(self.effective_channel_count());

        for index in 0..self.effective_channel_count() {
            let name = self.id.data_region_name(index);
            match SharedRegion::create(&name, size) {
                Ok(region) => created.push(Some(region)),
                Err(e) => {
                    return self.fail_open(ChannelError::Unavailable(format!(
                        "cannot create region {}: {}",
                        name, e
                    )))
                }
            }
        }

        self.remove_claim_tokens();

        let table_name = self.id.region_name();
        let table = match SharedRegion::create(&table_name, self.claim_table_size()) {
            Ok(table) => table,
            Err(e) => {
                return self.fail_open(ChannelError::Unavailable(format!(
                    "cannot create claim table {}: {}",
                    table_name, e
                )))
            }
        };

        self.slots = created;
        self.claim_table = Some(table);
        self.last_error.clear();
        debug!(id = %self.id, slots = self.slots.len(), "multi-channel receiving");
        Ok(())
    }

    fn remove_claim_tokens(&self) {
        for index in 0..self.effective_channel_count() {
            ClaimToken::remove(&self.id.claim_token_name(index));
        }
    }

    /// Flips the first free flag to claimed. The winner is only a hint.
    fn claim_hint(&self) -> Option<usize> {
        self.flags()?.iter().position(|flag| {
            flag.compare_exchange(FREE, CLAIMED, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        })
    }

    /// Tries to own slot `index`: lock its token, then open its region.
    fn try_claim(&self, index: usize) -> io::Result<Option<(ClaimToken, SharedRegion)>> {
        let Some(token) = ClaimToken::try_acquire(&self.id.claim_token_name(index))? else {
            return Ok(None);
        };
        // Dropping the token on error releases the slot again.
        let region = SharedRegion::open(&self.id.data_region_name(index), self.config.region_size())?;
        Ok(Some((token, region)))
    }

    fn open_sending(&mut self) -> Result<(), ChannelError> {
        let table_name = self.id.region_name();
        match SharedRegion::open(&table_name, self.claim_table_size()) {
            Ok(table) => self.claim_table = Some(table),
            Err(e) => {
                return self.fail_open(ChannelError::Unavailable(format!(
                    "cannot open claim table {}: {}",
                    table_name, e
                )))
            }
        }

        let count = self.effective_channel_count();
        let hint = self.claim_hint();
        // The hint flag stays set if its slot turns out to be held by
        // another sender; that holder clears it on close.
        let mut release_hint = false;

        for step in 0..count {
            let index = hint.map_or(step, |start| (start + step) % count);
            match self.try_claim(index) {
                Ok(Some((token, region))) => {
                    if let Some(flags) = self.flags() {
                        if hint != Some(index) {
                            if let (Some(start), true) = (hint, release_hint) {
                                flags[start].store(FREE, Ordering::Release);
                            }
                            // Already set means a racing sender hinted this
                            // slot; the flag is right either way.
                            let _ = flags[index].compare_exchange(
                                FREE,
                                CLAIMED,
                                Ordering::AcqRel,
                                Ordering::Acquire,
                            );
                        }
                    }
                    self.slots[index] = Some(region);
                    self.token = Some(token);
                    self.sending_index = Some(index);
                    self.last_error.clear();
                    debug!(id = %self.id, slot = index, "multi-channel slot claimed");
                    return Ok(());
                }
                Ok(None) => {}
                Err(e) => {
                    release_hint |= hint == Some(index);
                    debug!(id = %self.id, slot = index, error = %e, "slot unusable");
                }
            }
        }

        if let (Some(start), Some(flags), true) = (hint, self.flags(), release_hint) {
            flags[start].store(FREE, Ordering::Release);
        }
        self.claim_table = None;
        self.fail_open(ChannelError::OutOfSlots { tried: count })
    }

    // ---------------------------------------------------------------------
    // RECEIVER API
    // ---------------------------------------------------------------------

    /// Reads the pending bytes of one slot, returning them with the slot
    /// index. Requires receive mode.
    ///
    /// The sweep starts right after the slot that last yielded data, so a
    /// busy sender cannot starve the others. Returns `None` after one full
    /// sweep without data.
    ///
    /// A slot with corrupted cursors is logged and skipped. Its error is
    /// returned only if no other slot had data.
    pub fn try_read(&mut self) -> Result<Option<(usize, Vec<u8>)>, ChannelError> {
        if self.claim_table.is_none() {
            return Err(ChannelError::NotOpen);
        }
        if self.mode != Mode::Receive {
            return Err(ChannelError::WrongMode {
                expected: Mode::Receive,
            });
        }

        let count = self.effective_channel_count();
        let mut failure = None;
        for step in 0..count {
            let index = (self.next_read + step) % count;
            if self.slots[index].is_none() {
                continue;
            }
            let drained = self.ring_at(index)?.try_read();
            match drained {
                Ok(Some(data)) => {
                    self.next_read = (index + 1) % count;
                    return Ok(Some((index, data)));
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(id = %self.id, slot = index, error = %e, "slot unreadable");
                    failure.get_or_insert(e);
                }
            }
        }
        failure.map_or(Ok(None), Err)
    }

    // ---------------------------------------------------------------------
    // PER-SLOT API
    // ---------------------------------------------------------------------

    /// Returns `true` if this handle has a region attached for `index`.
    ///
    /// A receiver is connected to every slot while open; a sender only to
    /// the slot it claimed.
    pub fn is_connected(&self, index: usize) -> Result<bool, ChannelError> {
        self.check_index(index)?;
        Ok(self.slots[index].is_some())
    }

    /// Returns `true` if the claim table marks `index` as taken by a sender.
    pub fn is_claimed(&self, index: usize) -> Result<bool, ChannelError> {
        self.check_index(index)?;
        let flags = self.flags().ok_or(ChannelError::NotOpen)?;
        Ok(flags[index].load(Ordering::Acquire) != FREE)
    }

    /// Free bytes in slot `index`.
    pub fn free_len_at(&self, index: usize) -> Result<usize, ChannelError> {
        self.ring_at(index)?.free_len()
    }

    /// Used bytes in slot `index`.
    pub fn used_len_at(&self, index: usize) -> Result<usize, ChannelError> {
        self.ring_at(index)?.used_len()
    }

    /// Debug line for slot `index`, labelled with `name`.
    pub fn stats_at(&self, name: &str, index: usize) -> Result<String, ChannelError> {
        Ok(self.ring_at(index)?.stats()?.describe(name))
    }
}

impl Endpoint for MultiChannel {
    fn id(&self) -> ChannelId {
        self.id
    }

    fn mode(&self) -> Mode {
        self.mode
    }

    fn open(&mut self) -> Result<(), ChannelError> {
        if self.is_open() {
            return Err(ChannelError::AlreadyOpen);
        }
        match self.mode {
            Mode::Receive => self.open_receiving(),
            Mode::Send => self.open_sending(),
        }
    }

    fn close(&mut self) {
        if !self.is_open() {
            return;
        }

        if let Some(index) = self.sending_index.take() {
            self.slots[index] = None;
            // Flag first: a sender claiming the slot right after the token
            // is released must not have its flag cleared by us.
            if let Some(flags) = self.flags() {
                flags[index].store(FREE, Ordering::Release);
            }
            self.token = None;
            debug!(id = %self.id, slot = index, "multi-channel slot released");
        } else {
            self.slots.iter_mut().for_each(|slot| *slot = None);
            self.remove_claim_tokens();
            debug!(id = %self.id, "multi-channel receiving closed");
        }

        self.claim_table = None;
        self.next_read = 0;
    }

    fn is_open(&self) -> bool {
        self.claim_table.is_some()
    }

    fn last_error(&self) -> &str {
        &self.last_error
    }

    fn write(&mut self, data: &[u8]) -> Result<(), ChannelError> {
        self.own_ring()?.write(data)
    }

    fn free_len(&self) -> Result<usize, ChannelError> {
        self.own_ring()?.free_len()
    }

    fn used_len(&self) -> Result<usize, ChannelError> {
        self.own_ring()?.used_len()
    }

    fn stats(&self, name: &str) -> Result<String, ChannelError> {
        Ok(self.own_ring()?.stats()?.describe(name))
    }
}

impl Drop for MultiChannel {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for MultiChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiChannel")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .field("slots", &self.effective_channel_count())
            .field("capacity", &self.config.capacity())
            .field("open", &self.is_open())
            .field("sending_index", &self.sending_index)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: Config = Config::new(256);

    #[test]
    fn test_zero_count_means_one_slot() {
        let ch = MultiChannel::with_config(ChannelId::random(), Mode::Receive, 0, CONFIG);
        assert_eq!(ch.channel_count(), 0);
        assert_eq!(ch.effective_channel_count(), 1);
    }

    #[test]
    fn test_claim_flags_follow_senders() {
        let id = ChannelId::random();
        let mut rx = MultiChannel::with_config(id, Mode::Receive, 2, CONFIG);
        rx.open().unwrap();
        assert_eq!(rx.is_claimed(0), Ok(false));

        let mut tx = MultiChannel::with_config(id, Mode::Send, 2, CONFIG);
        tx.open().unwrap();
        assert_eq!(tx.sending_index(), Some(0));
        assert_eq!(rx.is_claimed(0), Ok(true));
        assert_eq!(rx.is_claimed(1), Ok(false));

        tx.close();
        assert_eq!(rx.is_claimed(0), Ok(false));
        assert_eq!(tx.sending_index(), None);
    }

    #[test]
    fn test_hint_on_held_slot_stays_claimed() {
        let id = ChannelId::random();
        let mut rx = MultiChannel::with_config(id, Mode::Receive, 2, CONFIG);
        rx.open().unwrap();

        // Slot 0 is held by a token but its flag says free: the hint lands on
        // 0, the token scan moves on to 1, and flag 0 keeps saying claimed.
        let _held = ClaimToken::try_acquire(&id.claim_token_name(0)).unwrap().unwrap();
        let mut tx = MultiChannel::with_config(id, Mode::Send, 2, CONFIG);
        tx.open().unwrap();

        assert_eq!(tx.sending_index(), Some(1));
        assert_eq!(rx.is_claimed(0), Ok(true));
        assert_eq!(rx.is_claimed(1), Ok(true));
    }

    #[test]
    fn test_failed_claim_keeps_owner_flag() {
        let id = ChannelId::random();
        let mut rx = MultiChannel::with_config(id, Mode::Receive, 2, CONFIG);
        rx.open().unwrap();
        let mut owner = MultiChannel::with_config(id, Mode::Send, 2, CONFIG);
        owner.open().unwrap();
        assert_eq!(owner.sending_index(), Some(0));

        // A stale flag lets the next sender hint at the owned slot.
        rx.flags().unwrap()[0].store(FREE, Ordering::Release);
        let mut other = MultiChannel::with_config(id, Mode::Send, 2, CONFIG);
        other.open().unwrap();

        assert_eq!(other.sending_index(), Some(1));
        assert_eq!(rx.is_claimed(0), Ok(true));
        assert_eq!(rx.is_claimed(1), Ok(true));

        other.close();
        assert_eq!(rx.is_claimed(0), Ok(true));
        assert_eq!(rx.is_claimed(1), Ok(false));
    }

    #[test]
    fn test_corrupted_slot_does_not_block_others() {
        let id = ChannelId::random();
        let mut rx = MultiChannel::with_config(id, Mode::Receive, 2, CONFIG);
        rx.open().unwrap();
        let _first = {
            let mut tx = MultiChannel::with_config(id, Mode::Send, 2, CONFIG);
            tx.open().unwrap();
            tx
        };
        let mut second = MultiChannel::with_config(id, Mode::Send, 2, CONFIG);
        second.open().unwrap();
        assert_eq!(second.sending_index(), Some(1));

        // Head of slot 0 points outside the data area.
        let region = rx.slots[0].as_ref().unwrap();
        unsafe {
            region
                .as_ptr()
                .as_ptr()
                .add(CONFIG.capacity())
                .cast::<i32>()
                .write(9999);
        }

        second.write(b"good").unwrap();
        assert_eq!(rx.try_read(), Ok(Some((1, b"good".to_vec()))));
        assert_eq!(
            rx.try_read(),
            Err(ChannelError::Corrupted {
                head: 9999,
                tail: 0,
                capacity: 256
            })
        );

        second.write(b"again").unwrap();
        assert_eq!(rx.try_read(), Ok(Some((1, b"again".to_vec()))));
    }

    #[test]
    fn test_receiver_reopen_clears_last_error() {
        let id = ChannelId::random();
        let mut first = MultiChannel::with_config(id, Mode::Receive, 2, CONFIG);
        first.open().unwrap();

        let mut rx = MultiChannel::with_config(id, Mode::Receive, 2, CONFIG);
        assert!(matches!(rx.open(), Err(ChannelError::Unavailable(_))));
        assert!(!rx.last_error().is_empty());

        first.close();
        rx.open().unwrap();
        assert!(rx.last_error().is_empty());
    }

    #[test]
    fn test_sender_before_receiver_fails_cleanly() {
        let id = ChannelId::random();
        let mut tx = MultiChannel::with_config(id, Mode::Send, 2, CONFIG);
        assert!(matches!(tx.open(), Err(ChannelError::Unavailable(_))));
        assert!(!tx.is_open());
        assert!(!tx.last_error().is_empty());

        let mut rx = MultiChannel::with_config(id, Mode::Receive, 2, CONFIG);
        rx.open().unwrap();
        tx.open().unwrap();
        assert!(tx.last_error().is_empty());
    }
}
