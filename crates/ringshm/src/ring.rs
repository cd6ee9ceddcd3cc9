use crate::invariants::{
    debug_assert_cursor_in_range, debug_assert_full_drain, debug_assert_reserved_byte,
};
use crate::{ChannelError, ChannelStats};
use std::marker::PhantomData;
use std::mem;
use std::ptr::{self, NonNull};
use std::sync::atomic::{fence, AtomicI32, Ordering};
use tracing::trace;

// =============================================================================
// REGION LAYOUT & SYNCHRONIZATION STRATEGY
// =============================================================================
//
// A region is `capacity + 8` bytes:
//
//   [0 .. capacity)          data bytes
//   [capacity .. +4)         head (i32): next write offset, written by the sender
//   [capacity + 4 .. +8)     tail (i32): next read offset, written by the receiver
//
// Cursors are offsets in `0..capacity`, not sequence numbers. `head == tail`
// always means empty; one byte is kept free so a full buffer never looks
// empty. Both ends live in different processes, so nothing here is cached:
// every operation re-reads both cursors from the region.
//
// ## Memory Ordering Protocol
//
// **Sender (write path):**
// 1. Load `head` and `tail` with Acquire (tail synchronizes with the receiver)
// 2. Copy data at `head`, wrapping at `capacity` (plain stores)
// 3. Store new `head` with Release (publishes the bytes)
//
// **Receiver (read path):**
// 1. Load `head` and `tail` with Acquire (head synchronizes with the sender)
// 2. Copy data from `tail` up to `head`, wrapping at `capacity`
// 3. Store `tail = head` with Release (hands the space back)
//
// ## Single-Writer Invariants
//
// - `head` is only written by the one sender attached to the region
// - `tail` is only written by the one receiver attached to the region
// - bytes in `[tail, head)` are only read; bytes outside are only written
//
// Cursor values read from the region come from another process and are
// range-checked before they index anything.
//
// =============================================================================

/// Size of the two cursors stored after the data area.
pub const CURSORS_SIZE: usize = 2 * mem::size_of::<i32>();

const HEAD_OFFSET: usize = 0;
const TAIL_OFFSET: usize = mem::size_of::<i32>();

/// Returns the number of readable bytes for the given cursors.
#[inline]
pub const fn used_len(head: usize, tail: usize, capacity: usize) -> usize {
    if head >= tail {
        head - tail
    } else {
        capacity - tail + head
    }
}

/// Returns the number of writable bytes for the given cursors.
#[inline]
pub const fn free_len(head: usize, tail: usize, capacity: usize) -> usize {
    capacity - used_len(head, tail, capacity) - 1
}

/// SPSC byte ring over a region of memory - the core building block.
///
/// A `RingBuffer` is a view: it owns nothing and can be rebuilt at any time
/// from the same region. Exactly one writer and one reader may address a
/// region concurrently; there is no internal lock.
pub struct RingBuffer<'a> {
    base: NonNull<u8>,
    capacity: usize,
    _region: PhantomData<&'a [u8]>,
}

impl<'a> RingBuffer<'a> {
    /// Formats `region` as an empty ring and returns a view over it.
    ///
    /// The data capacity is `region.len() - 8`.
    ///
    /// # Panics
    ///
    /// Panics if the region cannot hold the cursors plus at least two data
    /// bytes, or if it is larger than a 32-bit cursor can address.
    pub fn new(region: &'a mut [u8]) -> Self {
        assert!(
            region.len() >= CURSORS_SIZE + 2,
            "region of {} bytes is too small for a ring",
            region.len()
        );
        let capacity = region.len() - CURSORS_SIZE;
        assert!(
            capacity <= i32::MAX as usize,
            "capacity {} does not fit a 32-bit cursor",
            capacity
        );
        region[capacity..].fill(0);

        // SAFETY: the slice is non-empty, so its pointer is non-null, and the
        // exclusive borrow is held for 'a.
        unsafe { Self::from_raw(NonNull::new_unchecked(region.as_mut_ptr()), capacity) }
    }

    /// Creates a view over an existing region without touching it.
    ///
    /// # Safety
    ///
    /// `base` must point to at least `capacity + CURSORS_SIZE` bytes that stay
    /// mapped for `'a`, `capacity` must be at least 2 and fit in an `i32`, and
    /// the caller must uphold the single-writer/single-reader contract.
    pub(crate) unsafe fn from_raw(base: NonNull<u8>, capacity: usize) -> Self {
        Self {
            base,
            capacity,
            _region: PhantomData,
        }
    }

    // ---------------------------------------------------------------------
    // CURSORS
    // ---------------------------------------------------------------------

    /// Returns the data capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn cursor_ptr(&self, offset: usize) -> *mut u8 {
        // SAFETY: the region spans capacity + CURSORS_SIZE bytes.
        unsafe { self.base.as_ptr().add(self.capacity + offset) }
    }

    fn load_cursor(&self, offset: usize) -> i32 {
        let ptr = self.cursor_ptr(offset);
        if ptr as usize % mem::align_of::<AtomicI32>() == 0 {
            // SAFETY: aligned, in bounds, and only ever accessed as an i32.
            unsafe { (*ptr.cast::<AtomicI32>()).load(Ordering::Acquire) }
        } else {
            // SAFETY: in bounds; [u8; 4] has no alignment requirement.
            let bytes = unsafe { ptr::read_volatile(ptr.cast::<[u8; 4]>()) };
            fence(Ordering::Acquire);
            i32::from_ne_bytes(bytes)
        }
    }

    fn store_cursor(&self, offset: usize, value: i32) {
        let ptr = self.cursor_ptr(offset);
        if ptr as usize % mem::align_of::<AtomicI32>() == 0 {
            // SAFETY: aligned, in bounds, and only ever accessed as an i32.
            unsafe { (*ptr.cast::<AtomicI32>()).store(value, Ordering::Release) }
        } else {
            fence(Ordering::Release);
            // SAFETY: in bounds; [u8; 4] has no alignment requirement.
            unsafe { ptr::write_volatile(ptr.cast::<[u8; 4]>(), value.to_ne_bytes()) }
        }
    }

    /// Raw head cursor (next write offset) as stored in the region.
    #[inline]
    pub fn head(&self) -> i32 {
        self.load_cursor(HEAD_OFFSET)
    }

    /// Raw tail cursor (next read offset) as stored in the region.
    #[inline]
    pub fn tail(&self) -> i32 {
        self.load_cursor(TAIL_OFFSET)
    }

    /// Loads both cursors and checks they address the data area.
    fn cursors(&self) -> Result<(usize, usize), ChannelError> {
        let head = self.head();
        let tail = self.tail();
        let in_range = |c: i32| c >= 0 && (c as usize) < self.capacity;
        if in_range(head) && in_range(tail) {
            Ok((head as usize, tail as usize))
        } else {
            Err(ChannelError::Corrupted {
                head,
                tail,
                capacity: self.capacity,
            })
        }
    }

    // ---------------------------------------------------------------------
    // LENGTHS & STATS
    // ---------------------------------------------------------------------

    /// Number of bytes a single write can currently take.
    pub fn free_len(&self) -> Result<usize, ChannelError> {
        let (head, tail) = self.cursors()?;
        Ok(free_len(head, tail, self.capacity))
    }

    /// Number of bytes waiting to be read.
    pub fn used_len(&self) -> Result<usize, ChannelError> {
        let (head, tail) = self.cursors()?;
        Ok(used_len(head, tail, self.capacity))
    }

    /// Snapshot of cursors and lengths.
    pub fn stats(&self) -> Result<ChannelStats, ChannelError> {
        let (head, tail) = self.cursors()?;
        Ok(ChannelStats {
            head,
            tail,
            capacity: self.capacity,
            free: free_len(head, tail, self.capacity),
            used: used_len(head, tail, self.capacity),
        })
    }

    // ---------------------------------------------------------------------
    // SENDER API
    // ---------------------------------------------------------------------

    /// Appends `data` to the ring.
    ///
    /// Either the whole slice is written or nothing is: if `data` is longer
    /// than the free length the call fails with
    /// [`ChannelError::CapacityExceeded`]. The bytes become visible to the
    /// reader only when the new head is published.
    pub fn write(&self, data: &[u8]) -> Result<(), ChannelError> {
        let (head, tail) = self.cursors()?;
        let free = free_len(head, tail, self.capacity);
        debug_assert_reserved_byte!(used_len(head, tail, self.capacity), free, self.capacity);

        if data.len() > free {
            return Err(ChannelError::CapacityExceeded {
                requested: data.len(),
                free,
            });
        }

        let first = data.len().min(self.capacity - head);
        let second = data.len() - first;

        // SAFETY: [head, head + first) and [0, second) lie in the data area
        // and in the free space, which the reader never touches.
        unsafe {
            let dst = self.base.as_ptr();
            ptr::copy_nonoverlapping(data.as_ptr(), dst.add(head), first);
            ptr::copy_nonoverlapping(data.as_ptr().add(first), dst, second);
        }

        let new_head = (head + data.len()) % self.capacity;
        debug_assert_cursor_in_range!("head", new_head, self.capacity);
        self.store_cursor(HEAD_OFFSET, new_head as i32);

        trace!(len = data.len(), head = new_head, "ring write");
        Ok(())
    }

    // ---------------------------------------------------------------------
    // RECEIVER API
    // ---------------------------------------------------------------------

    /// Drains every pending byte, or returns `None` when the ring is empty.
    ///
    /// The ring imposes no message boundaries: bytes from several writes
    /// come back concatenated.
    pub fn try_read(&self) -> Result<Option<Vec<u8>>, ChannelError> {
        let (head, tail) = self.cursors()?;
        if head == tail {
            return Ok(None);
        }

        let used = used_len(head, tail, self.capacity);
        debug_assert_reserved_byte!(used, free_len(head, tail, self.capacity), self.capacity);

        let first = used.min(self.capacity - tail);
        let second = used - first;
        let mut out = Vec::with_capacity(used);

        // SAFETY: [tail, tail + first) and [0, second) hold bytes published
        // by the writer's Release store of head, which the Acquire load in
        // cursors() synchronizes with. The writer does not touch them until
        // tail moves past.
        unsafe {
            let src = self.base.as_ptr();
            ptr::copy_nonoverlapping(src.add(tail), out.as_mut_ptr(), first);
            ptr::copy_nonoverlapping(src, out.as_mut_ptr().add(first), second);
            out.set_len(first + second);
        }
        debug_assert_full_drain!(out.len(), used);

        debug_assert_cursor_in_range!("tail", head, self.capacity);
        self.store_cursor(TAIL_OFFSET, head as i32);

        trace!(len = used, tail = head, "ring read");
        Ok(Some(out))
    }
}

// Safety: the view only carries a pointer into a region that the owner keeps
// mapped for 'a; access follows the SPSC protocol above.
unsafe impl Send for RingBuffer<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(capacity: usize) -> Vec<u8> {
        vec![0xAA; capacity + CURSORS_SIZE]
    }

    #[test]
    fn test_ring_basic_write_read() {
        let mut mem = region(64);
        let ring = RingBuffer::new(&mut mem);

        assert_eq!(ring.capacity(), 64);
        assert_eq!(ring.free_len().unwrap(), 63);
        assert_eq!(ring.used_len().unwrap(), 0);

        ring.write(&[1, 2, 3, 4]).unwrap();
        assert_eq!(ring.used_len().unwrap(), 4);
        assert_eq!(ring.free_len().unwrap(), 59);

        assert_eq!(ring.try_read().unwrap(), Some(vec![1, 2, 3, 4]));
        assert_eq!(ring.used_len().unwrap(), 0);
        assert_eq!(ring.free_len().unwrap(), 63);
    }

    #[test]
    fn test_ring_empty_read_is_none() {
        let mut mem = region(16);
        let ring = RingBuffer::new(&mut mem);
        assert_eq!(ring.try_read().unwrap(), None);
    }

    #[test]
    fn test_ring_reads_concatenate_writes() {
        let mut mem = region(32);
        let ring = RingBuffer::new(&mut mem);

        ring.write(b"abc").unwrap();
        ring.write(b"def").unwrap();
        assert_eq!(ring.try_read().unwrap().as_deref(), Some(&b"abcdef"[..]));
    }

    #[test]
    fn test_ring_wraparound() {
        let mut mem = region(10);
        let ring = RingBuffer::new(&mut mem);

        ring.write(&[0; 7]).unwrap();
        ring.try_read().unwrap();
        assert_eq!(ring.head(), 7);
        assert_eq!(ring.tail(), 7);

        // Crosses the end: 3 bytes at 7..10, 3 bytes at 0..3
        ring.write(&[1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(ring.head(), 3);
        assert_eq!(ring.used_len().unwrap(), 6);
        assert_eq!(ring.try_read().unwrap(), Some(vec![1, 2, 3, 4, 5, 6]));
        assert_eq!(ring.tail(), 3);
    }

    #[test]
    fn test_ring_write_exactly_to_end_wraps_head_to_zero() {
        let mut mem = region(8);
        let ring = RingBuffer::new(&mut mem);

        ring.write(&[9; 4]).unwrap();
        ring.try_read().unwrap();
        ring.write(&[7; 4]).unwrap();
        assert_eq!(ring.head(), 0);
        assert_eq!(ring.try_read().unwrap(), Some(vec![7; 4]));
    }

    #[test]
    fn test_ring_full_rejects_whole_write() {
        let mut mem = region(8);
        let ring = RingBuffer::new(&mut mem);

        ring.write(&[1; 7]).unwrap();
        assert_eq!(ring.free_len().unwrap(), 0);
        assert_eq!(
            ring.write(&[2]),
            Err(ChannelError::CapacityExceeded { requested: 1, free: 0 })
        );
        // Nothing was written
        assert_eq!(ring.head(), 7);
        assert_eq!(ring.try_read().unwrap(), Some(vec![1; 7]));
    }

    #[test]
    fn test_ring_capacity_minus_one_is_max_write() {
        let mut mem = region(8);
        let ring = RingBuffer::new(&mut mem);
        assert!(matches!(
            ring.write(&[0; 8]),
            Err(ChannelError::CapacityExceeded { requested: 8, free: 7 })
        ));
        ring.write(&[0; 7]).unwrap();
    }

    #[test]
    fn test_ring_empty_write_is_noop() {
        let mut mem = region(8);
        let ring = RingBuffer::new(&mut mem);
        ring.write(&[]).unwrap();
        assert_eq!(ring.try_read().unwrap(), None);
    }

    #[test]
    fn test_ring_corrupted_cursor_detected() {
        let mut mem = region(8);
        {
            let ring = RingBuffer::new(&mut mem);
            ring.store_cursor(HEAD_OFFSET, 8);
        }
        let ring = unsafe { RingBuffer::from_raw(NonNull::new(mem.as_mut_ptr()).unwrap(), 8) };
        assert!(matches!(
            ring.try_read(),
            Err(ChannelError::Corrupted { head: 8, tail: 0, capacity: 8 })
        ));
        assert!(ring.write(&[1]).is_err());
        assert!(ring.free_len().is_err());
    }

    #[test]
    fn test_ring_unaligned_cursors() {
        // capacity 5 puts head at offset 5
        let mut mem = region(5);
        let ring = RingBuffer::new(&mut mem);
        ring.write(&[1, 2, 3]).unwrap();
        assert_eq!(ring.head(), 3);
        assert_eq!(ring.try_read().unwrap(), Some(vec![1, 2, 3]));
        ring.write(&[4, 5, 6]).unwrap();
        assert_eq!(ring.head(), 1);
        assert_eq!(ring.try_read().unwrap(), Some(vec![4, 5, 6]));
    }

    #[test]
    fn test_ring_stats() {
        let mut mem = region(16);
        let ring = RingBuffer::new(&mut mem);
        ring.write(&[0; 5]).unwrap();
        let stats = ring.stats().unwrap();
        assert_eq!(stats.head, 5);
        assert_eq!(stats.tail, 0);
        assert_eq!(stats.capacity, 16);
        assert_eq!(stats.used, 5);
        assert_eq!(stats.free, 10);
    }

    #[test]
    fn test_length_formulas() {
        assert_eq!(used_len(0, 0, 10), 0);
        assert_eq!(free_len(0, 0, 10), 9);
        assert_eq!(used_len(2, 8, 10), 4);
        assert_eq!(free_len(2, 8, 10), 5);
        assert_eq!(used_len(7, 8, 10), 9);
        assert_eq!(free_len(7, 8, 10), 0);
    }
}
