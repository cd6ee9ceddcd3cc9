//! Debug assertion macros for ring buffer cursor invariants.
//!
//! Only active in debug builds (`#[cfg(debug_assertions)]`), so there is
//! zero overhead in release builds. Cursor values coming from shared memory
//! are validated with real checks in `ring.rs`; these macros guard the
//! values this process computes itself.

// =============================================================================
// Cursor range: 0 <= cursor < capacity
// =============================================================================

/// Assert that a cursor this process is about to publish lies inside the
/// data area.
///
/// Used in: `write()` before publishing head, `try_read()` before publishing tail
macro_rules! debug_assert_cursor_in_range {
    ($name:literal, $cursor:expr, $capacity:expr) => {
        debug_assert!(
            $cursor < $capacity,
            "{} cursor {} outside data area of {} bytes",
            $name,
            $cursor,
            $capacity
        )
    };
}

// =============================================================================
// Reserved byte: used + free == capacity - 1
// =============================================================================

/// Assert that the used and free lengths account for every byte but the
/// reserved one.
///
/// Used in: `write()` and `try_read()` after computing lengths
macro_rules! debug_assert_reserved_byte {
    ($used:expr, $free:expr, $capacity:expr) => {
        debug_assert!(
            $used + $free + 1 == $capacity,
            "length accounting broken: used {} + free {} + 1 != capacity {}",
            $used,
            $free,
            $capacity
        )
    };
}

// =============================================================================
// Full drain: a read consumes everything up to head
// =============================================================================

/// Assert that the number of bytes copied out equals the used length.
///
/// Used in: `try_read()` after the (possibly split) copy
macro_rules! debug_assert_full_drain {
    ($copied:expr, $used:expr) => {
        debug_assert!(
            $copied == $used,
            "partial read: copied {} of {} pending bytes",
            $copied,
            $used
        )
    };
}

pub(crate) use debug_assert_cursor_in_range;
pub(crate) use debug_assert_full_drain;
pub(crate) use debug_assert_reserved_byte;
