//! Debug assertion macros for internal invariants that hold by construction
//! elsewhere in the crate.
//!
//! These are only active in debug builds (`#[cfg(debug_assertions)]`), so
//! there is zero overhead in release builds.

// =============================================================================
// Current/full disjointness
// =============================================================================

/// Assert that a Bucket's `current` slice, once rotated into `full`, is not
/// also still reachable as `current`.
///
/// Used in: `Bucket::append` after a successful CAS rotation.
macro_rules! debug_assert_not_double_owned {
    ($old_ptr:expr, $new_ptr:expr) => {
        debug_assert!(
            !std::ptr::eq($old_ptr, $new_ptr),
            "rotated slice reinstalled as its own successor"
        )
    };
}

// =============================================================================
// Overflow wheel created at most once
// =============================================================================

/// Assert that the overflow wheel pointer, once observed non-empty, never
/// changes identity on a later observation.
///
/// Used in: `TimingWheel::add` after `OnceLock::get_or_init`.
macro_rules! debug_assert_overflow_stable {
    ($first:expr, $second:expr) => {
        debug_assert!(
            std::sync::Arc::ptr_eq($first, $second),
            "overflow wheel identity changed across calls"
        )
    };
}

// =============================================================================
// Monotonic expiry updates
// =============================================================================

/// Assert that a delete-before-`threshold` is never applied to an entry
/// whose current `expAt` was renewed past that threshold.
///
/// An entry's `expAt` is monotonically updated only by `set`/`set_ex` on that
/// shard, so a lazy delete must re-check it under the write lock rather than
/// trusting a read-lock snapshot.
///
/// Used in: `Shard::delete_if_not_renewed`, right before removing the map
/// entry; called from `Shard::get` on an observed-expired read.
macro_rules! debug_assert_delete_not_past_renewal {
    ($current_exp_at:expr, $threshold:expr) => {
        debug_assert!(
            $current_exp_at <= $threshold,
            "deleting an entry renewed past the delete threshold"
        )
    };
}

pub(crate) use debug_assert_delete_not_past_renewal;
pub(crate) use debug_assert_not_double_owned;
pub(crate) use debug_assert_overflow_stable;
