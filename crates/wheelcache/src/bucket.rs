//! A wheel slot: a lock-free rotating [`Slice`] plus the drained slices
//! waiting to be scanned.

use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use crate::backoff::Backoff;
use crate::invariants::debug_assert_not_double_owned;
use crate::slice::{Slice, SlicePool};

/// One slot in a [`crate::wheel::TimingWheel`].
///
/// Keys scheduled to expire in this slot accumulate in `current` until it
/// fills, at which point the thread that fills it swaps in a fresh slice
/// from the shared pool and moves the full one into `full` for the next
/// scan to drain.
pub struct Bucket {
    pool: Arc<SlicePool>,
    current: ArcSwap<Slice>,
    full: Mutex<Vec<Arc<Slice>>>,
}

impl Bucket {
    #[must_use]
    pub fn new(pool: Arc<SlicePool>) -> Self {
        let initial = pool.get();
        Self {
            pool,
            current: ArcSwap::new(Arc::new(initial)),
            full: Mutex::new(Vec::new()),
        }
    }

    /// Appends `key`, transparently rotating `current` into `full` and
    /// pulling a fresh slice from the pool as many times as needed.
    ///
    /// Rejects empty keys outright: an empty string is indistinguishable
    /// from a cleared slot's sentinel, so it would silently vanish in
    /// `Slice::drain_into` instead of being scheduled.
    ///
    /// Concurrent callers racing to rotate the same full slice all retry
    /// against whichever slice wins the compare-and-swap; only the winner
    /// pays for a pool `Get`/`Put` round trip, losers simply retry their
    /// append against the new `current`.
    pub fn append(&self, key: Vec<u8>) {
        if key.is_empty() {
            return;
        }
        let mut key = key;
        let mut backoff = Backoff::new();
        loop {
            let old = self.current.load_full();
            key = match old.append(key) {
                Ok(()) => return,
                Err(key) => key,
            };

            let fresh = Arc::new(self.pool.get());
            let previous = self.current.compare_and_swap(&old, Arc::clone(&fresh));
            if Arc::ptr_eq(&old, &*previous) {
                debug_assert_not_double_owned!(Arc::as_ptr(&old), Arc::as_ptr(&fresh));
                self.full.lock().push(old);
                key = match fresh.append(key) {
                    Ok(()) => return,
                    // Astronomically unlikely: another thread filled `fresh`
                    // before we could. Loop around and rotate again.
                    Err(key) => key,
                };
            } else if let Ok(s) = Arc::try_unwrap(fresh) {
                // Lost the race; hand the unused slice back and retry.
                self.pool.put(s);
            }
            backoff.snooze();
        }
    }

    /// Swaps in a fresh `current` and returns every key the outgoing slice
    /// (plus any still sitting in `full` from a prior rotation) has
    /// accumulated. Called once per tick by the owning wheel, from the
    /// single ticker thread.
    ///
    /// The fresh slice is installed *before* the outgoing one is marked
    /// full, so there is never a window where `current` is absent: a
    /// concurrent `append` either lands in the outgoing slice just ahead of
    /// `mark_full` (and is still picked up below, since `drain_into` clamps
    /// to the slots actually reserved) or retries against the slice this
    /// call just installed.
    pub fn drain(&self) -> Vec<Vec<u8>> {
        let fresh = Arc::new(self.pool.get());
        let outgoing = self.current.swap(fresh);
        outgoing.mark_full();
        self.full.lock().push(outgoing);

        let mut out = Vec::new();
        for slice in self.full.lock().iter() {
            slice.drain_into(&mut out);
        }
        out
    }

    /// Returns every slice gathered by [`Bucket::drain`] to the pool.
    pub fn reset(&self) {
        let mut full = self.full.lock();
        for slice in full.drain(..) {
            if let Ok(s) = Arc::try_unwrap(slice) {
                self.pool.put(s);
            }
        }
    }
}
