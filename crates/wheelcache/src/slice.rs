//! Fixed-capacity, lock-free append buffer for keys sharing a wheel slot,
//! and the pool that recycles them.
//!
//! # Synchronization strategy
//!
//! `Slice::append` reserves a unique write index via `fetch_add` on `idx`
//! before touching the backing storage. Because the fetch-add is atomic,
//! two concurrent callers never receive the same index, so the subsequent
//! write into `keys[pos]` never races with another writer. The storage
//! itself lives behind an `UnsafeCell` rather than a `Mutex` because no
//! locking is needed to preserve that exclusivity — only the reservation
//! needs to be atomic, not the write. Readers (`drain_into`) only run once
//! the slice has been rotated out of a `Bucket`'s `current` slot, at which
//! point every future `append` against it fails before touching storage.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicI32, Ordering};

use parking_lot::Mutex;

use crossbeam_utils::CachePadded;

/// Default number of slices an idle [`SlicePool`] retains.
pub const DEFAULT_POOL_CAPACITY: usize = 100;
/// Default per-slice key capacity.
pub const DEFAULT_SLICE_CAPACITY: usize = 100;

/// An append-only, fixed-capacity buffer of keys.
pub struct Slice {
    // Every `append` call across every producer thread hits this fetch-add;
    // padded to its own cache line so it doesn't bounce against `cap` or the
    // `keys` pointer on a shared line.
    idx: CachePadded<AtomicI32>,
    cap: i32,
    keys: UnsafeCell<Box<[Vec<u8>]>>,
}

// SAFETY: `append`'s fetch_add gives every successful call a distinct index
// into `keys`, so concurrent writers never alias. `drain_into`/`reset` only
// run once the slice is no longer reachable from `Bucket::current`, at
// which point every `append` against it fails before touching storage.
unsafe impl Send for Slice {}
unsafe impl Sync for Slice {}

impl Slice {
    #[must_use]
    pub fn new(cap: usize) -> Self {
        Self {
            idx: CachePadded::new(AtomicI32::new(0)),
            cap: cap as i32,
            keys: UnsafeCell::new(vec![Vec::new(); cap].into_boxed_slice()),
        }
    }

    /// Attempts to append `key`, handing it back once the slice is full (or
    /// has been marked full via [`Slice::mark_full`]), so the caller can
    /// rotate the bucket's current slice and retry without re-allocating.
    pub fn append(&self, key: Vec<u8>) -> Result<(), Vec<u8>> {
        let pos = self.idx.fetch_add(1, Ordering::AcqRel) + 1;
        if pos < 1 || pos > self.cap {
            return Err(key);
        }
        // SAFETY: `pos - 1` was reserved exclusively by this call.
        unsafe {
            (*self.keys.get())[(pos - 1) as usize] = key;
        }
        Ok(())
    }

    /// Pushes `idx` past `cap`, so every future `append` observes the slice
    /// as full without touching storage. Used when a bucket is drained
    /// mid-tick and must stop accepting new keys.
    pub fn mark_full(&self) {
        self.idx.fetch_add(self.cap + 1, Ordering::AcqRel);
    }

    /// Moves every key this slice holds into `out`, leaving the slice ready
    /// for [`Slice::reset`] and reuse.
    ///
    /// Callable through a shared reference: by the time a slice reaches
    /// here it has already been rotated out of `Bucket::current`, so
    /// `append` can no longer succeed against it (the reserved index is
    /// always past `cap`) and no concurrent writer can alias the slots this
    /// reads.
    pub fn drain_into(&self, out: &mut Vec<Vec<u8>>) {
        let filled = self.idx.load(Ordering::Acquire).clamp(0, self.cap) as usize;
        // SAFETY: no `append` call can succeed against this slice anymore
        // (see doc comment), so these slots have no concurrent writer.
        let keys = unsafe { &mut *self.keys.get() };
        for slot in &mut keys[..filled] {
            if !slot.is_empty() {
                out.push(std::mem::take(slot));
            }
        }
    }

    /// Clears the write cursor so the slice can be handed back to a pool.
    /// Same exclusivity argument as [`Slice::drain_into`] applies.
    pub fn reset(&self) {
        self.idx.store(0, Ordering::Release);
    }

    #[cfg(test)]
    fn len(&self) -> i32 {
        self.idx.load(Ordering::Acquire)
    }
}

/// A capped LIFO pool of [`Slice`]s, avoiding an allocation on every bucket
/// rotation under steady-state load.
pub struct SlicePool {
    pool: Mutex<Vec<Slice>>,
    cap: usize,
    slice_cap: usize,
}

impl SlicePool {
    #[must_use]
    pub fn new(pool_cap: usize, slice_cap: usize) -> Self {
        Self {
            pool: Mutex::new(Vec::with_capacity(pool_cap)),
            cap: pool_cap,
            slice_cap,
        }
    }

    /// Takes an idle slice if one is available, otherwise allocates a new one.
    pub fn get(&self) -> Slice {
        let mut pool = self.pool.lock();
        pool.pop().unwrap_or_else(|| Slice::new(self.slice_cap))
    }

    /// Returns a drained slice to the pool, dropping it if the pool is at
    /// capacity.
    pub fn put(&self, slice: Slice) {
        let mut pool = self.pool.lock();
        if pool.len() == self.cap {
            return;
        }
        slice.reset();
        pool.push(slice);
    }
}

impl Default for SlicePool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_CAPACITY, DEFAULT_SLICE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn append_under_concurrent_producers_is_exact() {
        let cap = 10;
        let slice = Arc::new(Slice::new(cap));

        thread::scope(|scope| {
            for i in 0..cap {
                let slice = Arc::clone(&slice);
                scope.spawn(move || {
                    assert!(slice.append(i.to_string().into_bytes()).is_ok());
                });
            }
        });

        assert_eq!(slice.len(), cap as i32);

        // Further appends observe the slice as full and hand the key back.
        thread::scope(|scope| {
            for i in cap..cap + 3 {
                let slice = Arc::clone(&slice);
                scope.spawn(move || {
                    let key = i.to_string().into_bytes();
                    assert_eq!(slice.append(key.clone()), Err(key));
                });
            }
        });

        let mut out = Vec::new();
        slice.drain_into(&mut out);

        let seen: std::collections::HashSet<_> = out
            .into_iter()
            .map(|k| String::from_utf8(k).unwrap())
            .collect();
        for i in 0..cap {
            assert!(seen.contains(&i.to_string()));
        }
    }

    #[test]
    fn mark_full_rejects_further_appends() {
        let slice = Slice::new(4);
        assert!(slice.append(b"a".to_vec()).is_ok());
        slice.mark_full();
        assert_eq!(slice.append(b"b".to_vec()), Err(b"b".to_vec()));
    }

    #[test]
    fn reset_allows_reuse() {
        let slice = Slice::new(2);
        assert!(slice.append(b"a".to_vec()).is_ok());
        assert!(slice.append(b"b".to_vec()).is_ok());
        assert_eq!(slice.append(b"c".to_vec()), Err(b"c".to_vec()));

        let mut out = Vec::new();
        slice.drain_into(&mut out);
        assert_eq!(out.len(), 2);
        slice.reset();

        assert!(slice.append(b"c".to_vec()).is_ok());
    }

    #[test]
    fn pool_recycles_up_to_capacity() {
        let pool = SlicePool::new(2, 5);
        let a = pool.get();
        let b = pool.get();
        let c = pool.get();
        pool.put(a);
        pool.put(b);
        pool.put(c); // dropped, pool already at capacity

        assert_eq!(pool.pool.lock().len(), 2);
    }
}
