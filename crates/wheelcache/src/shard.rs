//! One independently-locked partition of the key space.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::invariants::debug_assert_delete_not_past_renewal;
use crate::singleflight::SingleFlight;
use crate::value::Value;

/// A cached entry. `exp_at < 0` means "no expiration"; otherwise it is a
/// nanosecond absolute timestamp.
#[derive(Clone)]
struct Entry {
    value: Value,
    exp_at: i64,
}

/// One shard: a key→[`Entry`] map guarded by a reader-writer lock, plus the
/// [`SingleFlight`] group coalescing concurrent loader calls for this shard's
/// keys.
pub(crate) struct Shard {
    map: RwLock<HashMap<Vec<u8>, Entry>>,
    group: SingleFlight,
}

impl Shard {
    pub(crate) fn new() -> Self {
        Self {
            map: RwLock::new(HashMap::new()),
            group: SingleFlight::new(),
        }
    }

    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            map: RwLock::new(HashMap::with_capacity(capacity)),
            group: SingleFlight::new(),
        }
    }

    /// Reads under a read lock; if the entry is expired, re-acquires under a
    /// write lock and deletes it — but only if it has not been renewed past
    /// the `exp_at` this call observed.
    pub(crate) fn get(&self, key: &[u8], now: i64) -> Option<Value> {
        let observed_exp_at = {
            let map = self.map.read();
            match map.get(key) {
                None => return None,
                Some(entry) => {
                    if entry.exp_at < 0 || entry.exp_at > now {
                        return Some(entry.value.clone());
                    }
                    entry.exp_at
                }
            }
        };
        self.delete_if_not_renewed(key, observed_exp_at);
        None
    }

    /// Reads under a read lock only, returning the value and its `exp_at`
    /// regardless of expiry. Used by `LoadAsyncWithEx` to serve a stale value
    /// while a refresh runs in the background.
    pub(crate) fn get_ignore_exp(&self, key: &[u8]) -> Option<(Value, i64)> {
        let map = self.map.read();
        map.get(key).map(|e| (e.value.clone(), e.exp_at))
    }

    pub(crate) fn set(&self, key: Vec<u8>, value: Value, exp_at: i64) {
        let mut map = self.map.write();
        map.insert(key, Entry { value, exp_at });
    }

    pub(crate) fn del(&self, key: &[u8]) -> bool {
        self.map.write().remove(key).is_some()
    }

    /// Batch delete used by the wheel's expiry handler: removes every key in
    /// `keys` whose current `exp_at` is still due by `now`, and returns how
    /// many were actually removed. A key renewed past `now` by a concurrent
    /// `Set`/`SetEx` since it was scheduled is left untouched; a key that no
    /// longer maps to a present entry is a no-op (idempotent).
    pub(crate) fn del_before(&self, now: i64, keys: &[Vec<u8>]) -> usize {
        let mut map = self.map.write();
        let mut removed = 0;
        for key in keys {
            if let Some(entry) = map.get(key) {
                if entry.exp_at >= 0 && entry.exp_at <= now {
                    map.remove(key);
                    removed += 1;
                }
            }
        }
        removed
    }

    fn delete_if_not_renewed(&self, key: &[u8], observed_exp_at: i64) {
        let mut map = self.map.write();
        if let Some(entry) = map.get(key) {
            if entry.exp_at <= observed_exp_at {
                debug_assert_delete_not_past_renewal!(entry.exp_at, observed_exp_at);
                map.remove(key);
            }
        }
    }

    /// Iterates every unexpired entry under a single read lock. `handler`
    /// must not call back into this shard.
    pub(crate) fn scan<F: FnMut(&[u8], &Value, i64)>(&self, now: i64, mut handler: F) {
        let map = self.map.read();
        for (key, entry) in map.iter() {
            if entry.exp_at < 0 || entry.exp_at > now {
                handler(key, &entry.value, entry.exp_at);
            }
        }
    }

    /// Delegates to this shard's [`SingleFlight`] group so concurrent misses
    /// for the same key share one `loader` execution.
    pub(crate) fn load<F>(&self, key: &[u8], loader: F) -> (crate::error::Result<Value>, bool)
    where
        F: FnOnce() -> crate::error::Result<Value>,
    {
        self.group.do_call(key, loader)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.map.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_returns_value() {
        let shard = Shard::new();
        shard.set(b"k".to_vec(), Value::Int(1), -1);
        assert_eq!(shard.get(b"k", 100), Some(Value::Int(1)));
    }

    #[test]
    fn get_past_expiry_deletes_lazily() {
        let shard = Shard::new();
        shard.set(b"k".to_vec(), Value::Int(1), 50);
        assert_eq!(shard.get(b"k", 100), None);
        assert_eq!(shard.len(), 0);
    }

    #[test]
    fn get_does_not_delete_an_entry_renewed_after_observation() {
        let shard = Shard::new();
        shard.set(b"k".to_vec(), Value::Int(1), 50);

        // Simulate a racing renewal landing between the read-lock observation
        // and the write-lock delete by renewing directly before the delete.
        shard.set(b"k".to_vec(), Value::Int(2), 1_000);
        shard.delete_if_not_renewed(b"k", 50);

        assert_eq!(shard.get(b"k", 100), Some(Value::Int(2)));
    }

    #[test]
    fn del_before_only_removes_due_unrenewed_keys() {
        let shard = Shard::new();
        shard.set(b"a".to_vec(), Value::Int(1), 50);
        shard.set(b"b".to_vec(), Value::Int(2), 1_000); // renewed past `now`
        shard.set(b"c".to_vec(), Value::Int(3), -1); // never expires

        let removed = shard.del_before(100, &[b"a".to_vec(), b"b".to_vec(), b"c".to_vec(), b"missing".to_vec()]);
        assert_eq!(removed, 1);
        assert_eq!(shard.get(b"a", 100), None);
        assert_eq!(shard.get(b"b", 100), Some(Value::Int(2)));
        assert_eq!(shard.get(b"c", 100), Some(Value::Int(3)));
    }

    #[test]
    fn get_ignore_exp_returns_expired_entries() {
        let shard = Shard::new();
        shard.set(b"k".to_vec(), Value::Int(1), 50);
        assert_eq!(shard.get_ignore_exp(b"k"), Some((Value::Int(1), 50)));
    }

    #[test]
    fn scan_skips_expired_entries() {
        let shard = Shard::new();
        shard.set(b"live".to_vec(), Value::Int(1), -1);
        shard.set(b"dead".to_vec(), Value::Int(2), 50);

        let mut seen = Vec::new();
        shard.scan(100, |k, v, _| seen.push((k.to_vec(), v.clone())));
        assert_eq!(seen, vec![(b"live".to_vec(), Value::Int(1))]);
    }

    #[test]
    fn del_removes_present_key_and_is_idempotent() {
        let shard = Shard::new();
        shard.set(b"k".to_vec(), Value::Int(1), -1);
        assert!(shard.del(b"k"));
        assert!(!shard.del(b"k"));
    }
}
