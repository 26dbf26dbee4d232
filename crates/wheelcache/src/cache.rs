//! The public façade: thin dispatch glue over [`ShardedStore`], [`SingleFlight`]
//! and the snapshot codec.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::config::CacheConfig;
use crate::error::Result;
use crate::metrics::MetricsSnapshot;
use crate::snapshot;
use crate::store::ShardedStore;
use crate::value::Value;
use crate::wheel::now_nanos;

/// A sharded, TTL-aware in-process cache.
///
/// Cheap to clone: internally it is an `Arc` handle over the shard table and
/// (if configured) the background expiry wheel.
#[derive(Clone)]
pub struct Cache {
    store: Arc<ShardedStore>,
}

impl Cache {
    /// Creates a cache with `shard_hint` / `shard_capacity` sizing and the
    /// default 1-second GC tick.
    #[must_use]
    pub fn new(shard_hint: usize, shard_capacity: usize) -> Self {
        Self::with_config(CacheConfig::new(shard_hint, shard_capacity))
    }

    /// Creates a cache whose background sweep runs every `gc_interval`.
    /// Pass `None` to disable the sweep entirely — TTL'd entries then only
    /// expire lazily, on `Get`.
    #[must_use]
    pub fn with_gc(shard_hint: usize, shard_capacity: usize, gc_interval: Option<Duration>) -> Self {
        let mut config = CacheConfig::new(shard_hint, shard_capacity);
        config.gc_interval = gc_interval;
        Self::with_config(config)
    }

    /// Creates a cache from a fully specified [`CacheConfig`].
    #[must_use]
    pub fn with_config(config: CacheConfig) -> Self {
        Self {
            store: Arc::new(ShardedStore::new(&config)),
        }
    }

    /// Returns the cached value for `key`, or `None` if absent or expired.
    #[must_use]
    pub fn get(&self, key: &[u8]) -> Option<Value> {
        self.store.get(key)
    }

    /// Stores `value` under `key` with no expiration.
    ///
    /// Rejects an empty `key` outright rather than inserting it: an empty
    /// key fed to `set_ex` would be indistinguishable from a wheel bucket's
    /// cleared-slot sentinel, so both methods reject it up front for
    /// consistency rather than letting `Set` succeed and `SetEx` silently
    /// degrade.
    pub fn set(&self, key: impl Into<Vec<u8>>, value: impl Into<Value>) {
        let key = key.into();
        if key.is_empty() {
            return;
        }
        self.store.set(key, value.into());
    }

    /// Stores `value` under `key`, expiring after `ttl`.
    ///
    /// `ttl == Duration::ZERO` lands in the wheel's next slot rather than
    /// expiring synchronously; see `DESIGN.md` for the rationale. An empty
    /// `key` is rejected outright: see `Cache::set`.
    pub fn set_ex(&self, key: impl Into<Vec<u8>>, value: impl Into<Value>, ttl: Duration) {
        let key = key.into();
        if key.is_empty() {
            return;
        }
        let exp_at = now_nanos().saturating_add(ttl.as_nanos() as i64);
        self.store.set_ex(key, value.into(), exp_at);
    }

    /// Deletes `key`, returning whether it was present.
    pub fn del(&self, key: &[u8]) -> bool {
        self.store.del(key)
    }

    /// Returns the cached value for `key`, loading and caching it (with no
    /// expiration) on a miss. Concurrent misses for the same key share one
    /// `loader` execution.
    pub fn load<F>(&self, key: &[u8], loader: F) -> Result<Value>
    where
        F: FnOnce() -> Result<Value>,
    {
        self.load_with(key, loader, None)
    }

    /// Like [`Cache::load`], but the loaded value is cached with `ttl`.
    pub fn load_with_ex<F>(&self, key: &[u8], loader: F, ttl: Duration) -> Result<Value>
    where
        F: FnOnce() -> Result<Value>,
    {
        self.load_with(key, loader, Some(ttl))
    }

    fn load_with<F>(&self, key: &[u8], loader: F, ttl: Option<Duration>) -> Result<Value>
    where
        F: FnOnce() -> Result<Value>,
    {
        if let Some(value) = self.store.get(key) {
            return Ok(value);
        }
        let (result, shared) = self.store.load(key, loader);
        let value = result?;
        if !shared {
            self.write_through(key, value.clone(), ttl);
        }
        Ok(value)
    }

    /// Serves a stale value immediately if `key` is present but expired,
    /// kicking off a background refresh that only the first-to-finish caller
    /// writes through; behaves like [`Cache::load_with_ex`] if `key` is
    /// altogether absent.
    pub fn load_async_with_ex<F>(&self, key: &[u8], loader: F, ttl: Duration) -> Result<Value>
    where
        F: FnOnce() -> Result<Value> + Send + 'static,
    {
        match self.store.get_ignore_exp(key) {
            Some((value, exp_at)) if exp_at < 0 || exp_at > now_nanos() => Ok(value),
            Some((stale_value, _exp_at)) => {
                let store = Arc::clone(&self.store);
                let key_owned = key.to_vec();
                thread::spawn(move || {
                    let (result, shared) = store.load(&key_owned, loader);
                    if !shared {
                        if let Ok(value) = result {
                            let exp_at = now_nanos().saturating_add(ttl.as_nanos() as i64);
                            store.set_ex(key_owned, value, exp_at);
                        }
                    }
                });
                Ok(stale_value)
            }
            None => self.load_with(key, loader, Some(ttl)),
        }
    }

    fn write_through(&self, key: &[u8], value: Value, ttl: Option<Duration>) {
        match ttl {
            Some(ttl) => {
                let exp_at = now_nanos().saturating_add(ttl.as_nanos() as i64);
                self.store.set_ex(key.to_vec(), value, exp_at);
            }
            None => self.store.set(key.to_vec(), value),
        }
    }

    /// Iterates every unexpired entry. `handler` must not call back into the
    /// cache.
    pub fn scan<F: FnMut(&[u8], &Value)>(&self, mut handler: F) {
        self.store.scan(|k, v, _exp_at| handler(k, v));
    }

    /// Writes every unexpired, persistable-type entry to `writer`.
    pub fn save_base_type<W: std::io::Write>(&self, writer: W) -> Result<()> {
        snapshot::save_base_type(&self.store, writer)
    }

    /// Reads records written by [`Cache::save_base_type`] (or a matching
    /// stream) and inserts them into this cache.
    pub fn load_base_type<R: std::io::Read>(&self, reader: R) -> Result<()> {
        snapshot::load_base_type(&self.store, reader)
    }

    /// Convenience wrapper around [`Cache::save_base_type`] targeting a file,
    /// thin glue over the same `Write`-based codec.
    pub fn save_to_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path)?;
        self.save_base_type(BufWriter::new(file))
    }

    /// Convenience wrapper around [`Cache::load_base_type`] targeting a file.
    pub fn load_from_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::open(path)?;
        self.load_base_type(BufReader::new(file))
    }

    /// Snapshots the hit/miss/load/expiration counters.
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.store.metrics()
    }

    /// Stops the background GC tick thread, if one is running. In-flight
    /// `Load` calls are not cancelled.
    pub fn close(&self) {
        self.store.close();
    }

    /// Alias for [`Cache::close`], kept for callers migrating from the
    /// `StopCleanExpired` name.
    pub fn stop_clean_expired(&self) {
        self.close();
    }
}
