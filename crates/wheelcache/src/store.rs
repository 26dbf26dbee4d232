//! Routes a key to a shard by hash and, when configured, owns the
//! [`TimingWheel`] lifetime that sweeps expired keys out of those shards.

use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;

use crate::config::CacheConfig;
use crate::error::Result;
use crate::hash::fnv1a32;
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::shard::Shard;
use crate::value::Value;
use crate::wheel::{self, now_nanos, ExpiryHandler, TimingWheel};

/// Owns every shard plus (optionally) the background wheel that drains
/// expired keys out of them.
pub(crate) struct ShardedStore {
    shards: Arc<Vec<Shard>>,
    mask: usize,
    wheel: Option<Arc<TimingWheel>>,
    stop_tx: Option<crossbeam_channel::Sender<()>>,
    tick_handle: Mutex<Option<JoinHandle<()>>>,
    metrics: Arc<Metrics>,
}

impl ShardedStore {
    pub(crate) fn new(config: &CacheConfig) -> Self {
        let shard_count = config.shard_count().max(1);
        let shards: Arc<Vec<Shard>> = Arc::new(
            (0..shard_count)
                .map(|_| Shard::with_capacity(config.shard_capacity))
                .collect(),
        );
        let mask = shard_count - 1;
        let metrics = Arc::new(Metrics::new());

        let wheel = config.gc_interval.map(|tick| {
            let handler = expiry_handler(Arc::clone(&shards), mask, Arc::clone(&metrics));
            TimingWheel::new(tick, now_nanos(), handler)
        });

        let (stop_tx, tick_handle) = match &wheel {
            Some(wheel) => {
                let (handle, tx) = wheel::spawn(Arc::clone(wheel));
                (Some(tx), Some(handle))
            }
            None => (None, None),
        };

        Self {
            shards,
            mask,
            wheel,
            stop_tx,
            tick_handle: Mutex::new(tick_handle),
            metrics,
        }
    }

    fn shard_index(&self, key: &[u8]) -> usize {
        shard_index_for(key, self.shards.len(), self.mask)
    }

    pub(crate) fn shard_for(&self, key: &[u8]) -> &Shard {
        &self.shards[self.shard_index(key)]
    }

    pub(crate) fn get(&self, key: &[u8]) -> Option<Value> {
        let value = self.shard_for(key).get(key, now_nanos());
        if value.is_some() {
            self.metrics.record_hit();
        } else {
            self.metrics.record_miss();
        }
        value
    }

    pub(crate) fn get_ignore_exp(&self, key: &[u8]) -> Option<(Value, i64)> {
        self.shard_for(key).get_ignore_exp(key)
    }

    pub(crate) fn set(&self, key: Vec<u8>, value: Value) {
        let idx = self.shard_index(&key);
        self.shards[idx].set(key, value, -1);
    }

    /// `exp_at` is the absolute nanosecond deadline. Also schedules the key
    /// into the wheel, if one is configured.
    pub(crate) fn set_ex(&self, key: Vec<u8>, value: Value, exp_at: i64) {
        let idx = self.shard_index(&key);
        self.shards[idx].set(key.clone(), value, exp_at);
        if let Some(wheel) = &self.wheel {
            wheel.add(key, exp_at);
        }
    }

    pub(crate) fn del(&self, key: &[u8]) -> bool {
        self.shard_for(key).del(key)
    }

    pub(crate) fn scan<F: FnMut(&[u8], &Value, i64)>(&self, mut handler: F) {
        let now = now_nanos();
        for shard in self.shards.iter() {
            shard.scan(now, &mut handler);
        }
    }

    pub(crate) fn load<F>(&self, key: &[u8], loader: F) -> (Result<Value>, bool)
    where
        F: FnOnce() -> Result<Value>,
    {
        let (result, shared) = self.shard_for(key).load(key, loader);
        self.metrics.record_load(shared);
        (result, shared)
    }

    pub(crate) fn shards(&self) -> &[Shard] {
        &self.shards
    }

    pub(crate) fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Stops the background tick thread, if one is running. In-flight
    /// `SingleFlight` calls are not cancelled.
    pub(crate) fn close(&self) {
        if let Some(stop_tx) = &self.stop_tx {
            let _ = stop_tx.send(());
        }
        if let Some(handle) = self.tick_handle.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ShardedStore {
    fn drop(&mut self) {
        self.close();
    }
}

fn shard_index_for(key: &[u8], shard_count: usize, mask: usize) -> usize {
    if shard_count == 1 {
        0
    } else {
        (fnv1a32(key) as usize) & mask
    }
}

/// Builds the wheel's expiry handler: groups the drained keys by shard index
/// (reusing a scratch buffer across ticks, since the handler only ever runs
/// serially on the wheel's tick thread) and batch-deletes each group.
fn expiry_handler(shards: Arc<Vec<Shard>>, mask: usize, metrics: Arc<Metrics>) -> Arc<ExpiryHandler> {
    let scratch: Mutex<Vec<Vec<Vec<u8>>>> = Mutex::new(vec![Vec::new(); shards.len()]);
    Arc::new(move |now, keys| {
        metrics.record_wheel_tick();
        let mut groups = scratch.lock();
        for key in keys {
            let idx = shard_index_for(key, shards.len(), mask);
            groups[idx].push(key.clone());
        }
        for (idx, group) in groups.iter_mut().enumerate() {
            if !group.is_empty() {
                let removed = shards[idx].del_before(now, group);
                metrics.record_expirations(removed as u64);
                group.clear();
            }
        }
    })
}
