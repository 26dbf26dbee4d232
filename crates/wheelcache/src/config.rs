//! Cache configuration: a plain struct with a constructor and two named presets.

use std::time::Duration;

use crate::hash::next_pow2;
use crate::slice::{DEFAULT_POOL_CAPACITY, DEFAULT_SLICE_CAPACITY};

/// Configuration for a [`crate::store::ShardedStore`] / [`crate::cache::Cache`].
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Rough total capacity hint; divided by `shard_capacity` and rounded up
    /// to a power of two to produce the shard count.
    pub shard_hint: usize,
    /// Target capacity of a single shard, used only to derive the shard count.
    pub shard_capacity: usize,
    /// `Some(interval)` runs a dedicated tick thread advancing the
    /// [`crate::wheel::TimingWheel`] by `interval` each cycle — `interval` is
    /// both the thread's sweep cadence and the wheel's slot resolution.
    /// `None` disables the wheel entirely (entries with a TTL still expire
    /// lazily on `Get`, just without the background sweep).
    pub gc_interval: Option<Duration>,
    /// Capacity of the [`crate::slice::SlicePool`] shared by every wheel slot.
    pub slice_pool_capacity: usize,
    /// Capacity of each pooled [`crate::slice::Slice`].
    pub slice_capacity: usize,
}

impl CacheConfig {
    /// Creates a configuration with the given shard sizing, defaulting every
    /// other field.
    ///
    /// # Panics
    ///
    /// Panics if `shard_capacity` is zero — the shard count calculation
    /// would divide by zero.
    #[must_use]
    pub fn new(shard_hint: usize, shard_capacity: usize) -> Self {
        assert!(shard_capacity > 0, "shard_capacity must be greater than 0");
        Self {
            shard_hint,
            shard_capacity,
            ..Self::default()
        }
    }

    /// Number of shards this configuration resolves to: `next_pow2(ceil(shard_hint
    /// / shard_capacity))`, clamped to `MAX_SHARDS`.
    #[must_use]
    pub fn shard_count(&self) -> usize {
        let capacity = self.shard_capacity.max(1) as u32;
        let needed = (self.shard_hint as u32).div_ceil(capacity);
        next_pow2(needed) as usize
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            shard_hint: 2000,
            shard_capacity: 600,
            gc_interval: Some(Duration::from_secs(1)),
            slice_pool_capacity: DEFAULT_POOL_CAPACITY,
            slice_capacity: DEFAULT_SLICE_CAPACITY,
        }
    }
}

/// Sub-millisecond tick for latency-sensitive expirations, at the cost of a
/// busier tick thread.
pub const LOW_LATENCY_CONFIG: CacheConfig = CacheConfig {
    shard_hint: 2000,
    shard_capacity: 600,
    gc_interval: Some(Duration::from_millis(1)),
    slice_pool_capacity: DEFAULT_POOL_CAPACITY,
    slice_capacity: DEFAULT_SLICE_CAPACITY,
};

/// Larger shard count and a coarser tick, for workloads dominated by hot-path
/// `Get`/`Set` rather than tight expiration deadlines.
pub const HIGH_THROUGHPUT_CONFIG: CacheConfig = CacheConfig {
    shard_hint: 20_000,
    shard_capacity: 600,
    gc_interval: Some(Duration::from_secs(1)),
    slice_pool_capacity: DEFAULT_POOL_CAPACITY,
    slice_capacity: DEFAULT_SLICE_CAPACITY,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.shard_hint, 2000);
        assert_eq!(config.shard_capacity, 600);
        assert_eq!(config.gc_interval, Some(Duration::from_secs(1)));
        assert_eq!(config.slice_pool_capacity, 100);
        assert_eq!(config.slice_capacity, 100);
    }

    #[test]
    fn shard_count_matches_basic_set_get_scenario() {
        // shard hint 2000 / capacity 600 => mask 3.
        let config = CacheConfig::new(2000, 600);
        assert_eq!(config.shard_count(), 4);
    }

    #[test]
    fn shard_count_clamps_to_max_shards() {
        let config = CacheConfig::new(10_000_000, 1);
        assert_eq!(config.shard_count(), 1024);
    }

    #[test]
    #[should_panic(expected = "shard_capacity must be greater than 0")]
    fn zero_shard_capacity_panics() {
        CacheConfig::new(100, 0);
    }

    #[test]
    fn named_presets_differ_in_gc_interval() {
        assert!(LOW_LATENCY_CONFIG.gc_interval < HIGH_THROUGHPUT_CONFIG.gc_interval);
    }
}
