//! wheelcache — an in-process key→value cache with per-entry expiration,
//! concurrent loader coalescing, and a snapshot/restore facility for
//! primitive-typed values.
//!
//! Three subsystems carry the design weight:
//!
//! - a sharded hash-map store with per-shard read-write locking, lazy
//!   expiration on read, and a single-flight loader ([`shard`],
//!   [`singleflight`]);
//! - a hierarchical timing wheel that buffers expiration keys in lock-free
//!   per-slot buckets ([`wheel`], [`bucket`], [`slice`]);
//! - a binary snapshot format with length-prefixed, type-tagged records over
//!   a streaming compressor ([`snapshot`], [`value`]).
//!
//! # Example
//!
//! ```
//! use wheelcache::{Cache, Value};
//! use std::time::Duration;
//!
//! let cache = Cache::new(2000, 600);
//! cache.set("hello", "world");
//! assert_eq!(cache.get(b"hello"), Some(Value::Text("world".into())));
//!
//! cache.set_ex("transient", 42_i64, Duration::from_millis(50));
//! assert!(cache.get(b"transient").is_some());
//! ```

mod backoff;
mod bucket;
mod cache;
mod config;
mod error;
mod hash;
mod invariants;
mod metrics;
mod shard;
mod singleflight;
mod slice;
mod snapshot;
mod store;
mod value;
mod wheel;

pub use cache::Cache;
pub use config::{CacheConfig, HIGH_THROUGHPUT_CONFIG, LOW_LATENCY_CONFIG};
pub use error::{CacheError, CodecError, Result};
pub use hash::{fnv1a32, next_pow2, MAX_SHARDS};
pub use metrics::MetricsSnapshot;
pub use value::Value;
