//! End-to-end scenario tests covering the cache's concrete behaviors.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use wheelcache::{Cache, CacheError, Value};

/// Scenario 1: shard hint 2000 / shard capacity 600 resolves to 4 shards
/// (mask 3), and a plain `Set`/`Get` round-trips.
#[test]
fn scenario_1_basic_set_get() {
    let cache = Cache::with_gc(2000, 600, Some(Duration::from_secs(1)));
    cache.set("t1", 123_i64);
    assert_eq!(cache.get(b"t1"), Some(Value::I64(123)));
}

/// Scenario 2: with a 1ms tick, an entry set with a 5ms TTL is still present
/// after 1ms and gone after 6ms.
#[test]
fn scenario_2_expiration_at_tick() {
    let cache = Cache::with_gc(16, 4, Some(Duration::from_millis(1)));
    cache.set_ex("test", 123_i64, Duration::from_millis(5));

    thread::sleep(Duration::from_millis(1));
    assert_eq!(cache.get(b"test"), Some(Value::I64(123)));

    thread::sleep(Duration::from_millis(6));
    assert_eq!(cache.get(b"test"), None);
}

/// Scenario 3: with tick 1ms (interval 31ms), a 300ms TTL is routed through
/// the overflow wheel and still expires within `300ms + 8ms + 0.5ms` of
/// being set.
#[test]
fn scenario_3_overflow_wheel_scheduling() {
    let cache = Cache::with_gc(16, 4, Some(Duration::from_millis(1)));
    cache.set_ex("k", 1_i64, Duration::from_millis(300));

    assert_eq!(cache.get(b"k"), Some(Value::I64(1)));

    thread::sleep(Duration::from_millis(320));
    assert_eq!(cache.get(b"k"), None);
}

/// Scenario 4: 10 concurrent `Load` calls for the same key, where the loader
/// sleeps and returns 1 — exactly one returner actually executes the loader,
/// all ten see 1, and a subsequent `Get` agrees.
#[test]
fn scenario_4_singleflight_coalescing() {
    let cache = Arc::new(Cache::with_gc(16, 4, None));
    let calls = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            thread::spawn(move || {
                cache
                    .load(b"k", || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(10));
                        Ok(Value::Int(1))
                    })
                    .unwrap()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), Value::Int(1));
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.get(b"k"), Some(Value::Int(1)));
}

/// Scenario 5: every supported primitive type round-trips through
/// `Save`/`Load` into a fresh cache.
#[test]
fn scenario_5_snapshot_round_trip_with_mixed_types() {
    let src = Cache::with_gc(16, 4, None);

    src.set("bytes", Vec::from(&b"raw"[..]));
    src.set("string", "text".to_string());
    src.set("bool_true", true);
    src.set("bool_false", false);
    src.set("int", Value::Int(-7));
    src.set("uint", Value::UInt(7));
    src.set("i8", -1_i8);
    src.set("i16", -2_i16);
    src.set("i32", -3_i32);
    src.set("i64", -4_i64);
    src.set("u8", 1_u8);
    src.set("u16", 2_u16);
    src.set("u32", 3_u32);
    src.set("u64", 4_u64);
    src.set("f32", 1.5_f32);
    src.set("f64", -2.5_f64);

    let mut buf = Vec::new();
    src.save_base_type(&mut buf).unwrap();

    let dst = Cache::with_gc(16, 4, None);
    dst.load_base_type(buf.as_slice()).unwrap();

    let mut restored = Vec::new();
    dst.scan(|k, v| restored.push((k.to_vec(), v.clone())));
    assert_eq!(restored.len(), 16);

    assert_eq!(dst.get(b"bytes"), Some(Value::Bytes(b"raw".to_vec())));
    assert_eq!(dst.get(b"string"), Some(Value::Text("text".into())));
    assert_eq!(dst.get(b"bool_true"), Some(Value::Bool(true)));
    assert_eq!(dst.get(b"bool_false"), Some(Value::Bool(false)));
    assert_eq!(dst.get(b"int"), Some(Value::Int(-7)));
    assert_eq!(dst.get(b"uint"), Some(Value::UInt(7)));
    assert_eq!(dst.get(b"f32"), Some(Value::F32(1.5)));
    assert_eq!(dst.get(b"f64"), Some(Value::F64(-2.5)));
}

/// Scenario 6: an expired record is skipped on load, and its bytes are
/// consumed exactly — the next record header is still read correctly (here,
/// clean EOF, since the expired record is the last one written).
#[test]
fn scenario_6_expired_record_skipping_in_snapshot() {
    let src = Cache::with_gc(16, 4, None);
    src.set_ex("a", 1_i64, Duration::from_secs(10));
    src.set_ex("b", 2_i64, Duration::from_millis(1));

    thread::sleep(Duration::from_millis(20));

    let mut buf = Vec::new();
    // `b` has already expired by wall-clock time but may still be present in
    // the shard (no GC wheel running); `save_base_type` re-checks expiry
    // itself and skips it regardless.
    src.save_base_type(&mut buf).unwrap();

    let dst = Cache::with_gc(16, 4, None);
    dst.load_base_type(buf.as_slice()).unwrap();

    assert_eq!(dst.get(b"a"), Some(Value::I64(1)));
    assert_eq!(dst.get(b"b"), None);
}

#[test]
fn load_error_propagates_as_load_error_kind() {
    let cache = Cache::with_gc(16, 4, None);
    let result = cache.load(b"k", || {
        Err(CacheError::from_load_error(std::io::Error::other("boom")))
    });
    assert!(matches!(result, Err(CacheError::LoadError(_))));
}

#[test]
fn load_with_ex_write_through_is_visible_only_to_the_lone_returner() {
    let cache = Cache::with_gc(16, 4, None);
    let value = cache
        .load_with_ex(b"k", || Ok(Value::Text("loaded".into())), Duration::from_secs(60))
        .unwrap();
    assert_eq!(value, Value::Text("loaded".into()));
    assert_eq!(cache.get(b"k"), Some(Value::Text("loaded".into())));
}

#[test]
fn close_stops_the_gc_thread_without_panicking() {
    let cache = Cache::with_gc(16, 4, Some(Duration::from_millis(1)));
    cache.set_ex("k", 1_i64, Duration::from_millis(2));
    cache.close();
    // Closing twice (e.g. via Drop after an explicit close) must not panic.
    cache.close();
}
