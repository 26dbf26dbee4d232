//! Hierarchical timing wheel: schedules keys into [`Bucket`] slots and
//! delivers expired keys to a handler once per tick.

use std::sync::atomic::Ordering;
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crossbeam_channel::{select, Receiver};
use parking_lot::RwLock;

use crate::bucket::Bucket;
use crate::invariants::debug_assert_overflow_stable;
use crate::slice::SlicePool;

const SLOT_COUNT: usize = 1 << 5;
const OVERFLOW_TICK_MULTIPLE: i64 = 8;

/// Called once per tick with every key whose slot just fired, plus the
/// wall-clock time of that tick.
pub type ExpiryHandler = dyn Fn(i64, &[Vec<u8>]) + Send + Sync;

/// Current nanosecond wall-clock time since `UNIX_EPOCH`, the unit `expAt`
/// and every wheel timestamp is expressed in.
#[must_use]
pub fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the unix epoch")
        .as_nanos() as i64
}

struct WheelState {
    cur_time: i64,
    cur_slot: usize,
}

/// A single level of the wheel: `SLOT_COUNT` buckets spanning `tick *
/// SLOT_COUNT` of wall-clock time, with a lazily-created coarser overflow
/// level for deadlines beyond that span.
pub struct TimingWheel {
    tick_nanos: i64,
    interval_nanos: i64,
    slot_mask: usize,
    state: RwLock<WheelState>,
    slots: Vec<Bucket>,
    pool: Arc<SlicePool>,
    overflow: OnceLock<Arc<TimingWheel>>,
    handler: Arc<ExpiryHandler>,
}

impl TimingWheel {
    #[must_use]
    pub fn new(tick: Duration, now: i64, handler: Arc<ExpiryHandler>) -> Arc<Self> {
        Self::with_pool(tick, now, handler, Arc::new(SlicePool::default()))
    }

    fn with_pool(
        tick: Duration,
        now: i64,
        handler: Arc<ExpiryHandler>,
        pool: Arc<SlicePool>,
    ) -> Arc<Self> {
        let tick_nanos = i64::try_from(tick.as_nanos()).unwrap_or(i64::MAX);
        let slots = (0..SLOT_COUNT)
            .map(|_| Bucket::new(Arc::clone(&pool)))
            .collect();
        Arc::new(Self {
            tick_nanos,
            interval_nanos: (SLOT_COUNT as i64 - 1) * tick_nanos,
            slot_mask: SLOT_COUNT - 1,
            state: RwLock::new(WheelState {
                cur_time: now,
                cur_slot: 0,
            }),
            slots,
            pool,
            overflow: OnceLock::new(),
            handler,
        })
    }

    fn cur_time(&self) -> i64 {
        self.state.read().cur_time
    }

    /// Schedules `key` to expire at `exp_at` (nanoseconds since the unix
    /// epoch). Delays within this level's span land directly in a slot;
    /// longer ones are forwarded to a lazily-created overflow level ticking
    /// `OVERFLOW_TICK_MULTIPLE` times coarser.
    pub fn add(&self, key: Vec<u8>, exp_at: i64) {
        let state = self.state.read();
        let delay = exp_at - state.cur_time;
        if delay <= self.interval_nanos {
            let move_slot = if delay <= self.tick_nanos {
                1
            } else {
                let whole = delay / self.tick_nanos;
                whole + i64::from(delay % self.tick_nanos != 0)
            };
            let slot = (state.cur_slot + move_slot as usize) & self.slot_mask;
            self.slots[slot].append(key);
            return;
        }
        let base_now = state.cur_time;
        drop(state);

        let overflow = self.overflow.get_or_init(|| {
            Self::with_pool(
                Duration::from_nanos((self.tick_nanos * OVERFLOW_TICK_MULTIPLE) as u64),
                base_now,
                Arc::clone(&self.handler),
                Arc::clone(&self.pool),
            )
        });
        debug_assert_overflow_stable!(overflow, self.overflow.get().unwrap());
        overflow.add(key, exp_at);
    }

    /// Advances this wheel to `now`, scanning the slot it just rotated into
    /// and, if the overflow level has drifted far enough behind, advancing
    /// it too. The overflow level never cascades entries back down; it
    /// delivers them straight to `handler` at its own coarser resolution
    /// (the overflow level's coarser resolution makes this safe: it only
    /// ever needs to catch up, never to hand entries back down).
    pub fn advance_clock(&self, now: i64) {
        let cur_slot;
        let mut overflow_drift = None;
        {
            let mut state = self.state.write();
            state.cur_slot = (state.cur_slot + 1) & self.slot_mask;
            state.cur_time = now;
            cur_slot = state.cur_slot;
            if let Some(overflow) = self.overflow.get() {
                overflow_drift = Some(now - overflow.cur_time());
            }
        }

        if let (Some(overflow), Some(drift)) = (self.overflow.get(), overflow_drift) {
            let slack = self.tick_nanos / 2;
            let threshold = (OVERFLOW_TICK_MULTIPLE - 1) * self.tick_nanos + slack;
            if drift > threshold {
                overflow.advance_clock(now);
            }
        }

        self.scan(cur_slot, now);
    }

    fn scan(&self, slot: usize, now: i64) {
        let bucket = &self.slots[slot];
        let keys = bucket.drain();
        if !keys.is_empty() {
            (self.handler)(now, &keys);
        }
        bucket.reset();
    }

    /// Runs the tick loop on the calling thread until `stop` fires or is
    /// dropped. Intended to be spawned on a dedicated OS thread by the
    /// owning store.
    pub fn run(self: Arc<Self>, stop: Receiver<()>) {
        let ticker = crossbeam_channel::tick(Duration::from_nanos(self.tick_nanos.max(0) as u64));
        loop {
            select! {
                recv(stop) -> _ => return,
                recv(ticker) -> _ => {
                    self.advance_clock(now_nanos());
                }
            }
        }
    }
}

/// Spawns [`TimingWheel::run`] on a dedicated OS thread, returning a handle
/// plus the stop sender that requests its exit.
pub fn spawn(
    wheel: Arc<TimingWheel>,
) -> (thread::JoinHandle<()>, crossbeam_channel::Sender<()>) {
    let (stop_tx, stop_rx) = crossbeam_channel::bounded(0);
    let handle = thread::spawn(move || wheel.run(stop_rx));
    (handle, stop_tx)
}
