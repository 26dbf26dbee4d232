//! Per-shard loader coalescer: concurrent misses for the same key share one
//! `loader` execution.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::error::{CacheError, Result};
use crate::value::Value;

enum CallState {
    Pending,
    Done(Result<Value>),
}

struct Call {
    state: Mutex<CallState>,
    done: Condvar,
}

/// Coalesces concurrent `loader` calls for the same key into one execution,
/// broadcasting the result to every waiter.
pub(crate) struct SingleFlight {
    inflight: Mutex<HashMap<Vec<u8>, Arc<Call>>>,
}

impl SingleFlight {
    pub(crate) fn new() -> Self {
        Self {
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Runs `loader` for `key` if no call for it is already in flight;
    /// otherwise waits for the in-flight call and returns its result.
    ///
    /// Returns `(result, shared)`, where `shared == true` means the caller
    /// did not execute `loader` itself — the only-first-returner write-through
    /// rule keys off this flag.
    pub(crate) fn do_call<F>(&self, key: &[u8], loader: F) -> (Result<Value>, bool)
    where
        F: FnOnce() -> Result<Value>,
    {
        let mut inflight = self.inflight.lock();
        if let Some(call) = inflight.get(key).cloned() {
            drop(inflight);
            let mut state = call.state.lock();
            loop {
                match &*state {
                    CallState::Done(result) => return (result.clone(), true),
                    CallState::Pending => call.done.wait(&mut state),
                }
            }
        }

        let call = Arc::new(Call {
            state: Mutex::new(CallState::Pending),
            done: Condvar::new(),
        });
        inflight.insert(key.to_vec(), Arc::clone(&call));
        drop(inflight);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(loader))
            .unwrap_or_else(|payload| Err(CacheError::LoadFault {
                context: panic_message(&payload),
            }));

        {
            let mut state = call.state.lock();
            *state = CallState::Done(result.clone());
        }
        call.done.notify_all();

        self.inflight.lock().remove(key);

        (result, false)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "loader panicked with a non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn single_caller_executes_and_is_not_shared() {
        let group = SingleFlight::new();
        let (result, shared) = group.do_call(b"k", || Ok(Value::Int(42)));
        assert_eq!(result.unwrap(), Value::Int(42));
        assert!(!shared);
    }

    #[test]
    fn concurrent_callers_coalesce_into_one_loader_execution() {
        let group = Arc::new(SingleFlight::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let shared_count = Arc::new(AtomicUsize::new(0));

        thread::scope(|scope| {
            for _ in 0..10 {
                let group = Arc::clone(&group);
                let calls = Arc::clone(&calls);
                let shared_count = Arc::clone(&shared_count);
                scope.spawn(move || {
                    let (result, shared) = group.do_call(b"k", || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(10));
                        Ok(Value::Int(1))
                    });
                    assert_eq!(result.unwrap(), Value::Int(1));
                    if !shared {
                        shared_count.fetch_add(1, Ordering::SeqCst);
                    }
                });
            }
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(shared_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn loader_error_propagates_to_every_waiter() {
        let group = Arc::new(SingleFlight::new());
        let results: Arc<Mutex<Vec<bool>>> = Arc::new(Mutex::new(Vec::new()));

        thread::scope(|scope| {
            for _ in 0..5 {
                let group = Arc::clone(&group);
                let results = Arc::clone(&results);
                scope.spawn(move || {
                    let (result, _shared) = group.do_call(b"k", || {
                        thread::sleep(Duration::from_millis(5));
                        Err(CacheError::from_load_error(std::io::Error::other("boom")))
                    });
                    results.lock().push(result.is_err());
                });
            }
        });

        assert!(results.lock().iter().all(|&is_err| is_err));
    }

    #[test]
    fn panicking_loader_becomes_a_load_fault() {
        let group = SingleFlight::new();
        let (result, _shared) = group.do_call(b"k", || panic!("kaboom"));
        assert!(matches!(result, Err(CacheError::LoadFault { .. })));
    }

    #[test]
    fn a_key_is_free_again_once_its_call_completes() {
        let group = SingleFlight::new();
        let _ = group.do_call(b"k", || Ok(Value::Int(1)));
        assert!(group.inflight.lock().is_empty());
    }
}
