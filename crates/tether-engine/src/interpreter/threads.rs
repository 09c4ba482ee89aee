//! Which host thread hosts which interpreter
//!
//! A host thread may host at most one live interpreter. The map is consulted
//! under one process-wide mutex when an interpreter is created or closed.

use std::thread::ThreadId;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use super::InterpreterId;
use crate::error::{BridgeError, BridgeResult};

static LIVE_INTERPRETERS: Lazy<Mutex<FxHashMap<ThreadId, InterpreterId>>> =
    Lazy::new(|| Mutex::new(FxHashMap::default()));

/// Record `id` as the live interpreter of `thread`.
///
/// Fails with `Concurrency` if the thread already hosts one.
pub(crate) fn claim(thread: ThreadId, id: InterpreterId) -> BridgeResult<()> {
    let mut live = LIVE_INTERPRETERS.lock();
    if let Some(existing) = live.get(&thread) {
        return Err(BridgeError::Concurrency(format!(
            "Thread {:?} already hosts live interpreter {}. Close it before creating another one.",
            thread,
            existing.as_u64()
        )));
    }
    live.insert(thread, id);
    Ok(())
}

/// Forget `id` as the live interpreter of `thread`.
///
/// No-op if the thread hosts a different interpreter.
pub(crate) fn release(thread: ThreadId, id: InterpreterId) {
    let mut live = LIVE_INTERPRETERS.lock();
    if live.get(&thread) == Some(&id) {
        live.remove(&thread);
    }
}

/// Live interpreter hosted by `thread`, if any
pub fn hosted_by(thread: ThreadId) -> Option<InterpreterId> {
    LIVE_INTERPRETERS.lock().get(&thread).copied()
}

/// Live interpreter hosted by the calling thread, if any
pub fn current() -> Option<InterpreterId> {
    hosted_by(std::thread::current().id())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_is_exclusive_per_thread() {
        std::thread::spawn(|| {
            let thread = std::thread::current().id();
            let first = InterpreterId::new();
            let second = InterpreterId::new();

            claim(thread, first).unwrap();
            assert_eq!(current(), Some(first));
            assert!(claim(thread, second).unwrap_err().is_concurrency());

            // Releasing someone else's claim leaves it in place
            release(thread, second);
            assert_eq!(current(), Some(first));

            release(thread, first);
            assert_eq!(current(), None);
            claim(thread, second).unwrap();
            release(thread, second);
        })
        .join()
        .unwrap();
    }
}
