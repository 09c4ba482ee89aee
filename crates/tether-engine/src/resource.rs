//! Foreign-owned resources
//!
//! A [`ForeignResource`] owns exactly one unit of a foreign reference count and
//! gives it back exactly once. Managed handles and proxy bridges are both built
//! on it; they differ only in their [`Dispose`] strategy.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tether_sdk::ForeignPtr;

use crate::error::{BridgeError, BridgeResult};

/// Unique identifier for a foreign resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceId(u64);

impl ResourceId {
    fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        ResourceId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// How a resource gives its reference back to the foreign runtime
pub trait Dispose: Send + Sync {
    /// Release the reference held on `ptr`.
    ///
    /// Called at most once per resource.
    fn dispose(&self, id: ResourceId, ptr: ForeignPtr) -> BridgeResult<()>;

    /// Run `step`, which zeroes the pointer and then calls [`Dispose::dispose`].
    ///
    /// Strategies whose teardown can race another owner (an interpreter
    /// closing, for example) hold that owner's lock across the whole step.
    fn guard(&self, step: &mut dyn FnMut() -> BridgeResult<bool>) -> BridgeResult<bool> {
        step()
    }
}

/// One foreign reference plus the strategy that releases it
pub struct ForeignResource {
    id: ResourceId,
    ptr: AtomicU64,
    disposer: Box<dyn Dispose>,
}

impl ForeignResource {
    /// Take ownership of the reference held on `ptr`.
    ///
    /// Fails with `Initialization` if `ptr` is null.
    pub fn new(ptr: ForeignPtr, disposer: impl Dispose + 'static) -> BridgeResult<Self> {
        if ptr.is_null() {
            return Err(BridgeError::initialization(
                "Unable to take ownership of a NULL foreign object.",
            ));
        }

        Ok(Self {
            id: ResourceId::next(),
            ptr: AtomicU64::new(ptr.as_raw()),
            disposer: Box::new(disposer),
        })
    }

    /// Identity of this resource
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// The owned pointer, or null once disposed
    pub fn ptr(&self) -> ForeignPtr {
        ForeignPtr::from_raw(self.ptr.load(Ordering::Acquire))
    }

    /// Check if the reference has been given back
    pub fn is_disposed(&self) -> bool {
        self.ptr.load(Ordering::Acquire) == 0
    }

    /// Zero the pointer and release the reference.
    ///
    /// Only the first caller observes a live pointer and runs the disposer;
    /// every later call returns `Ok(false)` without touching the runtime.
    pub fn dispose(&self) -> BridgeResult<bool> {
        self.disposer.guard(&mut || {
            let raw = self.ptr.swap(0, Ordering::AcqRel);
            if raw == 0 {
                return Ok(false);
            }
            self.disposer.dispose(self.id, ForeignPtr::from_raw(raw))?;
            Ok(true)
        })
    }
}

impl fmt::Debug for ForeignResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForeignResource")
            .field("id", &self.id)
            .field("ptr", &self.ptr())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    struct CountingDisposer(Arc<AtomicUsize>);

    impl Dispose for CountingDisposer {
        fn dispose(&self, _id: ResourceId, _ptr: ForeignPtr) -> BridgeResult<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_null_pointer_rejected() {
        let count = Arc::new(AtomicUsize::new(0));
        let err = ForeignResource::new(ForeignPtr::NULL, CountingDisposer(count.clone()))
            .unwrap_err();

        assert!(err.is_initialization());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_dispose_runs_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let resource =
            ForeignResource::new(ForeignPtr::from_raw(0x40), CountingDisposer(count.clone()))
                .unwrap();

        assert!(resource.dispose().unwrap());
        assert!(!resource.dispose().unwrap());
        assert!(resource.is_disposed());
        assert!(resource.ptr().is_null());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_dispose_runs_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let resource = Arc::new(
            ForeignResource::new(ForeignPtr::from_raw(0x80), CountingDisposer(count.clone()))
                .unwrap(),
        );

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let resource = resource.clone();
                std::thread::spawn(move || resource.dispose().unwrap())
            })
            .collect();
        let disposed = threads
            .into_iter()
            .map(|t| t.join().unwrap())
            .filter(|d| *d)
            .count();

        assert_eq!(disposed, 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_ids_are_unique() {
        let count = Arc::new(AtomicUsize::new(0));
        let a = ForeignResource::new(ForeignPtr::from_raw(1), CountingDisposer(count.clone()))
            .unwrap();
        let b = ForeignResource::new(ForeignPtr::from_raw(1), CountingDisposer(count)).unwrap();
        assert_ne!(a.id(), b.id());
    }

    struct GuardedDisposer {
        guarded: Arc<AtomicUsize>,
        inside: Arc<std::sync::atomic::AtomicBool>,
    }

    impl Dispose for GuardedDisposer {
        fn dispose(&self, _id: ResourceId, _ptr: ForeignPtr) -> BridgeResult<()> {
            assert!(self.inside.load(Ordering::SeqCst));
            Ok(())
        }

        fn guard(&self, step: &mut dyn FnMut() -> BridgeResult<bool>) -> BridgeResult<bool> {
            self.guarded.fetch_add(1, Ordering::SeqCst);
            self.inside.store(true, Ordering::SeqCst);
            let result = step();
            self.inside.store(false, Ordering::SeqCst);
            result
        }
    }

    #[test]
    fn test_guard_wraps_pointer_swap() {
        let guarded = Arc::new(AtomicUsize::new(0));
        let resource = ForeignResource::new(
            ForeignPtr::from_raw(0x100),
            GuardedDisposer {
                guarded: guarded.clone(),
                inside: Arc::new(std::sync::atomic::AtomicBool::new(false)),
            },
        )
        .unwrap();

        assert!(resource.dispose().unwrap());
        assert!(!resource.dispose().unwrap());
        assert_eq!(guarded.load(Ordering::SeqCst), 2);
    }
}
