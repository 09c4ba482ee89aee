//! Cleanup worker that reclaims handles dropped without an explicit release
//!
//! Dropping a managed handle that was never released posts its resource to a
//! [`ReferenceQueue`]. The worker thread drains that queue and disposes each
//! resource; a resource that was released in the meantime is a no-op.
//!
//! This is a backstop. Releasing handles (or closing the interpreter) is the
//! primary path, and nothing here is guaranteed to run before process exit.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::error::{BridgeError, BridgeResult};
use crate::resource::ForeignResource;

/// How long the worker blocks on the queue before re-checking its stop flag
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// How long `stop` waits for the worker to acknowledge
pub const DEFAULT_STOP_WAIT: Duration = Duration::from_secs(5);

static GLOBAL_WORKER: Lazy<CleanupWorker> = Lazy::new(CleanupWorker::new);

/// Sending side of a cleanup worker's notification queue
#[derive(Debug, Clone)]
pub struct ReferenceQueue {
    sender: Sender<Arc<ForeignResource>>,
}

impl ReferenceQueue {
    /// Post a resource whose owner went away without releasing it.
    ///
    /// Never blocks. If the worker has been dropped the notification is
    /// discarded and the resource stays with its registry.
    pub fn post(&self, resource: Arc<ForeignResource>) {
        if resource.is_disposed() {
            return;
        }
        if self.sender.send(resource).is_err() {
            tracing::debug!("cleanup.queue_closed");
        }
    }

    /// Number of notifications not yet picked up
    pub fn pending(&self) -> usize {
        self.sender.len()
    }
}

struct RunningWorker {
    stop: Arc<AtomicBool>,
    done: Receiver<()>,
}

/// Background thread disposing resources posted to its queue
pub struct CleanupWorker {
    sender: Sender<Arc<ForeignResource>>,
    receiver: Receiver<Arc<ForeignResource>>,
    poll_interval: Duration,
    stop_wait: Duration,
    running: Mutex<Option<RunningWorker>>,
}

impl CleanupWorker {
    /// Create a stopped worker with the default timing
    pub fn new() -> Self {
        Self::with_timing(DEFAULT_POLL_INTERVAL, DEFAULT_STOP_WAIT)
    }

    /// Create a stopped worker with custom poll and stop bounds
    pub fn with_timing(poll_interval: Duration, stop_wait: Duration) -> Self {
        let (sender, receiver) = channel::unbounded();
        Self {
            sender,
            receiver,
            poll_interval,
            stop_wait,
            running: Mutex::new(None),
        }
    }

    /// The process-wide worker.
    ///
    /// Interpreters post to it unless configured otherwise. It does not run
    /// until someone calls [`CleanupWorker::start`].
    pub fn global() -> &'static CleanupWorker {
        &GLOBAL_WORKER
    }

    /// Queue handle for posting notifications
    pub fn reference_queue(&self) -> ReferenceQueue {
        ReferenceQueue {
            sender: self.sender.clone(),
        }
    }

    /// Start a fresh worker thread.
    ///
    /// A thread started earlier is told to stop; it exits after its current
    /// poll without being waited for.
    pub fn start(&self) -> BridgeResult<()> {
        let mut running = self.running.lock();
        if let Some(previous) = running.take() {
            previous.stop.store(true, Ordering::Release);
        }

        let stop = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = channel::bounded(1);
        let receiver = self.receiver.clone();
        let poll_interval = self.poll_interval;
        let thread_stop = stop.clone();

        thread::Builder::new()
            .name("tether-cleanup".to_string())
            .spawn(move || {
                Self::run_loop(receiver, thread_stop, poll_interval);
                let _ = done_tx.send(());
            })
            .map_err(|e| {
                BridgeError::initialization(format!("Failed to spawn cleanup worker: {}", e))
            })?;

        let poll_ms = poll_interval.as_millis() as u64;
        tracing::debug!(poll_ms, "cleanup.start");
        *running = Some(RunningWorker {
            stop,
            done: done_rx,
        });
        Ok(())
    }

    /// Ask the worker to stop and wait up to the stop bound for it to do so.
    ///
    /// Returns after the bound even if the worker is still busy.
    pub fn stop(&self) {
        let Some(worker) = self.running.lock().take() else {
            return;
        };
        worker.stop.store(true, Ordering::Release);

        match worker.done.recv_timeout(self.stop_wait) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => tracing::debug!("cleanup.stop"),
            Err(RecvTimeoutError::Timeout) => {
                let wait_ms = self.stop_wait.as_millis() as u64;
                tracing::warn!(wait_ms, "cleanup.stop_timeout");
            }
        }
    }

    /// Check if a worker thread is currently active
    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Number of notifications not yet picked up
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    fn run_loop(
        receiver: Receiver<Arc<ForeignResource>>,
        stop: Arc<AtomicBool>,
        poll_interval: Duration,
    ) {
        loop {
            if stop.load(Ordering::Acquire) {
                break;
            }

            match receiver.recv_timeout(poll_interval) {
                Ok(resource) => Self::dispose_quietly(&resource),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    /// Dispose one resource. Errors and panics stop here.
    fn dispose_quietly(resource: &ForeignResource) {
        let id = resource.id().as_u64();
        match panic::catch_unwind(AssertUnwindSafe(|| resource.dispose())) {
            Ok(Ok(true)) => tracing::trace!(resource = id, "cleanup.dispose"),
            Ok(Ok(false)) => {}
            Ok(Err(e)) => tracing::warn!(resource = id, error = %e, "cleanup.dispose_failed"),
            Err(_) => tracing::warn!(resource = id, "cleanup.dispose_panicked"),
        }
    }
}

impl Default for CleanupWorker {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CleanupWorker {
    fn drop(&mut self) {
        if let Some(worker) = self.running.get_mut().take() {
            worker.stop.store(true, Ordering::Release);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{Dispose, ResourceId};
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;
    use tether_sdk::ForeignPtr;

    struct Counting(Arc<AtomicUsize>);

    impl Dispose for Counting {
        fn dispose(&self, _id: ResourceId, _ptr: ForeignPtr) -> BridgeResult<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Failing;

    impl Dispose for Failing {
        fn dispose(&self, _id: ResourceId, _ptr: ForeignPtr) -> BridgeResult<()> {
            Err(BridgeError::Validity("gone".into()))
        }
    }

    struct Panicking;

    impl Dispose for Panicking {
        fn dispose(&self, _id: ResourceId, _ptr: ForeignPtr) -> BridgeResult<()> {
            panic!("disposer panicked")
        }
    }

    fn fast_worker() -> CleanupWorker {
        CleanupWorker::with_timing(Duration::from_millis(20), Duration::from_secs(1))
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    #[test]
    fn test_queued_before_start_is_drained() {
        let count = Arc::new(AtomicUsize::new(0));
        let worker = fast_worker();
        let queue = worker.reference_queue();
        let resource = Arc::new(
            ForeignResource::new(ForeignPtr::from_raw(0x10), Counting(count.clone())).unwrap(),
        );

        queue.post(resource.clone());
        assert_eq!(worker.pending(), 1);

        worker.start().unwrap();
        assert!(wait_for(|| resource.is_disposed()));
        worker.stop();

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!worker.is_running());
    }

    #[test]
    fn test_already_released_is_not_posted() {
        let count = Arc::new(AtomicUsize::new(0));
        let worker = fast_worker();
        let resource = Arc::new(
            ForeignResource::new(ForeignPtr::from_raw(0x10), Counting(count.clone())).unwrap(),
        );
        resource.dispose().unwrap();

        worker.reference_queue().post(resource);
        assert_eq!(worker.pending(), 0);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_errors_and_panics_are_swallowed() {
        let count = Arc::new(AtomicUsize::new(0));
        let worker = fast_worker();
        let queue = worker.reference_queue();
        worker.start().unwrap();

        queue.post(Arc::new(
            ForeignResource::new(ForeignPtr::from_raw(0x10), Failing).unwrap(),
        ));
        queue.post(Arc::new(
            ForeignResource::new(ForeignPtr::from_raw(0x20), Panicking).unwrap(),
        ));
        let last = Arc::new(
            ForeignResource::new(ForeignPtr::from_raw(0x30), Counting(count.clone())).unwrap(),
        );
        queue.post(last.clone());

        assert!(wait_for(|| last.is_disposed()));
        assert!(worker.is_running());
        worker.stop();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stop_returns_within_bound_when_idle() {
        let worker = CleanupWorker::new();
        worker.start().unwrap();

        let started = Instant::now();
        worker.stop();

        assert!(started.elapsed() <= DEFAULT_STOP_WAIT);
        assert!(!worker.is_running());
    }

    #[test]
    fn test_start_replaces_previous_thread() {
        let count = Arc::new(AtomicUsize::new(0));
        let worker = fast_worker();
        worker.start().unwrap();
        worker.start().unwrap();
        assert!(worker.is_running());

        let resource = Arc::new(
            ForeignResource::new(ForeignPtr::from_raw(0x10), Counting(count.clone())).unwrap(),
        );
        worker.reference_queue().post(resource.clone());
        assert!(wait_for(|| resource.is_disposed()));

        worker.stop();
        worker.stop();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
