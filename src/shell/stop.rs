//! Cooperative stop signal and cancellable waits.
//!
//! The scheduler checks the signal at item boundaries; the process runner
//! checks it while waiting on a child so a hung server cannot block
//! shutdown. Every fixed delay in the pipeline goes through
//! [`StopSignal::wait`], which returns early once a stop is requested.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Upper bound on how long a wait sleeps before re-checking the flag.
///
/// Signal handlers can only flip the atomic, they cannot notify the
/// condvar, so waits wake up at least this often.
const WAKE_SLICE: Duration = Duration::from_millis(100);

#[derive(Default)]
struct StopInner {
    flag: Arc<AtomicBool>,
    lock: Mutex<()>,
    cvar: Condvar,
}

/// A shareable, cloneable stop request.
#[derive(Clone, Default)]
pub struct StopSignal {
    inner: Arc<StopInner>,
}

impl StopSignal {
    /// Create a signal that has not been triggered.
    pub fn new() -> Self {
        Self::default()
    }

    /// The raw flag, for registering with OS signal handlers.
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.inner.flag)
    }

    /// Request a stop and wake every waiter.
    pub fn stop(&self) {
        self.inner.flag.store(true, Ordering::SeqCst);
        let _guard = self.inner.lock.lock();
        self.inner.cvar.notify_all();
    }

    /// Whether a stop has been requested.
    pub fn is_stopped(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    /// Sleep for `duration` unless a stop is requested first.
    ///
    /// Returns `true` when the full duration elapsed, `false` when the wait
    /// was cut short by a stop request.
    pub fn wait(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_stopped() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            let slice = (deadline - now).min(WAKE_SLICE);
            let guard = match self.inner.lock.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let _ = self.inner.cvar.wait_timeout(guard, slice);
        }
    }
}

impl fmt::Debug for StopSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StopSignal")
            .field("stopped", &self.is_stopped())
            .finish()
    }
}
