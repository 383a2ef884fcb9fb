//! Retry coordinator for acknowledged deliveries.
//!
//! Per retry key the coordinator is a small state machine:
//!
//! ```text
//! Idle --start--> Pending --acknowledge--> Idle
//!                    |
//!                    +--timeout / fail--> Idle, then run continuation
//! ```
//!
//! # Invariants
//! - At most one live timer per key; `start` on a pending key cancels the
//!   old timer and drops its continuation
//! - Acknowledgment and expiry race on the entry map; whichever removes the
//!   entry first wins and the other becomes a no-op
//! - The map lock is never held while a continuation runs

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::types::RetryKey;

/// Work to run when a pending delivery times out or fails.
pub type RetryContinuation = Box<dyn FnOnce() + Send + 'static>;

/// A pending delivery.
struct PendingRetry {
    /// Distinguishes this entry from a later one under the same key
    generation: u64,

    /// Expiry timer task
    timer: JoinHandle<()>,

    /// Runs on timeout or failure
    on_timeout: RetryContinuation,
}

/// Counters describing coordinator activity.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RetryStats {
    pub started: u64,
    pub acknowledged: u64,
    pub timed_out: u64,
    pub failed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    started: AtomicU64,
    acknowledged: AtomicU64,
    timed_out: AtomicU64,
    failed: AtomicU64,
}

/// Tracks one expiry timer per (target, value) delivery.
pub struct RetryCoordinator {
    /// Time allowed for an acknowledgment
    timeout: Duration,

    /// Pending deliveries by key
    pending: Mutex<HashMap<RetryKey, PendingRetry>>,

    /// Source of entry generations
    next_generation: AtomicU64,

    counters: Counters,
}

impl RetryCoordinator {
    /// Create a coordinator whose timers fire after `timeout`.
    pub fn new(timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            timeout,
            pending: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(0),
            counters: Counters::default(),
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Arm a timer for `key`. If no acknowledgment arrives in time the entry
    /// is removed and `on_timeout` runs.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<F>(self: &Arc<Self>, key: RetryKey, on_timeout: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let coordinator = Arc::downgrade(self);
        let timeout = self.timeout;
        let timer_key = key.clone();

        // Spawn and insert under the lock so the timer can never observe a
        // missing entry for its own generation.
        let superseded = {
            let mut pending = self.pending.lock();

            let timer = tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                if let Some(coordinator) = coordinator.upgrade() {
                    coordinator.expire(&timer_key, generation);
                }
            });

            pending.insert(
                key.clone(),
                PendingRetry {
                    generation,
                    timer,
                    on_timeout: Box::new(on_timeout),
                },
            )
        };

        if let Some(old) = superseded {
            tracing::debug!("Superseding pending retry for {}", key);
            old.timer.abort();
        }

        self.counters.started.fetch_add(1, Ordering::Relaxed);
    }

    /// Resolve `key` as delivered. Returns false if nothing was pending.
    pub fn acknowledge(&self, key: &RetryKey) -> bool {
        let entry = self.pending.lock().remove(key);

        match entry {
            Some(entry) => {
                entry.timer.abort();
                self.counters.acknowledged.fetch_add(1, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    /// Resolve `key` as failed without waiting for the timer, then run its
    /// continuation. Returns false if nothing was pending.
    pub fn fail(&self, key: &RetryKey) -> bool {
        let entry = self.pending.lock().remove(key);

        match entry {
            Some(entry) => {
                entry.timer.abort();
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                (entry.on_timeout)();
                true
            }
            None => false,
        }
    }

    /// Timer callback. Only the entry that armed this timer may be expired.
    fn expire(&self, key: &RetryKey, generation: u64) {
        let entry = {
            let mut pending = self.pending.lock();
            let current = pending.get(key).map(|e| e.generation) == Some(generation);
            if current {
                pending.remove(key)
            } else {
                None
            }
        };

        if let Some(entry) = entry {
            tracing::warn!("No acknowledgment for {} within {:?}", key, self.timeout);
            self.counters.timed_out.fetch_add(1, Ordering::Relaxed);
            (entry.on_timeout)();
        }
    }

    /// Whether a delivery is pending for `key`.
    pub fn is_pending(&self, key: &RetryKey) -> bool {
        self.pending.lock().contains_key(key)
    }

    /// Number of pending deliveries.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn stats(&self) -> RetryStats {
        RetryStats {
            started: self.counters.started.load(Ordering::Relaxed),
            acknowledged: self.counters.acknowledged.load(Ordering::Relaxed),
            timed_out: self.counters.timed_out.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn counter() -> (Arc<AtomicUsize>, impl FnOnce() + Send + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        (count, move || {
            c.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_acknowledge_cancels_timer() {
        let retries = RetryCoordinator::new(TIMEOUT);
        let key = RetryKey::new("n2", 1);
        let (fired, on_timeout) = counter();

        retries.start(key.clone(), on_timeout);
        assert!(retries.is_pending(&key));

        assert!(retries.acknowledge(&key));
        assert!(!retries.is_pending(&key));

        tokio::time::sleep(TIMEOUT * 2).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(retries.stats().acknowledged, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acknowledge_is_idempotent() {
        let retries = RetryCoordinator::new(TIMEOUT);
        let key = RetryKey::new("n2", 1);

        assert!(!retries.acknowledge(&key));

        retries.start(key.clone(), || {});
        assert!(retries.acknowledge(&key));
        assert!(!retries.acknowledge(&key));
        assert_eq!(retries.stats().acknowledged, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_removes_entry_and_runs_continuation() {
        let retries = RetryCoordinator::new(TIMEOUT);
        let key = RetryKey::new("n3", 9);
        let (fired, on_timeout) = counter();

        retries.start(key.clone(), on_timeout);

        tokio::time::sleep(TIMEOUT - Duration::from_millis(1)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(retries.is_pending(&key));

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!retries.is_pending(&key));

        // Late acknowledgment after expiry has no effect
        assert!(!retries.acknowledge(&key));
        assert_eq!(retries.stats().timed_out, 1);
    }

    /// Log sink for asserting on emitted events.
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }
    }

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_logs_warning() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let retries = RetryCoordinator::new(TIMEOUT);
        let acked = RetryKey::new("n7", 1);
        let silent = RetryKey::new("n8", 2);
        retries.start(acked.clone(), || {});
        retries.start(silent.clone(), || {});
        retries.acknowledge(&acked);

        tokio::time::sleep(TIMEOUT + Duration::from_millis(1)).await;

        let text = logs.text();
        assert!(text.contains("WARN"));
        assert!(text.contains("No acknowledgment for n8:2"));
        assert!(!text.contains("n7:1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fail_runs_continuation_immediately() {
        let retries = RetryCoordinator::new(TIMEOUT);
        let key = RetryKey::new("n4", 2);
        let (fired, on_timeout) = counter();

        retries.start(key.clone(), on_timeout);
        assert!(retries.fail(&key));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!retries.is_pending(&key));

        // Timer was cancelled, so nothing fires later
        tokio::time::sleep(TIMEOUT * 2).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        assert!(!retries.fail(&key));
        assert_eq!(retries.stats().failed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_supersedes_previous_timer() {
        let retries = RetryCoordinator::new(TIMEOUT);
        let key = RetryKey::new("n5", 3);
        let (first, on_first) = counter();
        let (second, on_second) = counter();

        retries.start(key.clone(), on_first);
        tokio::time::sleep(TIMEOUT / 2).await;
        retries.start(key.clone(), on_second);
        assert_eq!(retries.pending_count(), 1);

        // The first timer's deadline passes without effect
        tokio::time::sleep(TIMEOUT / 2 + Duration::from_millis(10)).await;
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert!(retries.is_pending(&key));

        tokio::time::sleep(TIMEOUT / 2).await;
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
        assert_eq!(retries.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_independent() {
        let retries = RetryCoordinator::new(TIMEOUT);
        let a = RetryKey::new("n1", 1);
        let b = RetryKey::new("n2", 1);
        let (fired_b, on_b) = counter();

        retries.start(a.clone(), || {});
        retries.start(b.clone(), on_b);
        assert_eq!(retries.pending_count(), 2);

        retries.acknowledge(&a);
        tokio::time::sleep(TIMEOUT + Duration::from_millis(1)).await;

        assert_eq!(fired_b.load(Ordering::SeqCst), 1);
        assert_eq!(retries.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_continuation_may_restart_same_key() {
        let retries = RetryCoordinator::new(TIMEOUT);
        let key = RetryKey::new("n6", 4);

        let again = Arc::clone(&retries);
        let again_key = key.clone();
        retries.start(key.clone(), move || {
            again.start(again_key, || {});
        });

        tokio::time::sleep(TIMEOUT + Duration::from_millis(1)).await;
        assert!(retries.is_pending(&key));
        assert_eq!(retries.stats().started, 2);
        assert_eq!(retries.stats().timed_out, 1);
    }
}
