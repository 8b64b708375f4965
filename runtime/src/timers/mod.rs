//! # Timer Subsystem
//!
//! One-shot and repeating timers backed by `tokio::time`, spawned as
//! tracked tasks contributing to the owning runtime's live-handle count
//! (spec.md §3 "Timer" data model, §4.5 "Timer subsystem").

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::AbortHandle;

use crate::streams::core::LiveHandles;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// A live timer: either one-shot or repeating, cancellable by id.
pub struct Timer {
    id: u64,
    repeating: bool,
    refed: Arc<AtomicBool>,
    abort: AbortHandle,
    live_handles: Arc<LiveHandles>,
}

impl Timer {
    /// Schedules `callback` to run after `delay`, repeating every `delay`
    /// again if `repeating` is set. Every fire drains pending engine jobs
    /// before invoking `callback` — the caller supplies that drain as part
    /// of `callback` itself, since this module has no engine dependency;
    /// this is what makes the "microtask queue is empty when a timer
    /// callback begins" invariant (spec.md §8) hold.
    pub fn schedule<F>(
        live_handles: Arc<LiveHandles>,
        delay: Duration,
        repeating: bool,
        mut callback: F,
    ) -> Arc<Self>
    where
        F: FnMut() + Send + 'static,
    {
        live_handles.inc();
        let id = NEXT_ID.fetch_add(1, Ordering::SeqCst);
        let refed = Arc::new(AtomicBool::new(true));
        let task_refed = Arc::clone(&refed);
        let task_live_handles = Arc::clone(&live_handles);
        let task = tokio::spawn(async move {
            if repeating {
                let mut interval = tokio::time::interval(delay.max(Duration::from_millis(1)));
                interval.tick().await; // first tick fires immediately; skip it
                loop {
                    interval.tick().await;
                    callback();
                }
            } else {
                tokio::time::sleep(delay).await;
                callback();
                // One-shot timers clear themselves after firing (spec.md
                // §3) — release the live-handle contribution here, since
                // nothing else calls `clear()` for a timer that already ran.
                if task_refed.swap(false, Ordering::SeqCst) {
                    task_live_handles.dec();
                }
            }
        });
        Arc::new(Self {
            id,
            repeating,
            refed,
            abort: task.abort_handle(),
            live_handles,
        })
    }

    /// Monotonic timer id, the value `setTimeout`/`setInterval` return.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// `clearTimeout`/`clearInterval`: stops the task and releases the
    /// live-handle contribution.
    pub fn clear(&self) {
        self.abort.abort();
        if self.refed.swap(false, Ordering::SeqCst) {
            self.live_handles.dec();
        }
    }

    /// Keeps this timer contributing to the runtime's live-handle count.
    pub fn reference(&self) {
        if !self.refed.swap(true, Ordering::SeqCst) {
            self.live_handles.inc();
        }
    }

    /// Stops this timer from contributing to the live-handle count without
    /// cancelling it.
    pub fn unreference(&self) {
        if self.refed.swap(false, Ordering::SeqCst) {
            self.live_handles.dec();
        }
    }

    /// Whether this timer currently counts toward keeping the loop alive.
    pub fn has_ref(&self) -> bool {
        self.refed.load(Ordering::SeqCst)
    }

    /// Whether this is a repeating (`setInterval`) timer.
    pub fn is_repeating(&self) -> bool {
        self.repeating
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex as StdMutex;

    #[tokio::test(start_paused = true)]
    async fn one_shot_fires_exactly_once() {
        let live = Arc::new(LiveHandles::new());
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);
        let timer = Timer::schedule(live, Duration::from_millis(10), false, move || {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });
        // Paused time auto-advances to the next timer deadline once every
        // task is parked on one, so a plain sleep past the deadline is
        // enough to observe the fire without manual `time::advance` bookkeeping.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        timer.clear();
    }

    #[tokio::test(start_paused = true)]
    async fn repeating_timer_fires_multiple_times_until_cleared() {
        let live = Arc::new(LiveHandles::new());
        let log = Arc::new(StdMutex::new(Vec::new()));
        let log_clone = Arc::clone(&log);
        let timer = Timer::schedule(live, Duration::from_millis(10), true, move || {
            log_clone.lock().unwrap().push(());
        });
        tokio::time::sleep(Duration::from_millis(35)).await;
        timer.clear();
        assert!(log.lock().unwrap().len() >= 2);
    }

    #[tokio::test]
    async fn clear_releases_the_live_handle_count() {
        let live = Arc::new(LiveHandles::new());
        let timer = Timer::schedule(Arc::clone(&live), Duration::from_secs(60), false, || {});
        assert_eq!(live.count(), 1);
        timer.clear();
        assert_eq!(live.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn one_shot_releases_the_live_handle_count_once_fired() {
        let live = Arc::new(LiveHandles::new());
        let timer = Timer::schedule(Arc::clone(&live), Duration::from_millis(10), false, || {});
        assert_eq!(live.count(), 1);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(live.count(), 0);
        assert!(!timer.has_ref());
    }
}
