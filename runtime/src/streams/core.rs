//! # Stream Core
//!
//! The lifecycle, event-dispatch and write-queue accounting shared by every
//! stream variant (`tcp`, `pipe`, `tty`, `udp`, and the `tls` overlay). Each
//! variant embeds a [`StreamState`] and drives it through [`StreamCore`];
//! the variant-specific bind/listen/connect operations live in the sibling
//! modules.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use rquickjs::{Function, Persistent};
use tokio::sync::{Mutex, Notify};

/// The handle state machine (spec.md §3): a handle is in exactly one of
/// these at a time, and both `closed` and `finalized` must be true before
/// backing memory is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Constructed, not yet reading.
    Initialized,
    /// A `message` callback has been installed; reads are active.
    Reading,
    /// Close has been requested; waiting on the finalizer.
    ClosedPending,
    /// The finalizer has run; waiting on the close callback.
    FinalizedPending,
    /// Both close and finalize have completed; backing state may be dropped.
    Released,
}

/// One dispatch slot per event kind a stream can raise.
#[derive(Default)]
pub struct EventSlots<'js> {
    pub open: Option<Persistent<Function<'js>>>,
    pub connect: Option<Persistent<Function<'js>>>,
    pub connection: Option<Persistent<Function<'js>>>,
    pub close: Option<Persistent<Function<'js>>>,
    pub error: Option<Persistent<Function<'js>>>,
    pub message: Option<Persistent<Function<'js>>>,
}

/// Counts handles that are keeping a runtime's reactor alive (ref'd).
///
/// Every stream/timer increments this on construction and decrements it on
/// the close+finalize transition (§2.1); `Runtime::run` treats a zero count
/// plus an empty job queue as "nothing left to do".
#[derive(Default)]
pub struct LiveHandles(AtomicU64);

impl LiveHandles {
    /// A fresh, empty counter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one more live, ref'd handle.
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    /// Releases one handle (called once, at the close+finalize transition).
    pub fn dec(&self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }

    /// Current count of ref'd, live handles.
    pub fn count(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// The transport-independent half of a stream handle: state, ref-counting,
/// finalize/close bookkeeping, and the buffered-write accounting every
/// variant shares.
pub struct StreamCore {
    id: u64,
    state: Mutex<StreamState>,
    refed: AtomicBool,
    closed: AtomicBool,
    finalized: AtomicBool,
    buffered_amount: AtomicI64,
    live_handles: Arc<LiveHandles>,
    close_notify: Notify,
}

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

impl StreamCore {
    /// Allocates a new, `Initialized`, ref'd stream core and increments the
    /// owning runtime's live-handle counter.
    pub fn new(live_handles: Arc<LiveHandles>) -> Self {
        live_handles.inc();
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::SeqCst),
            state: Mutex::new(StreamState::Initialized),
            refed: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            finalized: AtomicBool::new(false),
            buffered_amount: AtomicI64::new(0),
            live_handles,
            close_notify: Notify::new(),
        }
    }

    /// Monotonically assigned numeric id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> StreamState {
        *self.state.lock().await
    }

    /// Transitions to `Reading`; installing a `message` callback auto-resumes
    /// per spec.md §4.3.
    pub async fn begin_reading(&self) {
        let mut state = self.state.lock().await;
        if *state == StreamState::Initialized {
            *state = StreamState::Reading;
        }
    }

    /// Restores this handle's contribution to the live-handle count, e.g.
    /// after a prior [`Self::unref_handle`].
    pub fn ref_handle(&self) {
        self.refed.store(true, Ordering::SeqCst);
    }

    /// Drops this handle's contribution to the live-handle count without
    /// closing it.
    pub fn unref_handle(&self) {
        if self.refed.swap(false, Ordering::SeqCst) {
            self.live_handles.dec();
        }
    }

    /// Whether this handle currently counts toward keeping the loop alive.
    pub fn has_ref(&self) -> bool {
        self.refed.load(Ordering::SeqCst)
    }

    /// Flags the close half of the paired close+finalize discipline. Returns
    /// `true` the first time it's called (subsequent calls are a no-op, the
    /// "second close is a no-op" property of spec.md §8).
    pub async fn mark_closed(&self) -> bool {
        let first = !self.closed.swap(true, Ordering::SeqCst);
        if first {
            let mut state = self.state.lock().await;
            *state = if self.finalized.load(Ordering::SeqCst) {
                StreamState::Released
            } else {
                StreamState::ClosedPending
            };
            self.release_if_both_done();
            self.close_notify.notify_waiters();
        }
        first
    }

    /// Whether [`Self::mark_closed`] has already run.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Lets a read loop race a pending read against `close()`, so closing a
    /// handle doesn't have to wait behind a read that's blocked on the peer.
    pub fn closed(&self) -> tokio::sync::futures::Notified<'_> {
        self.close_notify.notified()
    }

    /// Flags the finalize half. Idempotent like [`Self::mark_closed`].
    pub async fn mark_finalized(&self) -> bool {
        let first = !self.finalized.swap(true, Ordering::SeqCst);
        if first {
            let mut state = self.state.lock().await;
            *state = if self.closed.load(Ordering::SeqCst) {
                StreamState::Released
            } else {
                StreamState::FinalizedPending
            };
            self.release_if_both_done();
        }
        first
    }

    fn release_if_both_done(&self) {
        if self.closed.load(Ordering::SeqCst) && self.finalized.load(Ordering::SeqCst) {
            self.unref_handle();
        }
    }

    /// True once both close and finalize have completed — backing memory
    /// may now be dropped.
    pub fn is_released(&self) -> bool {
        self.closed.load(Ordering::SeqCst) && self.finalized.load(Ordering::SeqCst)
    }

    /// Records bytes queued for an in-flight async write.
    pub fn add_buffered(&self, n: i64) {
        self.buffered_amount.fetch_add(n, Ordering::SeqCst);
    }

    /// Records bytes that finished writing, per spec.md §4.3's
    /// `bufferedAmount` getter.
    pub fn sub_buffered(&self, n: i64) {
        self.buffered_amount.fetch_sub(n, Ordering::SeqCst);
    }

    /// Current write-queue size in bytes.
    pub fn buffered_amount(&self) -> i64 {
        self.buffered_amount.load(Ordering::SeqCst)
    }
}

/// Splits a would-be write into the part a synchronous try-write can accept
/// now and the remainder that must be queued, per spec.md §4.3's
/// "try-write-then-queue split".
pub fn split_try_write(data: &[u8], accepted: usize) -> (&[u8], &[u8]) {
    let accepted = accepted.min(data.len());
    data.split_at(accepted)
}

/// The capability set every stream variant (TCP/Pipe/TTY/UDP/TLS) shares,
/// per spec.md §9's "a trait-style interface is appropriate".
pub trait StreamHandle: Send + Sync {
    /// Closes the handle; idempotent.
    fn close(&self) -> impl std::future::Future<Output = ()> + Send;
    /// Writes `data`, returning once it has been accepted by the transport
    /// (synchronously or via the write queue).
    fn write(&self, data: &[u8]) -> impl std::future::Future<Output = std::io::Result<()>> + Send;
    /// Starts delivering `message` events.
    fn read_start(&self) -> impl std::future::Future<Output = ()> + Send;
    /// The underlying OS file descriptor, where applicable.
    fn fileno(&self) -> Option<i32>;
    /// Keeps this handle contributing to the runtime's live-handle count.
    fn ref_handle(&self);
    /// Stops this handle from contributing to the live-handle count.
    fn unref_handle(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_close_is_a_no_op() {
        let live = Arc::new(LiveHandles::new());
        let core = StreamCore::new(live);
        assert!(core.mark_closed().await);
        assert!(!core.mark_closed().await);
    }

    #[tokio::test]
    async fn released_only_after_both_close_and_finalize() {
        let live = Arc::new(LiveHandles::new());
        let core = StreamCore::new(live);
        assert!(!core.is_released());
        core.mark_closed().await;
        assert!(!core.is_released());
        core.mark_finalized().await;
        assert!(core.is_released());
    }

    #[tokio::test]
    async fn unref_drops_the_live_handle_count() {
        let live = Arc::new(LiveHandles::new());
        assert_eq!(live.count(), 0);
        let core = StreamCore::new(Arc::clone(&live));
        assert_eq!(live.count(), 1);
        core.unref_handle();
        assert_eq!(live.count(), 0);
    }

    #[test]
    fn split_try_write_respects_accepted_bound() {
        let data = b"hello world";
        let (done, rest) = split_try_write(data, 5);
        assert_eq!(done, b"hello");
        assert_eq!(rest, b" world");
    }
}
