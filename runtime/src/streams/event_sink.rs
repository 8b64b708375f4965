//! # Event Sink
//!
//! The stream variants run their read loops as plain tokio tasks with no
//! engine context of their own (a background task cannot safely hold a
//! `rquickjs::Ctx`, which is tied to the thread that owns the runtime). Each
//! variant instead reports lifecycle events through an [`EventSink`]; the
//! `vm` layer supplies an implementation that re-enters the engine context
//! and invokes the JS callback stored in a stream's [`super::core::EventSlots`].
//! This mirrors how `dispatcher.rs` fans a raw upstream message out to many
//! WebSocket sessions through a channel rather than calling into each
//! session's handler directly from the ingestor task.

use std::sync::Arc;

use crate::error::TransportError;

/// Receives the lifecycle events a stream handle raises, decoupling the
/// transport's tokio task from the engine thread that owns the JS callbacks.
pub trait EventSink: Send + Sync {
    /// The handle finished an async `open`/`listen` bind.
    fn on_open(&self) {}
    /// A `connect()` call completed successfully.
    fn on_connect(&self) {}
    /// A server handle accepted an incoming connection; `id` identifies the
    /// new child handle registered separately.
    fn on_connection(&self, _id: u64) {}
    /// The handle has fully closed (after EOF or explicit `close()`).
    fn on_close(&self) {}
    /// A transport error occurred; reading stops.
    fn on_error(&self, _err: &TransportError) {}
    /// A full message (read chunk) arrived.
    fn on_message(&self, _data: &[u8]) {}
}

/// An [`EventSink`] that drops every event, used where no listener has been
/// attached yet (a handle constructed but not yet wired to any callback).
pub struct NullSink;

impl EventSink for NullSink {}

/// Shared-ownership handle to a sink, cloned into every spawned read-loop task.
pub type SharedSink = Arc<dyn EventSink>;
