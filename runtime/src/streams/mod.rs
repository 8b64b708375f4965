//! # Stream Core + Variants
//!
//! The generic lifecycle/event/write-queue contract ([`core`]), the
//! event-reporting seam between transport tasks and the engine
//! ([`event_sink`]), and each concrete transport ([`tcp`], [`pipe`],
//! [`tty`], [`udp`], [`tls`]).

pub mod core;
pub mod event_sink;
pub mod pipe;
pub mod tcp;
pub mod tls;
pub mod tty;
pub mod udp;

pub use core::{StreamHandle, StreamState};
pub use event_sink::EventSink;
