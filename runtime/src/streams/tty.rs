//! # TTY Stream Variant
//!
//! Wraps `tokio::io::{Stdin, Stdout}` with `crossterm` raw-mode toggling —
//! none of the teacher's own crates touch a terminal directly, so this is
//! enriched from the wider example pack (`r3bl-org-r3bl-open-core`'s
//! `terminal_async`, which uses `crossterm` for exactly this) as the
//! Rust-idiomatic equivalent of spec.md's "TTY mode" operation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::error::TransportError;
use crate::streams::core::{LiveHandles, StreamCore, StreamHandle};
use crate::streams::event_sink::{NullSink, SharedSink};

const READ_CHUNK: usize = 4096;

/// A handle over the process's standard input or output.
pub enum TtyKind {
    /// Readable side: `tokio::io::stdin()`.
    Input,
    /// Writable side: `tokio::io::stdout()`.
    Output,
}

/// A TTY stream handle; `mode(true)` enables terminal raw mode.
pub struct TtyStreamHandle {
    core: StreamCore,
    kind: TtyKind,
    sink: Mutex<SharedSink>,
    raw_mode: AtomicBool,
    reading: AtomicBool,
}

impl TtyStreamHandle {
    /// Constructs a handle over the given standard stream.
    pub fn new(live_handles: Arc<LiveHandles>, kind: TtyKind) -> Arc<Self> {
        Arc::new(Self {
            core: StreamCore::new(live_handles),
            kind,
            sink: Mutex::new(Arc::new(NullSink)),
            raw_mode: AtomicBool::new(false),
            reading: AtomicBool::new(false),
        })
    }

    /// Toggles terminal raw mode via `crossterm`. A no-op, returning `Ok`,
    /// when the stream is not attached to a real terminal (e.g. CI, a pipe).
    pub fn set_mode(&self, raw: bool) -> std::io::Result<()> {
        if !crossterm::tty::IsTty::is_tty(&std::io::stdin()) {
            return Ok(());
        }
        if raw {
            crossterm::terminal::enable_raw_mode()
        } else {
            crossterm::terminal::disable_raw_mode()
        }
        .map_err(|e| std::io::Error::other(e.to_string()))?;
        self.raw_mode.store(raw, Ordering::SeqCst);
        Ok(())
    }

    /// Whether raw mode is currently enabled for this handle.
    pub fn is_raw(&self) -> bool {
        self.raw_mode.load(Ordering::SeqCst)
    }

    /// Installs the sink the read loop reports through.
    pub async fn set_sink(&self, sink: SharedSink) {
        *self.sink.lock().await = sink;
    }

    /// Spawns the background read loop (only meaningful for [`TtyKind::Input`]).
    pub fn spawn_read_loop(self: &Arc<Self>) {
        if !matches!(self.kind, TtyKind::Input) || self.reading.swap(true, Ordering::SeqCst) {
            return;
        }
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.core.begin_reading().await;
            let mut stdin = tokio::io::stdin();
            loop {
                let mut buf = vec![0u8; READ_CHUNK];
                match stdin.read(&mut buf).await {
                    Ok(0) => {
                        this.sink.lock().await.on_close();
                        break;
                    }
                    Ok(n) => {
                        buf.truncate(n);
                        this.sink.lock().await.on_message(&buf);
                    }
                    Err(e) => {
                        this.sink
                            .lock()
                            .await
                            .on_error(&TransportError::from_io(&e));
                        break;
                    }
                }
            }
        });
    }
}

impl StreamHandle for TtyStreamHandle {
    async fn close(&self) {
        if self.core.mark_closed().await {
            if self.is_raw() {
                let _ = crossterm::terminal::disable_raw_mode();
            }
            self.core.mark_finalized().await;
        }
    }

    async fn write(&self, data: &[u8]) -> std::io::Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        if !matches!(self.kind, TtyKind::Output) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "input TTY handle is not writable",
            ));
        }
        self.core.add_buffered(data.len() as i64);
        let result = tokio::io::stdout().write_all(data).await;
        self.core.sub_buffered(data.len() as i64);
        result
    }

    async fn read_start(&self) {}

    fn fileno(&self) -> Option<i32> {
        match self.kind {
            TtyKind::Input => Some(0),
            TtyKind::Output => Some(1),
        }
    }

    fn ref_handle(&self) {
        self.core.ref_handle();
    }

    fn unref_handle(&self) {
        self.core.unref_handle();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writing_to_an_input_handle_is_rejected() {
        let live = Arc::new(LiveHandles::new());
        let tty = TtyStreamHandle::new(live, TtyKind::Input);
        assert!(tty.write(b"x").await.is_err());
    }

    #[tokio::test]
    async fn set_mode_is_a_no_op_off_a_real_terminal() {
        let live = Arc::new(LiveHandles::new());
        let tty = TtyStreamHandle::new(live, TtyKind::Output);
        assert!(tty.set_mode(true).is_ok());
    }
}
