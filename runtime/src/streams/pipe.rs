//! # Pipe Stream Variant
//!
//! Backed by Unix domain sockets, which is also how the worker subsystem's
//! byte channel is built (§2.6) — this unifies both uses of "pipe" under one
//! primitive, the way the original design's single libuv pipe handle did.

use std::os::fd::AsRawFd;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Mutex;

use crate::error::TransportError;
use crate::streams::core::{LiveHandles, StreamCore, StreamHandle};
use crate::streams::event_sink::{NullSink, SharedSink};

const READ_CHUNK: usize = 64 * 1024;

/// A connected or listening Unix-domain-socket handle.
///
/// Like [`crate::streams::tcp::TcpStreamHandle`], the read and write halves
/// are split at connection time so a pending read doesn't hold a lock a
/// concurrent write would need.
pub struct PipeStreamHandle {
    core: StreamCore,
    reader: Mutex<Option<OwnedReadHalf>>,
    writer: Mutex<Option<OwnedWriteHalf>>,
    listener: Mutex<Option<UnixListener>>,
    sink: Mutex<SharedSink>,
    reading: AtomicBool,
}

impl PipeStreamHandle {
    /// Wraps an already-connected socket, e.g. one half of
    /// [`UnixStream::pair`] used by the worker channel.
    pub fn from_connected(live_handles: Arc<LiveHandles>, conn: UnixStream) -> Arc<Self> {
        let (reader, writer) = conn.into_split();
        Arc::new(Self {
            core: StreamCore::new(live_handles),
            reader: Mutex::new(Some(reader)),
            writer: Mutex::new(Some(writer)),
            listener: Mutex::new(None),
            sink: Mutex::new(Arc::new(NullSink)),
            reading: AtomicBool::new(false),
        })
    }

    /// Binds a listening socket at `path`.
    pub async fn bind(live_handles: Arc<LiveHandles>, path: &Path) -> std::io::Result<Arc<Self>> {
        let listener = UnixListener::bind(path)?;
        Ok(Arc::new(Self {
            core: StreamCore::new(live_handles),
            reader: Mutex::new(None),
            writer: Mutex::new(None),
            listener: Mutex::new(Some(listener)),
            sink: Mutex::new(Arc::new(NullSink)),
            reading: AtomicBool::new(false),
        }))
    }

    /// Connects to a listening socket at `path`.
    pub async fn connect(live_handles: Arc<LiveHandles>, path: &Path) -> std::io::Result<Arc<Self>> {
        let conn = UnixStream::connect(path).await?;
        Ok(Self::from_connected(live_handles, conn))
    }

    /// Installs the sink read-loop/accept-loop tasks report through.
    pub async fn set_sink(&self, sink: SharedSink) {
        *self.sink.lock().await = sink;
    }

    /// Accepts one incoming connection.
    pub async fn accept(&self, live_handles: Arc<LiveHandles>) -> std::io::Result<Arc<Self>> {
        let guard = self.listener.lock().await;
        let listener = guard
            .as_ref()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "not listening"))?;
        let (conn, _addr) = listener.accept().await?;
        Ok(Self::from_connected(live_handles, conn))
    }

    /// Spawns the background read loop.
    pub fn spawn_read_loop(self: &Arc<Self>) {
        if self.reading.swap(true, Ordering::SeqCst) {
            return;
        }
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.core.begin_reading().await;
            loop {
                if this.core.is_closed() {
                    break;
                }
                let mut buf = vec![0u8; READ_CHUNK];
                let n = {
                    let mut guard = this.reader.lock().await;
                    let conn = match guard.as_mut() {
                        Some(conn) => conn,
                        None => break,
                    };
                    tokio::select! {
                        r = conn.read(&mut buf) => r,
                        _ = this.core.closed() => break,
                    }
                };
                match n {
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

impl StreamHandle for PipeStreamHandle {
    async fn close(&self) {
        if self.core.mark_closed().await {
            *self.reader.lock().await = None;
            *self.writer.lock().await = None;
            *self.listener.lock().await = None;
            self.core.mark_finalized().await;
        }
    }

    async fn write(&self, data: &[u8]) -> std::io::Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let mut guard = self.writer.lock().await;
        let conn = guard
            .as_mut()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotConnected, "not connected"))?;
        self.core.add_buffered(data.len() as i64);
        let result = conn.write_all(data).await;
        self.core.sub_buffered(data.len() as i64);
        result
    }

    async fn read_start(&self) {}

    fn fileno(&self) -> Option<i32> {
        if let Ok(guard) = self.writer.try_lock() {
            if let Some(writer) = guard.as_ref() {
                return Some(writer.as_ref().as_raw_fd());
            }
        }
        if let Ok(guard) = self.listener.try_lock() {
            if let Some(listener) = guard.as_ref() {
                return Some(listener.as_raw_fd());
            }
        }
        None
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
    async fn socketpair_halves_exchange_bytes_directly() {
        let live = Arc::new(LiveHandles::new());
        let (a, b) = UnixStream::pair().unwrap();
        let a = PipeStreamHandle::from_connected(Arc::clone(&live), a);
        let b = PipeStreamHandle::from_connected(live, b);

        a.write(b"hi").await.unwrap();
        let mut buf = [0u8; 2];
        b.reader.lock().await.as_mut().unwrap().read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hi");
    }

    #[tokio::test]
    async fn listener_bound_to_socket_path_accepts_a_connection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.sock");
        let live = Arc::new(LiveHandles::new());
        let server = PipeStreamHandle::bind(Arc::clone(&live), &path).await.unwrap();

        let server_clone = Arc::clone(&server);
        let live_clone = Arc::clone(&live);
        let accept_task = tokio::spawn(async move { server_clone.accept(live_clone).await.unwrap() });

        let client = PipeStreamHandle::connect(live, &path).await.unwrap();
        let accepted = accept_task.await.unwrap();
        client.write(b"ok").await.unwrap();
        let mut buf = [0u8; 2];
        accepted.reader.lock().await.as_mut().unwrap().read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ok");
    }
}
