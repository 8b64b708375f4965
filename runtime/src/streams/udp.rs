//! # UDP Stream Variant
//!
//! UDP is connectionless, so unlike TCP/Pipe there is no accept loop; `bind`
//! gives a handle that can `send_to`/receive from any peer, with an optional
//! `connect` that fixes the peer for subsequent plain `write`/`read`.

use std::net::SocketAddr;
use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::Mutex;

use crate::error::TransportError;
use crate::streams::core::{LiveHandles, StreamCore, StreamHandle};
use crate::streams::event_sink::{NullSink, SharedSink};

const READ_CHUNK: usize = 64 * 1024;

/// A bound UDP socket.
pub struct UdpStreamHandle {
    core: StreamCore,
    socket: UdpSocket,
    sink: Mutex<SharedSink>,
    reading: AtomicBool,
}

impl UdpStreamHandle {
    /// Binds a UDP socket at `addr`.
    pub async fn bind(live_handles: Arc<LiveHandles>, addr: SocketAddr) -> std::io::Result<Arc<Self>> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Arc::new(Self {
            core: StreamCore::new(live_handles),
            socket,
            sink: Mutex::new(Arc::new(NullSink)),
            reading: AtomicBool::new(false),
        }))
    }

    /// Fixes the peer for subsequent `write`/read-loop deliveries.
    pub async fn connect(&self, addr: SocketAddr) -> std::io::Result<()> {
        self.socket.connect(addr).await
    }

    /// Enables broadcast datagrams, the UDP-specific operation spec.md §2
    /// names alongside bind/listen/connect/sockname/peername.
    pub fn set_broadcast(&self, on: bool) -> std::io::Result<()> {
        self.socket.set_broadcast(on)
    }

    /// Local bound address.
    pub fn sockname(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Sends to a specific peer without requiring a prior `connect`.
    pub async fn send_to(&self, data: &[u8], addr: SocketAddr) -> std::io::Result<usize> {
        self.core.add_buffered(data.len() as i64);
        let result = self.socket.send_to(data, addr).await;
        self.core.sub_buffered(data.len() as i64);
        result
    }

    /// Installs the sink the read loop reports through.
    pub async fn set_sink(&self, sink: SharedSink) {
        *self.sink.lock().await = sink;
    }

    /// Spawns the background receive loop.
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
                let recv = tokio::select! {
                    r = this.socket.recv(&mut buf) => r,
                    _ = this.core.closed() => break,
                };
                match recv {
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

impl StreamHandle for UdpStreamHandle {
    async fn close(&self) {
        if self.core.mark_closed().await {
            self.core.mark_finalized().await;
        }
    }

    async fn write(&self, data: &[u8]) -> std::io::Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        self.core.add_buffered(data.len() as i64);
        let result = self.socket.send(data).await.map(|_| ());
        self.core.sub_buffered(data.len() as i64);
        result
    }

    async fn read_start(&self) {}

    fn fileno(&self) -> Option<i32> {
        Some(self.socket.as_raw_fd())
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
    async fn datagram_round_trip_via_send_to() {
        let live = Arc::new(LiveHandles::new());
        let a = UdpStreamHandle::bind(Arc::clone(&live), "127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let b = UdpStreamHandle::bind(live, "127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let b_addr = b.sockname().unwrap();

        a.send_to(b"hello", b_addr).await.unwrap();
        let mut buf = [0u8; 5];
        let (n, _from) = b.socket.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"hello");
    }

    #[tokio::test]
    async fn connected_peer_allows_plain_write() {
        let live = Arc::new(LiveHandles::new());
        let a = UdpStreamHandle::bind(Arc::clone(&live), "127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let b = UdpStreamHandle::bind(Arc::clone(&live), "127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let b_addr = b.sockname().unwrap();
        a.connect(b_addr).await.unwrap();
        a.write(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        let (n, _from) = b.socket.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ping");
    }
}
