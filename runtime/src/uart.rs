//! # UART (Serial Port)
//!
//! Open/configure/read/write over a serial port via `tokio-serial`, exposed
//! through the same [`crate::streams::StreamHandle`] capability set as TCP
//! and Pipe — grounded in `original_source/core/deps/util/src/util/uart.c`
//! and `tjs/src/uart.c`. This is the one named peripheral whose whole
//! reason for existing is the async-request/poll-driven contract the core
//! enforces, per spec.md §2's component-share table.

use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio_serial::{SerialPortBuilderExt, SerialStream};

use crate::error::TransportError;
use crate::streams::core::{LiveHandles, StreamCore, StreamHandle};
use crate::streams::event_sink::{NullSink, SharedSink};

const READ_CHUNK: usize = 4096;

/// Serial line configuration: baud rate, data bits, parity, stop bits.
#[derive(Debug, Clone, Copy)]
pub struct UartConfig {
    /// Line speed in bits per second.
    pub baud_rate: u32,
    /// Bits per data frame, typically 8.
    pub data_bits: tokio_serial::DataBits,
    /// Parity checking mode.
    pub parity: tokio_serial::Parity,
    /// Number of stop bits.
    pub stop_bits: tokio_serial::StopBits,
}

impl Default for UartConfig {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            data_bits: tokio_serial::DataBits::Eight,
            parity: tokio_serial::Parity::None,
            stop_bits: tokio_serial::StopBits::One,
        }
    }
}

/// An open serial port.
pub struct UartStreamHandle {
    core: StreamCore,
    port: Mutex<Option<SerialStream>>,
    sink: Mutex<SharedSink>,
    reading: AtomicBool,
}

impl UartStreamHandle {
    /// Opens `path` (e.g. `/dev/ttyUSB0`) with `config`.
    pub fn open(
        live_handles: Arc<LiveHandles>,
        path: &str,
        config: UartConfig,
    ) -> Result<Arc<Self>, TransportError> {
        let port = tokio_serial::new(path, config.baud_rate)
            .data_bits(config.data_bits)
            .parity(config.parity)
            .stop_bits(config.stop_bits)
            .open_native_async()
            .map_err(|e| TransportError::from_io(&std::io::Error::other(e)))?;
        Ok(Arc::new(Self {
            core: StreamCore::new(live_handles),
            port: Mutex::new(Some(port)),
            sink: Mutex::new(Arc::new(NullSink)),
            reading: AtomicBool::new(false),
        }))
    }

    /// Installs the sink the read loop reports through.
    pub async fn set_sink(&self, sink: SharedSink) {
        *self.sink.lock().await = sink;
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
                let mut buf = vec![0u8; READ_CHUNK];
                let n = {
                    let mut guard = this.port.lock().await;
                    match guard.as_mut() {
                        Some(port) => port.read(&mut buf).await,
                        None => break,
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

impl StreamHandle for UartStreamHandle {
    async fn close(&self) {
        if self.core.mark_closed().await {
            *self.port.lock().await = None;
            self.core.mark_finalized().await;
        }
    }

    async fn write(&self, data: &[u8]) -> std::io::Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let mut guard = self.port.lock().await;
        let port = guard
            .as_mut()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotConnected, "port closed"))?;
        self.core.add_buffered(data.len() as i64);
        let result = port.write_all(data).await;
        self.core.sub_buffered(data.len() as i64);
        result
    }

    async fn read_start(&self) {}

    fn fileno(&self) -> Option<i32> {
        let guard = self.port.try_lock().ok()?;
        Some(guard.as_ref()?.as_raw_fd())
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

    #[test]
    fn default_config_matches_common_serial_baseline() {
        let config = UartConfig::default();
        assert_eq!(config.baud_rate, 115_200);
        assert_eq!(config.data_bits, tokio_serial::DataBits::Eight);
    }

    #[tokio::test]
    async fn opening_a_nonexistent_port_fails_with_transport_error() {
        let live = Arc::new(LiveHandles::new());
        let result = UartStreamHandle::open(live, "/dev/definitely-not-a-real-port", UartConfig::default());
        assert!(result.is_err());
    }
}
