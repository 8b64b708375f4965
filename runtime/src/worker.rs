//! # Worker Subsystem
//!
//! Spawns an OS thread running its own reactor and engine, connected to the
//! parent by a [`tokio::net::UnixStream::pair`] — exactly the "connected
//! socketpair, stream-mode, non-blocking" primitive spec.md §4.4 calls for.
//!
//! **Framing.** Unlike the original design, messages here ARE length-framed:
//! each `postMessage` write is a 4-byte big-endian length prefix followed by
//! the JSON-encoded payload, and the read side buffers until a full frame is
//! available before deserializing. spec.md §4.4/§9 names the lack of framing
//! as an open correctness issue the implementation "should" fix; this is the
//! one place this repository's behavior intentionally departs from a literal
//! reading of spec.md, and the departure is the spec's own recommendation,
//! not an invented change.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value as JsonValue;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::sync::{oneshot, Mutex};

use crate::error::TransportError;
use crate::modules::registry::ModuleRegistry;

/// A message as it crosses the worker channel: already-serialized JSON, so
/// the framing/codec concern is independent of how a caller constructed the
/// value on either end.
pub type WorkerMessage = JsonValue;

/// Reported to the parent-side listener for each channel event.
pub enum WorkerEvent {
    /// A `message` event: a value deserialized from the channel.
    Message(WorkerMessage),
    /// A `messageerror` event: the frame's bytes were not valid JSON.
    MessageError(String),
    /// A transport-level `error` event.
    Error(TransportError),
}

/// Writes one length-framed JSON message to `stream`.
async fn write_frame(stream: &mut UnixStream, value: &WorkerMessage) -> std::io::Result<()> {
    let payload = serde_json::to_vec(value)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    let len = (payload.len() as u32).to_be_bytes();
    stream.write_all(&len).await?;
    stream.write_all(&payload).await?;
    Ok(())
}

/// Reads one length-framed message from `stream`. `Ok(None)` means a clean
/// EOF between frames (the peer closed).
async fn read_frame(stream: &mut UnixStream) -> std::io::Result<Option<WorkerEvent>> {
    let mut len_buf = [0u8; 4];
    match stream.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await?;
    match serde_json::from_slice::<JsonValue>(&payload) {
        Ok(value) => Ok(Some(WorkerEvent::Message(value))),
        Err(e) => Ok(Some(WorkerEvent::MessageError(e.to_string()))),
    }
}

/// One end of the worker channel plus the lifecycle flags the main side
/// tracks (spec.md §3 "Worker" data model).
pub struct WorkerHandle {
    channel: Mutex<UnixStream>,
    thread: Mutex<Option<std::thread::JoinHandle<()>>>,
    stop: Arc<AtomicBool>,
    terminated: AtomicBool,
}

/// What a spawned worker thread needs to bootstrap itself, per spec.md
/// §4.4 steps 1-9.
pub struct WorkerBootstrap {
    /// The script path to evaluate as the worker's main module, once
    /// bootstrap mode is exited.
    pub script_path: String,
    /// A fork of the parent's committed module registry (spec.md §5: "new
    /// workers observe its committed state").
    pub registry: ModuleRegistry,
    /// The worker's end of the channel.
    pub channel: UnixStream,
    /// Signals readiness back to the parent once the thread's reactor is
    /// constructed and the bootstrap module has been evaluated.
    pub ready_tx: oneshot::Sender<()>,
    /// Observed each reactor turn; when set, the thread's `run()` stops.
    pub stop: Arc<AtomicBool>,
}

impl WorkerHandle {
    /// Spawns a worker thread executing `script_path`. `run_worker_thread`
    /// is supplied by the `vm` layer (it needs to construct an
    /// `AsyncRuntime`/`AsyncContext`, which this module has no dependency
    /// on), matching spec.md §4.4's numbered steps 1-9.
    pub fn spawn<F>(
        script_path: impl Into<String>,
        registry: ModuleRegistry,
        run_worker_thread: F,
    ) -> (Arc<Self>, oneshot::Receiver<()>)
    where
        F: FnOnce(WorkerBootstrap) + Send + 'static,
    {
        let (parent_sock, child_sock) = UnixStream::pair().expect("socketpair creation");
        let (ready_tx, ready_rx) = oneshot::channel();
        let stop = Arc::new(AtomicBool::new(false));

        let bootstrap = WorkerBootstrap {
            script_path: script_path.into(),
            registry,
            channel: child_sock,
            ready_tx,
            stop: Arc::clone(&stop),
        };

        let thread = std::thread::Builder::new()
            .name("worker".into())
            .spawn(move || run_worker_thread(bootstrap))
            .expect("worker thread spawn");

        let handle = Arc::new(Self {
            channel: Mutex::new(parent_sock),
            thread: Mutex::new(Some(thread)),
            stop,
            terminated: AtomicBool::new(false),
        });
        (handle, ready_rx)
    }

    /// `postMessage(value)`: serializes and frames `value` onto the channel.
    pub async fn post_message(&self, value: WorkerMessage) -> std::io::Result<()> {
        let mut guard = self.channel.lock().await;
        write_frame(&mut guard, &value).await
    }

    /// Reads the next framed event off the channel. Intended to be called
    /// in a loop by the side (main or worker) that owns this handle's
    /// event dispatch.
    pub async fn recv(&self) -> std::io::Result<Option<WorkerEvent>> {
        let mut guard = self.channel.lock().await;
        read_frame(&mut guard).await
    }

    /// `worker.terminate()`: signals the child's stop flag, joins the
    /// thread, and marks this handle terminated. Idempotent.
    pub async fn terminate(self: &Arc<Self>) {
        if self.terminated.swap(true, Ordering::SeqCst) {
            return;
        }
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.lock().await.take() {
            tokio::task::spawn_blocking(move || {
                let _ = thread.join();
            })
            .await
            .ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn framed_round_trip_preserves_json_value() {
        let (mut a, mut b) = UnixStream::pair().unwrap();
        let value: JsonValue = serde_json::json!({"n": 42, "ok": true});
        write_frame(&mut a, &value).await.unwrap();
        let event = read_frame(&mut b).await.unwrap().unwrap();
        match event {
            WorkerEvent::Message(v) => assert_eq!(v, value),
            _ => panic!("expected a message event"),
        }
    }

    #[tokio::test]
    async fn large_payload_survives_partial_reads() {
        let (mut a, mut b) = UnixStream::pair().unwrap();
        let big = "x".repeat(200_000);
        let value: JsonValue = serde_json::json!({"payload": big});
        let value_clone = value.clone();
        let writer = tokio::spawn(async move {
            write_frame(&mut a, &value_clone).await.unwrap();
        });
        let event = read_frame(&mut b).await.unwrap().unwrap();
        writer.await.unwrap();
        match event {
            WorkerEvent::Message(v) => assert_eq!(v, value),
            _ => panic!("expected a message event"),
        }
    }

    #[tokio::test]
    async fn back_to_back_posts_do_not_corrupt_each_other() {
        let (mut a, mut b) = UnixStream::pair().unwrap();
        write_frame(&mut a, &serde_json::json!(1)).await.unwrap();
        write_frame(&mut a, &serde_json::json!(2)).await.unwrap();
        let first = read_frame(&mut b).await.unwrap().unwrap();
        let second = read_frame(&mut b).await.unwrap().unwrap();
        match (first, second) {
            (WorkerEvent::Message(f), WorkerEvent::Message(s)) => {
                assert_eq!(f, serde_json::json!(1));
                assert_eq!(s, serde_json::json!(2));
            }
            _ => panic!("expected two message events"),
        }
    }

    #[tokio::test]
    async fn worker_round_trip_increments_posted_value() {
        let registry = ModuleRegistry::new();
        let (handle, ready_rx) = WorkerHandle::spawn("worker-script.js", registry, |bootstrap| {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            rt.block_on(async move {
                let mut channel = bootstrap.channel;
                bootstrap.ready_tx.send(()).ok();
                if let Some(WorkerEvent::Message(v)) = read_frame(&mut channel).await.unwrap() {
                    let n = v.as_i64().unwrap() + 1;
                    write_frame(&mut channel, &serde_json::json!(n)).await.unwrap();
                }
            });
        });

        ready_rx.await.unwrap();
        handle.post_message(serde_json::json!(41)).await.unwrap();
        let reply = handle.recv().await.unwrap().unwrap();
        match reply {
            WorkerEvent::Message(v) => assert_eq!(v, serde_json::json!(42)),
            _ => panic!("expected a message event"),
        }
        handle.terminate().await;
    }
}
