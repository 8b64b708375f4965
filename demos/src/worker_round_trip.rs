//! Spawns a worker thread, posts it a number, and prints back the reply —
//! demonstrating `runtime::worker::WorkerHandle` end to end.

use std::time::Duration;

use runtime::modules::ModuleRegistry;
use runtime::worker::{WorkerEvent, WorkerHandle};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

async fn write_frame(stream: &mut UnixStream, value: &serde_json::Value) -> std::io::Result<()> {
    let payload = serde_json::to_vec(value)?;
    stream.write_all(&(payload.len() as u32).to_be_bytes()).await?;
    stream.write_all(&payload).await?;
    Ok(())
}

async fn read_frame(stream: &mut UnixStream) -> std::io::Result<Option<serde_json::Value>> {
    let mut len_buf = [0u8; 4];
    if stream.read_exact(&mut len_buf).await.is_err() {
        return Ok(None);
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await?;
    Ok(Some(serde_json::from_slice(&payload)?))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let registry = ModuleRegistry::new();
    let (handle, ready_rx) = WorkerHandle::spawn("worker-script.js", registry, |bootstrap| {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("worker reactor");
        rt.block_on(async move {
            let mut channel = bootstrap.channel;
            bootstrap.ready_tx.send(()).ok();
            loop {
                if bootstrap.stop.load(std::sync::atomic::Ordering::SeqCst) {
                    break;
                }
                // Mirrors the stop-equivalent's "checked each reactor turn"
                // rule: race the next frame against a short poll interval so
                // `terminate()` setting the stop flag is noticed promptly
                // instead of leaving this thread parked on a frame that will
                // never arrive.
                let frame = tokio::select! {
                    f = read_frame(&mut channel) => f.unwrap(),
                    _ = tokio::time::sleep(Duration::from_millis(20)) => continue,
                };
                let Some(value) = frame else { break };
                let n = value.as_i64().unwrap_or(0) + 1;
                write_frame(&mut channel, &serde_json::json!(n)).await.unwrap();
            }
        });
    });

    ready_rx.await?;
    handle.post_message(serde_json::json!(41)).await?;
    match handle.recv().await? {
        Some(WorkerEvent::Message(v)) => tracing::info!(reply = %v, "worker replied"),
        Some(WorkerEvent::MessageError(e)) => tracing::error!(error = %e, "malformed frame"),
        Some(WorkerEvent::Error(e)) => tracing::error!(error = %e, "transport error"),
        None => tracing::warn!("worker closed the channel with no reply"),
    }
    handle.terminate().await;

    Ok(())
}
