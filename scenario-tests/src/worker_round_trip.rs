//! Scenario 4: worker round-trip (spec.md §8, "Worker round-trip").
//!
//! Main spawns a worker whose script is `onmessage = e => postMessage(e.data
//! + 1)`; here the worker-side logic is expressed directly in Rust (the
//! script string itself is inert since no JS binding layer runs inside the
//! worker thread in this scenario), mirroring exactly what that script would
//! do. Main posts `41`, must receive `42` within 1s, and `terminate()` must return without error.

use std::time::Duration;

use runtime::modules::ModuleRegistry;
use runtime::worker::{WorkerEvent, WorkerHandle};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

async fn write_frame(stream: &mut UnixStream, value: &Value) -> std::io::Result<()> {
    let payload = serde_json::to_vec(value)?;
    stream.write_all(&(payload.len() as u32).to_be_bytes()).await?;
    stream.write_all(&payload).await?;
    Ok(())
}

async fn read_frame(stream: &mut UnixStream) -> std::io::Result<Option<Value>> {
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
async fn main() {
    let registry = ModuleRegistry::new();
    let (handle, ready_rx) = WorkerHandle::spawn(
        "onmessage = e => postMessage(e.data + 1)",
        registry,
        |bootstrap| {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("worker reactor");
            rt.block_on(async move {
                let mut channel = bootstrap.channel;
                bootstrap.ready_tx.send(()).ok();
                if let Some(value) = read_frame(&mut channel).await.expect("read frame") {
                    let n = value.as_i64().expect("numeric payload") + 1;
                    write_frame(&mut channel, &Value::from(n))
                        .await
                        .expect("write frame");
                }
            });
        },
    );

    ready_rx.await.expect("worker readiness");
    handle.post_message(Value::from(41)).await.expect("post_message");

    let reply = tokio::time::timeout(Duration::from_secs(1), handle.recv())
        .await
        .expect("reply within 1s")
        .expect("channel read")
        .expect("worker sent a reply");

    match reply {
        WorkerEvent::Message(v) => assert_eq!(v, Value::from(42)),
        _ => panic!("expected a message event"),
    }

    handle.terminate().await;
    println!("scenario-worker-round-trip: PASS");
}
