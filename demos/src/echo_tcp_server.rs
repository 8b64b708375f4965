//! Binds on `127.0.0.1:0`, accepts one connection, and echoes back whatever
//! the client sends — the literal scenario from spec.md §8.1, run here as a
//! standalone demo rather than a test.

use std::sync::Arc;

use runtime::streams::core::LiveHandles;
use runtime::streams::event_sink::EventSink;
use runtime::streams::tcp::TcpStreamHandle;
use runtime::streams::StreamHandle;

struct ForwardingSink {
    tx: tokio::sync::mpsc::UnboundedSender<Vec<u8>>,
}

impl EventSink for ForwardingSink {
    fn on_message(&self, data: &[u8]) {
        let _ = self.tx.send(data.to_vec());
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let live = Arc::new(LiveHandles::new());
    let server = TcpStreamHandle::bind(Arc::clone(&live), "127.0.0.1:0".parse()?).await?;
    let addr = server.sockname().await?;
    tracing::info!(%addr, "listening");

    let server_clone = Arc::clone(&server);
    let live_clone = Arc::clone(&live);
    let accept_task = tokio::spawn(async move {
        let conn = server_clone.accept(live_clone).await.unwrap();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        conn.set_sink(Arc::new(ForwardingSink { tx })).await;
        conn.spawn_read_loop();
        let chunk = rx.recv().await.expect("client sent a message");
        conn.write(&chunk).await.unwrap();
        conn
    });

    let client = TcpStreamHandle::connect(Arc::clone(&live), addr).await?;
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    client.set_sink(Arc::new(ForwardingSink { tx })).await;
    client.spawn_read_loop();

    client.write(b"ping").await?;
    let echoed = rx.recv().await.expect("server echoed a reply");
    tracing::info!(reply = %String::from_utf8_lossy(&echoed), "echo confirmed");
    assert_eq!(echoed, b"ping");

    let server_conn = accept_task.await?;
    server_conn.close().await;
    client.close().await;
    server.close().await;

    Ok(())
}
