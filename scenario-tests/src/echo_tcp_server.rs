//! Scenario 1: echo TCP server (spec.md §8, "Echo TCP server").
//!
//! Listens on `127.0.0.1:0`, accepts one connection, echoes back whatever
//! the client sends, and closes cleanly on both sides within 1 s.

use std::sync::Arc;
use std::time::Duration;

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
async fn main() {
    let live = Arc::new(LiveHandles::new());
    let server = TcpStreamHandle::bind(Arc::clone(&live), "127.0.0.1:0".parse().unwrap())
        .await
        .expect("bind");
    let addr = server.sockname().await.expect("sockname");

    let server_clone = Arc::clone(&server);
    let live_clone = Arc::clone(&live);
    let accept_task = tokio::spawn(async move {
        let conn = server_clone.accept(live_clone).await.expect("accept");
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        conn.set_sink(Arc::new(ForwardingSink { tx })).await;
        conn.spawn_read_loop();
        let chunk = rx.recv().await.expect("client message");
        conn.write(&chunk).await.expect("echo write");
        conn
    });

    let client = TcpStreamHandle::connect(Arc::clone(&live), addr)
        .await
        .expect("connect");
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    client.set_sink(Arc::new(ForwardingSink { tx })).await;
    client.spawn_read_loop();

    client.write(b"ping").await.expect("client write");
    let echoed = rx.recv().await.expect("echo reply");
    assert_eq!(echoed, b"ping", "echoed bytes must match what was sent");

    let server_conn = accept_task.await.expect("accept task");
    tokio::time::timeout(Duration::from_secs(1), async {
        server_conn.close().await;
        client.close().await;
        server.close().await;
    })
    .await
    .expect("close within 1s");

    println!("scenario-echo-tcp-server: PASS");
}
