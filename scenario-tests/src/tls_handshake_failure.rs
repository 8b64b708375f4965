//! Scenario 2: TLS handshake failure (spec.md §8, "TLS handshake failure").
//!
//! Connecting to a peer that drops the connection before completing the
//! handshake must reject with an error, and must never emit an `open` event
//! (there is no handle to emit one from: `connect` returns `Err`, not a
//! handle plus a later error event).

use std::sync::Arc;

use rustls::pki_types::ServerName;
use runtime::streams::core::LiveHandles;
use runtime::streams::tls::{client_config, TlsStreamHandle};

#[tokio::main]
async fn main() {
    let _ = rustls::crypto::ring::default_provider().install_default();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind listener");
    let addr = listener.local_addr().expect("local_addr");

    // A server that accepts the TCP connection but never speaks TLS back —
    // the client's handshake read never completes and the connection is
    // dropped, standing in for "the server rejects the handshake".
    let server_task = tokio::spawn(async move {
        let (_tcp, _) = listener.accept().await.expect("accept");
    });

    let live = Arc::new(LiveHandles::new());
    let client_cfg = client_config(false);
    let name = ServerName::try_from("localhost").expect("server name");
    let result = TlsStreamHandle::connect(live, addr, name, client_cfg).await;

    server_task.await.expect("server task");

    let err = match result {
        Ok(_) => panic!("handshake must reject, not resolve"),
        Err(e) => e,
    };
    assert!(
        !err.message.is_empty(),
        "rejection must carry a non-empty error message"
    );
    println!("scenario-tls-handshake-failure: PASS ({})", err.message);
}
