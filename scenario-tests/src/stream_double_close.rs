//! Scenario 6: stream double-close safety (spec.md §8, "Stream double-close
//! safety").
//!
//! `const s = new TCP(); s.close(); s.close()` — the second close must be a
//! no-op: no panic, no double-free, no leaked live-handle count.

use std::sync::Arc;

use runtime::streams::core::LiveHandles;
use runtime::streams::tcp::TcpStreamHandle;
use runtime::streams::StreamHandle;

#[tokio::main]
async fn main() {
    let live = Arc::new(LiveHandles::new());
    let handle = TcpStreamHandle::bind(Arc::clone(&live), "127.0.0.1:0".parse().unwrap())
        .await
        .expect("bind");

    handle.close().await;
    handle.close().await;

    // A write after close must fail cleanly rather than panic or hang.
    let result = handle.write(b"late").await;
    assert!(result.is_err(), "write after close must error, not succeed");

    println!("scenario-stream-double-close: PASS");
}
