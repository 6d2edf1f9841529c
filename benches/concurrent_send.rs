//! Concurrent send benchmark.
//!
//! Measures how fast many tasks can push JSON responses through one
//! connection's write lock:
//! - Sender counts: 1, 8, 64
//!
//! Run with: cargo bench --bench concurrent_send
//! Results saved to: target/criterion/

use std::hint::black_box;
use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use futures_util::StreamExt;
use serde_json::json;
use tokio::io::duplex;
use tokio::runtime::Runtime;
use tokio_tungstenite::client_async;
use ws_dispatch::{Connection, Upgrader, message_handler};

// ============================================================================
// Benchmark Parameters
// ============================================================================

const SENDER_COUNTS: &[usize] = &[1, 8, 64];
const PIPE_CAPACITY: usize = 1 << 20;

// ============================================================================
// Setup
// ============================================================================

/// Upgrades an in-memory pipe and drains the client side in the background.
async fn connected() -> Arc<Connection> {
    let (server_io, client_io) = duplex(PIPE_CAPACITY);
    let handler = message_handler(|_connection, _payload| async {});
    let upgrader = Upgrader::new();

    let (server, client) = tokio::join!(
        upgrader.upgrade(server_io, handler),
        client_async("ws://localhost/", client_io)
    );
    let connection = server.expect("upgrade should succeed");
    let (mut peer, _) = client.expect("client handshake should succeed");

    tokio::spawn(async move { while let Some(Ok(_)) = peer.next().await {} });

    connection
}

async fn send_burst(connection: &Arc<Connection>, senders: usize) {
    let mut tasks = Vec::with_capacity(senders);
    for id in 0..senders {
        let connection = Arc::clone(connection);
        tasks.push(tokio::spawn(async move {
            connection
                .send_response(&json!({ "type": "tile", "id": id, "z": 12 }))
                .await
        }));
    }
    for task in tasks {
        let _ = black_box(task.await);
    }
}

// ============================================================================
// Benchmark: Concurrent Send
// ============================================================================

fn bench_concurrent_send(c: &mut Criterion) {
    let rt = Runtime::new().expect("tokio runtime");
    let connection = rt.block_on(connected());

    let mut group = c.benchmark_group("concurrent_send");

    for &senders in SENDER_COUNTS {
        group.bench_with_input(
            BenchmarkId::new("senders", senders),
            &senders,
            |b, &senders| {
                b.to_async(&rt)
                    .iter(|| async { send_burst(&connection, senders).await });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_concurrent_send);
criterion_main!(benches);
