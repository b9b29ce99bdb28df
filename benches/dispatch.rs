//! Dispatch benchmark suite.
//!
//! Benchmarks the correlation core at different scales:
//! - Register/resolve cycles with no I/O
//! - Full round-trips over an in-memory duplex stream
//! - Batch sizes: 1, 64, 512 concurrent requests
//!
//! Run with: cargo bench --bench dispatch
//! Results saved to: target/criterion/

use bytes::Bytes;
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::io::{DuplexStream, duplex};
use tokio::runtime::Runtime;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use duplex_dispatch::protocol::{Response, ResponseBody};
use duplex_dispatch::{
    AdmissionPolicy, CallbackDispatcher, Client, Command, JsonCodec, Reply, RequestId,
};

// ============================================================================
// Benchmark Parameters
// ============================================================================

const BATCH_SIZES: &[usize] = &[1, 64, 512];

// ============================================================================
// Helpers
// ============================================================================

/// Answers every request with `ok`.
async fn echo_companion(stream: DuplexStream) {
    let mut framed = Framed::new(stream, LengthDelimitedCodec::new());

    while let Some(Ok(frame)) = framed.next().await {
        let request: Value = serde_json::from_slice(&frame).expect("json request");
        let id = RequestId::new(request["callbackIdx"].as_u64().expect("id") as u32);
        let response = serde_json::to_vec(&Response::new(id, ResponseBody::Ok)).expect("encode");
        if framed.send(Bytes::from(response)).await.is_err() {
            break;
        }
    }
}

async fn connect(rt_limit: usize) -> Client {
    let (local, remote) = duplex(1 << 20);
    tokio::spawn(echo_companion(remote));

    Client::builder()
        .admission_policy(AdmissionPolicy::Block)
        .inflight_limit(rt_limit)
        .connect_stream(local, JsonCodec)
        .await
        .expect("connect")
}

// ============================================================================
// Benchmark: Register / Resolve
// ============================================================================

fn bench_register_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("register_resolve");

    for &batch in BATCH_SIZES {
        group.throughput(Throughput::Elements(batch as u64));
        group.bench_with_input(BenchmarkId::from_parameter(batch), &batch, |b, &batch| {
            let dispatcher: CallbackDispatcher<Reply> =
                CallbackDispatcher::new(batch, AdmissionPolicy::Reject).expect("dispatcher");
            dispatcher.mark_ready();

            let mut ids = Vec::with_capacity(batch);
            b.iter(|| {
                for _ in 0..batch {
                    let (id, _handle) = dispatcher.try_register().expect("register");
                    ids.push(id);
                }
                for id in ids.drain(..) {
                    dispatcher.resolve(id, Reply::Ok);
                }
            });
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Round-Trip
// ============================================================================

fn bench_round_trip(c: &mut Criterion) {
    let rt = Runtime::new().expect("runtime");
    let client = rt.block_on(connect(1024));

    let mut group = c.benchmark_group("round_trip");

    for &batch in BATCH_SIZES {
        group.throughput(Throughput::Elements(batch as u64));
        group.bench_with_input(BenchmarkId::from_parameter(batch), &batch, |b, &batch| {
            b.to_async(&rt).iter(|| async {
                let mut handles = Vec::with_capacity(batch);
                for _ in 0..batch {
                    handles.push(
                        client
                            .submit(Command::custom(["PING"]))
                            .await
                            .expect("submit"),
                    );
                }
                for handle in handles {
                    handle.wait().await.expect("reply");
                }
            });
        });
    }

    group.finish();
    rt.block_on(client.close());
}

criterion_group!(benches, bench_register_resolve, bench_round_trip);
criterion_main!(benches);
