// SPDX-License-Identifier: MIT OR Apache-2.0
//! Benchmarks for HTML escaping and line relaying into an in-memory sink.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use crudd_exec::{CancelToken, MemorySink, OutputStream, escape_html, relay};
use futures::StreamExt;

// ── Helpers ─────────────────────────────────────────────────────────────

fn sample_lines(n: usize) -> Vec<String> {
    (0..n)
        .map(|i| format!("tcp   LISTEN 0 128 0.0.0.0:{i} 0.0.0.0:* users:((\"sshd\",pid={i},fd=3)) <&>"))
        .collect()
}

fn output(lines: &[String]) -> OutputStream {
    futures::stream::iter(lines.to_vec().into_iter().map(Ok)).boxed()
}

// ── Benchmarks ──────────────────────────────────────────────────────────

fn bench_escape(c: &mut Criterion) {
    let mut group = c.benchmark_group("escape_html");
    let plain = "Filesystem      Size  Used Avail Use% Mounted on".repeat(4);
    let markup = "<tr><td>\"a\" & 'b'</td></tr>".repeat(8);
    group.bench_function("plain", |b| b.iter(|| escape_html(black_box(&plain))));
    group.bench_function("markup", |b| b.iter(|| escape_html(black_box(&markup))));
    group.finish();
}

fn bench_relay(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime");
    let mut group = c.benchmark_group("relay");
    for n in [10usize, 100, 1_000] {
        let lines = sample_lines(n);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &lines, |b, lines| {
            b.iter(|| {
                rt.block_on(async {
                    let mut stream = output(lines);
                    let mut sink = MemorySink::new();
                    let outcome = relay(&mut stream, &mut sink, &CancelToken::new(), false).await;
                    black_box(outcome)
                })
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_escape, bench_relay);
criterion_main!(benches);
