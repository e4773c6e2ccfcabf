//! Benchmarks for the Lumberjack wire codec.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use lumberjack_client::protocol::{data_frame_len, decode_data, encode_data};

fn record(fields: usize) -> Vec<(String, String)> {
    (0..fields)
        .map(|n| (format!("field_{n}"), format!("value of field {n} with some padding")))
        .collect()
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_data");
    for fields in [1, 4, 16] {
        let record = record(fields);
        let mut buf = vec![0u8; data_frame_len(&record)];
        group.throughput(Throughput::Bytes(buf.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(fields), &record, |b, record| {
            b.iter(|| encode_data(black_box(&mut buf), black_box(42), record))
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_data");
    for fields in [1, 4, 16] {
        let record = record(fields);
        let mut buf = vec![0u8; data_frame_len(&record)];
        if encode_data(&mut buf, 42, &record).is_err() {
            continue;
        }
        group.throughput(Throughput::Bytes(buf.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(fields), &buf, |b, buf| {
            b.iter(|| decode_data(black_box(buf)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
