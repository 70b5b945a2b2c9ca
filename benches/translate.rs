//! Micro-benchmarks for the hot translation paths: the filter codec and the
//! k-way sorted merge.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use shardql::filters::{self, Bound, FieldFilter};
use shardql::query::operators::StreamMerger;
use shardql::search::ShardStream;
use shardql::types::{Row, RowComparator, SortDirection, Value};
use std::collections::HashMap;

fn filter_map(entries: usize) -> HashMap<String, FieldFilter> {
    (0..entries)
        .map(|i| {
            (
                format!("field_{i}"),
                FieldFilter {
                    start: Bound::Literal(format!("2026-01-{:02}", (i % 28) + 1)),
                    end: Bound::Open,
                    include_start: true,
                    include_end: false,
                },
            )
        })
        .collect()
}

fn bench_filter_codec(c: &mut Criterion) {
    let map = filter_map(16);
    let encoded = filters::encode(&map);

    c.bench_function("filters/encode_16", |b| {
        b.iter(|| filters::encode(black_box(&map)))
    });
    c.bench_function("filters/decode_16", |b| {
        b.iter(|| filters::decode(black_box(&encoded)).unwrap())
    });
}

fn sorted_streams(streams: usize, rows_per_stream: usize) -> Vec<ShardStream> {
    (0..streams)
        .map(|s| {
            let rows = (0..rows_per_stream)
                .map(|i| {
                    Row::new().with("k", Value::Int((i * streams + s) as i64))
                })
                .collect();
            ShardStream::from_rows(rows)
        })
        .collect()
}

fn bench_stream_merge(c: &mut Criterion) {
    c.bench_function("merge/8x512", |b| {
        b.iter(|| {
            let comparator = RowComparator::new(vec![("k".to_string(), SortDirection::Asc)]);
            let mut merger = StreamMerger::new(sorted_streams(8, 512), comparator);
            let mut n = 0;
            while merger.next_row().unwrap().is_some() {
                n += 1;
            }
            black_box(n)
        })
    });
}

criterion_group!(benches, bench_filter_codec, bench_stream_merge);
criterion_main!(benches);
