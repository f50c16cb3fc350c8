//! Micro benchmarks for mysql-wire
//!
//! CPU-bound pieces of the driver, measured without a server:
//! - Statement fingerprinting and analysis (runs on every cache lookup)
//! - Authentication scrambles
//! - Packet framing and row decoding
//!
//! Run with: cargo bench --bench micro_benchmarks

use bytes::{BufMut, Bytes, BytesMut};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use mysql_wire::auth::{scramble_caching_sha2, scramble_native};
use mysql_wire::cache::BoundedCache;
use mysql_wire::protocol::decode::{decode_packet, decode_text_row};
use mysql_wire::protocol::encode::encode_packet;
use mysql_wire::statement::{Fingerprint, QueryMeta};

const SALT: &[u8; 20] = b"0123456789abcdefghij";

const QUERIES: &[(&str, &str)] = &[
    ("short", "SELECT 1"),
    (
        "typical",
        "SELECT   u.id, u.name\n  FROM users u\n WHERE u.active = 1   AND u.name <> 'a  b'\n ORDER BY u.id;",
    ),
    (
        "commented",
        "/* report */ SELECT o.id, -- order id\n  SUM(l.qty) # total\n FROM orders o JOIN lines l ON l.order_id = o.id GROUP BY o.id",
    ),
];

// ============================================================================
// Statement analysis
// ============================================================================

fn statement_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("statement");

    for (name, sql) in QUERIES {
        group.throughput(Throughput::Bytes(sql.len() as u64));
        group.bench_with_input(BenchmarkId::new("fingerprint", name), sql, |b, sql| {
            b.iter(|| Fingerprint::new(black_box(sql)))
        });
        group.bench_with_input(BenchmarkId::new("query_meta", name), sql, |b, sql| {
            b.iter(|| QueryMeta::parse(black_box(sql)))
        });
    }

    group.finish();
}

fn cache_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache");
    let keys: Vec<String> = (0..1024).map(|i| format!("SELECT * FROM t{}", i)).collect();

    group.bench_function("insert_evicting", |b| {
        let mut cache: BoundedCache<String, usize> = BoundedCache::new(256);
        let mut i = 0;
        b.iter(|| {
            let key = keys[i % keys.len()].clone();
            black_box(cache.insert(key, i));
            i += 1;
        })
    });

    group.bench_function("get_hit", |b| {
        let mut cache: BoundedCache<String, usize> = BoundedCache::new(256);
        for (i, key) in keys.iter().take(256).enumerate() {
            cache.insert(key.clone(), i);
        }
        let mut i = 0;
        b.iter(|| {
            black_box(cache.get(keys[i % 256].as_str()).copied());
            i += 1;
        })
    });

    group.finish();
}

// ============================================================================
// Authentication
// ============================================================================

fn auth_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("auth");

    group.bench_function("scramble_native", |b| {
        b.iter(|| scramble_native(black_box(b"correct horse battery staple"), SALT))
    });
    group.bench_function("scramble_caching_sha2", |b| {
        b.iter(|| scramble_caching_sha2(black_box(b"correct horse battery staple"), SALT))
    });

    group.finish();
}

// ============================================================================
// Protocol
// ============================================================================

fn text_row(columns: usize) -> Bytes {
    let mut buf = BytesMut::new();
    for i in 0..columns {
        let value = format!("value-{}", i);
        buf.put_u8(value.len() as u8);
        buf.put_slice(value.as_bytes());
    }
    buf.freeze()
}

fn protocol_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("protocol");

    for size in [64usize, 4096, 65536] {
        let payload = vec![0x5Au8; size];
        let mut framed = BytesMut::new();
        let mut sequence = 0;
        encode_packet(&mut framed, &mut sequence, &payload);

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("decode_packet", size), &framed, |b, framed| {
            b.iter(|| decode_packet(black_box(framed)))
        });
        group.bench_with_input(BenchmarkId::new("encode_packet", size), &payload, |b, payload| {
            b.iter(|| {
                let mut out = BytesMut::with_capacity(payload.len() + 4);
                let mut sequence = 0;
                encode_packet(&mut out, &mut sequence, black_box(payload));
                out
            })
        });
    }

    for columns in [4usize, 32] {
        let row = text_row(columns);
        group.throughput(Throughput::Elements(columns as u64));
        group.bench_with_input(BenchmarkId::new("decode_text_row", columns), &row, |b, row| {
            b.iter(|| decode_text_row(black_box(row), columns))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    statement_benchmarks,
    cache_benchmarks,
    auth_benchmarks,
    protocol_benchmarks
);
criterion_main!(benches);
