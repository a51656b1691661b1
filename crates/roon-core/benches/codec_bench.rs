//! Criterion benchmarks for the SOOD datagram codec.
//!
//! Run with:
//! ```bash
//! cargo bench --package roon-core --bench codec_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use roon_core::protocol::codec::{decode_message, encode_query, encode_response};
use roon_core::protocol::messages::{DiscoveryQuery, ServiceAnnouncement};

fn make_announcement() -> ServiceAnnouncement {
    ServiceAnnouncement {
        unique_id: "c0ffee00-1111-2222-3333-444455556666".to_string(),
        display_name: "Living Room Core".to_string(),
        version: "2.0 (build 1470) production".to_string(),
        host: Some("192.168.1.10".parse().unwrap()),
        port: Some(9100),
        transaction_id: Some("3f1e9a52-7d64-4d7e-9b1a-0c2d3e4f5a6b".to_string()),
    }
}

fn bench_encode(c: &mut Criterion) {
    let query = DiscoveryQuery::roon_core();
    let announcement = make_announcement();

    c.bench_function("encode/query", |b| {
        b.iter(|| encode_query(black_box(&query)).unwrap())
    });
    c.bench_function("encode/response", |b| {
        b.iter(|| encode_response(black_box(&announcement)).unwrap())
    });
}

fn bench_decode(c: &mut Criterion) {
    let bytes = encode_response(&make_announcement()).unwrap();
    let foreign = b"M-SEARCH * HTTP/1.1\r\nHOST: 239.255.255.250:1900\r\n\r\n".to_vec();

    c.bench_function("decode/response", |b| {
        b.iter(|| decode_message(black_box(&bytes)).unwrap())
    });
    // Rejecting foreign traffic must stay cheap: it is the common case on a busy LAN.
    c.bench_function("decode/foreign", |b| {
        b.iter(|| decode_message(black_box(&foreign)).is_err())
    });
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
