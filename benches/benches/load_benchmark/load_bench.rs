use std::{hint::black_box, io::Cursor};

use bytes::Bytes;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rdbkit::{
    load_reader,
    rdb::{
        packed::{parse_listpack, parse_ziplist},
        read_value, ByteSource, DecodeLimits, CRC64_REDIS,
    },
    CountHandler, LoadOptions, ValueType,
};

fn length(n: usize) -> Vec<u8> {
    if n < 1 << 6 {
        vec![n as u8]
    } else if n < 1 << 14 {
        vec![0x40 | (n >> 8) as u8, n as u8]
    } else {
        let mut out = vec![0x80];
        out.extend_from_slice(&(n as u32).to_be_bytes());
        out
    }
}

fn raw(s: &[u8]) -> Vec<u8> {
    let mut out = length(s.len());
    out.extend_from_slice(s);
    out
}

/// Listpack из коротких строк.
fn listpack(items: &[String]) -> Vec<u8> {
    let mut body = Vec::new();
    for item in items {
        body.push(0x80 | item.len() as u8);
        body.extend_from_slice(item.as_bytes());
        body.push(1 + item.len() as u8);
    }
    let total = 6 + body.len() + 1;
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&(total as u32).to_le_bytes());
    out.extend_from_slice(&(items.len() as u16).to_le_bytes());
    out.extend(body);
    out.push(0xFF);
    out
}

/// Ziplist из коротких строк.
fn ziplist(items: &[String]) -> Vec<u8> {
    let mut body = Vec::new();
    let mut prev = 0usize;
    let mut tail = 10usize;
    for item in items {
        let start = body.len();
        tail = 10 + start;
        body.push(prev as u8);
        body.push(item.len() as u8);
        body.extend_from_slice(item.as_bytes());
        prev = body.len() - start;
    }
    let total = 10 + body.len() + 1;
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&(total as u32).to_le_bytes());
    out.extend_from_slice(&(tail as u32).to_le_bytes());
    out.extend_from_slice(&(items.len() as u16).to_le_bytes());
    out.extend(body);
    out.push(0xFF);
    out
}

fn members(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("member:{i:05}")).collect()
}

/// Синтетический снимок: строки, списки, хэши и listpack-множества.
fn snapshot(keys: usize) -> Vec<u8> {
    let mut buf = b"REDIS0011".to_vec();
    buf.push(0xFA);
    buf.extend(raw(b"redis-ver"));
    buf.extend(raw(b"7.2.4"));
    buf.push(0xFE);
    buf.push(0);
    let set_blob = listpack(&members(32));
    for i in 0..keys {
        let key = format!("key:{i:08}");
        match i % 4 {
            0 => {
                buf.push(0);
                buf.extend(raw(key.as_bytes()));
                buf.extend(raw(format!("value-{i}-{}", "x".repeat(i % 64)).as_bytes()));
            }
            1 => {
                buf.push(0xFC);
                buf.extend_from_slice(&(1_700_000_000_000u64 + i as u64).to_le_bytes());
                buf.push(0);
                buf.extend(raw(key.as_bytes()));
                buf.extend_from_slice(&[0xC2]);
                buf.extend_from_slice(&(i as i32).to_le_bytes());
            }
            2 => {
                buf.push(4);
                buf.extend(raw(key.as_bytes()));
                buf.extend(length(8));
                for f in 0..8 {
                    buf.extend(raw(format!("field{f}").as_bytes()));
                    buf.extend(raw(format!("{i}:{f}").as_bytes()));
                }
            }
            _ => {
                buf.push(20);
                buf.extend(raw(key.as_bytes()));
                buf.extend(raw(&set_blob));
            }
        }
    }
    buf.push(0xFF);
    let crc = CRC64_REDIS.checksum(&buf);
    buf.extend_from_slice(&crc.to_le_bytes());
    buf
}

fn bench_load_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("load_reader");
    for keys in [1_000usize, 10_000] {
        let data = snapshot(keys);
        group.throughput(Throughput::Bytes(data.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(keys), &data, |b, data| {
            b.iter(|| {
                let mut counter = CountHandler::new();
                load_reader(Cursor::new(black_box(data)), &LoadOptions::default(), &mut counter)
                    .unwrap();
                counter.total_keys()
            })
        });
    }
    group.finish();
}

fn bench_packed_parsers(c: &mut Criterion) {
    let items = members(128);
    let lp = Bytes::from(listpack(&items));
    let zl = Bytes::from(ziplist(&items));

    c.bench_function("parse_listpack 128", |b| {
        b.iter(|| parse_listpack(black_box(&lp)).unwrap())
    });
    c.bench_function("parse_ziplist 128", |b| {
        b.iter(|| parse_ziplist(black_box(&zl)).unwrap())
    });
}

fn bench_read_value(c: &mut Criterion) {
    let items = members(64);
    let mut list = length(items.len());
    for item in &items {
        list.extend(raw(item.as_bytes()));
    }
    let set = raw(&listpack(&items));
    let limits = DecodeLimits::default();

    c.bench_function("read_value list 64", |b| {
        b.iter(|| {
            let mut src = ByteSource::new(Cursor::new(black_box(&list)));
            read_value(&mut src, ValueType::List, &limits).unwrap()
        })
    });
    c.bench_function("read_value set-listpack 64", |b| {
        b.iter(|| {
            let mut src = ByteSource::new(Cursor::new(black_box(&set)));
            read_value(&mut src, ValueType::SetListpack, &limits).unwrap()
        })
    });
}

criterion_group!(
    benches,
    bench_load_snapshot,
    bench_packed_parsers,
    bench_read_value
);
criterion_main!(benches);
