//! SSL channel benchmarks
//!
//! This benchmark suite measures:
//! - IoBuffer fill/drain cycles
//! - Encrypted writes of 1KB to 256KB into a discarding transport
//! - Write plus read through a connected pair
//!
//! Run with: cargo bench --bench write_path

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ssl_channel::io::{IoBuffer, IoState, ReadableChannel, WritableChannel};
use ssl_channel::ssl::{
    HandshakeProgress, InlineTaskRunner, OpenSslEngine, SslConnection, TlsConfig, TlsVersion,
};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

/// In-memory one-way channel; with `discard` set, writes are dropped
#[derive(Clone, Default)]
struct BenchPipe {
    queue: Rc<RefCell<VecDeque<u8>>>,
    discard: bool,
}

impl WritableChannel for BenchPipe {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.discard {
            self.queue.borrow_mut().extend(buf);
        }
        Ok(buf.len())
    }

    fn is_open(&self) -> bool {
        true
    }
}

impl ReadableChannel for BenchPipe {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut queue = self.queue.borrow_mut();
        if queue.is_empty() {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        let n = buf.len().min(queue.len());
        for (out, b) in buf.iter_mut().zip(queue.drain(..n)) {
            *out = b;
        }
        Ok(n)
    }

    fn is_open(&self) -> bool {
        true
    }
}

type BenchConnection = SslConnection<OpenSslEngine, BenchPipe, BenchPipe>;

fn connected_pair() -> (BenchConnection, BenchConnection) {
    let server_cfg = TlsConfig::server()
        .unwrap()
        .version(TlsVersion::Tls13)
        .unwrap()
        .build()
        .unwrap();
    let client_cfg = TlsConfig::client()
        .unwrap()
        .version(TlsVersion::Tls13)
        .unwrap()
        .servername("localhost")
        .build()
        .unwrap();

    let to_server = BenchPipe::default();
    let to_client = BenchPipe::default();
    let mut client = SslConnection::new(
        client_cfg.new_engine().unwrap(),
        to_client.clone(),
        to_server.clone(),
        Arc::new(InlineTaskRunner),
    );
    let mut server = SslConnection::new(
        server_cfg.new_engine().unwrap(),
        to_server,
        to_client,
        Arc::new(InlineTaskRunner),
    );

    for _ in 0..50 {
        let c = client.handshake().unwrap();
        let s = server.handshake().unwrap();
        if c == HandshakeProgress::Complete && s == HandshakeProgress::Complete {
            break;
        }
    }
    // Let the client absorb post-handshake messages.
    client.read(&mut Vec::<u8>::new()).unwrap();

    client.outbound_state().set(IoState::Processing);
    server.outbound_state().set(IoState::Processing);
    (client, server)
}

fn bench_io_buffer(c: &mut Criterion) {
    let mut group = c.benchmark_group("io_buffer");
    let chunk = vec![0xabu8; 4096];

    group.throughput(Throughput::Bytes(chunk.len() as u64));
    group.bench_function("fill_drain_4k", |b| {
        let mut buffer = IoBuffer::with_capacity(16_709);
        b.iter(|| {
            let slot = buffer.fill_slot();
            slot[..chunk.len()].copy_from_slice(&chunk);
            buffer.commit(chunk.len());
            buffer.finish_fill();
            black_box(buffer.pending());
            buffer.consume(chunk.len());
            buffer.clear().unwrap();
        });
    });

    group.finish();
}

fn bench_encrypted_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("encrypted_write");

    for size in [1024usize, 16 * 1024, 256 * 1024] {
        let data = vec![0x42u8; size];
        let (mut client, _server) = connected_pair();
        client.writable_mut().channel_mut().discard = true;

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &data, |b, data| {
            b.iter(|| {
                let mut src = &data[..];
                while !src.is_empty() {
                    client.write(&mut src).unwrap();
                }
                black_box(client.writable().pending());
            });
        });
    }

    group.finish();
}

fn bench_write_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("write_read");

    for size in [1024usize, 64 * 1024] {
        let data = vec![0x17u8; size];
        let (mut client, mut server) = connected_pair();
        let mut received: Vec<u8> = Vec::with_capacity(size);

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &data, |b, data| {
            b.iter(|| {
                let mut src = &data[..];
                while !src.is_empty() {
                    client.write(&mut src).unwrap();
                }
                received.clear();
                while received.len() < data.len() {
                    server.read(&mut received).unwrap();
                }
                black_box(&received);
            });
        });
    }

    group.finish();
}

criterion_group! {
    name = buffers;
    config = Criterion::default()
        .measurement_time(Duration::from_secs(5))
        .sample_size(1000);
    targets = bench_io_buffer
}

criterion_group! {
    name = transfers;
    config = Criterion::default()
        .measurement_time(Duration::from_secs(10))
        .sample_size(100);
    targets = bench_encrypted_write, bench_write_read
}

criterion_main!(buffers, transfers);
