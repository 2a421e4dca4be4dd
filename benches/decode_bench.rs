use std::collections::VecDeque;
use std::io;

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::io::Write;
use stream_unzip::{ChunkSource, ZipDecoder};

fn generate_compressible_data(size: usize) -> Vec<u8> {
    let pattern = b"The quick brown fox jumps over the lazy dog. ";
    let mut data = Vec::with_capacity(size);
    while data.len() < size {
        data.extend_from_slice(pattern);
    }
    data.truncate(size);
    data
}

fn push_local_header(
    out: &mut Vec<u8>,
    method: u16,
    compressed_size: u32,
    uncompressed_size: u32,
    name: &[u8],
) {
    out.extend_from_slice(&0x0403_4b50u32.to_le_bytes());
    out.extend_from_slice(&20u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&method.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&compressed_size.to_le_bytes());
    out.extend_from_slice(&uncompressed_size.to_le_bytes());
    out.extend_from_slice(&(name.len() as u16).to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(name);
}

fn build_stored_archive(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    push_local_header(&mut out, 0, data.len() as u32, data.len() as u32, b"bench.bin");
    out.extend_from_slice(data);
    out
}

fn build_deflate_archive(data: &[u8]) -> Vec<u8> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    let compressed = encoder.finish().unwrap();
    let mut out = Vec::new();
    push_local_header(
        &mut out,
        8,
        compressed.len() as u32,
        data.len() as u32,
        b"bench.bin",
    );
    out.extend_from_slice(&compressed);
    out
}

/// Hands the whole archive over in a single producer chunk; benchmarks are
/// about decode throughput, not chunk-boundary handling (that's covered by
/// the chunking-invariance integration tests).
struct SingleChunkSource(VecDeque<Bytes>);

impl SingleChunkSource {
    fn new(bytes: Vec<u8>) -> Self {
        let mut queue = VecDeque::new();
        queue.push_back(Bytes::from(bytes));
        Self(queue)
    }
}

impl ChunkSource for SingleChunkSource {
    fn next_chunk(&mut self) -> Option<io::Result<Bytes>> {
        self.0.pop_front().map(Ok)
    }
}

fn drain(archive: Vec<u8>) -> usize {
    let mut decoder = ZipDecoder::new(SingleChunkSource::new(archive));
    let mut total = 0usize;
    while let Some(mut member) = decoder.next_member().unwrap() {
        while let Some(chunk) = member.next_chunk().unwrap() {
            total += chunk.len();
        }
    }
    total
}

fn format_size(bytes: usize) -> String {
    if bytes >= 1024 * 1024 {
        format!("{}MB", bytes / (1024 * 1024))
    } else {
        format!("{}KB", bytes / 1024)
    }
}

fn bench_decode_stored(c: &mut Criterion) {
    let sizes = [100 * 1024, 1024 * 1024, 10 * 1024 * 1024];
    for size in sizes {
        let mut group = c.benchmark_group(format!("decode_stored_{}", format_size(size)));
        group.throughput(Throughput::Bytes(size as u64));
        let data = generate_compressible_data(size);
        let archive = build_stored_archive(&data);
        group.bench_with_input(BenchmarkId::from_parameter(size), &archive, |b, archive| {
            b.iter(|| black_box(drain(archive.clone())));
        });
        group.finish();
    }
}

fn bench_decode_deflate(c: &mut Criterion) {
    let sizes = [100 * 1024, 1024 * 1024, 10 * 1024 * 1024];
    for size in sizes {
        let mut group = c.benchmark_group(format!("decode_deflate_{}", format_size(size)));
        group.throughput(Throughput::Bytes(size as u64));
        let data = generate_compressible_data(size);
        let archive = build_deflate_archive(&data);
        group.bench_with_input(BenchmarkId::from_parameter(size), &archive, |b, archive| {
            b.iter(|| black_box(drain(archive.clone())));
        });
        group.finish();
    }
}

criterion_group!(benches, bench_decode_stored, bench_decode_deflate);
criterion_main!(benches);
