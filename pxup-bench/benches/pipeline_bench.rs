//! Streaming decode-and-apply benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pxup_core::{MemorySurface, Surface};
use pxup_protocol::{Packet, PixelEntry, RunEntry};
use pxup_server::{FrameDecoder, FramedReader, Session};
use tokio::runtime::Runtime;

const WIDTH: u16 = 280;
const HEIGHT: u16 = 240;

fn pixel_stream(frames: u32, entries: usize) -> Vec<u8> {
    let pixels: Vec<PixelEntry> = (0..entries)
        .map(|i| PixelEntry::new((i % 280) as u16, (i / 280 % 240) as u16, i as u16))
        .collect();
    let mut stream = Vec::new();
    for frame_id in 0..frames {
        stream.extend_from_slice(&Packet::pixels(frame_id, &pixels).unwrap().encode());
    }
    stream
}

fn run_stream(frames: u32) -> Vec<u8> {
    let runs: Vec<RunEntry> = (0..HEIGHT)
        .map(|y| RunEntry::new(y, 0, WIDTH, 0xFFFF))
        .collect();
    let mut stream = Vec::new();
    for frame_id in 0..frames {
        stream.extend_from_slice(&Packet::runs(frame_id, &runs).unwrap().encode());
    }
    stream
}

async fn drain(stream: &[u8]) -> u64 {
    let mut reader = FramedReader::new(stream);
    let mut surface = MemorySurface::new(WIDTH, HEIGHT);
    let decoder = FrameDecoder::for_surface(surface.area(), None);
    let mut session = Session::default();
    session.attach(([127, 0, 0, 1], 9000).into());

    while let Some(report) = session
        .next_frame(&mut reader, &decoder, &mut surface)
        .await
        .unwrap()
    {
        black_box(report);
    }
    surface.pixels_written()
}

fn bench_pixel_pipeline(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("pixel_pipeline");

    for entries in [64, 1024, 8192] {
        let stream = pixel_stream(16, entries);

        group.throughput(Throughput::Bytes(stream.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(entries), &stream, |b, stream| {
            b.to_async(&rt).iter(|| async { black_box(drain(stream).await) });
        });
    }

    group.finish();
}

fn bench_run_pipeline(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("run_pipeline");
    let stream = run_stream(16);

    group.throughput(Throughput::Bytes(stream.len() as u64));
    group.bench_function("full_rows", |b| {
        b.to_async(&rt)
            .iter(|| async { black_box(drain(&stream).await) });
    });

    group.finish();
}

criterion_group!(benches, bench_pixel_pipeline, bench_run_pipeline);
criterion_main!(benches);
