//! Benchmarks for batch planning and engine progress parsing
//!
//! Planning runs on every conversion request; progress parsing runs on every
//! line an engine prints.

use batchforge::conversion::{BatchRun, RunConfig};
use batchforge_av::progress::{FfmpegProgressParser, HandBrakeProgressParser, ProgressParser};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn file_names(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("reel_{i:05}.MXF")).collect()
}

fn bench_plan(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan");

    for &files in &[10usize, 1_000, 10_000] {
        let names = file_names(files);
        for &batch_size in &[1usize, 5, 50] {
            let config = RunConfig::new("/srv/input", "/srv/output").with_batch_size(batch_size);
            group.bench_with_input(
                BenchmarkId::new(format!("{files}_files"), batch_size),
                &names,
                |b, names| b.iter(|| BatchRun::plan(black_box(names), black_box(&config))),
            );
        }
    }

    group.finish();
}

fn bench_progress(c: &mut Criterion) {
    let handbrake_lines: Vec<String> = (0..100)
        .map(|i| {
            format!(
                "Encoding: task 1 of 2, {i}.42 % (87.31 fps, avg 91.02 fps, ETA 00h{:02}m{:02}s)",
                i % 60,
                (i * 7) % 60
            )
        })
        .collect();

    c.bench_function("handbrake_progress_100_lines", |b| {
        b.iter(|| {
            let mut parser = HandBrakeProgressParser;
            for line in &handbrake_lines {
                black_box(parser.parse_line(black_box(line)));
            }
        })
    });

    let mut ffmpeg_lines = Vec::new();
    for i in 0..100u64 {
        ffmpeg_lines.push(format!("frame={}", i * 25));
        ffmpeg_lines.push(format!("out_time_us={}", i * 1_000_000));
        ffmpeg_lines.push("speed=2.5x".to_string());
        ffmpeg_lines.push("progress=continue".to_string());
    }

    c.bench_function("ffmpeg_progress_100_blocks", |b| {
        b.iter(|| {
            let mut parser = FfmpegProgressParser::new(Some(120.0));
            for line in &ffmpeg_lines {
                black_box(parser.parse_line(black_box(line)));
            }
        })
    });
}

criterion_group!(benches, bench_plan, bench_progress);
criterion_main!(benches);
