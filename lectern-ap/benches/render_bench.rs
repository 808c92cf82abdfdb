//! Render Path Performance Benchmark
//!
//! Measures the audio-thread work per second of output and the decode step
//! that sits between the provider and the renderer.
//!
//! **Goal:** Rendering one second of audio should take well under 1 ms
//! **Target:** >1000x realtime

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use hound::{SampleFormat, WavSpec, WavWriter};
use lectern_ap::audio::types::{into_chunks, DEFAULT_SAMPLE_RATE};
use lectern_ap::audio::AudioDecoder;
use lectern_ap::playback::{renderer_channel, StreamingPlaybackBuffer};
use std::io::Cursor;

const ONE_SECOND: usize = DEFAULT_SAMPLE_RATE as usize;

fn wav_bytes(sample_rate: u32, seconds: u32) -> Vec<u8> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
        for i in 0..sample_rate * seconds {
            writer.write_sample(((i % 200) as i16 - 100) * 100).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

fn bench_streaming_buffer(c: &mut Criterion) {
    let mut group = c.benchmark_group("streaming_buffer");
    group.throughput(Throughput::Elements(ONE_SECOND as u64));

    for rate in [1.0, 1.37, 2.0] {
        group.bench_with_input(BenchmarkId::new("render_1s", rate), &rate, |b, &rate| {
            let samples = vec![0.25f32; ONE_SECOND * 2];
            b.iter(|| {
                let mut buffer = StreamingPlaybackBuffer::for_sample_rate(DEFAULT_SAMPLE_RATE);
                buffer.set_playback_rate(rate);
                buffer.append(&samples);
                buffer.mark_complete();
                let mut acc = 0.0f32;
                for _ in 0..ONE_SECOND {
                    acc += buffer.render_sample();
                }
                black_box(acc);
            });
        });
    }

    group.finish();
}

fn bench_renderer(c: &mut Criterion) {
    let mut group = c.benchmark_group("renderer");
    group.throughput(Throughput::Elements(ONE_SECOND as u64));

    group.bench_function("command_drain_and_render_1s_stereo", |b| {
        let samples = vec![0.25f32; ONE_SECOND];
        let mut out = vec![0.0f32; 512 * 2];

        b.iter(|| {
            let (mut handle, mut renderer, _events) = renderer_channel(
                DEFAULT_SAMPLE_RATE,
                StreamingPlaybackBuffer::for_sample_rate(DEFAULT_SAMPLE_RATE),
            );
            handle.reset();
            for chunk in into_chunks(samples.clone(), 4096) {
                handle.append(chunk);
            }
            handle.complete();

            for _ in 0..(ONE_SECOND / 512) {
                renderer.render_interleaved(black_box(&mut out), 2);
            }
            black_box(&out);
        });
    });

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_for_playback");
    group.sample_size(20);

    for source_rate in [22050u32, 44100] {
        let bytes = wav_bytes(source_rate, 2);
        group.bench_with_input(
            BenchmarkId::new("wav_2s", source_rate),
            &bytes,
            |b, bytes| {
                b.iter(|| {
                    let samples = AudioDecoder::decode_for_playback(black_box(bytes), DEFAULT_SAMPLE_RATE)
                        .unwrap();
                    black_box(samples.len());
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_streaming_buffer, bench_renderer, bench_decode);
criterion_main!(benches);
