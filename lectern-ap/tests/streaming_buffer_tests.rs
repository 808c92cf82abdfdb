//! Streaming buffer behaviour under mixed append/render sequences

use lectern_ap::playback::{StreamingPlaybackBuffer, MAX_PLAYBACK_RATE, MIN_PLAYBACK_RATE};

/// Deterministic chunk sizes in 1..=stride without a random source
fn chunk_sizes(seed: usize, count: usize, stride: usize) -> Vec<usize> {
    (0..count)
        .map(|i| ((seed * 31 + i * 17) % stride) + 1)
        .collect()
}

fn drain(buffer: &mut StreamingPlaybackBuffer, limit: usize) -> usize {
    let mut frames = 0;
    while !buffer.take_ended() && frames < limit {
        buffer.render_sample();
        frames += 1;
    }
    frames
}

#[test]
fn test_read_never_passes_write() {
    for (seed, rate) in [(1, 1.0), (2, 0.5), (3, 1.37), (4, 2.0)] {
        let mut buffer = StreamingPlaybackBuffer::new(64, 100);
        buffer.set_playback_rate(rate);

        for size in chunk_sizes(seed, 200, 97) {
            buffer.append(&vec![0.25; size]);
            for _ in 0..(size / 2 + seed) {
                buffer.render_sample();
                let p = buffer.progress();
                assert!(p.read_pos <= p.write_pos as f64, "rate {}: {:?}", rate, p);
                assert!(p.progress <= 1.0);
            }
        }
    }
}

#[test]
fn test_rate_always_clamped() {
    let mut buffer = StreamingPlaybackBuffer::new(16, 1);
    for requested in [-3.0, 0.0, 0.49, 0.5, 1.0, 1.99, 2.0, 2.01, 100.0] {
        let applied = buffer.set_playback_rate(requested);
        assert!((MIN_PLAYBACK_RATE..=MAX_PLAYBACK_RATE).contains(&applied));
    }
    assert_eq!(buffer.set_playback_rate(f64::INFINITY), MAX_PLAYBACK_RATE);
}

#[test]
fn test_started_once_at_threshold() {
    let mut buffer = StreamingPlaybackBuffer::new(32, 500);
    let mut starts = 0;
    let mut appended = 0;

    for size in chunk_sizes(7, 60, 40) {
        if buffer.append(&vec![0.1; size]) {
            starts += 1;
            assert!(appended + size >= 500);
            assert!(appended < 500);
        }
        appended += size;
    }
    if buffer.mark_complete() {
        starts += 1;
    }

    assert_eq!(starts, 1);
}

#[test]
fn test_ended_once_per_unit() {
    let mut buffer = StreamingPlaybackBuffer::new(32, 10);
    buffer.append(&[0.5; 40]);
    buffer.mark_complete();

    let mut ended = 0;
    for _ in 0..200 {
        buffer.render_sample();
        if buffer.take_ended() {
            ended += 1;
        }
    }
    assert_eq!(ended, 1);

    buffer.reset();
    buffer.append(&[0.5; 40]);
    buffer.mark_complete();
    assert_eq!(drain(&mut buffer, 1000), 40);
}

#[test]
fn test_unit_speed_consumes_one_sample_per_frame() {
    let mut buffer = StreamingPlaybackBuffer::new(1024, 4410);
    buffer.append(&vec![0.2; 10_000]);
    buffer.mark_complete();

    let frames = drain(&mut buffer, 100_000);
    assert_eq!(frames, 10_000);
    assert_eq!(buffer.progress().samples_consumed, 10_000);
}

#[test]
fn test_double_speed_halves_frames() {
    let mut buffer = StreamingPlaybackBuffer::new(1024, 4410);
    buffer.set_playback_rate(2.0);
    buffer.append(&vec![0.2; 10_000]);
    buffer.mark_complete();

    let frames = drain(&mut buffer, 100_000);
    assert!((4999..=5001).contains(&frames), "frames = {}", frames);
}

#[test]
fn test_half_speed_doubles_frames() {
    let mut buffer = StreamingPlaybackBuffer::new(1024, 100);
    buffer.set_playback_rate(0.5);
    buffer.append(&vec![0.2; 1_000]);
    buffer.mark_complete();

    let frames = drain(&mut buffer, 100_000);
    assert!((1998..=2001).contains(&frames), "frames = {}", frames);
}

#[test]
fn test_growth_preserves_every_sample() {
    let mut buffer = StreamingPlaybackBuffer::new(8, 1);
    let ramp: Vec<f32> = (0..5_000).map(|i| i as f32).collect();
    for chunk in ramp.chunks(333) {
        buffer.append(chunk);
    }
    buffer.mark_complete();
    assert!(buffer.capacity() >= 5_000);

    for expected in 0..5_000 {
        assert_eq!(buffer.render_sample(), expected as f32);
    }
    assert!(buffer.take_ended());
}
