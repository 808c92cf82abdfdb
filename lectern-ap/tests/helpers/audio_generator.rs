//! In-memory WAV generation for provider mocks and decoder fixtures

use hound::{SampleFormat, WavSpec, WavWriter};
use std::f32::consts::PI;
use std::io::Cursor;

/// Mono 16-bit sine wave as WAV bytes
pub fn sine_wav(sample_rate: u32, duration_ms: u64, frequency_hz: f32) -> Vec<u8> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let frames = sample_rate as u64 * duration_ms / 1000;
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec).expect("wav writer");
        for i in 0..frames {
            let t = i as f32 / sample_rate as f32;
            let sample = (2.0 * PI * frequency_hz * t).sin() * 0.5;
            writer
                .write_sample((sample * i16::MAX as f32) as i16)
                .expect("write sample");
        }
        writer.finalize().expect("finalize wav");
    }
    cursor.into_inner()
}

/// Number of frames `sine_wav` produces
pub fn frames_for(sample_rate: u32, duration_ms: u64) -> usize {
    (sample_rate as u64 * duration_ms / 1000) as usize
}
