//! Audio data types shared by the decode path and the renderer

/// Engine sample rate preferred when the output device allows it
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// Frames rendered between command drains on the audio thread
pub const RENDER_QUANTUM_FRAMES: usize = 128;

/// Samples that must be buffered before a unit starts: half a second
pub fn start_threshold_samples(sample_rate: u32) -> usize {
    (sample_rate / 2) as usize
}

/// Immutable block of mono PCM samples on its way to the renderer
///
/// Once built a chunk is only read. The renderer copies samples into its
/// playback buffer and drops the chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    sequence: u64,
    samples: Vec<f32>,
}

impl AudioChunk {
    pub fn new(sequence: u64, samples: Vec<f32>) -> Self {
        Self { sequence, samples }
    }

    /// Position of this chunk within its sentence
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Give up the chunk, keeping its allocation
    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Split decoded samples into renderer-sized chunks
pub fn into_chunks(samples: Vec<f32>, chunk_samples: usize) -> Vec<AudioChunk> {
    let chunk_samples = chunk_samples.max(1);
    samples
        .chunks(chunk_samples)
        .enumerate()
        .map(|(i, block)| AudioChunk::new(i as u64, block.to_vec()))
        .collect()
}

/// Mono PCM at a known sample rate
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.samples.len() as u64 * 1000 / self.sample_rate as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_threshold_is_half_second() {
        assert_eq!(start_threshold_samples(44100), 22050);
        assert_eq!(start_threshold_samples(48000), 24000);
    }

    #[test]
    fn test_into_chunks_preserves_order_and_tail() {
        let samples: Vec<f32> = (0..10).map(|i| i as f32).collect();
        let chunks = into_chunks(samples, 4);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].samples(), &[0.0, 1.0, 2.0, 3.0]);
        assert_eq!(chunks[2].samples(), &[8.0, 9.0]);
        assert_eq!(chunks[2].sequence(), 2);
        assert!(into_chunks(Vec::new(), 4).is_empty());
    }

    #[test]
    fn test_duration_ms() {
        let audio = DecodedAudio {
            samples: vec![0.0; 22050],
            sample_rate: 44100,
        };
        assert_eq!(audio.duration_ms(), 500);
    }
}
