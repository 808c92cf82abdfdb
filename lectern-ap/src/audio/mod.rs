//! Audio I/O: provider audio decoding, resampling and device output

pub mod decoder;
pub mod output;
pub mod resampler;
pub mod types;

pub use decoder::AudioDecoder;
pub use output::AudioOutput;
pub use resampler::Resampler;
pub use types::{AudioChunk, DecodedAudio, DEFAULT_SAMPLE_RATE, RENDER_QUANTUM_FRAMES};
