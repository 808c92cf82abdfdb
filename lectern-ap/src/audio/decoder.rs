//! Provider audio decoding using symphonia
//!
//! Speech providers return an encoded container (WAV, MP3, FLAC, Ogg
//! Vorbis, AAC). The bytes are decoded in memory, downmixed to mono and
//! resampled to the engine rate. This runs on the blocking thread pool; the
//! renderer only ever sees finished chunks.

use crate::audio::resampler::Resampler;
use crate::audio::types::DecodedAudio;
use crate::error::{Error, Result};
use std::io::Cursor;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// In-memory decoder for provider audio
pub struct AudioDecoder;

impl AudioDecoder {
    /// Decode an encoded audio blob to mono f32 at its native rate.
    ///
    /// # Errors
    /// - Unrecognized container or codec
    /// - No audio track or unknown sample rate
    /// - The stream decoded to zero samples
    pub fn decode_bytes(bytes: &[u8]) -> Result<DecodedAudio> {
        if bytes.is_empty() {
            return Err(Error::Decode("Empty audio payload".to_string()));
        }

        let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());

        let probed = symphonia::default::get_probe()
            .format(
                &Hint::new(),
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| Error::Decode(format!("Failed to probe format: {}", e)))?;

        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::Decode("No audio track found".to_string()))?;

        let track_id = track.id;
        let codec_params = track.codec_params.clone();
        let sample_rate = codec_params
            .sample_rate
            .ok_or_else(|| Error::Decode("Sample rate not found".to_string()))?;

        let mut decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| Error::Decode(format!("Failed to create decoder: {}", e)))?;

        let mut samples = Vec::new();
        let mut sample_buf: Option<SampleBuffer<f32>> = None;

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => {
                    warn!("Error reading packet: {}", e);
                    break;
                }
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!("Decode error: {}", e);
                    continue;
                }
                Err(e) => return Err(Error::Decode(format!("Decoder failed: {}", e))),
            };

            let spec = *decoded.spec();
            let channels = spec.channels.count().max(1);

            let needs_alloc = sample_buf
                .as_ref()
                .map_or(true, |buf| buf.capacity() < decoded.capacity() * channels);
            if needs_alloc {
                sample_buf = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
            }
            let Some(buf) = sample_buf.as_mut() else {
                continue;
            };
            buf.copy_interleaved_ref(decoded);

            downmix_into(buf.samples(), channels, &mut samples);
        }

        if samples.is_empty() {
            return Err(Error::Decode("Audio stream contained no samples".to_string()));
        }

        debug!("Decoded {} mono samples at {}Hz", samples.len(), sample_rate);
        Ok(DecodedAudio {
            samples,
            sample_rate,
        })
    }

    /// Decode and convert to mono at `target_rate`
    pub fn decode_for_playback(bytes: &[u8], target_rate: u32) -> Result<Vec<f32>> {
        let decoded = Self::decode_bytes(bytes)?;
        Resampler::resample(&decoded.samples, decoded.sample_rate, target_rate, 1)
    }
}

/// Average interleaved channels into mono
fn downmix_into(interleaved: &[f32], channels: usize, out: &mut Vec<f32>) {
    if channels == 1 {
        out.extend_from_slice(interleaved);
        return;
    }

    let scale = 1.0 / channels as f32;
    out.extend(
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() * scale),
    );
}
