//! Audio output using cpal
//!
//! Opens the output device and drives the [`Renderer`] from the device
//! callback. The renderer produces mono; each frame is copied to every
//! device channel.

use crate::error::{Error, Result};
use crate::playback::renderer::Renderer;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Sample, SampleFormat, Stream, StreamConfig};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Audio output manager using cpal.
pub struct AudioOutput {
    device: Device,
    device_name: String,
    config: StreamConfig,
    sample_format: SampleFormat,
    stream: Option<Stream>,
    error_count: Arc<AtomicU32>,
}

impl AudioOutput {
    /// List available audio output devices.
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();

        let devices: Vec<String> = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?
            .filter_map(|device| device.name().ok())
            .collect();

        debug!("Found {} output devices", devices.len());
        Ok(devices)
    }

    /// Open an output device, falling back to the default device when the
    /// requested one is missing.
    pub fn new(device_name: Option<&str>, preferred_rate: u32) -> Result<Self> {
        let host = cpal::default_host();

        let requested = match device_name {
            Some(name) => host
                .output_devices()
                .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?
                .find(|d| d.name().ok().as_deref() == Some(name)),
            None => None,
        };

        let device = match (requested, device_name) {
            (Some(device), Some(name)) => {
                info!("Found requested audio device: {}", name);
                device
            }
            (_, requested_name) => {
                if let Some(name) = requested_name {
                    warn!("Requested device '{}' not found, falling back to default device", name);
                }
                host.default_output_device()
                    .ok_or_else(|| Error::AudioOutput("No default output device found".to_string()))?
            }
        };

        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        let (config, sample_format) = Self::get_best_config(&device, preferred_rate)?;

        info!(
            "Audio device '{}': sample_rate={}, channels={}, format={:?}",
            device_name, config.sample_rate.0, config.channels, sample_format
        );

        Ok(Self {
            device,
            device_name,
            config,
            sample_format,
            stream: None,
            error_count: Arc::new(AtomicU32::new(0)),
        })
    }

    /// Prefer `preferred_rate` f32 at any channel count, else the device default.
    fn get_best_config(device: &Device, preferred_rate: u32) -> Result<(StreamConfig, SampleFormat)> {
        let mut supported_configs = device
            .supported_output_configs()
            .map_err(|e| Error::AudioOutput(format!("Failed to get device configs: {}", e)))?;

        let preferred = supported_configs.find(|config| {
            config.min_sample_rate().0 <= preferred_rate
                && config.max_sample_rate().0 >= preferred_rate
                && config.sample_format() == SampleFormat::F32
        });

        if let Some(supported_config) = preferred {
            let sample_format = supported_config.sample_format();
            let config = supported_config
                .with_sample_rate(cpal::SampleRate(preferred_rate))
                .config();
            return Ok((config, sample_format));
        }

        let supported_config = device
            .default_output_config()
            .map_err(|e| Error::AudioOutput(format!("Failed to get default config: {}", e)))?;

        Ok((supported_config.config(), supported_config.sample_format()))
    }

    /// Device sample rate; the engine renders at this rate
    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    pub fn channels(&self) -> u16 {
        self.config.channels
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Stream errors reported by the device since start
    pub fn error_count(&self) -> u32 {
        self.error_count.load(Ordering::Relaxed)
    }

    /// Start the device stream, moving the renderer onto the audio thread.
    pub fn start(&mut self, renderer: Renderer) -> Result<()> {
        info!("Starting audio stream on '{}'", self.device_name);

        let stream = match self.sample_format {
            SampleFormat::F32 => self.build_stream_f32(renderer)?,
            SampleFormat::I16 => self.build_stream_converted::<i16>(renderer)?,
            SampleFormat::U16 => self.build_stream_converted::<u16>(renderer)?,
            sample_format => {
                return Err(Error::AudioOutput(format!(
                    "Unsupported sample format: {:?}",
                    sample_format
                )));
            }
        };

        stream
            .play()
            .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {}", e)))?;

        self.stream = Some(stream);
        Ok(())
    }

    /// Stop and release the stream
    pub fn stop(&mut self) {
        if self.stream.take().is_some() {
            info!("Audio stream stopped");
        }
    }

    fn error_callback(&self) -> impl FnMut(cpal::StreamError) + Send + 'static {
        let error_count = Arc::clone(&self.error_count);
        move |err| {
            error!("Audio stream error: {}", err);
            error_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn build_stream_f32(&self, mut renderer: Renderer) -> Result<Stream> {
        let channels = self.config.channels as usize;

        self.device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    renderer.render_interleaved(data, channels);
                },
                self.error_callback(),
                None,
            )
            .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {}", e)))
    }

    /// Integer device formats render into a scratch f32 buffer first
    fn build_stream_converted<T>(&self, mut renderer: Renderer) -> Result<Stream>
    where
        T: cpal::SizedSample + cpal::FromSample<f32> + Send + 'static,
    {
        let channels = self.config.channels as usize;
        let mut scratch: Vec<f32> = Vec::with_capacity(8192);

        self.device
            .build_output_stream(
                &self.config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    if scratch.len() != data.len() {
                        scratch.resize(data.len(), 0.0);
                    }
                    renderer.render_interleaved(&mut scratch, channels);
                    for (out, sample) in data.iter_mut().zip(&scratch) {
                        *out = T::from_sample(*sample);
                    }
                },
                self.error_callback(),
                None,
            )
            .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {}", e)))
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        self.stop();
    }
}
