//! Audio device output via cpal
//!
//! The device callback pulls the synchronized streamer directly, so output
//! pacing is driven by the sound card while the streamer decides what is
//! played at which instant.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleRate, StreamConfig};
use parking_lot::Mutex;
use std::sync::Arc;

use crate::error::PlaybackError;
use crate::playback::streamer::TimedStreamer;
use crate::playback::StereoSample;

/// Shared playback volume, applied at the device boundary
pub struct Volume(Mutex<f64>);

impl Volume {
    pub fn new(volume: f64) -> Self {
        Self(Mutex::new(volume))
    }

    pub fn get(&self) -> f64 {
        *self.0.lock()
    }

    pub fn set(&self, volume: f64) {
        *self.0.lock() = volume;
        tracing::info!("volume set to {:.3}", volume);
    }
}

/// Output stream on the default device, pulling a [`TimedStreamer`]
pub struct AudioOutput {
    _stream: cpal::Stream,
}

impl AudioOutput {
    pub fn start(
        mut streamer: TimedStreamer,
        volume: Arc<Volume>,
        sample_rate: u32,
    ) -> Result<Self, PlaybackError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| PlaybackError::DeviceNotFound("no default output device".to_string()))?;

        let config = StreamConfig {
            channels: 2,
            sample_rate: SampleRate(sample_rate),
            buffer_size: BufferSize::Default,
        };

        let mut pull: Vec<StereoSample> = Vec::new();
        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let frames = data.len() / 2;
                    if pull.len() != frames {
                        pull.resize(frames, StereoSample::silence());
                    }
                    streamer.stream(&mut pull);

                    let vol = volume.get();
                    for (frame, sample) in pull.iter().enumerate() {
                        data[2 * frame] = convert_sample(sample.left, vol);
                        data[2 * frame + 1] = convert_sample(sample.right, vol);
                    }
                },
                move |err| tracing::error!("output stream error: {}", err),
                None,
            )
            .map_err(|e| PlaybackError::StreamError(e.to_string()))?;

        stream
            .play()
            .map_err(|e| PlaybackError::StreamError(e.to_string()))?;

        Ok(Self { _stream: stream })
    }
}

fn convert_sample(value: f64, volume: f64) -> f32 {
    (value * volume).clamp(-1.0, 1.0) as f32
}
