//! Synchronized audio playback
//!
//! Chunks broadcast by the coordinator are expanded into per-sample
//! timestamps, buffered in a bounded timed queue and drained into the audio
//! device at their scheduled absolute instants.

pub mod chunk;
pub mod output;
pub mod queue;
pub mod streamer;

pub use chunk::QueuedChunk;
pub use output::{AudioOutput, Volume};
pub use queue::{TimedSample, TimedSampleQueue};
pub use streamer::{samples_count, samples_duration, ChunkReader, TimedStreamer};

use crossbeam_channel::{unbounded, Sender};
use std::sync::Arc;

use crate::constants::{DEFAULT_VOLUME, QUEUE_SECONDS};
use crate::error::PlaybackError;
use crate::protocol::Message;
use crate::timing::TimeSource;

/// One stereo sample. A NaN amplitude is the gap sentinel meaning "no audio
/// here, stay silent", used for pauses and song-boundary breaks; it is never
/// valid audio data.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StereoSample {
    pub left: f64,
    pub right: f64,
}

impl StereoSample {
    pub const fn new(left: f64, right: f64) -> Self {
        Self { left, right }
    }

    pub const fn silence() -> Self {
        Self {
            left: 0.0,
            right: 0.0,
        }
    }

    /// The gap sentinel
    pub const fn gap() -> Self {
        Self {
            left: f64::NAN,
            right: f64::NAN,
        }
    }

    pub fn is_gap(&self) -> bool {
        self.left.is_nan()
    }
}

/// Combine two per-channel sample arrays into stereo samples, truncating to
/// the shorter of the two
pub fn combine_samples(low: &[f64], high: &[f64]) -> Vec<StereoSample> {
    low.iter()
        .zip(high.iter())
        .map(|(&left, &right)| StereoSample { left, right })
        .collect()
}

/// Client-side playback facade: owns the timed queue, the chunk reader and
/// the device output stream.
pub struct Player {
    chunk_tx: Sender<QueuedChunk>,
    reader: ChunkReader,
    volume: Arc<Volume>,
    _output: AudioOutput,
}

impl Player {
    pub fn new(clock: Arc<dyn TimeSource>, sample_rate: u32) -> Result<Self, PlaybackError> {
        tracing::info!("initializing playback");

        let queue = Arc::new(TimedSampleQueue::new(QUEUE_SECONDS * sample_rate as usize));
        let (chunk_tx, chunk_rx) = unbounded();
        let reader = ChunkReader::start(queue.clone(), chunk_rx, sample_rate);
        let streamer = TimedStreamer::new(queue, clock, sample_rate);
        let volume = Arc::new(Volume::new(DEFAULT_VOLUME));
        let output = AudioOutput::start(streamer, volume.clone(), sample_rate)?;

        tracing::info!("playback initialized");
        Ok(Self {
            chunk_tx,
            reader,
            volume,
            _output: output,
        })
    }

    /// Queue a broadcast chunk for playback
    pub fn queue_chunk(&self, start_time: i64, chunk_id: i64, samples: Vec<StereoSample>) {
        tracing::debug!(chunk_id, start_time, "queueing chunk");
        if self
            .chunk_tx
            .send(QueuedChunk::new(start_time, samples))
            .is_err()
        {
            tracing::warn!(chunk_id, "chunk reader is gone, dropping chunk");
        }
    }

    pub fn set_volume(&self, volume: f64) {
        self.volume.set(volume);
    }

    /// Dispatch a message from the coordinator
    pub fn handle_message(&self, message: &Message) {
        match message {
            Message::QueueChunk(chunk) => self.queue_chunk(
                chunk.start_time,
                chunk.chunk_id,
                combine_samples(&chunk.sample_low, &chunk.sample_high),
            ),
            Message::SetVolume(request) => self.set_volume(request.volume),
            _ => {}
        }
    }

    pub fn stop(&mut self) {
        self.reader.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gap_sentinel_is_not_audio() {
        let gap = StereoSample::gap();
        assert!(gap.is_gap());
        assert!(!StereoSample::silence().is_gap());
        assert!(!StereoSample::new(-1.0, 1.0).is_gap());
    }

    #[test]
    fn combine_truncates_to_shorter_channel() {
        let low = [1.0, 2.0, 3.0];
        let high = [4.0, 5.0];
        let combined = combine_samples(&low, &high);
        assert_eq!(
            combined,
            vec![StereoSample::new(1.0, 4.0), StereoSample::new(2.0, 5.0)]
        );
    }
}
