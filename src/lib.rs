//! # LAN Sync Player
//!
//! Sample-accurate synchronized music playback across many machines on a LAN.
//!
//! One coordinator decodes a playlist and broadcasts fixed-size, timestamped
//! chunks of stereo samples. Every player estimates its clock offset against
//! the coordinator, buffers the chunks in a timed queue and releases each
//! sample at its scheduled absolute instant, so all machines play the same
//! sample at the same wall-clock moment despite uncorrected local clocks and
//! a lossy network.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌────────────────────────── COORDINATOR ──────────────────────────┐
//! │  Playlist Pipeline ──► Chunk Scheduler ──► MessageSender        │
//! │  (decode + pause/gap    (tick every chunk   (per-channel        │
//! │   injection, callbacks)  duration, stamp     fan-out)           │
//! │                          start times)                           │
//! └──────────────────────────────┬──────────────────────────────────┘
//!                                │ QueueChunk / ChunkInfo / NewSong /
//!                                │ PauseToggle / SetVolume / TimeSync
//! ┌──────────────────────────────▼────────────── PLAYER ────────────┐
//! │  Chunk Reader ──► TimedSampleQueue ──► TimedStreamer ──► cpal   │
//! │  (expand chunk     (bounded, blocking   (syncing/direct  output │
//! │   to per-sample     monitor)             drift handling)        │
//! │   timestamps)                                                   │
//! │                    Clock ◄── time sync probes (500 cycles)      │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod metadata;
pub mod playback;
pub mod playlist;
pub mod protocol;
pub mod schedule;
pub mod source;
pub mod timing;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Default sample rate of the stream
    pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

    /// Size of one stream chunk in samples (4 seconds at the default rate)
    pub const DEFAULT_CHUNK_SIZE: usize = 44100 * 4;

    /// Number of gap samples inserted between songs, which players use to
    /// realign playback
    pub const DEFAULT_GAP_BREAK_SIZE: usize = 44100;

    /// Number of request/response cycles in one time sync run
    pub const TIME_SYNC_CYCLES: usize = 500;

    /// Delay between cycles within one time sync run, in milliseconds
    pub const TIME_SYNC_CYCLE_DELAY_MS: u64 = 10;

    /// Interval between time sync runs, in seconds
    pub const TIME_SYNC_INTERVAL_SECS: u64 = 600;

    /// Delay before the coordinator starts streaming, in seconds
    pub const STREAM_START_DELAY_SECS: u64 = 5;

    /// Stream lead time players use to receive and queue chunks, in seconds
    pub const STREAM_DELAY_SECS: u64 = 15;

    /// Decode buffer size of the playlist pipeline, in samples
    pub const DECODE_BUFFER_SIZE: usize = 512;

    /// Timed sample queue capacity, in seconds of audio
    pub const QUEUE_SECONDS: usize = 2;

    /// Default playback volume
    pub const DEFAULT_VOLUME: f64 = 0.1;
}
