//! Message payloads exchanged between coordinator and clients

use serde::{Deserialize, Serialize};

use crate::metadata::{LyricsLine, SongMetadata};
use crate::protocol::Channel;

/// First half of a clock probe, carrying the client's raw send time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSyncRequest {
    pub client_send: i64,
}

/// Second half of a clock probe. `client_send` is echoed back unchanged so
/// the client can pair the response with its request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSyncResponse {
    pub client_send: i64,
    pub server_recv: i64,
    pub server_send: i64,
}

/// One block of audio to be played starting at an absolute synchronized
/// instant. Channels are sent as separate arrays of amplitudes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueChunkRequest {
    pub start_time: i64,
    pub chunk_id: i64,
    pub sample_low: Vec<f64>,
    pub sample_high: Vec<f64>,
    pub first_sample_index: u64,
}

/// Chunk timing announcement without the audio payload, for observers that
/// track progress but do not play
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkInfo {
    pub start_time: i64,
    pub first_sample_index: u64,
    pub chunk_size: u64,
}

/// Announcement that a new song starts at a given global sample index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSongInfo {
    pub first_sample_of_song_index: u64,
    pub song_file_name: String,
    pub song_length: i64,
    pub lyrics: Vec<LyricsLine>,
    pub metadata: SongMetadata,
}

/// A pause or resume that took effect at a given global sample index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PauseInfo {
    pub playing: bool,
    pub toggle_sample_index: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SetVolumeRequest {
    pub volume: f64,
}

/// A client declaring which broadcast channel it wants to receive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeRequest {
    pub channel: Channel,
}

/// Every message that can cross the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    TimeSyncRequest(TimeSyncRequest),
    TimeSyncResponse(TimeSyncResponse),
    QueueChunk(QueueChunkRequest),
    ChunkInfo(ChunkInfo),
    NewSong(NewSongInfo),
    PauseToggle(PauseInfo),
    SetVolume(SetVolumeRequest),
    Subscribe(SubscribeRequest),
}
