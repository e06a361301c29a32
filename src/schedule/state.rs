//! Coordinator-side broadcast state
//!
//! Tracks the volume, the newest song announcement and the pause toggles
//! that are still relevant, so a client subscribing mid-stream can be caught
//! up without replaying the whole history.

use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

use crate::error::NetworkError;
use crate::metadata::{LyricsProvider, MetadataProvider};
use crate::playlist::{NewSongHandler, PauseToggleHandler};
use crate::protocol::{
    Channel, Message, MessageSender, MessageSink, NewClientHandler, NewSongInfo, PauseInfo,
    SetVolumeRequest,
};

pub struct ServerState {
    sender: Arc<dyn MessageSender>,
    metadata_provider: Arc<dyn MetadataProvider>,
    lyrics_provider: Arc<dyn LyricsProvider>,
    volume: Mutex<f64>,
    newest_song: Mutex<Option<NewSongInfo>>,
    pauses: RwLock<Vec<PauseInfo>>,
}

impl ServerState {
    pub fn new(
        sender: Arc<dyn MessageSender>,
        metadata_provider: Arc<dyn MetadataProvider>,
        lyrics_provider: Arc<dyn LyricsProvider>,
        volume: f64,
    ) -> Self {
        Self {
            sender,
            metadata_provider,
            lyrics_provider,
            volume: Mutex::new(volume),
            newest_song: Mutex::new(None),
            pauses: RwLock::new(Vec::new()),
        }
    }

    pub fn volume(&self) -> f64 {
        *self.volume.lock()
    }

    /// Update the broadcast volume and push it to every client
    pub fn set_volume(&self, volume: f64) -> Result<(), NetworkError> {
        *self.volume.lock() = volume;
        self.sender
            .send_message(&Message::SetVolume(SetVolumeRequest { volume }))
    }

    pub fn newest_song(&self) -> Option<NewSongInfo> {
        self.newest_song.lock().clone()
    }

    pub fn pauses(&self) -> Vec<PauseInfo> {
        self.pauses.read().clone()
    }

    /// Handler wired into the playlist: announces each new song, enriched
    /// with metadata and lyrics, and remembers it for late joiners
    pub fn new_song_handler(self: &Arc<Self>) -> NewSongHandler {
        let state = self.clone();
        Box::new(move |first_sample_index, song, song_length| {
            let info = NewSongInfo {
                first_sample_of_song_index: first_sample_index,
                song_file_name: song.to_string(),
                song_length,
                lyrics: state.lyrics_provider.collect_lyrics(song),
                metadata: state.metadata_provider.collect_metadata(song),
            };
            *state.newest_song.lock() = Some(info.clone());
            state.prune_pauses();
            if let Err(e) = state.sender.send_message(&Message::NewSong(info)) {
                tracing::warn!(song, "failed to announce new song: {}", e);
            }
        })
    }

    /// Handler wired into the playlist: broadcasts pause toggles and keeps
    /// the replayable toggle history
    pub fn pause_toggle_handler(self: &Arc<Self>) -> PauseToggleHandler {
        let state = self.clone();
        Box::new(move |playing, toggle_sample_index| {
            let pause = PauseInfo {
                playing,
                toggle_sample_index,
            };
            state.pauses.write().push(pause);
            state.prune_pauses();
            if let Err(e) = state.sender.send_message(&Message::PauseToggle(pause)) {
                tracing::warn!(playing, "failed to broadcast pause toggle: {}", e);
            }
        })
    }

    /// Handler wired into the fan-out sender: replays current state to a
    /// freshly subscribed client
    pub fn client_handler(self: &Arc<Self>) -> NewClientHandler {
        let state = self.clone();
        Box::new(move |channel, sink| match channel {
            Channel::Audio => {
                state.replay_volume(sink);
            }
            Channel::Meta => {
                state.replay_volume(sink);
                state.replay_song_state(sink);
            }
        })
    }

    fn replay_volume(&self, sink: &dyn MessageSink) {
        let volume = self.volume();
        if let Err(e) = sink.deliver(&Message::SetVolume(SetVolumeRequest { volume })) {
            tracing::warn!("failed to replay volume: {}", e);
        }
    }

    fn replay_song_state(&self, sink: &dyn MessageSink) {
        if let Some(info) = self.newest_song() {
            if let Err(e) = sink.deliver(&Message::NewSong(info)) {
                tracing::warn!("failed to replay newest song: {}", e);
            }
        }
        for pause in self.pauses() {
            if let Err(e) = sink.deliver(&Message::PauseToggle(pause)) {
                tracing::warn!("failed to replay pause toggle: {}", e);
            }
        }
    }

    /// Drop pause toggles that are fully resolved before the newest song
    /// started. A resume older than the song start can no longer matter; an
    /// unresolved pause is kept no matter how old it is.
    fn prune_pauses(&self) {
        let newest_song = self.newest_song.lock();
        let Some(newest_song) = newest_song.as_ref() else {
            return;
        };
        let song_start = newest_song.first_sample_of_song_index;
        let mut pauses = self.pauses.write();
        let mut passed = 0;
        for (i, pause) in pauses.iter().enumerate() {
            if pause.toggle_sample_index < song_start && pause.playing {
                passed = i + 1;
            } else if song_start < pause.toggle_sample_index {
                break;
            }
        }
        if passed > 0 {
            pauses.drain(..passed);
        }
    }
}
