//! Playlist streaming pipeline
//!
//! A background loop decodes the active song into a pair of bounded
//! per-channel sample streams. Pauses and song-boundary breaks are encoded
//! in-band as gap (NaN) samples, so downstream consumers see one continuous
//! stream and the global sample index keeps advancing in real time even
//! while paused.

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::constants::DECODE_BUFFER_SIZE;
use crate::playback::StereoSample;
use crate::source::{SampleSource, SourceProvider};

/// Called when a new song starts: global index of its first sample, song
/// identifier, song length in samples
pub type NewSongHandler = Box<dyn Fn(u64, &str, i64) + Send + Sync>;

/// Called when playback pauses or resumes: new playing state, global index
/// of the first sample the toggle applies to
pub type PauseToggleHandler = Box<dyn Fn(bool, u64) + Send + Sync>;

enum SongEnd {
    /// The source ran out of samples
    Completed,
    /// A position change interrupted the song
    Jumped,
}

struct SongList {
    songs: Vec<String>,
    position: usize,
}

/// The playlist and its streaming state. Mutations may come from any thread
/// while [`Playlist::stream_loop`] runs; they take effect at the next decode
/// buffer boundary.
pub struct Playlist {
    state: RwLock<SongList>,
    provider: Box<dyn SourceProvider>,
    sample_rate: u32,
    gap_break_size: usize,

    low_tx: Sender<f64>,
    low_rx: Receiver<f64>,
    high_tx: Sender<f64>,
    high_rx: Receiver<f64>,
    force_next_tx: Sender<bool>,
    force_next_rx: Receiver<bool>,

    playing: AtomicBool,
    playing_last: AtomicBool,
    current_song: Mutex<String>,

    sample_index_write: AtomicU64,
    sample_index_read: AtomicU64,

    new_song_handler: Option<NewSongHandler>,
    pause_toggle_handler: Option<PauseToggleHandler>,
}

impl Playlist {
    /// `buffer_size` bounds how many samples the pipeline decodes ahead of
    /// the consumer. Starts paused.
    pub fn new(
        buffer_size: usize,
        songs: Vec<String>,
        gap_break_size: usize,
        sample_rate: u32,
        provider: Box<dyn SourceProvider>,
    ) -> Self {
        let (low_tx, low_rx) = bounded(buffer_size);
        let (high_tx, high_rx) = bounded(buffer_size);
        let (force_next_tx, force_next_rx) = bounded(2);
        Self {
            state: RwLock::new(SongList { songs, position: 0 }),
            provider,
            sample_rate,
            gap_break_size,
            low_tx,
            low_rx,
            high_tx,
            high_rx,
            force_next_tx,
            force_next_rx,
            playing: AtomicBool::new(false),
            // differs from playing, so the initial paused state is reported
            playing_last: AtomicBool::new(true),
            current_song: Mutex::new(String::new()),
            sample_index_write: AtomicU64::new(0),
            sample_index_read: AtomicU64::new(0),
            new_song_handler: None,
            pause_toggle_handler: None,
        }
    }

    pub fn set_new_song_handler(&mut self, handler: NewSongHandler) {
        self.new_song_handler = Some(handler);
    }

    pub fn set_pause_toggle_handler(&mut self, handler: PauseToggleHandler) {
        self.pause_toggle_handler = Some(handler);
    }

    /// Stream the playlist forever. Songs that fail to open are skipped; an
    /// empty playlist streams gap samples until a song is added.
    pub fn stream_loop(&self) {
        loop {
            let Some(name) = self.next_song() else {
                self.push_gap_samples(self.sample_rate as usize);
                continue;
            };
            *self.current_song.lock() = name.clone();
            let source = match self.provider.open(&name) {
                Ok(source) => source,
                Err(e) => {
                    tracing::warn!(song = %name, "skipping unplayable song: {}", e);
                    self.advance_position();
                    continue;
                }
            };
            tracing::info!(song = %name, "streaming song");
            if let SongEnd::Completed = self.push_source(source, &name) {
                self.push_gap_samples(self.gap_break_size);
                self.advance_position();
            }
        }
    }

    /// Fill both channel buffers with the next samples of the stream.
    /// Blocks until enough samples were produced; returns the global index
    /// of the first filled sample.
    pub fn fill(&self, low: &mut [f64], high: &mut [f64]) -> u64 {
        debug_assert_eq!(low.len(), high.len());
        for i in 0..low.len() {
            // the producer pushes strictly in low, high order per sample, so
            // draining interleaved cannot deadlock on the bounded channels
            low[i] = self.low_rx.recv().unwrap_or(f64::NAN);
            high[i] = self.high_rx.recv().unwrap_or(f64::NAN);
        }
        self.sample_index_read
            .fetch_add(low.len() as u64, Ordering::Relaxed)
    }

    fn push_source(&self, mut source: Box<dyn SampleSource>, name: &str) -> SongEnd {
        if let Some(handler) = &self.new_song_handler {
            handler(
                self.sample_index_write.load(Ordering::Relaxed),
                name,
                source.len() as i64,
            );
        }
        let mut buf = vec![StereoSample::silence(); DECODE_BUFFER_SIZE];
        loop {
            self.report_pause_toggle();
            let (n, more) = if self.playing.load(Ordering::Relaxed) {
                let (n, more) = source.stream(&mut buf);
                for sample in &buf[..n] {
                    self.push_sample(sample.left, sample.right);
                }
                (n, more)
            } else {
                // paused: real time keeps passing, so the index stream is
                // padded with gaps while the source stands still
                self.push_gap_samples(buf.len());
                (buf.len(), true)
            };
            if self.take_forced_jump() {
                return SongEnd::Jumped;
            }
            if !more || n < buf.len() {
                return SongEnd::Completed;
            }
        }
    }

    /// Report a pending pause state change, stamped with the index the
    /// toggle takes effect at
    fn report_pause_toggle(&self) {
        let playing = self.playing.load(Ordering::Relaxed);
        if playing == self.playing_last.load(Ordering::Relaxed) {
            return;
        }
        self.playing_last.store(playing, Ordering::Relaxed);
        if let Some(handler) = &self.pause_toggle_handler {
            handler(playing, self.sample_index_write.load(Ordering::Relaxed));
        }
    }

    fn take_forced_jump(&self) -> bool {
        matches!(self.force_next_rx.try_recv(), Ok(true))
    }

    fn push_sample(&self, left: f64, right: f64) {
        // both receivers live in self, so sends cannot fail
        let _ = self.low_tx.send(left);
        let _ = self.high_tx.send(right);
        self.sample_index_write.fetch_add(1, Ordering::Relaxed);
    }

    fn push_gap_samples(&self, count: usize) {
        for _ in 0..count {
            self.push_sample(f64::NAN, f64::NAN);
        }
    }

    fn next_song(&self) -> Option<String> {
        let mut state = self.state.write();
        if state.songs.is_empty() {
            return None;
        }
        let pos = state.position % state.songs.len();
        state.position = pos;
        Some(state.songs[pos].clone())
    }

    fn advance_position(&self) {
        self.state.write().position += 1;
    }

    pub fn add_song(&self, song: impl Into<String>) {
        let mut state = self.state.write();
        state.songs.push(song.into());
    }

    /// Insert a song at `index`, clamped into the playlist bounds
    pub fn insert_song(&self, song: impl Into<String>, index: isize) {
        let mut state = self.state.write();
        let index = index.clamp(0, state.songs.len() as isize) as usize;
        state.songs.insert(index, song.into());
    }

    /// Remove and return the song at `index`, clamped into the playlist
    /// bounds. Returns `None` on an empty playlist.
    pub fn remove_song(&self, index: isize) -> Option<String> {
        let mut state = self.state.write();
        if state.songs.is_empty() {
            return None;
        }
        let index = index.clamp(0, state.songs.len() as isize - 1) as usize;
        Some(state.songs.remove(index))
    }

    /// Jump to the song at `position`. Interrupts the current song without a
    /// gap break.
    pub fn set_pos(&self, position: usize) {
        self.state.write().position = position;
        let _ = self.force_next_tx.try_send(true);
    }

    pub fn pos(&self) -> usize {
        let state = self.state.read();
        if state.songs.is_empty() {
            0
        } else {
            state.position % state.songs.len()
        }
    }

    pub fn songs(&self) -> Vec<String> {
        self.state.read().songs.clone()
    }

    pub fn current_song(&self) -> String {
        self.current_song.lock().clone()
    }

    pub fn playing(&self) -> bool {
        self.playing.load(Ordering::Relaxed)
    }

    pub fn set_playing(&self, playing: bool) {
        self.playing.store(playing, Ordering::Relaxed);
    }
}
