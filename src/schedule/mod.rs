//! Chunk scheduling and process wiring
//!
//! The coordinator side pulls fixed-size chunks out of the playlist
//! pipeline on a fixed cadence and broadcasts them with absolute start
//! times far enough in the future that every client can receive and buffer
//! them before they are due.

pub mod state;

pub use state::ServerState;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::config::{AppConfig, StreamConfig, SyncConfig};
use crate::error::Result;
use crate::metadata::{LyricsProvider, MetadataProvider};
use crate::playback::{samples_duration, Player};
use crate::playlist::Playlist;
use crate::protocol::{ChunkInfo, Message, MessageSender, MultiSender, QueueChunkRequest};
use crate::source::SourceProvider;
use crate::timing::{run_sync_loop, Clock, TimeSource, TimeSyncExchange};

/// Handle to the chunk scheduler thread
pub struct SchedulerHandle {
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Spawn the chunk scheduler.
///
/// After the warm-up delay the schedule anchor is fixed at `now +
/// stream_delay`; chunk `i` is stamped `anchor + i * chunk_duration` and the
/// loop ticks off a monotonic base so stamp spacing never drifts.
pub fn run_chunk_scheduler(
    playlist: Arc<Playlist>,
    clock: Arc<dyn TimeSource>,
    sender: Arc<dyn MessageSender>,
    config: StreamConfig,
) -> SchedulerHandle {
    let running = Arc::new(AtomicBool::new(true));
    let thread_running = running.clone();
    let thread_handle = thread::Builder::new()
        .name("chunk-scheduler".to_string())
        .spawn(move || {
            if !interruptible_sleep(&thread_running, config.stream_start_delay()) {
                return;
            }

            let chunk_ns = samples_duration(config.sample_rate, config.chunk_size);
            let anchor = clock.synced_time() + config.stream_delay().as_nanos() as i64;
            let chunk_duration = config.chunk_duration();
            let base = Instant::now();
            tracing::info!(anchor, "chunk schedule anchored");

            let mut chunk_id: i64 = 0;
            let mut low = vec![0.0; config.chunk_size];
            let mut high = vec![0.0; config.chunk_size];
            while thread_running.load(Ordering::Relaxed) {
                let first_sample_index = playlist.fill(&mut low, &mut high);
                let start_time = anchor + chunk_id * chunk_ns;

                let chunk = Message::QueueChunk(QueueChunkRequest {
                    start_time,
                    chunk_id,
                    sample_low: low.clone(),
                    sample_high: high.clone(),
                    first_sample_index,
                });
                if let Err(e) = sender.send_message(&chunk) {
                    tracing::warn!(chunk_id, "failed to broadcast chunk: {}", e);
                }
                let info = Message::ChunkInfo(ChunkInfo {
                    start_time,
                    first_sample_index,
                    chunk_size: config.chunk_size as u64,
                });
                if let Err(e) = sender.send_message(&info) {
                    tracing::warn!(chunk_id, "failed to broadcast chunk info: {}", e);
                }

                chunk_id += 1;
                let next_tick = base + chunk_duration * chunk_id as u32;
                while thread_running.load(Ordering::Relaxed) {
                    let now = Instant::now();
                    if now >= next_tick {
                        break;
                    }
                    thread::sleep((next_tick - now).min(Duration::from_millis(10)));
                }
            }
        })
        .expect("failed to spawn chunk-scheduler thread");

    SchedulerHandle {
        running,
        thread_handle: Some(thread_handle),
    }
}

/// Sleep in short steps so the scheduler can be stopped during its warm-up.
/// Returns false when stopped early.
fn interruptible_sleep(running: &AtomicBool, duration: Duration) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if !running.load(Ordering::Relaxed) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep((deadline - now).min(Duration::from_millis(10)));
    }
}

/// Everything the coordinator side runs: playlist pipeline, broadcast state
/// and the chunk scheduler
pub struct Server {
    pub playlist: Arc<Playlist>,
    pub state: Arc<ServerState>,
    pub scheduler: SchedulerHandle,
}

/// Wire up and start the coordinator: client state replay on subscription,
/// playlist handlers feeding the broadcast state, the streaming loop and
/// the chunk scheduler.
pub fn run_server(
    sender: Arc<MultiSender>,
    clock: Arc<Clock>,
    provider: Box<dyn SourceProvider>,
    metadata_provider: Arc<dyn MetadataProvider>,
    lyrics_provider: Arc<dyn LyricsProvider>,
    config: &AppConfig,
) -> Server {
    let state = Arc::new(ServerState::new(
        sender.clone() as Arc<dyn MessageSender>,
        metadata_provider,
        lyrics_provider,
        config.audio.volume,
    ));
    sender.set_new_client_handler(state.client_handler());

    let mut playlist = Playlist::new(
        config.stream.sample_rate as usize,
        Vec::new(),
        config.stream.gap_break_size,
        config.stream.sample_rate,
        provider,
    );
    playlist.set_new_song_handler(state.new_song_handler());
    playlist.set_pause_toggle_handler(state.pause_toggle_handler());
    let playlist = Arc::new(playlist);

    {
        let playlist = playlist.clone();
        thread::Builder::new()
            .name("playlist-stream".to_string())
            .spawn(move || playlist.stream_loop())
            .expect("failed to spawn playlist-stream thread");
    }

    let scheduler = run_chunk_scheduler(
        playlist.clone(),
        clock as Arc<dyn TimeSource>,
        sender as Arc<dyn MessageSender>,
        config.stream.clone(),
    );

    Server {
        playlist,
        state,
        scheduler,
    }
}

/// Start the client side: synchronized playback plus the background time
/// sync loop against the coordinator
pub fn run_player(
    clock: Arc<Clock>,
    transport: Arc<dyn TimeSyncExchange>,
    config: &AppConfig,
) -> Result<Player> {
    let player = Player::new(clock.clone() as Arc<dyn TimeSource>, config.stream.sample_rate)?;
    run_sync_loop(
        clock,
        transport,
        config.sync.interval(),
        config.sync.cycles,
        config.sync.cycle_delay(),
    );
    Ok(player)
}

/// Start a metadata observer: no audio device, just a synced clock kept
/// calibrated so broadcast chunk times can be interpreted
pub fn run_observer(clock: Arc<Clock>, transport: Arc<dyn TimeSyncExchange>, config: &SyncConfig) {
    run_sync_loop(
        clock,
        transport,
        config.interval(),
        config.cycles,
        config.cycle_delay(),
    );
}
