//! Local Playback Demo
//!
//! Runs the coordinator and one player in the same process: the playlist
//! pipeline and chunk scheduler broadcast sine-tone chunks over an
//! in-process channel, and the player buffers them and plays them at their
//! scheduled instants through the default output device.

use anyhow::Result;
use crossbeam_channel::unbounded;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lan_sync_player::{
    config::AppConfig,
    error::NetworkError,
    metadata::EmptyProvider,
    protocol::{Channel, ChannelSink, MultiSender, TimeSyncRequest, TimeSyncResponse},
    schedule::{run_player, run_server},
    source::SineProvider,
    timing::{answer_probe, Clock, TimeSyncExchange},
};

/// In-process probe exchange against the coordinator's clock
struct LoopbackExchange {
    coordinator: Arc<Clock>,
}

impl TimeSyncExchange for LoopbackExchange {
    fn exchange(&self, request: TimeSyncRequest) -> Result<TimeSyncResponse, NetworkError> {
        Ok(answer_probe(&self.coordinator, &request))
    }
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting local playback demo");

    let config = match std::env::args().nth(1) {
        Some(path) => AppConfig::load(Path::new(&path))?,
        None => AppConfig::default(),
    };
    config.validate()?;

    // coordinator
    let sender = Arc::new(MultiSender::new());
    let coordinator_clock = Arc::new(Clock::new());
    let server = run_server(
        sender.clone(),
        coordinator_clock.clone(),
        Box::new(SineProvider::new(config.stream.sample_rate, 10)),
        Arc::new(EmptyProvider),
        Arc::new(EmptyProvider),
        &config,
    );
    server.playlist.add_song("sine:440");
    server.playlist.add_song("sine:550");
    server.playlist.add_song("sine:660");
    server.playlist.set_playing(true);

    // player, with its own clock frame synced over the loopback exchange
    let player_clock = Arc::new(Clock::new());
    let transport = Arc::new(LoopbackExchange {
        coordinator: coordinator_clock,
    });
    let player = run_player(player_clock, transport, &config)?;

    let (tx, rx) = unbounded();
    let client = sender.add_client(Arc::new(ChannelSink::new(tx)));
    sender.subscribe(client, Channel::Audio)?;

    tracing::info!("playing, press ctrl-c to quit");
    for message in rx.iter() {
        player.handle_message(&message);
    }
    Ok(())
}
