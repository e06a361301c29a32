//! Wire messages, channel routing and client fan-out

pub mod messages;
pub mod wire;

pub use messages::{
    ChunkInfo, Message, NewSongInfo, PauseInfo, QueueChunkRequest, SetVolumeRequest,
    SubscribeRequest, TimeSyncRequest, TimeSyncResponse,
};
pub use wire::{from_wire, to_wire};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::NetworkError;

/// Broadcast channels a client can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Channel {
    /// Audio chunks and everything needed to play them
    Audio,
    /// Playback metadata without the audio payload
    Meta,
}

/// The channels a broadcast message is routed to. `None` means the message
/// is point-to-point and never broadcast by channel.
pub fn channels_of(message: &Message) -> Option<&'static [Channel]> {
    match message {
        Message::QueueChunk(_) => Some(&[Channel::Audio]),
        Message::SetVolume(_) => Some(&[Channel::Audio, Channel::Meta]),
        Message::ChunkInfo(_) | Message::NewSong(_) | Message::PauseToggle(_) => {
            Some(&[Channel::Meta])
        }
        Message::TimeSyncRequest(_) | Message::TimeSyncResponse(_) | Message::Subscribe(_) => None,
    }
}

/// Broadcast side of the transport: deliver a message to every subscribed
/// client
pub trait MessageSender: Send + Sync {
    fn send_message(&self, message: &Message) -> Result<(), NetworkError>;
}

/// Delivery to one connected client
pub trait MessageSink: Send + Sync {
    fn deliver(&self, message: &Message) -> Result<(), NetworkError>;
}

/// In-process sink delivering messages over a channel, for clients living in
/// the same process as the coordinator
pub struct ChannelSink(crossbeam_channel::Sender<Message>);

impl ChannelSink {
    pub fn new(tx: crossbeam_channel::Sender<Message>) -> Self {
        Self(tx)
    }
}

impl MessageSink for ChannelSink {
    fn deliver(&self, message: &Message) -> Result<(), NetworkError> {
        self.0
            .send(message.clone())
            .map_err(|_| NetworkError::SendFailed("client channel closed".to_string()))
    }
}

/// Called when a client subscribes to a channel, so coordinator state can be
/// replayed to the newcomer
pub type NewClientHandler = Box<dyn Fn(Channel, &dyn MessageSink) + Send + Sync>;

struct ClientEntry {
    id: usize,
    channels: Vec<Channel>,
    sink: Arc<dyn MessageSink>,
}

/// Fan-out sender keeping per-client channel subscriptions. Delivery
/// failures to individual clients never abort the broadcast; they are
/// reported as a partial delivery after every remaining client was tried.
#[derive(Default)]
pub struct MultiSender {
    clients: RwLock<Vec<ClientEntry>>,
    next_id: AtomicUsize,
    new_client_handler: RwLock<Option<NewClientHandler>>,
}

impl MultiSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_new_client_handler(&self, handler: NewClientHandler) {
        *self.new_client_handler.write() = Some(handler);
    }

    /// Register a connected client with no subscriptions yet. Returns its id.
    pub fn add_client(&self, sink: Arc<dyn MessageSink>) -> usize {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.clients.write().push(ClientEntry {
            id,
            channels: Vec::new(),
            sink,
        });
        tracing::info!(client = id, "client connected");
        id
    }

    pub fn remove_client(&self, id: usize) {
        self.clients.write().retain(|entry| entry.id != id);
        tracing::info!(client = id, "client removed");
    }

    /// Subscribe a client to a broadcast channel and replay coordinator
    /// state to it
    pub fn subscribe(&self, id: usize, channel: Channel) -> Result<(), NetworkError> {
        let sink = {
            let mut clients = self.clients.write();
            let entry = clients
                .iter_mut()
                .find(|entry| entry.id == id)
                .ok_or(NetworkError::ClientNotFound(id))?;
            if !entry.channels.contains(&channel) {
                entry.channels.push(channel);
            }
            entry.sink.clone()
        };
        tracing::debug!(client = id, ?channel, "client subscribed");
        if let Some(handler) = self.new_client_handler.read().as_ref() {
            handler(channel, sink.as_ref());
        }
        Ok(())
    }

    pub fn client_count(&self) -> usize {
        self.clients.read().len()
    }
}

impl MessageSender for MultiSender {
    fn send_message(&self, message: &Message) -> Result<(), NetworkError> {
        let routing = channels_of(message);
        let clients = self.clients.read();
        let mut attempted = 0;
        let mut failed = 0;
        for entry in clients.iter() {
            let wants = match routing {
                None => true,
                Some(channels) => entry.channels.iter().any(|c| channels.contains(c)),
            };
            if !wants {
                continue;
            }
            attempted += 1;
            if let Err(e) = entry.sink.deliver(message) {
                tracing::warn!(client = entry.id, "delivery failed: {}", e);
                failed += 1;
            }
        }
        if failed > 0 {
            Err(NetworkError::PartialDelivery {
                failed,
                total: attempted,
            })
        } else {
            Ok(())
        }
    }
}
