//! Typed event channels replacing the reference lineage's event-emitter
//! broadcast of state changes (§9). Consumers subscribe to a
//! `tokio::sync::broadcast` channel and filter by channel id themselves, or
//! just take everything.

use crate::channel::{ChannelId, DisputeAlert};
use tokio::sync::broadcast;

#[derive(Clone, Debug)]
pub enum Event {
    ChannelOpened { channel_id: ChannelId },
    ChannelPayment { channel_id: ChannelId, sequence: u64 },
    ChannelClosed { channel_id: ChannelId },
    DisputeAlert(DisputeAlert),
}

/// A broadcast sender held by the `Engine`; `subscribe()` hands out
/// independent receivers, each seeing every event emitted from that point
/// on.
#[derive(Clone, Debug)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: Event) {
        // No subscribers is a normal, common case; the send error just means
        // the event had nowhere to go.
        let _ = self.sender.send(event);
    }
}

/// The interface `Protocol` calls back into rather than holding a reference
/// to `Engine` directly — replaces the cyclic Engine/Protocol reference
/// named in the design notes. `Engine` implements this; events travel one
/// way only.
#[async_trait::async_trait]
pub trait EngineEvents: Send + Sync {
    async fn on_open_accept(&self, channel_id: ChannelId);
    async fn on_update(&self, channel_id: ChannelId, sequence: u64);
    async fn on_close(&self, channel_id: ChannelId);
    async fn on_dispute_alert(&self, alert: DisputeAlert);
}
