//! The transport port: an authenticated, relay-capable overlay providing
//! bidirectional byte streams between peer identifiers. The engine uses one
//! logical stream per channel for payment updates and one dedicated stream
//! for open/close negotiation; this crate is agnostic to which.

use crate::channel::PeerId;
use crate::protocol::Envelope;
use async_trait::async_trait;

#[async_trait]
pub trait SendMessage {
    async fn send_message(&mut self, peer: &PeerId, message: Envelope) -> anyhow::Result<()>;
}

#[async_trait]
pub trait ReceiveMessage {
    async fn receive_message(&mut self, peer: &PeerId) -> anyhow::Result<Envelope>;
}

#[async_trait]
pub trait Transport: SendMessage + ReceiveMessage + Send {
    async fn open_stream(&mut self, peer: &PeerId, protocol_id: &str) -> anyhow::Result<()>;

    async fn handle_stream(&mut self, protocol_id: &str) -> anyhow::Result<()>;
}
