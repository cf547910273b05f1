//! An in-process `Transport`, mimicking a peer-to-peer connection between
//! two parties with a pair of `futures::mpsc` channels. No framing, no
//! authentication — correlation and signing are the engine's job, not the
//! transport's.

use ducat::channel::PeerId;
use ducat::protocol::Envelope;
use ducat::transport::{ReceiveMessage, SendMessage, Transport};
use futures::channel::mpsc::{self, Receiver, Sender};
use futures::{SinkExt, StreamExt};

pub struct MpscTransport {
    sender: Sender<Envelope>,
    receiver: Receiver<Envelope>,
}

/// Builds a connected pair: whatever one side sends, the other receives.
pub fn make_transports() -> (MpscTransport, MpscTransport) {
    let (alice_sender, bob_receiver) = mpsc::channel(16);
    let (bob_sender, alice_receiver) = mpsc::channel(16);

    (
        MpscTransport {
            sender: alice_sender,
            receiver: alice_receiver,
        },
        MpscTransport {
            sender: bob_sender,
            receiver: bob_receiver,
        },
    )
}

#[async_trait::async_trait]
impl SendMessage for MpscTransport {
    async fn send_message(&mut self, _peer: &PeerId, message: Envelope) -> anyhow::Result<()> {
        self.sender
            .send(message)
            .await
            .map_err(|_| anyhow::anyhow!("peer disconnected"))
    }
}

#[async_trait::async_trait]
impl ReceiveMessage for MpscTransport {
    async fn receive_message(&mut self, _peer: &PeerId) -> anyhow::Result<Envelope> {
        self.receiver
            .next()
            .await
            .ok_or_else(|| anyhow::anyhow!("peer disconnected"))
    }
}

#[async_trait::async_trait]
impl Transport for MpscTransport {
    async fn open_stream(&mut self, _peer: &PeerId, _protocol_id: &str) -> anyhow::Result<()> {
        Ok(())
    }

    async fn handle_stream(&mut self, _protocol_id: &str) -> anyhow::Result<()> {
        Ok(())
    }
}
