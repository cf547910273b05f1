//! Wire message envelope and catalogue. Messages are JSON-encoded bytes, one
//! message per framed record, matching the reference lineage's sum-type
//! message dispatch (replacing the source's dynamic string-tag dispatch,
//! §9).

pub mod close;
pub mod create;
pub mod update;

use crate::channel::ChannelId;
use crate::keys::{InvalidSignature, OwnershipKeyPair, OwnershipPublicKey};
use bitcoin::hashes::{sha256d, Hash};
use bitcoin::{Address, SigHash};
use enum_as_inner::EnumAsInner;
use serde::{Deserialize, Serialize};

/// Every message on the wire, whatever its kind, is wrapped in this common
/// envelope.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Envelope {
    pub channel_id: ChannelId,
    pub timestamp: u64,
    /// Signature over the JSON encoding of `message` with this field
    /// removed. `None` for messages that don't need peer-authentication
    /// beyond what the transport already provides.
    pub signature: Option<Vec<u8>>,
    pub message: Message,
}

/// The digest an `Envelope`'s `signature` commits to: the double-SHA256 of
/// the JSON encoding of `message` alone, reusing the same 32-byte `SigHash`
/// newtype and signing primitives the on-chain transactions use rather than
/// inventing a second signature scheme for the wire.
fn envelope_digest(message: &Message) -> SigHash {
    let json = serde_json::to_vec(message).expect("Message always serializes to JSON");
    SigHash::from_slice(&sha256d::Hash::hash(&json)[..]).expect("sha256d output is 32 bytes")
}

impl Envelope {
    /// Builds an envelope carrying `message`, signed with the per-channel
    /// keys. Most transports already authenticate the byte stream itself
    /// (§6); this is defense in depth for transports that don't, or for
    /// messages relayed through an intermediary.
    pub fn sign(channel_id: ChannelId, message: Message, keys: &OwnershipKeyPair, now: u64) -> Self {
        let secp = bitcoin::secp256k1::Secp256k1::signing_only();
        let signature = keys.sign(&secp, &envelope_digest(&message));
        Self {
            channel_id,
            timestamp: now,
            signature: Some(signature),
            message,
        }
    }

    /// Verifies this envelope's signature against the counterparty's
    /// per-channel public key. An envelope with no signature is accepted
    /// only by callers that explicitly choose to trust the transport alone.
    pub fn verify(&self, counterparty_pk: &OwnershipPublicKey) -> Result<(), InvalidSignature> {
        let signature = self.signature.as_ref().ok_or(InvalidSignature)?;
        let secp = bitcoin::secp256k1::Secp256k1::verification_only();
        crate::keys::verify_signature(&secp, counterparty_pk, &envelope_digest(&self.message), signature)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, EnumAsInner)]
pub enum Message {
    OpenReq(OpenReq),
    OpenAccept(OpenAccept),
    OpenReject(OpenReject),
    FundingCreated(FundingCreated),
    FundingSigned(FundingSigned),
    ChannelReady(ChannelReady),
    UpdateReq(UpdateReq),
    UpdateAck(UpdateAck),
    UpdateReject(UpdateReject),
    CloseReq(CloseReq),
    CloseAccept(CloseAccept),
    CloseComplete(CloseComplete),
    Error(ErrorMessage),
}

#[derive(Debug, thiserror::Error)]
#[error("expected a {expected} message, got a different kind")]
pub struct UnexpectedMessage {
    pub expected: &'static str,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OpenReq {
    pub capacity: u64,
    pub fee: u64,
    pub lifetime_secs: u32,
    pub pk: OwnershipPublicKey,
    pub addr: Address,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OpenAccept {
    pub pk: OwnershipPublicKey,
    pub addr: Address,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OpenReject {
    pub reason: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FundingCreated {
    pub funding_txid: bitcoin::Txid,
    pub funding_vout: u32,
    pub lock_time: u32,
    pub initiator_signature: Vec<u8>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FundingSigned {
    pub responder_signature: Vec<u8>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChannelReady;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UpdateReq {
    pub sequence: u64,
    pub balance_initiator: u64,
    pub balance_responder: u64,
    pub signature: Vec<u8>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UpdateAck {
    pub sequence: u64,
    pub signature: Vec<u8>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UpdateReject {
    pub sequence: u64,
    pub reason: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CloseReq {
    pub signature: Vec<u8>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CloseAccept {
    pub signature: Vec<u8>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CloseComplete {
    pub txid: bitcoin::Txid,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub kind: String,
    pub detail: String,
}
