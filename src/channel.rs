//! The channel data model: identifiers, the persisted `Channel` record, the
//! append-only payment log, and dispute bookkeeping.

use crate::keys::OwnershipPublicKey;
use crate::script;
use bitcoin::{Address, Amount, Script, Txid};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifies a channel. Allocated by the initiator at `CREATE_CHANNEL` time
/// and used as the primary key in the Store and in all Protocol message
/// correlation.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId(Uuid);

impl ChannelId {
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// The raw 16 bytes of the id, used as a fixed-width key prefix in the
    /// payment log so a channel's records sort and scan contiguously.
    pub fn as_bytes(&self) -> [u8; 16] {
        *self.0.as_bytes()
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChannelId({})", self.0)
    }
}

/// An opaque peer identifier. The transport assigns it meaning; the engine
/// only compares and stores it.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct PeerId(pub String);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which side of the channel a key, address or balance belongs to. Script
/// byte order is fixed as initiator-first (this crate's resolution of the
/// key-ordering Open Question) so both parties always reproduce identical
/// multisig bytes without needing a separate "first party" flag on the
/// record.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum Party {
    Initiator,
    Responder,
}

/// Channel lifecycle state, `S` in the data model.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum Lifecycle {
    Pending,
    Open,
    Closing,
    Closed,
    Failed,
}

/// A party's view of the channel's current split of `capacity`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Balance {
    pub ours: u64,
    pub theirs: u64,
}

/// The latest committed state `L`: the commitment transaction's parameters
/// plus both parties' signatures over it. There is exactly one of these per
/// channel — this engine's dispute mechanism is sequence-based replacement,
/// not a revocable-commitment scheme, so no history of prior states is kept.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LatestCommitment {
    pub sequence: u64,
    pub balance_initiator: u64,
    pub balance_responder: u64,
    pub local_signature: Vec<u8>,
    pub remote_signature: Vec<u8>,
}

/// The direction of a payment from the recording party's point of view.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum Direction {
    Sent,
    Received,
}

/// An append-only audit log entry. Not authoritative for balance — the
/// `Channel`'s `LatestCommitment` is.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub channel_id: ChannelId,
    pub amount: u64,
    pub direction: Direction,
    pub sequence: u64,
    pub remote_signature: Option<Vec<u8>>,
    pub local_signature: Option<Vec<u8>>,
    pub timestamp: u64,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum DisputeStatus {
    Detected,
    Responded,
    Resolved,
}

/// Raised by the `DisputeMonitor` when it observes an outdated commitment
/// broadcast against a channel's funding output.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DisputeAlert {
    pub channel_id: ChannelId,
    pub detected_at: u64,
    pub broadcast_txid: Txid,
    pub broadcast_sequence: u64,
    pub latest_known_sequence: u64,
    pub deadline: u32,
    pub status: DisputeStatus,
}

/// The durable channel record. Every mutation to one of these routes through
/// the `StateMachine`, which writes the result to the `Store` within the
/// same critical section (see `Engine`'s per-channel mutex).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Channel {
    pub id: ChannelId,
    pub local_party: Party,
    pub opener: PeerId,
    pub responder: PeerId,
    pub pk_initiator: OwnershipPublicKey,
    pub pk_responder: OwnershipPublicKey,
    pub addr_initiator: Address,
    pub addr_responder: Address,

    /// Config snapshot captured at open time, so later rebuilds of the
    /// commitment/settlement transaction are pure functions of the `Channel`
    /// alone.
    pub capacity: u64,
    pub dust_threshold: u64,
    pub fee: u64,

    pub balance_initiator: u64,
    pub balance_responder: u64,
    pub sequence: u64,
    pub lock_time: u32,

    pub funding_outpoint: Option<(Txid, u32)>,
    pub latest: Option<LatestCommitment>,
    pub state: Lifecycle,

    pub created_at: u64,
    pub updated_at: u64,
}

impl Channel {
    /// I1: `bI + bR = C`.
    pub fn conserves_capacity(&self) -> bool {
        self.balance_initiator + self.balance_responder == self.capacity
    }

    /// The byte-exact 2-of-2 locking script for this channel's funding
    /// output, initiator key first (I5).
    pub fn locking_script(&self) -> Script {
        script::multisig_script(&self.pk_initiator, &self.pk_responder)
    }

    pub fn balance_for(&self, party: Party) -> Balance {
        match party {
            Party::Initiator => Balance {
                ours: self.balance_initiator,
                theirs: self.balance_responder,
            },
            Party::Responder => Balance {
                ours: self.balance_responder,
                theirs: self.balance_initiator,
            },
        }
    }

    pub fn balance(&self) -> Balance {
        self.balance_for(self.local_party)
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, Lifecycle::Open)
    }

    pub fn funding_amount(&self) -> Amount {
        Amount::from_sat(self.capacity)
    }

    pub fn counterparty_key(&self, party: Party) -> &OwnershipPublicKey {
        match party {
            Party::Initiator => &self.pk_responder,
            Party::Responder => &self.pk_initiator,
        }
    }

    pub fn own_key(&self, party: Party) -> &OwnershipPublicKey {
        match party {
            Party::Initiator => &self.pk_initiator,
            Party::Responder => &self.pk_responder,
        }
    }
}
