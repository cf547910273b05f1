//! Typestate exchange for a single balance update: `UpdateReq -> UpdateAck |
//! UpdateReject`. Each exchange builds a brand-new commitment transaction
//! from scratch; unlike the reference lineage's update exchange there is no
//! revocation-secret reveal at the end, since this engine's dispute
//! mechanism is sequence-based replacement rather than a revocable
//! commitment (§4.H).

use super::{UpdateAck, UpdateReq};
use crate::channel::Channel;
use crate::error::Error;
use crate::keys::OwnershipKeyPair;
use crate::transaction::{CommitTransaction, StateParams};

/// The sender's view, about to propose `sequence = channel.sequence + 1`.
pub struct Sending<'a> {
    pub channel: &'a Channel,
    pub keys: &'a OwnershipKeyPair,
    pub amount: u64,
}

impl<'a> Sending<'a> {
    /// Validates the `SEND_PAY` contract and builds the message plus the
    /// commitment to persist optimistically.
    pub fn compose(&self) -> Result<(UpdateReq, CommitTransaction), Error> {
        let balance = self.channel.balance();
        if !self.channel.is_open() {
            return Err(Error::ChannelNotOpen {
                channel: self.channel.id,
                operation: "pay",
                state: self.channel.state,
            });
        }
        if self.amount > balance.ours {
            return Err(Error::InsufficientBalance {
                channel: self.channel.id,
                operation: "pay",
                amount: self.amount,
                balance: balance.ours,
            });
        }

        let (balance_initiator, balance_responder) = shifted_balances(self.channel, self.amount);
        let sequence = self.channel.sequence + 1;

        let params = state_params(self.channel, balance_initiator, balance_responder);
        let commit = CommitTransaction::new(params, self.channel.lock_time, sequence);

        let secp = bitcoin::secp256k1::Secp256k1::signing_only();
        let signature = self.keys.sign(&secp, &commit.digest());

        Ok((
            UpdateReq {
                sequence,
                balance_initiator,
                balance_responder,
                signature,
            },
            commit,
        ))
    }
}

/// The receiver's view of an incoming `UpdateReq`.
pub struct Receiving<'a> {
    pub channel: &'a Channel,
    pub keys: &'a OwnershipKeyPair,
    pub counterparty_pk: &'a crate::keys::OwnershipPublicKey,
}

impl<'a> Receiving<'a> {
    /// `RECV_PAY` contract: strict ordering, then conservation, then
    /// signature — in that order, so an out-of-order message never pays for
    /// a wasted signature check.
    pub fn interpret(&self, request: UpdateReq) -> Result<(UpdateAck, CommitTransaction), Error> {
        let expected_sequence = self.channel.sequence + 1;
        if request.sequence != expected_sequence {
            return Err(Error::BadSequence {
                channel: self.channel.id,
                operation: "recv_pay",
                given: request.sequence,
            });
        }
        if request.balance_initiator + request.balance_responder != self.channel.capacity {
            return Err(Error::BadConservation {
                channel: self.channel.id,
                operation: "recv_pay",
                balance_a: request.balance_initiator,
                balance_b: request.balance_responder,
            });
        }

        let params = state_params(self.channel, request.balance_initiator, request.balance_responder);
        let commit = CommitTransaction::new(params, self.channel.lock_time, request.sequence);

        let secp = bitcoin::secp256k1::Secp256k1::new();
        crate::keys::verify_signature(&secp, self.counterparty_pk, &commit.digest(), &request.signature)
            .map_err(|_| Error::BadSignature {
                channel: self.channel.id,
                operation: "recv_pay",
            })?;

        let our_signature = self.keys.sign(&secp, &commit.digest());

        Ok((
            UpdateAck {
                sequence: request.sequence,
                signature: our_signature,
            },
            commit,
        ))
    }
}

fn shifted_balances(channel: &Channel, amount: u64) -> (u64, u64) {
    use crate::channel::Party;
    match channel.local_party {
        Party::Initiator => (
            channel.balance_initiator - amount,
            channel.balance_responder + amount,
        ),
        Party::Responder => (
            channel.balance_initiator + amount,
            channel.balance_responder - amount,
        ),
    }
}

fn state_params(channel: &Channel, balance_initiator: u64, balance_responder: u64) -> StateParams {
    StateParams {
        funding_txid: channel.funding_outpoint.expect("open channel is funded").0,
        funding_vout: channel.funding_outpoint.expect("open channel is funded").1,
        funding_amount: channel.funding_amount(),
        script_code: channel.locking_script(),
        addr_initiator: channel.addr_initiator.clone(),
        addr_responder: channel.addr_responder.clone(),
        balance_initiator,
        balance_responder,
        fee: channel.fee,
    }
}

/// Applies a verified `UpdateAck` to the sender's local channel state:
/// advances `sequence`, records both signatures as `latest`.
pub fn apply_ack(channel: &mut Channel, balance_initiator: u64, balance_responder: u64, sequence: u64, local_signature: Vec<u8>, remote_signature: Vec<u8>, now: u64) {
    channel.balance_initiator = balance_initiator;
    channel.balance_responder = balance_responder;
    channel.sequence = sequence;
    channel.latest = Some(crate::channel::LatestCommitment {
        sequence,
        balance_initiator,
        balance_responder,
        local_signature,
        remote_signature,
    });
    channel.updated_at = now;
}
