//! Typestate exchange for opening a channel:
//! `OpenReq -> OpenAccept|OpenReject -> FundingCreated -> FundingSigned ->
//! ChannelReady`. Mirrors the reference lineage's channel-open exchange
//! shape but without the PSBT co-funding or revocation/publishing key
//! exchange that lineage carries — this engine's opener alone funds the
//! channel (§6 Wallet port) and there is no revocation key to exchange.

use super::{ChannelReady, FundingCreated, FundingSigned, OpenAccept, OpenReq};
use crate::channel::{Channel, ChannelId, Lifecycle, Party, PeerId};
use crate::keys::OwnershipKeyPair;
use crate::transaction::{CommitTransaction, FundingTransaction, StateParams};
use crate::wallet::Utxo;
use bitcoin::{Address, Amount};

/// Initiator state: about to send `OpenReq`.
pub struct Initiating {
    pub channel_id: ChannelId,
    pub opener: PeerId,
    pub responder: PeerId,
    pub capacity: Amount,
    pub fee: Amount,
    pub lifetime_secs: u32,
    pub keys: OwnershipKeyPair,
    pub addr: Address,
}

impl Initiating {
    pub fn compose(&self) -> OpenReq {
        OpenReq {
            capacity: self.capacity.as_sat(),
            fee: self.fee.as_sat(),
            lifetime_secs: self.lifetime_secs,
            pk: self.keys.public(),
            addr: self.addr.clone(),
        }
    }

    /// Call once an `OpenAccept` arrives (an `OpenReject` is handled by the
    /// caller before reaching here — there is nothing legal to do with a
    /// rejection except fail the channel).
    pub fn interpret(self, reply: OpenAccept) -> AwaitingFunding {
        AwaitingFunding {
            channel_id: self.channel_id,
            opener: self.opener,
            responder: self.responder,
            capacity: self.capacity,
            fee: self.fee,
            lifetime_secs: self.lifetime_secs,
            keys: self.keys,
            addr: self.addr,
            counterparty_pk: reply.pk,
            counterparty_addr: reply.addr,
        }
    }
}

/// Initiator state: accepted, about to fund and propose the first
/// commitment.
pub struct AwaitingFunding {
    pub channel_id: ChannelId,
    pub opener: PeerId,
    pub responder: PeerId,
    pub capacity: Amount,
    pub fee: Amount,
    pub lifetime_secs: u32,
    pub keys: OwnershipKeyPair,
    pub addr: Address,
    pub counterparty_pk: crate::keys::OwnershipPublicKey,
    pub counterparty_addr: Address,
}

impl AwaitingFunding {
    /// Builds the funding transaction from the opener's UTXOs and the
    /// initial (sequence 0) commitment transaction, and signs the latter.
    pub fn compose(
        &self,
        utxos: &[Utxo],
        change_address: Option<&Address>,
        now: u64,
    ) -> Result<(FundingCreated, AwaitingFundingSigned), crate::transaction::BuildError> {
        let lock_script = crate::script::multisig_script(&self.keys.public(), &self.counterparty_pk);
        let funding_tx = FundingTransaction::new(
            utxos,
            change_address,
            lock_script.clone(),
            self.capacity,
            self.fee,
        )?;
        let lock_time = now as u32 + self.lifetime_secs;

        let params = StateParams {
            funding_txid: funding_tx.txid(),
            funding_vout: funding_tx.funding_vout(),
            funding_amount: self.capacity,
            script_code: lock_script,
            addr_initiator: self.addr.clone(),
            addr_responder: self.counterparty_addr.clone(),
            balance_initiator: self.capacity.as_sat(),
            balance_responder: 0,
            fee: self.fee.as_sat(),
        };
        let commit = CommitTransaction::new(params, lock_time, 0);
        let secp = bitcoin::secp256k1::Secp256k1::signing_only();
        let signature = self.keys.sign(&secp, &commit.digest());

        let message = FundingCreated {
            funding_txid: funding_tx.txid(),
            funding_vout: funding_tx.funding_vout(),
            lock_time,
            initiator_signature: signature.clone(),
        };

        Ok((
            message,
            AwaitingFundingSigned {
                channel_id: self.channel_id,
                opener: self.opener.clone(),
                responder: self.responder.clone(),
                capacity: self.capacity,
                fee: self.fee,
                keys: self.keys.clone(),
                addr: self.addr.clone(),
                counterparty_pk: self.counterparty_pk,
                counterparty_addr: self.counterparty_addr.clone(),
                funding_tx,
                lock_time,
                initiator_signature: signature,
            },
        ))
    }
}

/// Initiator state: funding proposed, awaiting the responder's
/// counter-signature.
pub struct AwaitingFundingSigned {
    pub channel_id: ChannelId,
    pub opener: PeerId,
    pub responder: PeerId,
    pub capacity: Amount,
    pub fee: Amount,
    pub keys: OwnershipKeyPair,
    pub addr: Address,
    pub counterparty_pk: crate::keys::OwnershipPublicKey,
    pub counterparty_addr: Address,
    pub funding_tx: FundingTransaction,
    pub lock_time: u32,
    pub initiator_signature: Vec<u8>,
}

impl AwaitingFundingSigned {
    /// Verifies the responder's signature over the initial commitment and
    /// produces the now-fully-open `Channel` record plus the funding
    /// transaction ready to broadcast.
    pub fn interpret(
        self,
        reply: FundingSigned,
        now: u64,
    ) -> Result<(Channel, bitcoin::Transaction), crate::error::Error> {
        let lock_script = crate::script::multisig_script(&self.keys.public(), &self.counterparty_pk);
        let params = StateParams {
            funding_txid: self.funding_tx.txid(),
            funding_vout: self.funding_tx.funding_vout(),
            funding_amount: self.capacity,
            script_code: lock_script,
            addr_initiator: self.addr.clone(),
            addr_responder: self.counterparty_addr.clone(),
            balance_initiator: self.capacity.as_sat(),
            balance_responder: 0,
            fee: self.fee.as_sat(),
        };
        let commit = CommitTransaction::new(params, self.lock_time, 0);

        let secp = bitcoin::secp256k1::Secp256k1::verification_only();
        crate::keys::verify_signature(
            &secp,
            &self.counterparty_pk,
            &commit.digest(),
            &reply.responder_signature,
        )
        .map_err(|_| crate::error::Error::BadSignature {
            channel: self.channel_id,
            operation: "open:funding_signed",
        })?;

        let channel = Channel {
            id: self.channel_id,
            local_party: Party::Initiator,
            opener: self.opener,
            responder: self.responder,
            pk_initiator: self.keys.public(),
            pk_responder: self.counterparty_pk,
            addr_initiator: self.addr,
            addr_responder: self.counterparty_addr,
            capacity: self.capacity.as_sat(),
            dust_threshold: crate::DUST_LIMIT,
            fee: self.fee.as_sat(),
            balance_initiator: self.capacity.as_sat(),
            balance_responder: 0,
            sequence: 0,
            lock_time: self.lock_time,
            funding_outpoint: Some((self.funding_tx.txid(), self.funding_tx.funding_vout())),
            latest: Some(crate::channel::LatestCommitment {
                sequence: 0,
                balance_initiator: self.capacity.as_sat(),
                balance_responder: 0,
                local_signature: self.initiator_signature,
                remote_signature: reply.responder_signature,
            }),
            state: Lifecycle::Open,
            created_at: now,
            updated_at: now,
        };

        Ok((channel, self.funding_tx.into_inner()))
    }
}

/// Responder state: received `OpenReq`, about to send `OpenAccept`.
pub struct Accepting {
    pub channel_id: ChannelId,
    pub opener: PeerId,
    pub responder: PeerId,
    pub keys: OwnershipKeyPair,
    pub addr: Address,
    pub request: OpenReq,
}

impl Accepting {
    pub fn compose(&self) -> OpenAccept {
        OpenAccept {
            pk: self.keys.public(),
            addr: self.addr.clone(),
        }
    }

    /// Verifies the initiator's proposed commitment signature and builds a
    /// matching counter-signature.
    pub fn interpret(
        self,
        message: FundingCreated,
        now: u64,
    ) -> Result<(FundingSigned, Channel), crate::error::Error> {
        let lock_script = crate::script::multisig_script(&self.request.pk, &self.keys.public());
        let params = StateParams {
            funding_txid: message.funding_txid,
            funding_vout: message.funding_vout,
            funding_amount: Amount::from_sat(self.request.capacity),
            script_code: lock_script,
            addr_initiator: self.request.addr.clone(),
            addr_responder: self.addr.clone(),
            balance_initiator: self.request.capacity,
            balance_responder: 0,
            fee: self.request.fee,
        };
        let commit = CommitTransaction::new(params, message.lock_time, 0);

        let secp = bitcoin::secp256k1::Secp256k1::new();
        crate::keys::verify_signature(
            &secp,
            &self.request.pk,
            &commit.digest(),
            &message.initiator_signature,
        )
        .map_err(|_| crate::error::Error::BadSignature {
            channel: self.channel_id,
            operation: "open:funding_created",
        })?;

        let responder_signature = self.keys.sign(&secp, &commit.digest());

        let channel = Channel {
            id: self.channel_id,
            local_party: Party::Responder,
            opener: self.opener,
            responder: self.responder,
            pk_initiator: self.request.pk,
            pk_responder: self.keys.public(),
            addr_initiator: self.request.addr,
            addr_responder: self.addr,
            capacity: self.request.capacity,
            dust_threshold: crate::DUST_LIMIT,
            fee: self.request.fee,
            balance_initiator: self.request.capacity,
            balance_responder: 0,
            sequence: 0,
            lock_time: message.lock_time,
            funding_outpoint: Some((message.funding_txid, message.funding_vout)),
            latest: Some(crate::channel::LatestCommitment {
                sequence: 0,
                balance_initiator: self.request.capacity,
                balance_responder: 0,
                local_signature: responder_signature.clone(),
                remote_signature: message.initiator_signature,
            }),
            state: Lifecycle::Pending,
            created_at: now,
            updated_at: now,
        };

        Ok((
            FundingSigned {
                responder_signature,
            },
            channel,
        ))
    }
}

/// Responder: receiving `ChannelReady` transitions `Pending` -> `Open`.
pub fn on_channel_ready(channel: &mut Channel, _ready: ChannelReady) {
    channel.state = Lifecycle::Open;
}
