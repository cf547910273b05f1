//! Cooperative close exchange: `CloseReq -> CloseAccept -> CloseComplete`.
//! Directly grounded in the reference lineage's single-message close
//! exchange, which needed nothing more elaborate since closing spends no
//! PTLC and reveals no revocation secret: build the settlement transaction,
//! sign once, exchange, attach both signatures, broadcast.

use super::{CloseAccept, CloseComplete, CloseReq};
use crate::channel::Channel;
use crate::error::Error;
use crate::keys::OwnershipKeyPair;
use crate::transaction::{SettlementTransaction, StateParams};
use bitcoin::Transaction;

fn settlement_params(channel: &Channel) -> StateParams {
    StateParams {
        funding_txid: channel.funding_outpoint.expect("open channel is funded").0,
        funding_vout: channel.funding_outpoint.expect("open channel is funded").1,
        funding_amount: channel.funding_amount(),
        script_code: channel.locking_script(),
        addr_initiator: channel.addr_initiator.clone(),
        addr_responder: channel.addr_responder.clone(),
        balance_initiator: channel.balance_initiator,
        balance_responder: channel.balance_responder,
        fee: channel.fee,
    }
}

/// Initiating side: about to send `CloseReq`.
pub struct Closing<'a> {
    pub channel: &'a Channel,
    pub keys: &'a OwnershipKeyPair,
}

impl<'a> Closing<'a> {
    pub fn compose(&self) -> (CloseReq, SettlementTransaction) {
        let settlement = SettlementTransaction::new(settlement_params(self.channel));
        let secp = bitcoin::secp256k1::Secp256k1::signing_only();
        let signature = self.keys.sign(&secp, &settlement.digest());

        (CloseReq { signature: signature.clone() }, settlement)
    }

    /// Verifies the counterparty's signature and assembles the final,
    /// broadcastable settlement transaction.
    pub fn interpret(
        &self,
        our_signature: Vec<u8>,
        reply: CloseAccept,
        counterparty_pk: &crate::keys::OwnershipPublicKey,
    ) -> Result<Transaction, Error> {
        let settlement = SettlementTransaction::new(settlement_params(self.channel));

        let secp = bitcoin::secp256k1::Secp256k1::new();
        crate::keys::verify_signature(&secp, counterparty_pk, &settlement.digest(), &reply.signature)
            .map_err(|_| Error::BadSignature {
                channel: self.channel.id,
                operation: "close:accept",
            })?;

        use crate::channel::Party;
        let (sig_initiator, sig_responder) = match self.channel.local_party {
            Party::Initiator => (our_signature, reply.signature),
            Party::Responder => (reply.signature, our_signature),
        };

        Ok(settlement.add_signatures(sig_initiator, sig_responder))
    }
}

/// Responding side: received `CloseReq`, about to send `CloseAccept`.
pub struct Accepting<'a> {
    pub channel: &'a Channel,
    pub keys: &'a OwnershipKeyPair,
}

impl<'a> Accepting<'a> {
    pub fn interpret(
        &self,
        request: CloseReq,
        counterparty_pk: &crate::keys::OwnershipPublicKey,
    ) -> Result<(CloseAccept, Transaction), Error> {
        let settlement = SettlementTransaction::new(settlement_params(self.channel));

        let secp = bitcoin::secp256k1::Secp256k1::new();
        crate::keys::verify_signature(&secp, counterparty_pk, &settlement.digest(), &request.signature)
            .map_err(|_| Error::BadSignature {
                channel: self.channel.id,
                operation: "close:req",
            })?;

        let our_signature = self.keys.sign(&secp, &settlement.digest());

        use crate::channel::Party;
        let (sig_initiator, sig_responder) = match self.channel.local_party {
            Party::Initiator => (our_signature.clone(), request.signature),
            Party::Responder => (request.signature, our_signature.clone()),
        };

        Ok((
            CloseAccept {
                signature: our_signature,
            },
            settlement.add_signatures(sig_initiator, sig_responder),
        ))
    }
}

pub fn on_close_complete(channel: &mut Channel, _complete: CloseComplete) {
    channel.state = crate::channel::Lifecycle::Closed;
}
