//! Unilateral close: broadcasts the latest committed state when the peer
//! has gone silent and the channel's locktime has expired. Both
//! preconditions are required — neither a silent peer before `T` nor an
//! elapsed `T` with a responsive peer triggers this path (§4.I).

use crate::chain::{ChainError, ChainOracle};
use crate::channel::{Channel, Party};
use crate::error::Error;
use crate::transaction::{CommitTransaction, StateParams};
use bitcoin::Transaction;
use std::time::Duration;

/// `true` only when the peer has been silent for at least `peer_timeout`
/// *and* the wall clock has passed the channel's locktime `T`.
pub fn should_force_close(channel: &Channel, last_peer_contact: u64, now: u64, peer_timeout: Duration) -> bool {
    let peer_silent = now.saturating_sub(last_peer_contact) >= peer_timeout.as_secs();
    let locktime_elapsed = now >= u64::from(channel.lock_time);
    peer_silent && locktime_elapsed
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

/// Rebuilds the latest committed commitment transaction from `channel.latest`
/// and attaches both parties' stored signatures in channel key order,
/// producing the exact transaction that was signed at `SEND_PAY`/`RECV_PAY`
/// time.
pub fn latest_signed_commitment(channel: &Channel) -> Result<Transaction, Error> {
    let latest = channel.latest.as_ref().ok_or(Error::ChannelNotOpen {
        channel: channel.id,
        operation: "force_close",
        state: channel.state,
    })?;

    let params = state_params(channel, latest.balance_initiator, latest.balance_responder);
    let commit = CommitTransaction::new(params, channel.lock_time, latest.sequence);

    let (sig_initiator, sig_responder) = match channel.local_party {
        Party::Initiator => (latest.local_signature.clone(), latest.remote_signature.clone()),
        Party::Responder => (latest.remote_signature.clone(), latest.local_signature.clone()),
    };

    Ok(commit.add_signatures(sig_initiator, sig_responder))
}

/// Broadcasts the latest committed commitment transaction and returns its
/// txid. Unlike the placeholder force-close this engine's reference lineage
/// shipped (§9 Open Question 3), this always broadcasts the real latest
/// commitment and surfaces the real txid the chain assigned it.
pub async fn broadcast_latest<O: ChainOracle>(oracle: &O, channel: &Channel) -> Result<bitcoin::Txid, Error> {
    let tx = latest_signed_commitment(channel)?;

    crate::chain::with_retry(3, || oracle.broadcast(tx.clone()))
        .await
        .map_err(|err| match err {
            ChainError::Rejected(reason) => Error::Broadcast {
                channel: channel.id,
                operation: "force_close",
                reason,
            },
            ChainError::Unavailable(reason) | ChainError::Permanent(reason) => Error::ChainUnavailable {
                channel: channel.id,
                operation: "force_close",
                source: anyhow::anyhow!(reason),
            },
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neither_precondition_alone_is_sufficient() {
        let mut channel = dummy_channel();
        channel.lock_time = 1_000;

        // peer silent, but locktime not yet elapsed
        assert!(!should_force_close(&channel, 0, 500, Duration::from_secs(300)));

        // locktime elapsed, but peer just made contact
        assert!(!should_force_close(&channel, 1_100, 1_100, Duration::from_secs(300)));

        // both hold
        assert!(should_force_close(&channel, 0, 1_100, Duration::from_secs(300)));
    }

    fn dummy_channel() -> Channel {
        use crate::channel::{ChannelId, Lifecycle, PeerId};
        use crate::keys::OwnershipKeyPair;
        use bitcoin::secp256k1::Secp256k1;
        use std::str::FromStr;

        let secp = Secp256k1::new();
        let pk = OwnershipKeyPair::new_random(&secp).public();
        let addr = bitcoin::Address::from_str("1BvBMSEYstWetqTFn5Au4m4GFg7xJaNVN2").unwrap();
        Channel {
            id: ChannelId::random(),
            local_party: Party::Initiator,
            opener: PeerId("alice".into()),
            responder: PeerId("bob".into()),
            pk_initiator: pk,
            pk_responder: pk,
            addr_initiator: addr.clone(),
            addr_responder: addr,
            capacity: 10_000,
            dust_threshold: crate::DUST_LIMIT,
            fee: crate::TX_FEE,
            balance_initiator: 10_000,
            balance_responder: 0,
            sequence: 0,
            lock_time: 0,
            funding_outpoint: None,
            latest: None,
            state: Lifecycle::Open,
            created_at: 0,
            updated_at: 0,
        }
    }
}
