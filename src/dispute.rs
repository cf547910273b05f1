//! Periodically scans open and closing channels for an outdated commitment
//! broadcast against the funding output, and responds by broadcasting the
//! latest one before the channel's locktime `T` elapses.

use crate::chain::{ChainError, ChainOracle};
use crate::channel::{Channel, DisputeAlert, DisputeStatus, Lifecycle};
use crate::transaction::sequence_number_of;
use bitcoin::{OutPoint, Transaction};

/// One pass over `channels`, querying `oracle` for any spend of each open
/// or closing channel's funding output. Returns an alert for every outdated
/// broadcast observed; the caller (`Engine`) is responsible for then
/// broadcasting the latest commitment and persisting the alert.
pub async fn scan<O: ChainOracle>(
    oracle: &O,
    channels: &[Channel],
    now: u64,
) -> Vec<DisputeAlert> {
    let mut alerts = Vec::new();

    for channel in channels {
        if !matches!(channel.state, Lifecycle::Open | Lifecycle::Closing) {
            continue;
        }
        let Some((funding_txid, funding_vout)) = channel.funding_outpoint else {
            continue;
        };

        let spend = match find_spend(oracle, OutPoint::new(funding_txid, funding_vout)).await {
            Some(spend) => spend,
            None => continue,
        };

        let broadcast_sequence = sequence_number_of(spend.input[0].sequence);
        if broadcast_sequence < channel.sequence {
            alerts.push(DisputeAlert {
                channel_id: channel.id,
                detected_at: now,
                broadcast_txid: spend.txid(),
                broadcast_sequence,
                latest_known_sequence: channel.sequence,
                deadline: channel.lock_time,
                status: DisputeStatus::Detected,
            });
        }
    }

    alerts
}

/// Looks for a transaction spending `outpoint`, the channel's funding
/// output. `ChainError::Unavailable` is swallowed here rather than
/// propagated — a single flaky poll of one channel among many must not
/// abort the whole scan; the next `dispute_check_interval` tick tries again.
async fn find_spend<O: ChainOracle>(oracle: &O, outpoint: OutPoint) -> Option<Transaction> {
    match oracle.find_spend(outpoint).await {
        Ok(spend) => spend,
        Err(ChainError::Unavailable(_)) => None,
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_broadcast_sequence_from_nsequence() {
        assert_eq!(sequence_number_of(crate::transaction::SEQUENCE_MAX_REPLACEABLE - 3), 3);
    }
}
