//! The chain-query backend port: raw-tx fetch, broadcast, tip height, merkle
//! proofs. Implementations may be HTTP clients, full nodes, or mocks; the
//! core only requires that transient `Unavailable` errors are tolerated with
//! bounded retry and permanent errors are surfaced.

use async_trait::async_trait;
use bitcoin::hashes::sha256d;
use bitcoin::{BlockHash, OutPoint, Transaction, Txid};
use std::future::Future;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("chain backend temporarily unavailable: {0}")]
    Unavailable(String),

    #[error("permanent chain error: {0}")]
    Permanent(String),

    #[error("broadcast rejected: {0}")]
    Rejected(String),
}

#[derive(Clone, Debug)]
pub struct FetchedTx {
    pub raw: Transaction,
    pub block_height: Option<u32>,
    pub block_hash: Option<BlockHash>,
}

#[derive(Clone, Debug)]
pub struct MerkleProof {
    pub merkle_root: sha256d::Hash,
    pub path: Vec<sha256d::Hash>,
}

#[async_trait]
pub trait ChainOracle {
    async fn fetch_tx(&self, txid: Txid) -> Result<FetchedTx, ChainError>;

    async fn broadcast(&self, raw: Transaction) -> Result<Txid, ChainError>;

    async fn tip_height(&self) -> Result<u32, ChainError>;

    async fn merkle_proof(&self, txid: Txid) -> Result<Option<MerkleProof>, ChainError>;

    async fn verify_merkle_root(&self, root: sha256d::Hash, height: u32) -> Result<bool, ChainError>;

    /// Finds the transaction, if any, that spends `outpoint`. Needed by the
    /// `DisputeMonitor` to notice an old-state commitment broadcast against
    /// a channel's funding output; most chain-indexing backends expose this
    /// as a direct "spent-by" lookup rather than requiring a linear scan.
    async fn find_spend(&self, outpoint: OutPoint) -> Result<Option<Transaction>, ChainError>;
}

/// Retries `f` up to `budget` times on `ChainError::Unavailable`, with a
/// fixed backoff. Permanent errors and rejections propagate immediately.
pub async fn with_retry<F, Fut, T>(mut budget: u32, mut f: F) -> Result<T, ChainError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ChainError>>,
{
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(ChainError::Unavailable(reason)) => {
                if budget == 0 {
                    return Err(ChainError::Unavailable(reason));
                }
                budget -= 1;
                tokio::time::delay_for(Duration::from_millis(200)).await;
            }
            Err(other) => return Err(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_transient_errors_up_to_budget() {
        let attempts = AtomicU32::new(0);

        let result: Result<u32, ChainError> = with_retry(2, || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(ChainError::Unavailable("flaky".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
    }

    #[tokio::test]
    async fn does_not_retry_permanent_errors() {
        let attempts = AtomicU32::new(0);

        let result: Result<u32, ChainError> = with_retry(5, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async move { Err(ChainError::Permanent("nope".into())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
