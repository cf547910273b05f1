//! An in-memory `ChainOracle`. `broadcast` records the transaction and marks
//! each of its inputs' previous outputs as spent by it, so a dispute test can
//! later `find_spend` the outpoint an old commitment was published against
//! without a real node.

use bitcoin::hashes::sha256d;
use bitcoin::{BlockHash, OutPoint, Transaction, Txid};
use ducat::chain::{ChainError, ChainOracle, FetchedTx, MerkleProof};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Inner {
    broadcasts: Vec<Transaction>,
    spends: HashMap<OutPoint, Transaction>,
    tip: u32,
}

/// Cheaply `Clone`, so both ends of a channel negotiation can hold a handle
/// onto the same ledger — a funding tx Alice broadcasts is immediately
/// visible to Bob's dispute scan, as it would be against a shared node.
#[derive(Clone, Default)]
pub struct MockChain {
    inner: Arc<Mutex<Inner>>,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn broadcasts(&self) -> Vec<Transaction> {
        self.inner.lock().expect("lock poisoned").broadcasts.clone()
    }

    /// Registers `tx` as the spend of `outpoint` without going through
    /// `broadcast`, so a test can simulate a counterparty publishing an old
    /// commitment directly.
    pub fn inject_spend(&self, outpoint: OutPoint, tx: Transaction) {
        self.inner.lock().expect("lock poisoned").spends.insert(outpoint, tx);
    }
}

#[async_trait::async_trait]
impl ChainOracle for MockChain {
    async fn fetch_tx(&self, txid: Txid) -> Result<FetchedTx, ChainError> {
        let inner = self.inner.lock().expect("lock poisoned");
        inner
            .broadcasts
            .iter()
            .find(|tx| tx.txid() == txid)
            .cloned()
            .map(|raw| FetchedTx {
                raw,
                block_height: None,
                block_hash: None,
            })
            .ok_or_else(|| ChainError::Permanent("unknown txid".into()))
    }

    async fn broadcast(&self, raw: Transaction) -> Result<Txid, ChainError> {
        let mut inner = self.inner.lock().expect("lock poisoned");
        let txid = raw.txid();
        for input in &raw.input {
            inner.spends.insert(input.previous_output, raw.clone());
        }
        inner.broadcasts.push(raw);
        Ok(txid)
    }

    async fn tip_height(&self) -> Result<u32, ChainError> {
        Ok(self.inner.lock().expect("lock poisoned").tip)
    }

    async fn merkle_proof(&self, _txid: Txid) -> Result<Option<MerkleProof>, ChainError> {
        Ok(None)
    }

    async fn verify_merkle_root(&self, _root: sha256d::Hash, _height: u32) -> Result<bool, ChainError> {
        Ok(true)
    }

    async fn find_spend(&self, outpoint: OutPoint) -> Result<Option<Transaction>, ChainError> {
        Ok(self.inner.lock().expect("lock poisoned").spends.get(&outpoint).cloned())
    }
}
