//! Builds the three on-chain transaction kinds this engine ever produces:
//! funding, commitment and settlement. Every constructor here is a pure
//! function of its inputs (P3, P4) — reproducibility is the whole point,
//! since these bytes are publicly witnessed on chain.

use crate::script;
use crate::wallet::Utxo;
use crate::{DUST_LIMIT, TX_FEE};
use bitcoin::{Address, Amount, OutPoint, Script, SigHash, Transaction, TxIn, TxOut, Txid};

/// Any `nSequence` at or below this value is a valid "replaceable" sequence
/// for this engine's commitment transactions: `nSequence = SEQUENCE_MAX_REPLACEABLE
/// - s`, so higher sequence numbers `s` produce lower `nSequence` values and
/// the chain's replacement rules let a newer state replace an older one.
pub const SEQUENCE_MAX_REPLACEABLE: u32 = 0xFFFF_FFFE;

/// `nSequence` used on a settlement transaction's input: final, not subject
/// to replacement.
pub const SEQUENCE_FINAL: u32 = 0xFFFF_FFFF;

/// Recovers the sequence number `s` a commitment's `nSequence` encodes.
pub fn sequence_number_of(nsequence: u32) -> u64 {
    u64::from(SEQUENCE_MAX_REPLACEABLE.saturating_sub(nsequence))
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("utxo set totals {available} satoshi, less than the {required} required")]
    InsufficientFunds { available: u64, required: u64 },
}

/// The on-chain transaction that creates the channel's 2-of-2 output.
#[derive(Clone, Debug, PartialEq)]
pub struct FundingTransaction {
    inner: Transaction,
    lock_script: Script,
}

impl FundingTransaction {
    /// Spends `utxos` (P2PKH, opener-owned) to fund the channel. Any change
    /// above dust is returned to `change_address`. Both the input and
    /// output orderings are deterministic so an independently-reconstructed
    /// instance of this transaction produces identical bytes.
    pub fn new(
        utxos: &[Utxo],
        change_address: Option<&Address>,
        lock_script: Script,
        capacity: Amount,
        fee: Amount,
    ) -> Result<Self, BuildError> {
        let available: u64 = utxos.iter().map(|utxo| utxo.amount.as_sat()).sum();
        let required = capacity.as_sat() + fee.as_sat();
        if available < required {
            return Err(BuildError::InsufficientFunds { available, required });
        }

        let mut input: Vec<TxIn> = utxos
            .iter()
            .map(|utxo| TxIn {
                previous_output: OutPoint::new(utxo.txid, utxo.vout),
                script_sig: Script::new(),
                sequence: SEQUENCE_FINAL,
                witness: Vec::new(),
            })
            .collect();
        input.sort_by_key(|input| input.previous_output);

        let mut output = vec![TxOut {
            value: capacity.as_sat(),
            script_pubkey: lock_script.clone(),
        }];

        let change = available - required;
        if change > DUST_LIMIT {
            if let Some(change_address) = change_address {
                output.push(TxOut {
                    value: change,
                    script_pubkey: change_address.script_pubkey(),
                });
            }
        }
        output.sort_by(|a, b| a.script_pubkey.cmp(&b.script_pubkey));

        let inner = Transaction {
            version: 1,
            lock_time: 0,
            input,
            output,
        };

        Ok(Self { inner, lock_script })
    }

    pub fn txid(&self) -> Txid {
        self.inner.txid()
    }

    /// The output index of the multisig output, wherever deterministic
    /// sorting happened to place it.
    pub fn funding_vout(&self) -> u32 {
        self.inner
            .output
            .iter()
            .position(|output| output.script_pubkey == self.lock_script)
            .expect("constructor always includes the lock script as an output") as u32
    }

    pub fn into_inner(self) -> Transaction {
        self.inner
    }

    pub fn as_ref(&self) -> &Transaction {
        &self.inner
    }
}

/// Parameters shared by commitment and settlement transactions: they differ
/// only in `nLockTime`/`nSequence`.
#[derive(Clone, Debug)]
pub struct StateParams {
    pub funding_txid: Txid,
    pub funding_vout: u32,
    pub funding_amount: Amount,
    pub script_code: Script,
    pub addr_initiator: Address,
    pub addr_responder: Address,
    pub balance_initiator: u64,
    pub balance_responder: u64,
    pub fee: u64,
}

/// Splits `fee` half-and-half between both sides; if one side can't cover
/// its half without falling at-or-below the dust threshold, it pays nothing
/// and the other (non-dust) side absorbs the whole fee instead. Resolves
/// Open Question 2 ("half to each, debit the non-dust side").
fn apply_fee(balance_initiator: u64, balance_responder: u64, fee: u64) -> (u64, u64) {
    let half = fee / 2;
    let other_half = fee - half;

    let initiator_after = balance_initiator.saturating_sub(half);
    let responder_after = balance_responder.saturating_sub(other_half);

    if initiator_after <= DUST_LIMIT && balance_initiator > initiator_after {
        (
            balance_initiator,
            balance_responder.saturating_sub(fee.min(balance_responder)),
        )
    } else if responder_after <= DUST_LIMIT && balance_responder > responder_after {
        (
            balance_initiator.saturating_sub(fee.min(balance_initiator)),
            balance_responder,
        )
    } else {
        (initiator_after, responder_after)
    }
}

fn build_outputs(params: &StateParams) -> Vec<TxOut> {
    let (amount_initiator, amount_responder) =
        apply_fee(params.balance_initiator, params.balance_responder, params.fee);

    let mut output = Vec::with_capacity(2);
    if amount_initiator > DUST_LIMIT {
        output.push(TxOut {
            value: amount_initiator,
            script_pubkey: params.addr_initiator.script_pubkey(),
        });
    }
    if amount_responder > DUST_LIMIT {
        output.push(TxOut {
            value: amount_responder,
            script_pubkey: params.addr_responder.script_pubkey(),
        });
    }
    output.sort_by(|a, b| a.script_pubkey.cmp(&b.script_pubkey));
    output
}

fn build_state_tx(params: &StateParams, lock_time: u32, sequence: u32) -> Transaction {
    Transaction {
        version: 2,
        lock_time,
        input: vec![TxIn {
            previous_output: OutPoint::new(params.funding_txid, params.funding_vout),
            script_sig: Script::new(),
            sequence,
            witness: Vec::new(),
        }],
        output: build_outputs(params),
    }
}

fn digest_of(tx: &Transaction, script_code: &Script, amount: Amount) -> SigHash {
    script::sighash(tx, 0, script_code, amount.as_sat())
}

/// An off-chain, signed-but-unbroadcast transaction spending the funding
/// output to pay each party their balance as of sequence `s`.
#[derive(Clone, Debug)]
pub struct CommitTransaction {
    inner: Transaction,
    script_code: Script,
    amount: Amount,
}

impl CommitTransaction {
    pub fn new(params: StateParams, lock_time: u32, sequence_number: u64) -> Self {
        let sequence = SEQUENCE_MAX_REPLACEABLE.saturating_sub(sequence_number as u32);
        let funding_amount = params.funding_amount;
        let script_code = params.script_code.clone();
        let inner = build_state_tx(&params, lock_time, sequence);

        Self {
            inner,
            script_code,
            amount: funding_amount,
        }
    }

    pub fn digest(&self) -> SigHash {
        digest_of(&self.inner, &self.script_code, self.amount)
    }

    pub fn sequence_number(&self) -> u64 {
        sequence_number_of(self.inner.input[0].sequence)
    }

    pub fn txid(&self) -> Txid {
        self.inner.txid()
    }

    /// Attaches both signatures in channel key order, producing the final
    /// broadcastable transaction.
    pub fn add_signatures(mut self, sig_initiator: Vec<u8>, sig_responder: Vec<u8>) -> Transaction {
        self.inner.input[0].script_sig =
            script::multisig_unlock_script(&sig_initiator, &sig_responder);
        self.inner
    }

    pub fn as_ref(&self) -> &Transaction {
        &self.inner
    }
}

/// The final cooperative-close transaction: same shape as a commitment but
/// immediately broadcastable (`nLockTime = 0`, `nSequence` final).
#[derive(Clone, Debug)]
pub struct SettlementTransaction {
    inner: Transaction,
    script_code: Script,
    amount: Amount,
}

impl SettlementTransaction {
    pub fn new(params: StateParams) -> Self {
        let funding_amount = params.funding_amount;
        let script_code = params.script_code.clone();
        let inner = build_state_tx(&params, 0, SEQUENCE_FINAL);

        Self {
            inner,
            script_code,
            amount: funding_amount,
        }
    }

    pub fn digest(&self) -> SigHash {
        digest_of(&self.inner, &self.script_code, self.amount)
    }

    pub fn add_signatures(mut self, sig_initiator: Vec<u8>, sig_responder: Vec<u8>) -> Transaction {
        self.inner.input[0].script_sig =
            script::multisig_unlock_script(&sig_initiator, &sig_responder);
        self.inner
    }

    pub fn as_ref(&self) -> &Transaction {
        &self.inner
    }
}
