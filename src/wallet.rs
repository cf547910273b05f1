//! The wallet port: used by the channel opener only, to fund the channel.

use async_trait::async_trait;
use bitcoin::{Amount, Script, Transaction, Txid};

/// A spendable P2PKH output the opener's wallet controls.
#[derive(Clone, Debug)]
pub struct Utxo {
    pub txid: Txid,
    pub vout: u32,
    pub amount: Amount,
    pub script_pubkey: Script,
}

#[async_trait]
pub trait Wallet {
    async fn list_utxos(&self) -> anyhow::Result<Vec<Utxo>>;

    /// Signs the input spending `utxo` in `tx`, returning a DER+hashtype
    /// signature suitable for that input's `scriptSig`.
    async fn sign_p2pkh(&self, utxo: &Utxo, tx: &Transaction) -> anyhow::Result<Vec<u8>>;
}
