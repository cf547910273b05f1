//! A fixed-UTXO wallet stub. Signature bytes are never checked by anything
//! in these tests — only the channel's 2-of-2 multisig signatures are, and
//! those never touch `Wallet` — so `sign_p2pkh` returns a fixed-shape dummy.

use bitcoin::{Address, Amount, Script, Transaction, Txid};
use ducat::wallet::{Utxo, Wallet};
use std::str::FromStr;

#[derive(Clone)]
pub struct MockWallet {
    utxos: Vec<Utxo>,
}

impl MockWallet {
    /// A wallet holding a single UTXO of `amount`, comfortably funding any
    /// channel capacity these tests open.
    pub fn funded(amount: Amount) -> Self {
        let script_pubkey = dummy_address().script_pubkey();
        Self {
            utxos: vec![Utxo {
                txid: Txid::from_str("1111111111111111111111111111111111111111111111111111111111111111").unwrap_or_else(|_| {
                    Txid::from_slice(&[7u8; 32]).expect("32 bytes is a valid txid")
                }),
                vout: 0,
                amount,
                script_pubkey,
            }],
        }
    }
}

pub fn dummy_address() -> Address {
    Address::from_str("1BvBMSEYstWetqTFn5Au4m4GFg7xJaNVN2").expect("well-known mainnet address literal")
}

#[async_trait::async_trait]
impl Wallet for MockWallet {
    async fn list_utxos(&self) -> anyhow::Result<Vec<Utxo>> {
        Ok(self.utxos.clone())
    }

    async fn sign_p2pkh(&self, _utxo: &Utxo, _tx: &Transaction) -> anyhow::Result<Vec<u8>> {
        Ok(vec![0u8; 71])
    }
}

#[allow(dead_code)]
pub fn unused_script() -> Script {
    Script::new()
}
