//! Deterministic construction of the channel's 2-of-2 lock/unlock scripts and
//! the fork-aware sighash preimage both parties sign over.
//!
//! The lock script is a bare (non-segwit) multisig output, and the sighash
//! algorithm is the BIP-143 digest shape generalized with the fork-aware
//! `SIGHASH_FORKID` bit, matching chains that adopted BIP-143 hashing for
//! legacy-style scripts to fix the quadratic-hashing and cross-chain replay
//! problems of the original sighash algorithm. Reproducibility of every byte
//! here is load-bearing: these scripts and digests are publicly witnessed on
//! chain (P1, P3, P4, P5 in the engine's test suite).

use crate::keys::OwnershipPublicKey;
use bitcoin::blockdata::opcodes::all::{OP_CHECKMULTISIG, OP_PUSHNUM_2};
use bitcoin::blockdata::script::Builder;
use bitcoin::consensus::encode::serialize;
use bitcoin::hashes::{sha256d, Hash};
use bitcoin::{Script, SigHash, Transaction};

/// `SIGHASH_ALL | SIGHASH_FORKID`.
pub const SIGHASH_FORKID_ALL: u8 = 0x41;

/// Builds `OP_2 <first> <second> OP_2 OP_CHECKMULTISIG`.
///
/// Keys are pushed in the order given, never sorted: the caller fixes that
/// order once, at channel creation, and the channel record remembers it so
/// both sides always reproduce identical bytes (see `Channel`'s
/// initiator-first convention).
pub fn multisig_script(first: &OwnershipPublicKey, second: &OwnershipPublicKey) -> Script {
    Builder::new()
        .push_opcode(OP_PUSHNUM_2)
        .push_slice(&first.serialize())
        .push_slice(&second.serialize())
        .push_opcode(OP_PUSHNUM_2)
        .push_opcode(OP_CHECKMULTISIG)
        .into_script()
}

/// Builds `OP_0 <first_sig> <second_sig>`, in the same fixed order as
/// [`multisig_script`]. `OP_0` satisfies `OP_CHECKMULTISIG`'s historical
/// off-by-one extra-pop requirement.
pub fn multisig_unlock_script(first_sig: &[u8], second_sig: &[u8]) -> Script {
    Builder::new()
        .push_int(0)
        .push_slice(first_sig)
        .push_slice(second_sig)
        .into_script()
}

/// Computes the fork-aware BIP-143-shaped sighash for `tx`'s input at
/// `input_index`, spending a previous output locked by `script_code` holding
/// `amount` satoshi.
///
/// Written generally over `&Transaction` rather than assuming a single
/// input/output, even though every transaction this engine builds happens to
/// have exactly one input.
pub fn sighash(tx: &Transaction, input_index: usize, script_code: &Script, amount: u64) -> SigHash {
    let preimage = sighash_preimage(tx, input_index, script_code, amount);
    SigHash::from_slice(&sha256d::Hash::hash(&preimage)[..]).expect("sha256d output is 32 bytes")
}

fn sighash_preimage(tx: &Transaction, input_index: usize, script_code: &Script, amount: u64) -> Vec<u8> {
    let input = &tx.input[input_index];

    let mut buf = Vec::new();
    buf.extend_from_slice(&tx.version.to_le_bytes());
    buf.extend_from_slice(&hash_prevouts(tx)[..]);
    buf.extend_from_slice(&hash_sequence(tx)[..]);
    buf.extend_from_slice(&serialize(&input.previous_output));
    buf.extend_from_slice(&serialize(script_code));
    buf.extend_from_slice(&amount.to_le_bytes());
    buf.extend_from_slice(&input.sequence.to_le_bytes());
    buf.extend_from_slice(&hash_outputs(tx)[..]);
    buf.extend_from_slice(&tx.lock_time.to_le_bytes());
    buf.extend_from_slice(&u32::from(SIGHASH_FORKID_ALL).to_le_bytes());
    buf
}

fn hash_prevouts(tx: &Transaction) -> sha256d::Hash {
    let mut buf = Vec::new();
    for input in &tx.input {
        buf.extend_from_slice(&serialize(&input.previous_output));
    }
    sha256d::Hash::hash(&buf)
}

fn hash_sequence(tx: &Transaction) -> sha256d::Hash {
    let mut buf = Vec::new();
    for input in &tx.input {
        buf.extend_from_slice(&input.sequence.to_le_bytes());
    }
    sha256d::Hash::hash(&buf)
}

fn hash_outputs(tx: &Transaction) -> sha256d::Hash {
    let mut buf = Vec::new();
    for output in &tx.output {
        buf.extend_from_slice(&serialize(output));
    }
    sha256d::Hash::hash(&buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::OwnershipKeyPair;
    use bitcoin::secp256k1::Secp256k1;

    #[test]
    fn multisig_script_is_pure() {
        let secp = Secp256k1::new();
        let a = OwnershipKeyPair::new_random(&secp).public();
        let b = OwnershipKeyPair::new_random(&secp).public();

        let one = multisig_script(&a, &b);
        let two = multisig_script(&a, &b);

        assert_eq!(one, two);
        assert_ne!(multisig_script(&a, &b), multisig_script(&b, &a));
    }

    proptest::proptest! {
        /// P3: `multisig_script` is pure and order-sensitive for any
        /// randomly generated key pair, not just one fixed example.
        #[test]
        fn multisig_script_is_pure_for_arbitrary_keys(seed_a in proptest::prelude::any::<[u8; 32]>(), seed_b in proptest::prelude::any::<[u8; 32]>()) {
            let secp = Secp256k1::new();
            let (key_a, key_b) = match (
                bitcoin::secp256k1::SecretKey::from_slice(&seed_a),
                bitcoin::secp256k1::SecretKey::from_slice(&seed_b),
            ) {
                (Ok(a), Ok(b)) => (a, b),
                _ => return Ok(()),
            };
            proptest::prop_assume!(key_a != key_b);
            let a = OwnershipKeyPair::from_secret_key(&secp, key_a).public();
            let b = OwnershipKeyPair::from_secret_key(&secp, key_b).public();

            proptest::prop_assert_eq!(multisig_script(&a, &b), multisig_script(&a, &b));
            proptest::prop_assert_ne!(multisig_script(&a, &b), multisig_script(&b, &a));
        }
    }
}
