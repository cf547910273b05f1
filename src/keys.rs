//! Long-term secret custody and per-channel key derivation and signing.
//!
//! The derivation is an HMAC-style chained SHA-256, the same technique the
//! reference lineage's key manager uses to fan a single seed out into many
//! per-purpose keys, generalized here from BIP32 hardened indices to an
//! explicit bind of `(secret, counterparty pubkey, invoice string)` since
//! this system's derivation path is defined by those three inputs rather
//! than a channel index.

use crate::channel::ChannelId;
use crate::script::SIGHASH_FORKID_ALL;
use bitcoin::secp256k1::{self, Message, PublicKey, Secp256k1, SecretKey, Signing, Verification};
use bitcoin::SigHash;
use sha2::{Digest, Sha256};

/// A signing keypair used to authorize spends of the channel's funding
/// output. The secret half never leaves the `Signer` that derived it.
#[derive(Clone)]
pub struct OwnershipKeyPair {
    secret_key: SecretKey,
    public_key: PublicKey,
}

impl OwnershipKeyPair {
    pub fn new_random(secp: &Secp256k1<impl Signing>) -> Self {
        let secret_key = SecretKey::new(&mut rand::thread_rng());
        Self::from_secret_key(secp, secret_key)
    }

    pub fn from_secret_key(secp: &Secp256k1<impl Signing>, secret_key: SecretKey) -> Self {
        let public_key = PublicKey::from_secret_key(secp, &secret_key);
        Self {
            secret_key,
            public_key,
        }
    }

    pub fn public(&self) -> OwnershipPublicKey {
        OwnershipPublicKey(self.public_key)
    }

    pub fn secret_key(&self) -> &SecretKey {
        &self.secret_key
    }

    /// Signs `digest`, returning a DER-encoded ECDSA signature with the
    /// sighash type byte appended — exactly the bytes this engine pushes
    /// into an unlock script.
    pub fn sign(&self, secp: &Secp256k1<impl Signing>, digest: &SigHash) -> Vec<u8> {
        let message = Message::from_slice(&digest[..]).expect("sighash is 32 bytes");
        let signature = secp.sign(&message, &self.secret_key);

        let mut bytes = signature.serialize_der().to_vec();
        bytes.push(SIGHASH_FORKID_ALL);
        bytes
    }
}

impl std::fmt::Debug for OwnershipKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnershipKeyPair")
            .field("public_key", &self.public_key)
            .finish()
    }
}

/// The public half of an [`OwnershipKeyPair`].
#[derive(Clone, Copy, PartialEq, Eq, Debug, serde::Serialize, serde::Deserialize)]
pub struct OwnershipPublicKey(PublicKey);

impl OwnershipPublicKey {
    pub fn serialize(&self) -> [u8; 33] {
        self.0.serialize()
    }
}

impl std::fmt::Display for OwnershipPublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0.serialize()))
    }
}

impl From<PublicKey> for OwnershipPublicKey {
    fn from(public_key: PublicKey) -> Self {
        Self(public_key)
    }
}

impl From<OwnershipPublicKey> for PublicKey {
    fn from(key: OwnershipPublicKey) -> Self {
        key.0
    }
}

#[derive(Debug, thiserror::Error)]
#[error("signature does not verify against the given public key and digest")]
pub struct InvalidSignature;

/// Verifies a DER+hashtype signature produced by [`OwnershipKeyPair::sign`].
pub fn verify_signature(
    secp: &Secp256k1<impl Verification>,
    public_key: &OwnershipPublicKey,
    digest: &SigHash,
    signature_with_hashtype: &[u8],
) -> Result<(), InvalidSignature> {
    if signature_with_hashtype.is_empty() {
        return Err(InvalidSignature);
    }
    let (rest, last) = signature_with_hashtype.split_at(signature_with_hashtype.len() - 1);
    if last[0] != SIGHASH_FORKID_ALL {
        return Err(InvalidSignature);
    }

    let signature = secp256k1::Signature::from_der(rest).map_err(|_| InvalidSignature)?;
    let message = Message::from_slice(&digest[..]).expect("sighash is 32 bytes");

    secp.verify(&message, &signature, &public_key.0)
        .map_err(|_| InvalidSignature)
}

/// Holds the long-term secret and derives per-channel signing keys. No other
/// component ever sees raw secret bytes.
pub struct Signer {
    secp: Secp256k1<secp256k1::All>,
    master_secret: [u8; 32],
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer").finish_non_exhaustive()
    }
}

impl Signer {
    pub fn new(master_secret: [u8; 32]) -> Self {
        Self {
            secp: Secp256k1::new(),
            master_secret,
        }
    }

    /// Derives the keypair this party uses in a given channel, bound to the
    /// counterparty's long-term public key so the derivation is unique to
    /// this pairing.
    pub fn derive_channel_keys(
        &self,
        channel_id: &ChannelId,
        counterparty: &OwnershipPublicKey,
    ) -> OwnershipKeyPair {
        let seed = derive_seed(&self.master_secret, counterparty, channel_id);
        let secret_key = key_step(&seed, b"funding key");
        OwnershipKeyPair::from_secret_key(&self.secp, secret_key)
    }

    pub fn sign(&self, keys: &OwnershipKeyPair, digest: &SigHash) -> Vec<u8> {
        keys.sign(&self.secp, digest)
    }

    pub fn verify(
        &self,
        public_key: &OwnershipPublicKey,
        digest: &SigHash,
        signature: &[u8],
    ) -> Result<(), InvalidSignature> {
        verify_signature(&self.secp, public_key, digest, signature)
    }
}

fn derive_seed(master_secret: &[u8; 32], counterparty: &OwnershipPublicKey, channel_id: &ChannelId) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(master_secret);
    hasher.update(&counterparty.serialize());
    hasher.update(format!("channel:{}", channel_id).as_bytes());
    hasher.finalize().into()
}

fn key_step(seed: &[u8; 32], info: &[u8]) -> SecretKey {
    let mut hasher = Sha256::new();
    hasher.update(seed);
    hasher.update(info);
    let bytes: [u8; 32] = hasher.finalize().into();
    SecretKey::from_slice(&bytes).expect("SHA-256 output is a valid secret key")
}
