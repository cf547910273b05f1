//! Durable channel and payment-record storage, grounded in the reference
//! client's `sled` + `serde_cbor` persistence (same crates, extended here to
//! handle in-place updates and an append-only payment log, not just
//! insert-once).

use crate::channel::{Channel, ChannelId, PaymentRecord};
use anyhow::{anyhow, Context};

/// Embedded key/value store. Keyed by `ChannelId` (CBOR bytes) to a
/// CBOR-serialized `Channel` snapshot in one tree; a second tree holds the
/// append-only `PaymentRecord` log keyed by `(channel id, sequence)` so
/// recovery can compare log sequence against snapshot sequence (P6, S3).
pub struct Store {
    channels: sled::Tree,
    payments: sled::Tree,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

impl Store {
    pub fn open(path: &std::path::Path) -> anyhow::Result<Self> {
        let path = path
            .to_str()
            .ok_or_else(|| anyhow!("the store path is not utf-8: {:?}", path))?;
        let db = sled::open(path).with_context(|| format!("could not open the store at {}", path))?;
        let channels = db.open_tree("channels")?;
        let payments = db.open_tree("payments")?;

        Ok(Self { channels, payments })
    }

    /// Inserts a brand-new channel. Fails if one with the same id already
    /// exists — use `update` for subsequent writes.
    pub async fn insert(&self, channel: &Channel) -> anyhow::Result<()> {
        let key = serialize(&channel.id)?;
        let value = serialize(channel).context("could not serialize channel")?;

        self.channels
            .compare_and_swap(key, Option::<Vec<u8>>::None, Some(value))
            .context("could not write to the store")?
            .map_err(|_| anyhow!("channel {} is already stored", channel.id))?;

        self.channels.flush_async().await.map(|_| ()).context("could not flush store")
    }

    /// Atomically replaces a previously-stored channel's snapshot, using
    /// `compare_and_swap` keyed off the value the caller read, so concurrent
    /// writers to the same channel can't silently clobber each other.
    pub async fn update(&self, previous: &Channel, next: &Channel) -> anyhow::Result<()> {
        let key = serialize(&next.id)?;
        let old_value = serialize(previous)?;
        let new_value = serialize(next).context("could not serialize channel")?;

        self.channels
            .compare_and_swap(key, Some(old_value), Some(new_value))
            .context("could not write to the store")?
            .map_err(|_| anyhow!("channel {} changed concurrently, aborting write", next.id))?;

        self.channels.flush_async().await.map(|_| ()).context("could not flush store")
    }

    pub fn get_channel(&self, channel_id: &ChannelId) -> anyhow::Result<Channel> {
        let key = serialize(channel_id)?;
        let raw = self
            .channels
            .get(&key)?
            .ok_or_else(|| anyhow!("channel {} does not exist", channel_id))?;

        deserialize(&raw).context("could not deserialize channel")
    }

    pub fn all_channels(&self) -> anyhow::Result<Vec<Channel>> {
        self.channels
            .iter()
            .values()
            .map(|value| deserialize(&value?).context("could not deserialize channel"))
            .collect()
    }

    pub async fn append_payment(&self, record: &PaymentRecord) -> anyhow::Result<()> {
        let key = payment_key(&record.channel_id, record.sequence);
        let value = serialize(record).context("could not serialize payment record")?;

        self.payments.insert(key, value).context("could not write payment record")?;
        self.payments.flush_async().await.map(|_| ()).context("could not flush store")
    }

    pub fn payments_for(&self, channel_id: &ChannelId) -> anyhow::Result<Vec<PaymentRecord>> {
        self.payments
            .scan_prefix(channel_id.as_bytes())
            .values()
            .map(|value| deserialize(&value?).context("could not deserialize payment record"))
            .collect()
    }
}

/// `channel_id` bytes followed by the big-endian sequence number, so a
/// `scan_prefix(channel_id.as_bytes())` matches every record for that channel
/// and the matches come back in sequence order.
fn payment_key(channel_id: &ChannelId, sequence: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(16 + 8);
    key.extend_from_slice(&channel_id.as_bytes());
    key.extend_from_slice(&sequence.to_be_bytes());
    key
}

pub fn serialize<T: serde::Serialize>(value: &T) -> anyhow::Result<Vec<u8>> {
    Ok(serde_cbor::to_vec(value)?)
}

pub fn deserialize<'a, T: serde::Deserialize<'a>>(bytes: &'a [u8]) -> anyhow::Result<T> {
    Ok(serde_cbor::from_slice(bytes)?)
}
