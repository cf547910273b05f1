use crate::channel::{ChannelId, Lifecycle};

/// The full error taxonomy surfaced by this crate. Every variant carries the
/// channel it concerns, the operation that was attempted, and enough
/// kind-specific context for a caller to classify and log it without string
/// matching the `Display` output.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("[{channel}] {operation}: sequence {given} is not the current sequence's successor")]
    BadSequence {
        channel: ChannelId,
        operation: &'static str,
        given: u64,
    },

    #[error("[{channel}] {operation}: balances {balance_a} + {balance_b} do not sum to capacity")]
    BadConservation {
        channel: ChannelId,
        operation: &'static str,
        balance_a: u64,
        balance_b: u64,
    },

    #[error("[{channel}] {operation}: counterparty signature does not verify")]
    BadSignature {
        channel: ChannelId,
        operation: &'static str,
    },

    #[error("[{channel}] {operation}: amount {amount} exceeds local balance {balance}")]
    InsufficientBalance {
        channel: ChannelId,
        operation: &'static str,
        amount: u64,
        balance: u64,
    },

    #[error("[{channel}] {operation}: channel is not open (state: {state:?})")]
    ChannelNotOpen {
        channel: ChannelId,
        operation: &'static str,
        state: Lifecycle,
    },

    #[error("{operation}: unknown channel {channel}")]
    UnknownChannel {
        channel: ChannelId,
        operation: &'static str,
    },

    #[error("[{channel}] {operation}: timed out waiting for a reply")]
    Timeout {
        channel: ChannelId,
        operation: &'static str,
    },

    #[error("[{channel}] {operation}: chain backend unavailable")]
    ChainUnavailable {
        channel: ChannelId,
        operation: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("[{channel}] {operation}: broadcast rejected: {reason}")]
    Broadcast {
        channel: ChannelId,
        operation: &'static str,
        reason: String,
    },

    #[error("[{channel}] {operation}: store operation failed")]
    StoreFailure {
        channel: ChannelId,
        operation: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("[{channel}] {operation}: expected a different message, got {got}")]
    UnexpectedMessage {
        channel: ChannelId,
        operation: &'static str,
        got: &'static str,
    },
}

impl Error {
    pub fn channel(&self) -> ChannelId {
        match self {
            Error::BadSequence { channel, .. }
            | Error::BadConservation { channel, .. }
            | Error::BadSignature { channel, .. }
            | Error::InsufficientBalance { channel, .. }
            | Error::ChannelNotOpen { channel, .. }
            | Error::UnknownChannel { channel, .. }
            | Error::Timeout { channel, .. }
            | Error::ChainUnavailable { channel, .. }
            | Error::Broadcast { channel, .. }
            | Error::StoreFailure { channel, .. }
            | Error::UnexpectedMessage { channel, .. } => *channel,
        }
    }

    pub fn operation(&self) -> &'static str {
        match self {
            Error::BadSequence { operation, .. }
            | Error::BadConservation { operation, .. }
            | Error::BadSignature { operation, .. }
            | Error::InsufficientBalance { operation, .. }
            | Error::ChannelNotOpen { operation, .. }
            | Error::UnknownChannel { operation, .. }
            | Error::Timeout { operation, .. }
            | Error::ChainUnavailable { operation, .. }
            | Error::Broadcast { operation, .. }
            | Error::StoreFailure { operation, .. }
            | Error::UnexpectedMessage { operation, .. } => operation,
        }
    }

    /// `true` for error kinds that indicate the counterparty misbehaved, as
    /// opposed to a caller or transient-environment error.
    pub fn is_peer_misbehavior(&self) -> bool {
        matches!(
            self,
            Error::BadSequence { .. } | Error::BadConservation { .. } | Error::BadSignature { .. }
        )
    }
}
