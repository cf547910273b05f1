#![warn(
    unused_extern_crates,
    missing_debug_implementations,
    rust_2018_idioms,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::fallible_impl_from,
    clippy::cast_precision_loss,
    clippy::cast_possible_wrap,
    clippy::dbg_macro
)]
#![cfg_attr(not(test), warn(clippy::unwrap_used))]
#![forbid(unsafe_code)]
#![allow(non_snake_case)]

pub mod chain;
pub mod channel;
pub mod config;
pub mod dispute;
pub mod engine;
pub mod error;
pub mod events;
pub mod force_close;
pub mod keys;
pub mod protocol;
pub mod script;
pub mod state_machine;
pub mod store;
pub mod transaction;
pub mod transport;
pub mod wallet;

pub use ::bitcoin;

pub use channel::{Channel, ChannelId, Lifecycle, PaymentRecord, PeerId};
pub use config::EngineConfig;
pub use engine::Engine;
pub use error::Error;

/// Flat fee used for all on-chain transactions built by this engine, in
/// satoshi. Neither the spec nor the lineage it is grounded on gives a
/// dynamic fee estimator, so this constant is carried over unchanged.
pub const TX_FEE: u64 = 10_000;

/// Outputs at or below this value are omitted entirely rather than built
/// with a zero or dust amount.
pub const DUST_LIMIT: u64 = 546;
