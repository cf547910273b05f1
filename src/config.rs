//! Explicit engine configuration, replacing the reference lineage's implicit
//! mutable global config (§9 of the design notes).

use std::time::Duration;

#[derive(Clone, Copy, Debug)]
pub struct CapacityBounds {
    pub min: u64,
    pub max: u64,
}

#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub capacity_bounds: CapacityBounds,
    pub open_timeout: Duration,
    pub payment_timeout: Duration,
    pub dispute_check_interval: Duration,
    pub fee_rate: u64,
    pub peer_timeout: Duration,
    pub auto_accept_threshold: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            capacity_bounds: CapacityBounds {
                min: 10_000,
                max: 100_000_000,
            },
            open_timeout: Duration::from_secs(30),
            payment_timeout: Duration::from_secs(5),
            dispute_check_interval: Duration::from_secs(60),
            fee_rate: crate::TX_FEE,
            peer_timeout: Duration::from_secs(300),
            auto_accept_threshold: 1_000_000,
        }
    }
}
