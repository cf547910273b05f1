pub mod chain;
pub mod transport;
pub mod wallet;

pub use chain::MockChain;
pub use transport::{make_transports, MpscTransport};
pub use wallet::MockWallet;
