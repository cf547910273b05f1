//! The authoritative channel lifecycle: allowed operations per state, and
//! the transitions that are not already covered by the `protocol::{create,
//! update, close}` exchanges (which own the `SEND_PAY`/`RECV_PAY`/`CLOSE`
//! message-building contracts themselves, since those need the commitment
//! bytes right where they're signed).

use crate::channel::{Channel, Lifecycle};
use crate::error::Error;

/// The operations named in the lifecycle diagram. Each `Lifecycle` value
/// accepts exactly the subset documented here; anything else is rejected
/// before any mutation is attempted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    SetFunding,
    ConfirmOpen,
    Fail,
    SendPay,
    RecvPay,
    Close,
    ForceClose,
    AcceptSettlement,
}

pub fn ensure_allowed(channel: &Channel, operation: Operation, op_name: &'static str) -> Result<(), Error> {
    use Lifecycle::*;
    use Operation::*;

    let allowed = match (channel.state, operation) {
        (Pending, SetFunding) | (Pending, ConfirmOpen) | (Pending, Fail) => true,
        (Open, SendPay) | (Open, RecvPay) | (Open, Close) | (Open, ForceClose) => true,
        (Closing, AcceptSettlement) | (Closing, ForceClose) => true,
        _ => false,
    };

    if allowed {
        Ok(())
    } else {
        Err(Error::ChannelNotOpen {
            channel: channel.id,
            operation: op_name,
            state: channel.state,
        })
    }
}

/// `CLOSE`: only from `Open`, transitions to `Closing`. The settlement
/// transaction itself is built by `protocol::close`; this just performs the
/// lifecycle transition once that exchange has started.
pub fn begin_close(channel: &mut Channel) -> Result<(), Error> {
    ensure_allowed(channel, Operation::Close, "close")?;
    channel.state = Lifecycle::Closing;
    Ok(())
}

/// Settlement broadcast confirmed (or simply accepted cooperatively):
/// `Closing -> Closed`.
pub fn complete_close(channel: &mut Channel, now: u64) {
    channel.state = Lifecycle::Closed;
    channel.updated_at = now;
}

/// Funding failed before the channel ever opened: `Pending -> Failed`. A
/// channel never transitions to `Failed` from `Open` — only funding failure
/// produces it.
pub fn fail(channel: &mut Channel, now: u64) {
    channel.state = Lifecycle::Failed;
    channel.updated_at = now;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{Channel, Party, PeerId};
    use crate::keys::OwnershipKeyPair;
    use bitcoin::secp256k1::Secp256k1;
    use std::str::FromStr;

    fn dummy_channel(state: Lifecycle) -> Channel {
        let secp = Secp256k1::new();
        let pk = OwnershipKeyPair::new_random(&secp).public();
        let addr = bitcoin::Address::from_str("1BvBMSEYstWetqTFn5Au4m4GFg7xJaNVN2").unwrap();
        Channel {
            id: crate::channel::ChannelId::random(),
            local_party: Party::Initiator,
            opener: PeerId("alice".into()),
            responder: PeerId("bob".into()),
            pk_initiator: pk,
            pk_responder: pk,
            addr_initiator: addr.clone(),
            addr_responder: addr,
            capacity: 10_000,
            dust_threshold: crate::DUST_LIMIT,
            fee: crate::TX_FEE,
            balance_initiator: 10_000,
            balance_responder: 0,
            sequence: 0,
            lock_time: 0,
            funding_outpoint: None,
            latest: None,
            state,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn open_channel_accepts_send_pay_not_close_from_closing() {
        let open = dummy_channel(Lifecycle::Open);
        assert!(ensure_allowed(&open, Operation::SendPay, "pay").is_ok());

        let closing = dummy_channel(Lifecycle::Closing);
        assert!(ensure_allowed(&closing, Operation::SendPay, "pay").is_err());
        assert!(ensure_allowed(&closing, Operation::ForceClose, "force_close").is_ok());
    }

    #[test]
    fn terminal_states_accept_nothing() {
        let closed = dummy_channel(Lifecycle::Closed);
        assert!(ensure_allowed(&closed, Operation::SendPay, "pay").is_err());
        assert!(ensure_allowed(&closed, Operation::ForceClose, "force_close").is_err());
    }
}
