//! End-to-end coverage of the engine facade against in-process mocks: no
//! bitcoind, no testcontainers. Dispute and force-close paths need a chain
//! both parties observe and a clock the test controls, which a real regtest
//! node can't give us as cheaply as `MockChain` and a plain `u64` can.

mod harness;

use bitcoin::secp256k1::Secp256k1;
use bitcoin::{Address, Amount};
use ducat::channel::{Lifecycle, PeerId};
use ducat::keys::{OwnershipKeyPair, Signer};
use ducat::store::Store;
use ducat::{Engine, EngineConfig, Error};
use harness::{make_transports, MockChain, MockWallet};
use std::str::FromStr;

fn temp_store() -> (Store, TempDir) {
    let dir = TempDir::new();
    (Store::open(dir.path()).expect("open temp store"), dir)
}

struct TempDir(std::path::PathBuf);
impl TempDir {
    fn new() -> Self {
        let mut path = std::env::temp_dir();
        path.push(format!("ducat-e2e-{}", uuid::Uuid::new_v4()));
        Self(path)
    }
    fn path(&self) -> &std::path::Path {
        &self.0
    }
}
impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

fn identity() -> OwnershipKeyPair {
    OwnershipKeyPair::new_random(&Secp256k1::new())
}

fn addr() -> Address {
    Address::from_str("1BvBMSEYstWetqTFn5Au4m4GFg7xJaNVN2").expect("well-known mainnet address literal")
}

struct Parties {
    alice: Engine<MockChain, MockWallet>,
    bob: Engine<MockChain, MockWallet>,
}

fn build_parties(chain: MockChain, config: EngineConfig) -> (Parties, TempDir, TempDir) {
    let (alice_store, alice_dir) = temp_store();
    let (bob_store, bob_dir) = temp_store();

    let alice = Engine::new(
        config.clone(),
        alice_store,
        Signer::new([1u8; 32]),
        chain.clone(),
        MockWallet::funded(Amount::from_sat(50_000_000)),
    );
    let bob = Engine::new(
        config,
        bob_store,
        Signer::new([2u8; 32]),
        chain,
        MockWallet::funded(Amount::from_sat(50_000_000)),
    );

    (Parties { alice, bob }, alice_dir, bob_dir)
}

/// S1: open a channel, exchange six payments in alternating directions, then
/// cooperatively close it.
#[tokio::test]
async fn open_pay_six_times_then_close() {
    let chain = MockChain::new();
    let (parties, _alice_dir, _bob_dir) = build_parties(chain.clone(), EngineConfig::default());
    let (mut alice_transport, mut bob_transport) = make_transports();
    let mut alice_events = parties.alice.events().subscribe();

    let alice_identity = identity();
    let bob_identity = identity();

    let alice_fut = parties.alice.open_channel_initiator(
        PeerId("alice".into()),
        PeerId("bob".into()),
        bob_identity.public(),
        Amount::from_sat(1_000_000),
        3600,
        addr(),
        None,
        &mut alice_transport,
    );
    let bob_fut = parties
        .bob
        .open_channel_responder(PeerId("alice".into()), PeerId("bob".into()), alice_identity.public(), addr(), &mut bob_transport);

    let (alice_channel, bob_channel) = futures::future::try_join(alice_fut, bob_fut).await.expect("open succeeds");
    assert_eq!(alice_channel, bob_channel);
    assert_eq!(chain.broadcasts().len(), 1, "funding tx broadcast exactly once");
    assert!(matches!(alice_events.try_recv(), Ok(ducat::events::Event::ChannelOpened { channel_id }) if channel_id == alice_channel));

    let amounts = [10_000u64, 25_000, 5_000, 50_000, 1_000, 8_000];
    for (i, amount) in amounts.iter().copied().enumerate() {
        if i % 2 == 0 {
            let pay_fut = parties.alice.pay(alice_channel, amount, &mut alice_transport);
            let recv_fut = parties.bob.receive_update(bob_channel, &mut bob_transport);
            let (receipt, sequence) = futures::future::try_join(pay_fut, recv_fut).await.expect("payment round-trips");
            assert_eq!(receipt.sequence, sequence);
        } else {
            let pay_fut = parties.bob.pay(bob_channel, amount, &mut bob_transport);
            let recv_fut = parties.alice.receive_update(alice_channel, &mut alice_transport);
            let (receipt, sequence) = futures::future::try_join(pay_fut, recv_fut).await.expect("payment round-trips");
            assert_eq!(receipt.sequence, sequence);
        }
    }

    let alice_balance = parties.alice.channel_balance(alice_channel).unwrap();
    let bob_balance = parties.bob.channel_balance(bob_channel).unwrap();
    assert_eq!(alice_balance.ours, bob_balance.theirs);
    assert_eq!(alice_balance.theirs, bob_balance.ours);

    let close_fut = parties.alice.close_channel(alice_channel, &mut alice_transport);
    let accept_fut = parties.bob.accept_close(bob_channel, &mut bob_transport);
    let (close_txid, accept_txid) = futures::future::try_join(close_fut, accept_fut).await.expect("cooperative close succeeds");
    assert_eq!(close_txid, accept_txid);
    assert_eq!(chain.broadcasts().len(), 2, "settlement tx broadcast exactly once, after funding");

    let closed = parties.alice.list_channels().unwrap();
    assert!(closed.iter().any(|c| c.id == alice_channel && c.state == Lifecycle::Closed));
}

/// S2: a payment request for more than the local balance is rejected before
/// anything is sent to the peer.
#[tokio::test]
async fn pay_more_than_balance_is_rejected_without_contacting_peer() {
    let chain = MockChain::new();
    let (parties, _alice_dir, _bob_dir) = build_parties(chain, EngineConfig::default());
    let (mut alice_transport, mut bob_transport) = make_transports();

    let alice_identity = identity();
    let bob_identity = identity();

    let alice_fut = parties.alice.open_channel_initiator(
        PeerId("alice".into()),
        PeerId("bob".into()),
        bob_identity.public(),
        Amount::from_sat(1_000_000),
        3600,
        addr(),
        None,
        &mut alice_transport,
    );
    let bob_fut = parties
        .bob
        .open_channel_responder(PeerId("alice".into()), PeerId("bob".into()), alice_identity.public(), addr(), &mut bob_transport);
    let (alice_channel, _bob_channel) = futures::future::try_join(alice_fut, bob_fut).await.expect("open succeeds");

    let balance = parties.alice.channel_balance(alice_channel).unwrap();
    let result = parties.alice.pay(alice_channel, balance.ours + 1, &mut alice_transport).await;

    assert!(matches!(result, Err(Error::InsufficientBalance { .. })));
}

/// S3: a channel's state survives closing and reopening the store.
#[tokio::test]
async fn channel_state_survives_store_reopen() {
    let chain = MockChain::new();
    let config = EngineConfig::default();
    let alice_dir = TempDir::new();
    let bob_dir = TempDir::new();

    let alice_signer_seed = [5u8; 32];
    let alice_identity = identity();
    let bob_identity = identity();
    let (mut alice_transport, mut bob_transport) = make_transports();

    let alice_channel = {
        let alice_store = Store::open(alice_dir.path()).unwrap();
        let bob_store = Store::open(bob_dir.path()).unwrap();
        let alice = Engine::new(
            config.clone(),
            alice_store,
            Signer::new(alice_signer_seed),
            chain.clone(),
            MockWallet::funded(Amount::from_sat(50_000_000)),
        );
        let bob = Engine::new(config.clone(), bob_store, Signer::new([6u8; 32]), chain.clone(), MockWallet::funded(Amount::from_sat(50_000_000)));

        let alice_fut = alice.open_channel_initiator(
            PeerId("alice".into()),
            PeerId("bob".into()),
            bob_identity.public(),
            Amount::from_sat(1_000_000),
            3600,
            addr(),
            None,
            &mut alice_transport,
        );
        let bob_fut = bob.open_channel_responder(PeerId("alice".into()), PeerId("bob".into()), alice_identity.public(), addr(), &mut bob_transport);
        let (alice_channel, _bob_channel) = futures::future::try_join(alice_fut, bob_fut).await.expect("open succeeds");

        let pay_fut = alice.pay(alice_channel, 12_000, &mut alice_transport);
        let recv_fut = bob.receive_update(_bob_channel, &mut bob_transport);
        futures::future::try_join(pay_fut, recv_fut).await.expect("payment round-trips");

        alice_channel
    };

    // Reopen the store fresh — the engine above is dropped, the sled tree is not.
    let alice_store = Store::open(alice_dir.path()).unwrap();
    let reopened = Engine::new(config, alice_store, Signer::new(alice_signer_seed), chain, MockWallet::funded(Amount::from_sat(50_000_000)));

    let channel = reopened.list_channels().unwrap().into_iter().find(|c| c.id == alice_channel).expect("channel persisted across reopen");
    assert_eq!(channel.sequence, 1);
    assert_eq!(channel.balance_initiator, 1_000_000 - 12_000);
}

/// S4: broadcasting an outdated commitment against a channel's funding
/// output is detected by the dispute monitor, which responds by publishing
/// the latest known state.
#[tokio::test]
async fn dispute_monitor_detects_and_responds_to_an_old_state_broadcast() {
    let chain = MockChain::new();
    let (parties, _alice_dir, _bob_dir) = build_parties(chain.clone(), EngineConfig::default());
    let (mut alice_transport, mut bob_transport) = make_transports();

    let alice_identity = identity();
    let bob_identity = identity();

    let alice_fut = parties.alice.open_channel_initiator(
        PeerId("alice".into()),
        PeerId("bob".into()),
        bob_identity.public(),
        Amount::from_sat(1_000_000),
        3600,
        addr(),
        None,
        &mut alice_transport,
    );
    let bob_fut = parties
        .bob
        .open_channel_responder(PeerId("alice".into()), PeerId("bob".into()), alice_identity.public(), addr(), &mut bob_transport);
    let (alice_channel, bob_channel) = futures::future::try_join(alice_fut, bob_fut).await.expect("open succeeds");

    let stale_channel = parties.alice.list_channels().unwrap().into_iter().find(|c| c.id == alice_channel).unwrap();
    let stale_commitment = ducat::force_close::latest_signed_commitment(&stale_channel).expect("sequence 0 is already signed");

    let pay_fut = parties.alice.pay(alice_channel, 40_000, &mut alice_transport);
    let recv_fut = parties.bob.receive_update(bob_channel, &mut bob_transport);
    futures::future::try_join(pay_fut, recv_fut).await.expect("payment round-trips");

    let funding_outpoint = stale_channel.funding_outpoint.expect("channel is funded");
    chain.inject_spend(bitcoin::OutPoint::new(funding_outpoint.0, funding_outpoint.1), stale_commitment.clone());

    let alerts = parties.bob.check_disputes(stale_channel.created_at + 1).await.expect("dispute scan succeeds");

    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].channel_id, bob_channel);
    assert_eq!(alerts[0].broadcast_sequence, 0);
    assert_eq!(alerts[0].latest_known_sequence, 1);
    assert!(chain.broadcasts().iter().any(|tx| tx.txid() != stale_commitment.txid()), "responded with the latest commitment, not the stale one");
}

/// S5: with the peer silent past `peer_timeout` and the locktime elapsed,
/// `try_force_close` unilaterally publishes the latest commitment.
#[tokio::test]
async fn force_close_fires_once_both_preconditions_hold() {
    let chain = MockChain::new();
    let mut config = EngineConfig::default();
    config.peer_timeout = std::time::Duration::from_secs(100);
    let (parties, _alice_dir, _bob_dir) = build_parties(chain.clone(), config);
    let (mut alice_transport, mut bob_transport) = make_transports();

    let alice_identity = identity();
    let bob_identity = identity();

    let alice_fut = parties.alice.open_channel_initiator(
        PeerId("alice".into()),
        PeerId("bob".into()),
        bob_identity.public(),
        Amount::from_sat(1_000_000),
        50,
        addr(),
        None,
        &mut alice_transport,
    );
    let bob_fut = parties
        .bob
        .open_channel_responder(PeerId("alice".into()), PeerId("bob".into()), alice_identity.public(), addr(), &mut bob_transport);
    let (alice_channel, _bob_channel) = futures::future::try_join(alice_fut, bob_fut).await.expect("open succeeds");

    let channel = parties.alice.list_channels().unwrap().into_iter().find(|c| c.id == alice_channel).unwrap();
    let too_soon = parties.alice.try_force_close(alice_channel, channel.created_at + 10).await.expect("force close check succeeds");
    assert!(too_soon.is_none(), "neither precondition holds yet");

    let late_enough = channel.created_at + u64::from(channel.lock_time) + 101;
    let txid = parties.alice.try_force_close(alice_channel, late_enough).await.expect("force close check succeeds").expect("both preconditions hold");

    assert!(chain.broadcasts().iter().any(|tx| tx.txid() == txid));
    let closed = parties.alice.list_channels().unwrap().into_iter().find(|c| c.id == alice_channel).unwrap();
    assert_eq!(closed.state, Lifecycle::Closed);
}

/// S6: an `UpdateReq` that skips a sequence number is rejected, and the
/// channel's state is untouched.
#[tokio::test]
async fn out_of_order_update_is_rejected() {
    let chain = MockChain::new();
    let (parties, _alice_dir, _bob_dir) = build_parties(chain, EngineConfig::default());
    let (mut alice_transport, mut bob_transport) = make_transports();

    let alice_identity = identity();
    let bob_identity = identity();

    let alice_fut = parties.alice.open_channel_initiator(
        PeerId("alice".into()),
        PeerId("bob".into()),
        bob_identity.public(),
        Amount::from_sat(1_000_000),
        3600,
        addr(),
        None,
        &mut alice_transport,
    );
    let bob_fut = parties
        .bob
        .open_channel_responder(PeerId("alice".into()), PeerId("bob".into()), alice_identity.public(), addr(), &mut bob_transport);
    let (alice_channel, bob_channel) = futures::future::try_join(alice_fut, bob_fut).await.expect("open succeeds");

    // Alice sends a well-formed UpdateReq directly over the transport,
    // skipping straight to sequence 2 instead of 1.
    let channel = parties.alice.list_channels().unwrap().into_iter().find(|c| c.id == alice_channel).unwrap();
    let keys = Signer::new([1u8; 32]).derive_channel_keys(&alice_channel, &bob_identity.public());
    let secp = Secp256k1::new();
    let params = ducat::transaction::StateParams {
        funding_txid: channel.funding_outpoint.unwrap().0,
        funding_vout: channel.funding_outpoint.unwrap().1,
        funding_amount: channel.funding_amount(),
        script_code: channel.locking_script(),
        addr_initiator: channel.addr_initiator.clone(),
        addr_responder: channel.addr_responder.clone(),
        balance_initiator: channel.balance_initiator - 1_000,
        balance_responder: channel.balance_responder + 1_000,
        fee: channel.fee,
    };
    let bogus_commit = ducat::transaction::CommitTransaction::new(params, channel.lock_time, 2);
    let bogus_signature = keys.sign(&secp, &bogus_commit.digest());

    let envelope = ducat::protocol::Envelope {
        channel_id: alice_channel,
        timestamp: 0,
        signature: None,
        message: ducat::protocol::Message::UpdateReq(ducat::protocol::UpdateReq {
            sequence: 2,
            balance_initiator: channel.balance_initiator - 1_000,
            balance_responder: channel.balance_responder + 1_000,
            signature: bogus_signature,
        }),
    };

    use ducat::transport::SendMessage;
    alice_transport.send_message(&PeerId("bob".into()), envelope).await.unwrap();

    let result = parties.bob.receive_update(bob_channel, &mut bob_transport).await;
    assert!(matches!(result, Err(Error::BadSequence { .. })));

    let untouched = parties.bob.list_channels().unwrap().into_iter().find(|c| c.id == bob_channel).unwrap();
    assert_eq!(untouched.sequence, 0);
}
