//! Thin facade wiring `StateMachine`, `Protocol`, `Signer`, `Store`,
//! `DisputeMonitor` and `ForceClose` behind the `openChannel`/`pay`/
//! `closeChannel`/`paidRequest`/`listChannels`/`channelBalance` API of
//! `spec.md` §4.J. Generic over the two external ports this engine itself
//! drives directly (`ChainOracle`, `Wallet`); `Transport` is taken per call
//! instead of stored, since each call already owns the stream for its
//! duration (§6: one logical stream per channel for updates, one for
//! open/close negotiation).

use crate::chain::{with_retry, ChainError, ChainOracle};
use crate::channel::{Balance, Channel, ChannelId, Direction, Lifecycle, Party, PaymentRecord, PeerId};
use crate::config::EngineConfig;
use crate::error::Error;
use crate::events::{EngineEvents, Event, EventBus};
use crate::keys::{OwnershipKeyPair, OwnershipPublicKey, Signer};
use crate::protocol::{self, close, create, update, Envelope, Message};
use crate::store::Store;
use crate::transport::Transport;
use crate::wallet::Wallet;
use bitcoin::{Address, Amount, Txid};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex as AsyncMutex;

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is after the Unix epoch")
        .as_secs()
}

/// What a successful `pay`/`receive_update` leaves the caller holding:
/// enough to reconcile against the `PaymentRecord` log without re-reading
/// the channel.
#[derive(Clone, Debug)]
pub struct PaymentReceipt {
    pub channel_id: ChannelId,
    pub sequence: u64,
    pub amount: u64,
}

/// Per-channel mutex table: every mutation of a channel is serialized
/// against all other mutations of the *same* channel, while different
/// channels progress concurrently (§5).
#[derive(Default)]
struct Locks {
    table: HashMap<ChannelId, Arc<AsyncMutex<()>>>,
}

impl Locks {
    fn entry(&mut self, id: ChannelId) -> Arc<AsyncMutex<()>> {
        self.table.entry(id).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
    }
}

#[derive(Debug)]
pub struct Engine<C, W> {
    config: EngineConfig,
    store: Store,
    signer: Signer,
    chain: C,
    wallet: W,
    events: EventBus,
    locks: AsyncMutex<Locks>,
    last_peer_contact: AsyncMutex<HashMap<ChannelId, u64>>,
}

impl<C, W> Engine<C, W>
where
    C: ChainOracle + Send + Sync,
    W: Wallet + Send + Sync,
{
    pub fn new(config: EngineConfig, store: Store, signer: Signer, chain: C, wallet: W) -> Self {
        Self {
            config,
            store,
            signer,
            chain,
            wallet,
            events: EventBus::new(256),
            locks: AsyncMutex::new(Locks::default()),
            last_peer_contact: AsyncMutex::new(HashMap::new()),
        }
    }

    pub fn events(&self) -> EventBus {
        self.events.clone()
    }

    pub fn list_channels(&self) -> Result<Vec<Channel>, Error> {
        self.store.all_channels().map_err(store_failure(None, "list_channels"))
    }

    pub fn channel_balance(&self, channel_id: ChannelId) -> Result<Balance, Error> {
        Ok(self.get_channel(channel_id)?.balance())
    }

    fn get_channel(&self, channel_id: ChannelId) -> Result<Channel, Error> {
        self.store.get_channel(&channel_id).map_err(|_| Error::UnknownChannel {
            channel: channel_id,
            operation: "lookup",
        })
    }

    async fn lock(&self, channel_id: ChannelId) -> Arc<AsyncMutex<()>> {
        self.locks.lock().await.entry(channel_id)
    }

    async fn note_contact(&self, channel_id: ChannelId, now: u64) {
        self.last_peer_contact.lock().await.insert(channel_id, now);
    }

    /// `openChannel`, initiator side: proposes capacity and lifetime, funds
    /// from the wallet port, and exchanges signatures over the initial
    /// (sequence 0) commitment.
    ///
    /// `remote_identity_pk` is the responder's long-term identity key —
    /// known in advance of opening a channel with them, the same way a
    /// peer's static node key is known before a connection exists — and is
    /// what the per-channel key derivation (§4.E) binds to. It is distinct
    /// from `OpenAccept::pk`, the fresh per-channel funding key the
    /// responder proposes during this very exchange.
    #[allow(clippy::too_many_arguments)]
    pub async fn open_channel_initiator<T: Transport>(
        &self,
        opener: PeerId,
        responder: PeerId,
        remote_identity_pk: OwnershipPublicKey,
        capacity: Amount,
        lifetime_secs: u32,
        addr: Address,
        change_address: Option<Address>,
        transport: &mut T,
    ) -> Result<ChannelId, Error> {
        let channel_id = ChannelId::random();
        self.check_capacity_bounds(channel_id, capacity)?;

        let fee = Amount::from_sat(self.config.fee_rate);
        let keys = self.signer.derive_channel_keys(&channel_id, &remote_identity_pk);

        let initiating = create::Initiating {
            channel_id,
            opener: opener.clone(),
            responder: responder.clone(),
            capacity,
            fee,
            lifetime_secs,
            keys,
            addr,
        };

        let request = initiating.compose();
        self.send(transport, &responder, channel_id, Message::OpenReq(request), None, now_unix()).await?;

        let reply = self.recv_timeout(transport, &responder, self.config.open_timeout, channel_id, "OpenAccept").await?;
        let accept = match reply.message {
            Message::OpenAccept(accept) => accept,
            Message::OpenReject(reject) => {
                return Err(Error::Broadcast {
                    channel: channel_id,
                    operation: "open:reject",
                    reason: reject.reason,
                })
            }
            other => return Err(unexpected(channel_id, "OpenAccept", &other)),
        };

        let awaiting_funding = initiating.interpret(accept);

        let utxos = self.wallet.list_utxos().await.map_err(|source| Error::ChainUnavailable {
            channel: channel_id,
            operation: "open:wallet",
            source,
        })?;
        let now = now_unix();
        let (funding_created, awaiting_signed) = awaiting_funding
            .compose(&utxos, change_address.as_ref(), now)
            .map_err(|err| Error::Broadcast {
                channel: channel_id,
                operation: "open:build_funding",
                reason: err.to_string(),
            })?;

        self.send(transport, &responder, channel_id, Message::FundingCreated(funding_created), None, now_unix())
            .await?;

        let reply = self
            .recv_timeout(transport, &responder, self.config.open_timeout, channel_id, "FundingSigned")
            .await?;
        let funding_signed = match reply.message {
            Message::FundingSigned(signed) => signed,
            other => return Err(unexpected(channel_id, "FundingSigned", &other)),
        };

        let (channel, funding_tx) = awaiting_signed.interpret(funding_signed, now_unix())?;

        with_retry(3, || self.chain.broadcast(funding_tx.clone()))
            .await
            .map_err(chain_error(channel_id, "open:broadcast_funding"))?;

        self.store.insert(&channel).await.map_err(store_failure(Some(channel_id), "open:persist"))?;
        self.send(transport, &responder, channel_id, Message::ChannelReady(protocol::ChannelReady), None, now_unix())
            .await?;

        self.on_open_accept(channel_id).await;
        Ok(channel_id)
    }

    /// `openChannel`, responder side: accepts an incoming `OpenReq`, waits
    /// for the funded commitment, counter-signs it, and marks the channel
    /// `Open` once `ChannelReady` arrives.
    pub async fn open_channel_responder<T: Transport>(
        &self,
        opener: PeerId,
        responder: PeerId,
        remote_identity_pk: OwnershipPublicKey,
        addr: Address,
        transport: &mut T,
    ) -> Result<ChannelId, Error> {
        let channel_id = ChannelId::random();
        let reply = self
            .recv_timeout(transport, &opener, self.config.open_timeout, channel_id, "OpenReq")
            .await?;
        let request = match reply.message {
            Message::OpenReq(request) => request,
            other => return Err(unexpected(channel_id, "OpenReq", &other)),
        };

        if request.capacity < self.config.capacity_bounds.min || request.capacity > self.config.capacity_bounds.max {
            let reject = protocol::OpenReject {
                reason: "capacity outside accepted bounds".into(),
            };
            self.send(transport, &opener, channel_id, Message::OpenReject(reject), None, now_unix()).await?;
            return Err(Error::InsufficientBalance {
                channel: channel_id,
                operation: "open:capacity_bounds",
                amount: request.capacity,
                balance: self.config.capacity_bounds.max,
            });
        }

        let keys = self.signer.derive_channel_keys(&channel_id, &remote_identity_pk);
        let accepting = create::Accepting {
            channel_id,
            opener: opener.clone(),
            responder,
            keys,
            addr,
            request,
        };

        self.send(transport, &opener, channel_id, Message::OpenAccept(accepting.compose()), None, now_unix())
            .await?;

        let reply = self
            .recv_timeout(transport, &opener, self.config.open_timeout, channel_id, "FundingCreated")
            .await?;
        let funding_created = match reply.message {
            Message::FundingCreated(message) => message,
            other => return Err(unexpected(channel_id, "FundingCreated", &other)),
        };

        let (funding_signed, channel) = accepting.interpret(funding_created, now_unix())?;
        self.store.insert(&channel).await.map_err(store_failure(Some(channel_id), "open:persist"))?;

        self.send(transport, &opener, channel_id, Message::FundingSigned(funding_signed), None, now_unix())
            .await?;

        let reply = self
            .recv_timeout(transport, &opener, self.config.open_timeout, channel_id, "ChannelReady")
            .await?;
        let ready = match reply.message {
            Message::ChannelReady(ready) => ready,
            other => return Err(unexpected(channel_id, "ChannelReady", &other)),
        };

        let mut channel = self.get_channel(channel_id)?;
        let previous = channel.clone();
        create::on_channel_ready(&mut channel, ready);
        self.store.update(&previous, &channel).await.map_err(store_failure(Some(channel_id), "open:confirm"))?;

        self.on_open_accept(channel_id).await;
        Ok(channel_id)
    }

    /// `pay`: the `SEND_PAY` contract (§4.F). Fails fast on
    /// `ChannelNotOpen`/`InsufficientBalance` without sending anything;
    /// otherwise exchanges `UpdateReq`/`UpdateAck` and, on success,
    /// persists the new paired signatures as `latest` and appends a
    /// `PaymentRecord`.
    pub async fn pay<T: Transport>(&self, channel_id: ChannelId, amount: u64, transport: &mut T) -> Result<PaymentReceipt, Error> {
        let lock = self.lock(channel_id).await;
        let _guard = lock.lock().await;

        let channel = self.get_channel(channel_id)?;
        let peer = self.counterparty_peer(&channel);
        let counterparty_pk = *channel.counterparty_key(channel.local_party);
        let keys = self.signer.derive_channel_keys(&channel_id, &counterparty_pk);

        let sending = update::Sending {
            channel: &channel,
            keys: &keys,
            amount,
        };
        let (request, _commit) = sending.compose()?;
        let sequence = request.sequence;
        let balance_initiator = request.balance_initiator;
        let balance_responder = request.balance_responder;
        let local_signature = request.signature.clone();

        self.send(transport, &peer, channel_id, Message::UpdateReq(request), Some(&keys), now_unix()).await?;

        let reply = self
            .recv_timeout(transport, &peer, self.config.payment_timeout, channel_id, "UpdateAck")
            .await?;
        let ack = match reply.message {
            Message::UpdateAck(ack) if ack.sequence == sequence => ack,
            Message::UpdateReject(reject) => {
                return Err(Error::Broadcast {
                    channel: channel_id,
                    operation: "pay:reject",
                    reason: reject.reason,
                })
            }
            other => return Err(unexpected(channel_id, "UpdateAck", &other)),
        };

        let commit = crate::transaction::CommitTransaction::new(
            commit_params(&channel, balance_initiator, balance_responder),
            channel.lock_time,
            sequence,
        );
        let secp = bitcoin::secp256k1::Secp256k1::verification_only();
        crate::keys::verify_signature(&secp, &counterparty_pk, &commit.digest(), &ack.signature).map_err(|_| Error::BadSignature {
            channel: channel_id,
            operation: "pay:ack",
        })?;

        let now = now_unix();
        let mut next = channel.clone();
        update::apply_ack(
            &mut next,
            balance_initiator,
            balance_responder,
            sequence,
            local_signature.clone(),
            ack.signature.clone(),
            now,
        );
        self.store.update(&channel, &next).await.map_err(store_failure(Some(channel_id), "pay"))?;
        self.store
            .append_payment(&PaymentRecord {
                channel_id,
                amount,
                direction: Direction::Sent,
                sequence,
                remote_signature: Some(ack.signature),
                local_signature: Some(local_signature),
                timestamp: now,
            })
            .await
            .map_err(store_failure(Some(channel_id), "pay:log"))?;

        self.note_contact(channel_id, now).await;
        self.on_update(channel_id, sequence).await;

        Ok(PaymentReceipt { channel_id, sequence, amount })
    }

    /// `RECV_PAY`: processes exactly one incoming `UpdateReq` and replies
    /// with an `UpdateAck`. Strict sequence ordering, conservation and
    /// signature checks, in that order, are enforced by
    /// `protocol::update::Receiving` before anything is persisted.
    pub async fn receive_update<T: Transport>(&self, channel_id: ChannelId, transport: &mut T) -> Result<u64, Error> {
        let lock = self.lock(channel_id).await;
        let _guard = lock.lock().await;

        let channel = self.get_channel(channel_id)?;
        let peer = self.counterparty_peer(&channel);
        let counterparty_pk = *channel.counterparty_key(channel.local_party);
        let keys = self.signer.derive_channel_keys(&channel_id, &counterparty_pk);

        let reply = self
            .recv_timeout(transport, &peer, self.config.payment_timeout, channel_id, "UpdateReq")
            .await?;
        let request = match reply.message {
            Message::UpdateReq(request) => request,
            other => return Err(unexpected(channel_id, "UpdateReq", &other)),
        };

        let sequence = request.sequence;
        let balance_initiator = request.balance_initiator;
        let balance_responder = request.balance_responder;
        let remote_signature = request.signature.clone();
        let amount = match channel.local_party {
            Party::Initiator => balance_initiator.saturating_sub(channel.balance_initiator),
            Party::Responder => balance_responder.saturating_sub(channel.balance_responder),
        };

        let receiving = update::Receiving {
            channel: &channel,
            keys: &keys,
            counterparty_pk: &counterparty_pk,
        };
        let ack = match receiving.interpret(request) {
            Ok((ack, _commit)) => ack,
            Err(err) => {
                let reject = protocol::UpdateReject {
                    sequence: channel.sequence + 1,
                    reason: err.to_string(),
                };
                self.send(transport, &peer, channel_id, Message::UpdateReject(reject), None, now_unix()).await?;
                return Err(err);
            }
        };
        let local_signature = ack.signature.clone();

        self.send(transport, &peer, channel_id, Message::UpdateAck(ack), Some(&keys), now_unix()).await?;

        let now = now_unix();
        let mut next = channel.clone();
        update::apply_ack(&mut next, balance_initiator, balance_responder, sequence, local_signature.clone(), remote_signature.clone(), now);
        self.store.update(&channel, &next).await.map_err(store_failure(Some(channel_id), "recv_pay"))?;
        self.store
            .append_payment(&PaymentRecord {
                channel_id,
                amount,
                direction: Direction::Received,
                sequence,
                remote_signature: Some(remote_signature),
                local_signature: Some(local_signature),
                timestamp: now,
            })
            .await
            .map_err(store_failure(Some(channel_id), "recv_pay:log"))?;

        self.note_contact(channel_id, now).await;
        self.on_update(channel_id, sequence).await;
        Ok(sequence)
    }

    /// `closeChannel`: cooperative close from `Open`. Builds and exchanges
    /// the settlement transaction, then broadcasts it.
    pub async fn close_channel<T: Transport>(&self, channel_id: ChannelId, transport: &mut T) -> Result<Txid, Error> {
        let lock = self.lock(channel_id).await;
        let _guard = lock.lock().await;

        let mut channel = self.get_channel(channel_id)?;
        let peer = self.counterparty_peer(&channel);
        let previous = channel.clone();
        crate::state_machine::begin_close(&mut channel)?;
        self.store.update(&previous, &channel).await.map_err(store_failure(Some(channel_id), "close"))?;

        let counterparty_pk = *channel.counterparty_key(channel.local_party);
        let keys = self.signer.derive_channel_keys(&channel_id, &counterparty_pk);
        let closing = close::Closing { channel: &channel, keys: &keys };
        let (request, _settlement) = closing.compose();
        self.send(transport, &peer, channel_id, Message::CloseReq(request.clone()), Some(&keys), now_unix())
            .await?;

        let reply = self
            .recv_timeout(transport, &peer, self.config.open_timeout, channel_id, "CloseAccept")
            .await?;
        let accept = match reply.message {
            Message::CloseAccept(accept) => accept,
            other => return Err(unexpected(channel_id, "CloseAccept", &other)),
        };

        let settlement = closing.interpret(request.signature, accept, &counterparty_pk)?;
        let txid = settlement.txid();
        with_retry(3, || self.chain.broadcast(settlement.clone()))
            .await
            .map_err(chain_error(channel_id, "close:broadcast"))?;

        let previous = channel.clone();
        crate::state_machine::complete_close(&mut channel, now_unix());
        self.store.update(&previous, &channel).await.map_err(store_failure(Some(channel_id), "close:complete"))?;

        self.send(transport, &peer, channel_id, Message::CloseComplete(protocol::CloseComplete { txid }), None, now_unix())
            .await?;

        self.on_close(channel_id).await;
        Ok(txid)
    }

    /// Accepts a peer-initiated cooperative close.
    pub async fn accept_close<T: Transport>(&self, channel_id: ChannelId, transport: &mut T) -> Result<Txid, Error> {
        let lock = self.lock(channel_id).await;
        let _guard = lock.lock().await;

        let mut channel = self.get_channel(channel_id)?;
        let peer = self.counterparty_peer(&channel);
        let counterparty_pk = *channel.counterparty_key(channel.local_party);
        let keys = self.signer.derive_channel_keys(&channel_id, &counterparty_pk);

        let reply = self
            .recv_timeout(transport, &peer, self.config.open_timeout, channel_id, "CloseReq")
            .await?;
        let request = match reply.message {
            Message::CloseReq(request) => request,
            other => return Err(unexpected(channel_id, "CloseReq", &other)),
        };

        let previous = channel.clone();
        crate::state_machine::begin_close(&mut channel)?;
        self.store.update(&previous, &channel).await.map_err(store_failure(Some(channel_id), "close:accept"))?;

        let accepting = close::Accepting { channel: &channel, keys: &keys };
        let (accept, settlement) = accepting.interpret(request, &counterparty_pk)?;
        let txid = settlement.txid();
        self.send(transport, &peer, channel_id, Message::CloseAccept(accept), Some(&keys), now_unix()).await?;

        let reply = self
            .recv_timeout(transport, &peer, self.config.open_timeout, channel_id, "CloseComplete")
            .await?;
        if let Message::CloseComplete(complete) = reply.message {
            let previous = channel.clone();
            close::on_close_complete(&mut channel, complete);
            self.store.update(&previous, &channel).await.map_err(store_failure(Some(channel_id), "close:complete"))?;
        }

        self.on_close(channel_id).await;
        Ok(txid)
    }

    /// `paidRequest`: pays, then runs the caller-supplied service callback
    /// representing the higher-level service-request/quote layer (§1, out
    /// of scope for this crate). Payment is real money moved the moment the
    /// ack is persisted; a failing `service` afterward does not roll it
    /// back — reconciling a paid-but-failed request is the service layer's
    /// job, not this engine's.
    pub async fn paid_request<T, F, Fut, R>(&self, channel_id: ChannelId, amount: u64, transport: &mut T, service: F) -> Result<R, Error>
    where
        T: Transport,
        F: FnOnce(PaymentReceipt) -> Fut,
        Fut: Future<Output = anyhow::Result<R>>,
    {
        let receipt = self.pay(channel_id, amount, transport).await?;
        service(receipt).await.map_err(|source| Error::StoreFailure {
            channel: channel_id,
            operation: "paid_request:service",
            source,
        })
    }

    /// One dispute-monitor pass (§4.H): scans all open/closing channels for
    /// an outdated commitment broadcast and, for each one found,
    /// broadcasts the latest commitment in response before `T` elapses.
    pub async fn check_disputes(&self, now: u64) -> Result<Vec<crate::channel::DisputeAlert>, Error> {
        let channels = self.list_channels()?;
        let mut alerts = crate::dispute::scan(&self.chain, &channels, now).await;

        for alert in &mut alerts {
            let channel = self.get_channel(alert.channel_id)?;
            crate::force_close::broadcast_latest(&self.chain, &channel).await?;
            alert.status = crate::channel::DisputeStatus::Responded;
            self.on_dispute_alert(alert.clone()).await;
        }

        Ok(alerts)
    }

    /// `ForceClose` (§4.I): broadcasts the latest commitment once the peer
    /// has been silent beyond `peer_timeout` *and* the channel's locktime
    /// has elapsed. Returns `None` if either precondition does not hold
    /// yet — neither alone triggers a broadcast.
    pub async fn try_force_close(&self, channel_id: ChannelId, now: u64) -> Result<Option<Txid>, Error> {
        let mut channel = self.get_channel(channel_id)?;
        let last_contact = self
            .last_peer_contact
            .lock()
            .await
            .get(&channel_id)
            .copied()
            .unwrap_or(channel.created_at);

        if !crate::force_close::should_force_close(&channel, last_contact, now, self.config.peer_timeout) {
            return Ok(None);
        }

        let txid = crate::force_close::broadcast_latest(&self.chain, &channel).await?;
        let previous = channel.clone();
        channel.state = Lifecycle::Closed;
        channel.updated_at = now;
        self.store.update(&previous, &channel).await.map_err(store_failure(Some(channel_id), "force_close"))?;

        self.on_close(channel_id).await;
        Ok(Some(txid))
    }

    fn check_capacity_bounds(&self, channel_id: ChannelId, capacity: Amount) -> Result<(), Error> {
        let sats = capacity.as_sat();
        if sats < self.config.capacity_bounds.min || sats > self.config.capacity_bounds.max {
            return Err(Error::InsufficientBalance {
                channel: channel_id,
                operation: "open:capacity_bounds",
                amount: sats,
                balance: self.config.capacity_bounds.max,
            });
        }
        Ok(())
    }

    fn counterparty_peer(&self, channel: &Channel) -> PeerId {
        match channel.local_party {
            Party::Initiator => channel.responder.clone(),
            Party::Responder => channel.opener.clone(),
        }
    }

    async fn send<T: Transport>(
        &self,
        transport: &mut T,
        peer: &PeerId,
        channel_id: ChannelId,
        message: Message,
        sign_with: Option<&OwnershipKeyPair>,
        now: u64,
    ) -> Result<(), Error> {
        let envelope = match sign_with {
            Some(keys) => Envelope::sign(channel_id, message, keys, now),
            None => Envelope {
                channel_id,
                timestamp: now,
                signature: None,
                message,
            },
        };
        transport.send_message(peer, envelope).await.map_err(|source| Error::ChainUnavailable {
            channel: channel_id,
            operation: "transport:send",
            source,
        })
    }

    async fn recv_timeout<T: Transport>(
        &self,
        transport: &mut T,
        peer: &PeerId,
        timeout: Duration,
        channel_id: ChannelId,
        expected: &'static str,
    ) -> Result<Envelope, Error> {
        let envelope = tokio::time::timeout(timeout, transport.receive_message(peer))
            .await
            .map_err(|_| Error::Timeout {
                channel: channel_id,
                operation: expected,
            })?
            .map_err(|source| Error::ChainUnavailable {
                channel: channel_id,
                operation: "transport:receive",
                source,
            })?;
        Ok(envelope)
    }
}

/// `Engine` is the callback target named in the design notes in place of
/// `Protocol` holding a reference back to `Engine`: every state change that
/// used to require reaching back into the engine instead flows out through
/// this one-way interface onto the `EventBus`.
#[async_trait::async_trait]
impl<C, W> EngineEvents for Engine<C, W>
where
    C: ChainOracle + Send + Sync,
    W: Wallet + Send + Sync,
{
    async fn on_open_accept(&self, channel_id: ChannelId) {
        self.events.publish(Event::ChannelOpened { channel_id });
    }

    async fn on_update(&self, channel_id: ChannelId, sequence: u64) {
        self.events.publish(Event::ChannelPayment { channel_id, sequence });
    }

    async fn on_close(&self, channel_id: ChannelId) {
        self.events.publish(Event::ChannelClosed { channel_id });
    }

    async fn on_dispute_alert(&self, alert: crate::channel::DisputeAlert) {
        self.events.publish(Event::DisputeAlert(alert));
    }
}

fn commit_params(channel: &Channel, balance_initiator: u64, balance_responder: u64) -> crate::transaction::StateParams {
    crate::transaction::StateParams {
        funding_txid: channel.funding_outpoint.expect("open channel is funded").0,
        funding_vout: channel.funding_outpoint.expect("open channel is funded").1,
        funding_amount: channel.funding_amount(),
        script_code: channel.locking_script(),
        addr_initiator: channel.addr_initiator.clone(),
        addr_responder: channel.addr_responder.clone(),
        balance_initiator,
        balance_responder,
        fee: channel.fee,
    }
}

fn unexpected(channel_id: ChannelId, expected: &'static str, got: &Message) -> Error {
    let got_kind = message_kind(got);
    tracing::warn!(channel = %channel_id, expected, got = got_kind, "discarding an unmatched protocol message");
    Error::UnexpectedMessage {
        channel: channel_id,
        operation: expected,
        got: got_kind,
    }
}

fn message_kind(message: &Message) -> &'static str {
    match message {
        Message::OpenReq(_) => "OpenReq",
        Message::OpenAccept(_) => "OpenAccept",
        Message::OpenReject(_) => "OpenReject",
        Message::FundingCreated(_) => "FundingCreated",
        Message::FundingSigned(_) => "FundingSigned",
        Message::ChannelReady(_) => "ChannelReady",
        Message::UpdateReq(_) => "UpdateReq",
        Message::UpdateAck(_) => "UpdateAck",
        Message::UpdateReject(_) => "UpdateReject",
        Message::CloseReq(_) => "CloseReq",
        Message::CloseAccept(_) => "CloseAccept",
        Message::CloseComplete(_) => "CloseComplete",
        Message::Error(_) => "Error",
    }
}

fn store_failure(channel_id: Option<ChannelId>, operation: &'static str) -> impl Fn(anyhow::Error) -> Error {
    move |source| Error::StoreFailure {
        channel: channel_id.unwrap_or_else(ChannelId::random),
        operation,
        source,
    }
}

fn chain_error(channel_id: ChannelId, operation: &'static str) -> impl Fn(ChainError) -> Error {
    move |err| match err {
        ChainError::Rejected(reason) => Error::Broadcast {
            channel: channel_id,
            operation,
            reason,
        },
        ChainError::Unavailable(reason) | ChainError::Permanent(reason) => Error::ChainUnavailable {
            channel: channel_id,
            operation,
            source: anyhow::anyhow!(reason),
        },
    }
}
