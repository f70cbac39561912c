// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The per-datagram dispatch state machine.
//!
//! Every inbound datagram takes exactly one of these paths:
//!
//! * delivery to the live session owning its connection ID,
//! * the time-wait list, which answers or discards stragglers,
//! * the version negotiation path,
//! * handshake-initiation validation, leading to a new session,
//! * the pre-session buffer, or
//! * a silent, event-reported drop.
//!
//! The dispatcher runs on a single event-loop thread. The only suspension
//! point is an asynchronous CHLO validation: the dispatcher snapshots its
//! per-packet view before submitting and restores it when the embedder
//! completes the validation through [`Dispatcher::on_chlo_validated`].

use crate::{
    connection::{self, id},
    crypto::{chlo, validate, validate::Validator as _},
    event::{self, DatagramMeta, EmissionKind, Subscriber as _},
    inet::Datagram,
    io::tx,
    packet::{Peek, MINIMUM_INITIAL_SIZE},
    random::Generator as _,
    session::{self, Factory as _, Session as _},
    time::Clock as _,
    version::{SupportedVersions, Version},
};
use bytes::Bytes;
use hashbrown::{HashMap, HashSet};
use std::{collections::VecDeque, net::SocketAddr};

pub mod buffer;
mod config;
pub mod limits;
pub mod time_wait;
pub mod version;
pub mod write_blocked;

pub use config::{Config, Context};
pub use limits::Limits;

/// Initial packet numbers above this cannot belong to a legitimate new
/// connection; such datagrams quarantine their ID instead of creating state.
pub const MAX_REASONABLE_INITIAL_PACKET_NUMBER: u64 = 100;

/// Extra allowance when clients randomize their initial packet numbers
pub const MAX_RANDOM_INITIAL_PACKET_NUMBER: u64 = 0x7fff_ffff;

/// Reloadable toggles, captured once per datagram so a flip mid-dispatch is
/// never observable within a single datagram's handling
#[derive(Clone, Copy, Debug)]
struct FlagsView {
    validate_chlo_size: bool,
    random_initial_packet_numbers: bool,
    allow_short_initial_connection_ids: bool,
}

/// The dispatcher's view of the datagram currently being handled.
///
/// Saved before every suspension point and restored on resumption, so
/// resumed code observes the same view as at suspension.
struct CurrentPacket<Ctx> {
    local_address: Option<SocketAddr>,
    remote_address: Option<SocketAddr>,
    packet_context: Ctx,
}

struct PendingValidation<Ctx> {
    connection_id: connection::Id,
    version: Version,
    alpn: Option<Vec<u8>>,
    /// The CHLO datagram itself; `None` when the CHLO is anchored at the
    /// front of the buffered queue instead
    chlo_datagram: Option<Datagram>,
    saved_local_address: Option<SocketAddr>,
    saved_remote_address: Option<SocketAddr>,
    saved_packet_context: Ctx,
}

pub struct Dispatcher<Cfg: Config> {
    config: Cfg,
    clock: Cfg::Clock,
    writer: tx::Shared<Cfg::Writer>,
    limits: Limits,
    versions: SupportedVersions,
    id_policy: connection::id::Policy,
    negotiator: version::Negotiator,
    sessions: session::Table<Cfg::Session>,
    time_wait: time_wait::List,
    buffer: buffer::Store,
    write_blocked: write_blocked::List,
    pending: HashMap<u64, PendingValidation<Cfg::PacketContext>>,
    pending_ids: HashSet<connection::Id>,
    next_token: u64,
    /// Sessions that may still be created before the next
    /// `process_buffered_chlos` call replenishes the budget
    session_budget: usize,
    current: CurrentPacket<Cfg::PacketContext>,
}

impl<Cfg: Config> Dispatcher<Cfg> {
    pub fn new(config: Cfg, clock: Cfg::Clock, writer: Cfg::Writer, limits: Limits) -> Self {
        let session_budget = limits.new_sessions_per_tick;
        Self {
            config,
            clock,
            writer: tx::Shared::new(writer),
            buffer: buffer::Store::new(
                limits.max_buffered_connections,
                limits.max_buffered_connections_without_chlo,
                limits.max_buffered_packets_per_connection,
                limits.buffer_expiration,
            ),
            time_wait: time_wait::List::new(limits.time_wait_period, limits.time_wait_capacity),
            limits,
            versions: SupportedVersions::default(),
            id_policy: connection::id::Policy::default(),
            negotiator: version::Negotiator,
            sessions: session::Table::default(),
            write_blocked: write_blocked::List::default(),
            pending: HashMap::new(),
            pending_ids: HashSet::new(),
            next_token: 0,
            session_budget,
            current: CurrentPacket {
                local_address: None,
                remote_address: None,
                packet_context: Default::default(),
            },
        }
    }

    /// Ingress for every datagram received on the listening socket. Must be
    /// called on the event-loop thread.
    pub fn process_packet(&mut self, datagram: Datagram) {
        self.dispatch_datagram(datagram);
        self.flush_transmissions();
        self.sessions.reap_closed();
    }

    /// Called by the socket layer when the shared writer becomes writable.
    /// Pending canned responses flush first, then write-blocked sessions are
    /// served in insertion order, one serve per session per drain.
    pub fn on_can_write(&mut self) {
        self.writer.set_writable();
        self.flush_transmissions();

        let snapshot = self.write_blocked.take_snapshot();
        for id in snapshot {
            let result = match self.sessions.get_mut(&id) {
                Some(session) => session.on_can_write(),
                None => continue,
            };
            match result {
                Ok(interests) => {
                    if interests.write_blocked {
                        self.write_blocked.add(id);
                    }
                }
                Err(error) => self.run_close(&id, error, false),
            }
        }
        self.sessions.reap_closed();
    }

    /// Replenishes the per-tick session budget to `max` and creates sessions
    /// for buffered CHLO-ready connections until the budget or the backlog
    /// is exhausted. Call once per event-loop tick.
    pub fn process_buffered_chlos(&mut self, max: usize) {
        self.session_budget = max;

        while self.session_budget > 0 {
            let id = match self.buffer.next_chlo_ready() {
                Some(id) => id,
                None => break,
            };
            if self.pending_ids.contains(&id) {
                continue;
            }
            let info = match self.buffer.chlo_info(&id) {
                Some(info) => info.clone(),
                None => continue,
            };

            if !self.versions.is_supported(info.version) {
                self.negotiate_buffered(&id, &info);
                continue;
            }

            self.submit_buffered_validation(id, info);
        }

        self.flush_transmissions();
        self.sessions.reap_closed();
    }

    /// Expires time-wait entries and idle buffered connections. Driven by
    /// the embedder's timer.
    pub fn on_timeout(&mut self) {
        let now = self.clock.get_time();
        self.time_wait.cleanup(now);
        for id in self.buffer.expire(now) {
            self.time_wait.add(id, time_wait::Action::SilentDrop, now);
            self.publish(|events| events.on_time_wait_added(&id));
        }
        self.flush_transmissions();
    }

    /// Completion callback for a deferred CHLO validation. Unknown tokens
    /// (cancelled by shutdown) are ignored.
    pub fn on_chlo_validated(&mut self, token: validate::Token, validation: validate::Validation) {
        let pending = match self.pending.remove(&token.0) {
            Some(pending) => pending,
            None => return,
        };
        self.pending_ids.remove(&pending.connection_id);

        // restore the view saved at suspension before touching any state
        self.current.local_address = pending.saved_local_address;
        self.current.remote_address = pending.saved_remote_address;
        self.current.packet_context = pending.saved_packet_context;

        match validation {
            validate::Validation::Accept => {
                if self.time_wait.contains(&pending.connection_id) {
                    // the connection was given up on while the validation was
                    // in flight (buffer expiry); a session must never coexist
                    // with a time-wait entry
                    return;
                }
                self.install_session(
                    pending.connection_id,
                    pending.version,
                    pending.alpn,
                    pending.chlo_datagram,
                );
            }
            validate::Validation::Reject(frame) => {
                let destination = pending
                    .chlo_datagram
                    .as_ref()
                    .map(|datagram| datagram.remote_address)
                    .or(pending.saved_remote_address);
                self.reject(pending.connection_id, frame, destination);
            }
        }

        self.flush_transmissions();
        self.sessions.reap_closed();
    }

    /// Closes every session ("peer going away"), cancels pending
    /// validations, and drains the buffers.
    pub fn shutdown(&mut self) {
        self.pending.clear();
        self.pending_ids.clear();

        let now = self.clock.get_time();
        for id in self.sessions.ids() {
            if let Some(session) = self.sessions.get_mut(&id) {
                session.on_close(session::CloseReason::ShuttingDown);
            }
            self.write_blocked.remove(&id);
            self.time_wait.add(id, time_wait::Action::SilentDrop, now);
            self.publish(|events| events.on_time_wait_added(&id));
            self.sessions.retire(&id);
        }

        self.buffer.clear();
        self.flush_transmissions();
        self.sessions.reap_closed();
    }

    /// Embedder-initiated close of a live session
    pub fn close_session(&mut self, id: &connection::Id, error: session::Error) {
        self.run_close(id, error, true);
        self.flush_transmissions();
        self.sessions.reap_closed();
    }

    /// Quarantines a connection ID with an explicit action, for terminations
    /// decided outside the dispatcher (for example a stateless reset packet
    /// produced by the crypto layer). No-op while a session for `id` is
    /// live; close the session instead.
    pub fn add_to_time_wait(&mut self, id: connection::Id, action: time_wait::Action) {
        if self.sessions.contains(&id) {
            return;
        }
        let now = self.clock.get_time();
        self.time_wait.add(id, action, now);
        self.publish(|events| events.on_time_wait_added(&id));
    }

    pub fn set_allow_short_initial_connection_ids(&mut self, allow: bool) {
        self.id_policy.allow_short_initial_ids = allow;
    }

    pub fn set_enabled_versions(&mut self, enabled: Vec<Version>) {
        self.versions.set_enabled(enabled);
    }

    pub fn set_packet_context(&mut self, context: Cfg::PacketContext) {
        self.current.packet_context = context;
    }

    pub fn packet_context(&self) -> &Cfg::PacketContext {
        &self.current.packet_context
    }

    /// Local address of the datagram currently (or last) dispatched
    pub fn current_self_address(&self) -> Option<SocketAddr> {
        self.current.local_address
    }

    /// Peer address of the datagram currently (or last) dispatched
    pub fn current_peer_address(&self) -> Option<SocketAddr> {
        self.current.remote_address
    }

    pub fn has_session(&self, id: &connection::Id) -> bool {
        self.sessions.contains(id)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_in_time_wait(&self, id: &connection::Id) -> bool {
        self.time_wait.contains(id)
    }

    pub fn buffered_connection_count(&self) -> usize {
        self.buffer.len()
    }

    pub fn config(&self) -> &Cfg {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Cfg {
        &mut self.config
    }

    /// The shared writer capability; the same handle sessions receive
    pub fn writer(&self) -> &tx::Shared<Cfg::Writer> {
        &self.writer
    }

    fn dispatch_datagram(&mut self, datagram: Datagram) {
        let flags = self.flags_snapshot();
        let meta = DatagramMeta {
            remote_address: datagram.remote_address,
            len: datagram.len(),
            timestamp: datagram.timestamp,
        };

        // anti-reflection: port 0 cannot be a legitimate peer
        if datagram.remote_address.port() == 0 {
            self.publish(|events| {
                events.on_datagram_dropped(&meta, event::DatagramDropReason::InvalidSourcePort)
            });
            return;
        }

        self.current.local_address = Some(datagram.local_address);
        self.current.remote_address = Some(datagram.remote_address);

        let peek = match Peek::decode(&datagram.payload, id::SERVER_ACCEPTED_LEN) {
            Ok(peek) => peek,
            Err(_) => {
                self.publish(|events| {
                    events.on_datagram_dropped(&meta, event::DatagramDropReason::DecodingFailed)
                });
                return;
            }
        };

        // existing session: cheap lookup, deliver, done
        if self.sessions.contains(&peek.destination_id) {
            let id = peek.destination_id;
            self.deliver_to_session(&id, &datagram);
            return;
        }

        // recently closed: the time-wait list answers or discards
        if self.time_wait.contains(&peek.destination_id) {
            if let Some(kind) = self.time_wait.on_packet(&peek.destination_id, &datagram) {
                self.publish(|events| events.on_packet_emitted(kind));
            }
            return;
        }

        // a stray reset for an unknown connection must not allocate state
        if peek.public_reset {
            self.publish(|events| {
                events.on_datagram_dropped(&meta, event::DatagramDropReason::StrayPublicReset)
            });
            return;
        }

        if peek.version.is_some() {
            let tag_entropy = self.random_byte();
            match self.negotiator.on_packet(
                &peek,
                datagram.len(),
                &self.versions,
                flags.validate_chlo_size,
                tag_entropy,
            ) {
                version::Outcome::Supported => {}
                version::Outcome::Negotiate(packet) => {
                    self.time_wait.queue_response(datagram.remote_address, packet);
                    self.publish(|events| {
                        events.on_packet_emitted(EmissionKind::VersionNegotiation)
                    });
                    return;
                }
                version::Outcome::Drop => {
                    self.publish(|events| {
                        events
                            .on_datagram_dropped(&meta, event::DatagramDropReason::UnsupportedVersion)
                    });
                    return;
                }
            }
        }

        // the server's acceptance policy for client-chosen IDs; an
        // out-of-range length (zero-length included) may be rewritten to a
        // server-generated ID when the policy allows it
        let routed_id = match peek.version {
            Some(version) => {
                let policy = connection::id::Policy {
                    allow_short_initial_ids: flags.allow_short_initial_connection_ids,
                    ..self.id_policy.clone()
                };
                let context = self.config.context();
                match policy.decide(
                    &peek.destination_id,
                    version,
                    context.connection_id_generator,
                    context.random_generator,
                ) {
                    connection::id::Decision::Accept(id) => id,
                    connection::id::Decision::Replace(id) => id,
                    connection::id::Decision::Reject => {
                        self.publish(|events| {
                            events.on_datagram_dropped(
                                &meta,
                                event::DatagramDropReason::RejectedConnectionId,
                            )
                        });
                        return;
                    }
                }
            }
            None => {
                // no version, so no policy governs the packet; an absent ID
                // cannot be routed at all
                if peek.destination_id.is_empty() {
                    self.publish(|events| {
                        events.on_datagram_dropped(
                            &meta,
                            event::DatagramDropReason::RejectedConnectionId,
                        )
                    });
                    return;
                }
                peek.destination_id
            }
        };

        // an absurd initial packet number cannot start a real connection;
        // quarantine the ID so retransmissions cannot resurrect it
        if let Some(packet_number) = peek.packet_number {
            let mut max = MAX_REASONABLE_INITIAL_PACKET_NUMBER;
            if flags.random_initial_packet_numbers {
                max += MAX_RANDOM_INITIAL_PACKET_NUMBER;
            }
            if packet_number > max {
                self.time_wait
                    .add(routed_id, time_wait::Action::SilentDrop, datagram.timestamp);
                self.publish(|events| {
                    events.on_time_wait_added(&routed_id);
                    events.on_datagram_dropped(
                        &meta,
                        event::DatagramDropReason::UnreasonableInitialPacketNumber,
                    );
                });
                return;
            }
        }

        // ask the embedder once per connection, before any state exists
        if !self.buffer.contains(&routed_id) && !self.pending_ids.contains(&routed_id) {
            let allowed = self
                .config
                .context()
                .session_factory
                .should_create_or_buffer(&routed_id, peek.form.is_ietf());
            if !allowed {
                self.publish(|events| {
                    events.on_datagram_dropped(&meta, event::DatagramDropReason::VetoedByEmbedder)
                });
                return;
            }
        }

        let extracted = if peek.is_initial {
            peek.payload_offset.and_then(|offset| {
                let version = peek.version.expect("initial packets carry a version");
                chlo::extract(&datagram.payload[offset..], version)
            })
        } else {
            None
        };

        match extracted {
            Some(extracted) => {
                let version = peek.version.expect("initial packets carry a version");

                if flags.validate_chlo_size && datagram.len() < MINIMUM_INITIAL_SIZE {
                    self.publish(|events| {
                        events
                            .on_datagram_dropped(&meta, event::DatagramDropReason::UndersizedChlo)
                    });
                    return;
                }

                if self.pending_ids.contains(&routed_id) || self.session_budget == 0 {
                    // over budget or awaiting an async decision: park the CHLO
                    let info = buffer::ChloInfo {
                        version,
                        chlo: extracted,
                    };
                    let now = datagram.timestamp;
                    let outcome = self.buffer.enqueue(routed_id, datagram, Some(info), now);
                    self.publish_enqueue_outcome(&meta, &routed_id, outcome);
                    return;
                }

                self.submit_validation(routed_id, version, extracted, datagram);
            }
            None => {
                let now = datagram.timestamp;
                let outcome = self.buffer.enqueue(routed_id, datagram, None, now);
                self.publish_enqueue_outcome(&meta, &routed_id, outcome);
            }
        }
    }

    fn submit_validation(
        &mut self,
        id: connection::Id,
        version: Version,
        extracted: chlo::Chlo,
        datagram: Datagram,
    ) {
        let token = self.mint_token();
        let decision = {
            let context = self.config.context();
            let request = validate::Request {
                token,
                connection_id: &id,
                remote_address: datagram.remote_address,
                local_address: datagram.local_address,
                version,
                alpn: extracted.alpn.as_deref(),
            };
            context.chlo_validator.validate(&request)
        };

        match decision {
            validate::Decision::Accept => {
                self.install_session(id, version, extracted.alpn, Some(datagram));
            }
            validate::Decision::Reject(frame) => {
                let destination = datagram.remote_address;
                self.reject(id, frame, Some(destination));
            }
            validate::Decision::Pending => {
                self.publish(|events| events.on_validation_deferred(&id));
                self.pending_ids.insert(id);
                self.pending.insert(
                    token.0,
                    PendingValidation {
                        connection_id: id,
                        version,
                        alpn: extracted.alpn,
                        chlo_datagram: Some(datagram),
                        saved_local_address: self.current.local_address,
                        saved_remote_address: self.current.remote_address,
                        saved_packet_context: self.current.packet_context.clone(),
                    },
                );
            }
        }
    }

    fn submit_buffered_validation(&mut self, id: connection::Id, info: buffer::ChloInfo) {
        let (remote_address, local_address) = match self.buffer.front(&id) {
            Some(datagram) => (datagram.remote_address, datagram.local_address),
            None => return,
        };

        let token = self.mint_token();
        let decision = {
            let context = self.config.context();
            let request = validate::Request {
                token,
                connection_id: &id,
                remote_address,
                local_address,
                version: info.version,
                alpn: info.chlo.alpn.as_deref(),
            };
            context.chlo_validator.validate(&request)
        };

        match decision {
            validate::Decision::Accept => {
                self.install_session(id, info.version, info.chlo.alpn, None);
            }
            validate::Decision::Reject(frame) => {
                self.reject(id, frame, Some(remote_address));
            }
            validate::Decision::Pending => {
                self.publish(|events| events.on_validation_deferred(&id));
                self.pending_ids.insert(id);
                self.pending.insert(
                    token.0,
                    PendingValidation {
                        connection_id: id,
                        version: info.version,
                        alpn: info.chlo.alpn,
                        chlo_datagram: None,
                        saved_local_address: self.current.local_address,
                        saved_remote_address: self.current.remote_address,
                        saved_packet_context: self.current.packet_context.clone(),
                    },
                );
            }
        }
    }

    /// Creates the session and delivers the CHLO first, then everything
    /// buffered, in arrival order
    fn install_session(
        &mut self,
        id: connection::Id,
        version: Version,
        alpn: Option<Vec<u8>>,
        chlo_datagram: Option<Datagram>,
    ) {
        let mut delivery: VecDeque<Datagram> = VecDeque::new();
        if let Some(datagram) = chlo_datagram {
            delivery.push_back(datagram);
        }
        if let Some((buffered, _chlo)) = self.buffer.drain(&id) {
            delivery.extend(buffered);
        }

        let remote_address = match delivery.front() {
            Some(datagram) => datagram.remote_address,
            None => return,
        };

        self.session_budget = self.session_budget.saturating_sub(1);

        let session = {
            let context = self.config.context();
            context.session_factory.create_session(
                &id,
                remote_address,
                alpn.as_deref(),
                version,
                &self.writer,
            )
        };
        self.sessions.insert(id, session);
        self.publish(|events| events.on_session_created(&id, version));

        for datagram in delivery {
            if !self.sessions.contains(&id) {
                // the session closed while consuming its backlog
                break;
            }
            self.deliver_to_session(&id, &datagram);
        }
    }

    fn deliver_to_session(&mut self, id: &connection::Id, datagram: &Datagram) {
        let result = match self.sessions.get_mut(id) {
            Some(session) => session.on_datagram(datagram),
            None => return,
        };
        match result {
            Ok(interests) => {
                if interests.write_blocked {
                    self.write_blocked.add(*id);
                }
            }
            Err(error) => self.run_close(id, error, false),
        }
    }

    /// The close sequence: close hook, write-blocked removal, time-wait
    /// registration, end-of-tick destruction
    fn run_close(&mut self, id: &connection::Id, error: session::Error, requested: bool) {
        let now = self.clock.get_time();

        match self.sessions.get_mut(id) {
            Some(session) => {
                let reason = if requested {
                    session::CloseReason::Requested(&error)
                } else {
                    session::CloseReason::Closed(&error)
                };
                session.on_close(reason);
            }
            None => return,
        }

        self.write_blocked.remove(id);

        let action = match &error.close_frame {
            Some(frame) => time_wait::Action::SendClose(frame.clone()),
            None => time_wait::Action::SilentDrop,
        };
        self.time_wait.add(*id, action, now);
        self.publish(|events| events.on_time_wait_added(id));

        self.sessions.retire(id);
    }

    /// Cryptographic reject: one close frame now, the time-wait list answers
    /// retransmissions, buffered datagrams are discarded
    fn reject(&mut self, id: connection::Id, frame: Bytes, destination: Option<SocketAddr>) {
        let now = self.clock.get_time();
        let _ = self.buffer.drain(&id);
        self.time_wait
            .add(id, time_wait::Action::SendClose(frame.clone()), now);
        self.publish(|events| events.on_time_wait_added(&id));

        if let Some(destination) = destination {
            self.time_wait.queue_response(destination, frame);
            self.publish(|events| events.on_packet_emitted(EmissionKind::CloseFrame));
        }
    }

    /// A buffered CHLO whose version lost support while it waited: quarantine
    /// with a version negotiation answer
    fn negotiate_buffered(&mut self, id: &connection::Id, info: &buffer::ChloInfo) {
        let tag_entropy = self.random_byte();
        let packet = version::build_packet_for_id(
            id,
            info.version.uses_crypto_frames(),
            &self.versions,
            tag_entropy,
        );

        let destination = self.buffer.front(id).map(|datagram| datagram.remote_address);
        let _ = self.buffer.drain(id);

        let now = self.clock.get_time();
        self.time_wait.add(
            *id,
            time_wait::Action::SendVersionNegotiation(packet.clone()),
            now,
        );
        self.publish(|events| events.on_time_wait_added(id));

        if let Some(destination) = destination {
            self.time_wait.queue_response(destination, packet);
            self.publish(|events| events.on_packet_emitted(EmissionKind::VersionNegotiation));
        }
    }

    fn publish_enqueue_outcome(
        &mut self,
        meta: &DatagramMeta,
        id: &connection::Id,
        outcome: buffer::EnqueueOutcome,
    ) {
        use buffer::EnqueueOutcome::*;
        self.publish(|events| match outcome {
            Buffered | BufferedChlo => events.on_packet_buffered(id),
            DroppedDuplicateChlo => {
                events.on_datagram_dropped(meta, event::DatagramDropReason::DuplicateChlo)
            }
            DroppedStoreFull | DroppedChloLessLimit | DroppedQueueFull => {
                events.on_datagram_dropped(meta, event::DatagramDropReason::BufferFull)
            }
        });
    }

    fn flush_transmissions(&mut self) {
        self.time_wait.on_transmit(&self.writer);
    }

    fn flags_snapshot(&self) -> FlagsView {
        FlagsView {
            validate_chlo_size: self.limits.validate_chlo_size,
            random_initial_packet_numbers: self.limits.random_initial_packet_numbers,
            allow_short_initial_connection_ids: self.id_policy.allow_short_initial_ids,
        }
    }

    fn mint_token(&mut self) -> validate::Token {
        let token = validate::Token(self.next_token);
        self.next_token += 1;
        token
    }

    fn random_byte(&mut self) -> u8 {
        let mut byte = [0u8; 1];
        self.config
            .context()
            .random_generator
            .public_random_fill(&mut byte);
        byte[0]
    }

    fn publish(&mut self, f: impl FnOnce(&mut Cfg::EventSubscriber)) {
        f(self.config.context().event_subscriber)
    }
}

#[cfg(any(test, feature = "testing"))]
pub mod testing {
    //! A ready-made dispatcher harness wired to the crate's test doubles

    use super::*;
    use crate::{io::tx::testing::Queue, random, session::testing::Factory};
    use std::rc::Rc;

    pub struct TestConfig<V: validate::Validator> {
        pub session_factory: Factory<Queue>,
        pub chlo_validator: V,
        pub connection_id_generator: connection::id::RandomGenerator,
        pub random_generator: random::testing::Generator,
        pub event_subscriber: crate::event::testing::Subscriber,
    }

    impl<V: validate::Validator> Default for TestConfig<V>
    where
        V: Default,
    {
        fn default() -> Self {
            Self {
                session_factory: Factory::default(),
                chlo_validator: V::default(),
                connection_id_generator: connection::id::RandomGenerator,
                random_generator: random::testing::Generator::default(),
                event_subscriber: crate::event::testing::Subscriber::default(),
            }
        }
    }

    impl<V: validate::Validator> Config for TestConfig<V> {
        type Session = crate::session::testing::Session;
        type SessionFactory = Factory<Queue>;
        type ChloValidator = V;
        type ConnectionIdGenerator = connection::id::RandomGenerator;
        type RandomGenerator = random::testing::Generator;
        type Clock = Rc<crate::time::testing::Clock>;
        type Writer = Queue;
        type EventSubscriber = crate::event::testing::Subscriber;
        type PacketContext = String;

        fn context(&mut self) -> Context<'_, Self> {
            Context {
                session_factory: &mut self.session_factory,
                chlo_validator: &mut self.chlo_validator,
                connection_id_generator: &mut self.connection_id_generator,
                random_generator: &mut self.random_generator,
                event_subscriber: &mut self.event_subscriber,
            }
        }
    }

    /// A dispatcher over [`TestConfig`] with default limits
    pub fn dispatcher<V: validate::Validator + Default>() -> Dispatcher<TestConfig<V>> {
        dispatcher_with_limits(Limits::default()).0
    }

    /// A dispatcher plus the handle driving its clock
    pub fn dispatcher_with_limits<V: validate::Validator + Default>(
        limits: Limits,
    ) -> (
        Dispatcher<TestConfig<V>>,
        Rc<crate::time::testing::Clock>,
    ) {
        let clock = Rc::new(crate::time::testing::Clock::default());
        let dispatcher = Dispatcher::new(
            TestConfig::default(),
            clock.clone(),
            Queue::default(),
            limits,
        );
        (dispatcher, clock)
    }
}
