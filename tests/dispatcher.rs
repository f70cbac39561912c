// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! End-to-end dispatch behavior, driven through the public API with the
//! crate's collaborator doubles.

use bytes::Bytes;
use quic_dispatch::{
    connection,
    crypto::{chlo, validate},
    dispatch::{
        testing::{dispatcher, dispatcher_with_limits, TestConfig},
        Limits, MAX_REASONABLE_INITIAL_PACKET_NUMBER,
    },
    event::{DatagramDropReason, EmissionKind},
    inet::Datagram,
    packet::testing as packets,
    session,
    time::Clock as _,
    version::{Version, DRAFT_29, QUIC_V43},
    Dispatcher,
};
use std::net::SocketAddr;

const SERVER: &str = "0.0.0.0:5";
const CLIENT: &str = "127.0.0.1:1";

fn cid(value: u64) -> connection::Id {
    connection::Id::try_from_bytes(&value.to_be_bytes()).unwrap()
}

fn addr(value: &str) -> SocketAddr {
    value.parse().unwrap()
}

fn datagram<V: validate::Validator>(
    dispatcher: &Dispatcher<TestConfig<V>>,
    payload: Bytes,
) -> Datagram {
    datagram_from(dispatcher, CLIENT, payload)
}

fn datagram_from<V: validate::Validator>(
    _dispatcher: &Dispatcher<TestConfig<V>>,
    peer: &str,
    payload: Bytes,
) -> Datagram {
    Datagram {
        local_address: addr(SERVER),
        remote_address: addr(peer),
        payload,
        timestamp: quic_dispatch::time::Timestamp::from_duration(core::time::Duration::from_micros(
            1,
        )),
    }
}

/// A legacy CHLO datagram padded past the anti-amplification floor
fn chlo_packet(id: &connection::Id) -> Bytes {
    let mut payload = chlo::testing::chlo_payload(QUIC_V43, b"hq");
    payload.resize(1300, 0);
    packets::legacy_long(id, QUIC_V43, 1, 4, &payload)
}

fn data_packet(id: &connection::Id, packet_number: u64) -> Bytes {
    packets::legacy_short(id, packet_number, &chlo::testing::data_payload())
}

#[test]
fn chlo_creates_session_and_routes_follow_ups() {
    let mut dispatcher = dispatcher::<validate::AcceptAll>();

    let packet = datagram(&dispatcher, chlo_packet(&cid(1)));
    dispatcher.process_packet(packet);
    let packet = datagram(&dispatcher, chlo_packet(&cid(2)));
    dispatcher.process_packet(packet);

    assert_eq!(dispatcher.session_count(), 2);
    assert!(dispatcher.has_session(&cid(1)));
    assert!(dispatcher.has_session(&cid(2)));

    let state = dispatcher.config().session_factory.state_for(&cid(1)).unwrap();
    {
        let state = state.borrow();
        assert_eq!(state.alpn.as_deref(), Some(&b"hq"[..]));
        assert_eq!(state.version, QUIC_V43);
        assert_eq!(state.remote_address, addr(CLIENT));
        assert_eq!(state.datagrams.len(), 1);
    }

    let packet = datagram(&dispatcher, data_packet(&cid(1), 2));
    dispatcher.process_packet(packet);

    assert_eq!(state.borrow().datagrams.len(), 2);
    let other = dispatcher.config().session_factory.state_for(&cid(2)).unwrap();
    assert_eq!(other.borrow().datagrams.len(), 1);

    assert_eq!(dispatcher.current_peer_address(), Some(addr(CLIENT)));
    assert_eq!(dispatcher.current_self_address(), Some(addr(SERVER)));
}

#[test]
fn unsupported_version_with_large_packet_negotiates_once() {
    let mut dispatcher = dispatcher::<validate::AcceptAll>();
    let below_minimum = Version(QUIC_V43.0 - 1);

    let packet = packets::legacy_long(&cid(1), below_minimum, 1, 4, &[0; 1300]);
    let packet = datagram(&dispatcher, packet);
    dispatcher.process_packet(packet);

    assert_eq!(dispatcher.session_count(), 0);
    assert_eq!(
        dispatcher.config().event_subscriber.emitted,
        vec![EmissionKind::VersionNegotiation]
    );
    dispatcher.writer().with(|queue| {
        assert_eq!(queue.transmissions.len(), 1);
        let reply = &queue.transmissions[0];
        assert_eq!(reply.destination, addr(CLIENT));
        assert_eq!(reply.payload[0], 0x09);
        assert_eq!(&reply.payload[1..9], cid(1).as_bytes());
    });
}

#[test]
fn unsupported_version_with_small_packet_is_dropped() {
    let mut dispatcher = dispatcher::<validate::AcceptAll>();
    let below_minimum = Version(QUIC_V43.0 - 1);

    let packet = packets::legacy_long(&cid(1), below_minimum, 1, 4, &[0; 1080]);
    let packet = datagram(&dispatcher, packet);
    assert!(packet.len() <= 1100);
    dispatcher.process_packet(packet);

    assert_eq!(dispatcher.session_count(), 0);
    assert!(dispatcher.config().event_subscriber.emitted.is_empty());
    dispatcher.writer().with(|queue| assert!(queue.transmissions.is_empty()));
    assert_eq!(
        dispatcher.config().event_subscriber.dropped,
        vec![DatagramDropReason::UnsupportedVersion]
    );
}

#[test]
fn small_packet_negotiates_when_chlo_size_validation_disabled() {
    let limits = Limits::default().with_validate_chlo_size(false);
    let (mut dispatcher, _clock) = dispatcher_with_limits::<validate::AcceptAll>(limits);
    let below_minimum = Version(QUIC_V43.0 - 1);

    let packet = packets::legacy_long(&cid(1), below_minimum, 1, 4, &[0; 1080]);
    let packet = datagram(&dispatcher, packet);
    dispatcher.process_packet(packet);

    assert_eq!(
        dispatcher.config().event_subscriber.emitted,
        vec![EmissionKind::VersionNegotiation]
    );
}

#[test]
fn closed_session_routes_stragglers_to_time_wait() {
    let mut dispatcher = dispatcher::<validate::AcceptAll>();

    let packet = datagram(&dispatcher, chlo_packet(&cid(1)));
    dispatcher.process_packet(packet);
    assert!(dispatcher.has_session(&cid(1)));

    dispatcher.close_session(
        &cid(1),
        session::Error {
            source: session::CloseSource::Local,
            close_frame: None,
        },
    );

    assert!(!dispatcher.has_session(&cid(1)));
    assert!(dispatcher.is_in_time_wait(&cid(1)));

    let state = dispatcher.config().session_factory.state_for(&cid(1)).unwrap();
    assert!(state.borrow().closed.is_some());

    let packet = datagram(&dispatcher, data_packet(&cid(1), 3));
    dispatcher.process_packet(packet);

    assert_eq!(dispatcher.session_count(), 0);
    assert_eq!(state.borrow().datagrams.len(), 1, "no delivery after close");
}

#[test]
fn pre_chlo_datagrams_buffer_up_to_the_limit_and_drain_in_order() {
    let mut dispatcher = dispatcher::<validate::AcceptAll>();

    for packet_number in 1..=17u64 {
        let payload = packets::legacy_short(&cid(1), packet_number, &[packet_number as u8]);
        let packet = datagram(&dispatcher, payload);
        dispatcher.process_packet(packet);
    }

    assert_eq!(dispatcher.session_count(), 0);
    assert_eq!(dispatcher.buffered_connection_count(), 1);
    assert_eq!(
        dispatcher
            .config()
            .event_subscriber
            .dropped
            .iter()
            .filter(|reason| **reason == DatagramDropReason::BufferFull)
            .count(),
        1,
        "the seventeenth datagram is dropped"
    );

    let packet = datagram(&dispatcher, chlo_packet(&cid(1)));
    dispatcher.process_packet(packet);

    assert!(dispatcher.has_session(&cid(1)));
    let state = dispatcher.config().session_factory.state_for(&cid(1)).unwrap();
    let state = state.borrow();
    assert_eq!(state.datagrams.len(), 17, "chlo plus the 16 buffered");

    // the CHLO is delivered first
    assert_eq!(state.datagrams[0].payload, chlo_packet(&cid(1)));
    // then the buffered datagrams in arrival order
    for (index, delivered) in state.datagrams[1..].iter().enumerate() {
        let packet_number = index as u64 + 1;
        assert_eq!(
            delivered.payload,
            packets::legacy_short(&cid(1), packet_number, &[packet_number as u8])
        );
    }
}

#[test]
fn session_creation_budget_buffers_overflow_chlos() {
    let mut dispatcher = dispatcher::<validate::AcceptAll>();

    for value in 1..=117u64 {
        let packet = datagram(&dispatcher, chlo_packet(&cid(value)));
        dispatcher.process_packet(packet);
    }

    assert_eq!(dispatcher.session_count(), 16);
    assert_eq!(dispatcher.buffered_connection_count(), 100);
    assert_eq!(
        dispatcher
            .config()
            .event_subscriber
            .dropped
            .iter()
            .filter(|reason| **reason == DatagramDropReason::BufferFull)
            .count(),
        1
    );

    dispatcher.process_buffered_chlos(16);
    assert_eq!(dispatcher.session_count(), 32);
    assert_eq!(dispatcher.buffered_connection_count(), 84);

    for _ in 0..10 {
        dispatcher.process_buffered_chlos(16);
    }
    assert_eq!(dispatcher.session_count(), 116);
    assert_eq!(dispatcher.buffered_connection_count(), 0);

    // ids 1..=116 made it; the dropped CHLO never does
    for value in 1..=116u64 {
        assert!(dispatcher.has_session(&cid(value)), "session {value}");
    }
    assert!(!dispatcher.has_session(&cid(117)));
}

#[test]
fn unreasonable_initial_packet_number_quarantines_the_id() {
    let mut dispatcher = dispatcher::<validate::AcceptAll>();

    let mut payload = chlo::testing::chlo_payload(QUIC_V43, b"hq");
    payload.resize(1300, 0);
    let packet = packets::legacy_long(
        &cid(1),
        QUIC_V43,
        MAX_REASONABLE_INITIAL_PACKET_NUMBER + 1,
        4,
        &payload,
    );
    let packet = datagram(&dispatcher, packet);
    dispatcher.process_packet(packet);

    assert_eq!(dispatcher.session_count(), 0);
    assert!(dispatcher.is_in_time_wait(&cid(1)));
    assert_eq!(
        dispatcher.config().event_subscriber.dropped,
        vec![DatagramDropReason::UnreasonableInitialPacketNumber]
    );

    // the boundary value is still acceptable
    let packet = packets::legacy_long(
        &cid(2),
        QUIC_V43,
        MAX_REASONABLE_INITIAL_PACKET_NUMBER,
        4,
        &payload,
    );
    let packet = datagram(&dispatcher, packet);
    dispatcher.process_packet(packet);
    assert!(dispatcher.has_session(&cid(2)));
}

#[test]
fn async_validations_resolve_out_of_order() {
    let mut dispatcher = dispatcher::<validate::testing::DeferAll>();

    let packet = datagram(&dispatcher, chlo_packet(&cid(1)));
    dispatcher.process_packet(packet);
    let packet = datagram(&dispatcher, chlo_packet(&cid(2)));
    dispatcher.process_packet(packet);

    assert_eq!(dispatcher.session_count(), 0);
    assert_eq!(dispatcher.config().event_subscriber.validations_deferred, 2);

    // data for 0x01 arriving between submission and completion is buffered
    let packet = datagram(&dispatcher, data_packet(&cid(1), 2));
    dispatcher.process_packet(packet);
    assert_eq!(dispatcher.buffered_connection_count(), 1);

    let (token1, _) = dispatcher.config().chlo_validator.pending[0];
    let (token2, _) = dispatcher.config().chlo_validator.pending[1];

    dispatcher.on_chlo_validated(token2, validate::Validation::Accept);
    assert!(dispatcher.has_session(&cid(2)));
    assert!(!dispatcher.has_session(&cid(1)));

    dispatcher.on_chlo_validated(token1, validate::Validation::Accept);
    assert!(dispatcher.has_session(&cid(1)));

    let state = dispatcher.config().session_factory.state_for(&cid(1)).unwrap();
    let state = state.borrow();
    assert_eq!(state.datagrams.len(), 2);
    assert_eq!(state.datagrams[0].payload, chlo_packet(&cid(1)));
    assert_eq!(state.datagrams[1].payload, data_packet(&cid(1), 2));
}

#[test]
fn packet_context_is_restored_across_suspension() {
    let mut dispatcher = dispatcher::<validate::testing::DeferAll>();

    dispatcher.set_packet_context("A".to_string());
    let packet = datagram(&dispatcher, chlo_packet(&cid(1)));
    dispatcher.process_packet(packet);

    dispatcher.set_packet_context("B".to_string());
    let packet = datagram(&dispatcher, chlo_packet(&cid(2)));
    dispatcher.process_packet(packet);

    let (token1, _) = dispatcher.config().chlo_validator.pending[0];
    let (token2, _) = dispatcher.config().chlo_validator.pending[1];

    dispatcher.on_chlo_validated(token1, validate::Validation::Accept);
    assert_eq!(dispatcher.packet_context().as_str(), "A");

    dispatcher.on_chlo_validated(token2, validate::Validation::Accept);
    assert_eq!(dispatcher.packet_context().as_str(), "B");
}

#[test]
fn rejected_chlo_time_waits_with_the_close_frame() {
    let mut dispatcher = dispatcher::<validate::testing::RejectAll>();

    let packet = datagram(&dispatcher, chlo_packet(&cid(1)));
    dispatcher.process_packet(packet);

    assert_eq!(dispatcher.session_count(), 0);
    assert!(dispatcher.is_in_time_wait(&cid(1)));

    // one close frame is emitted immediately
    dispatcher.writer().with(|queue| {
        assert_eq!(queue.transmissions.len(), 1);
        assert_eq!(queue.transmissions[0].payload, &b"handshake rejected"[..]);
    });

    // the time-wait list answers the first retransmission
    let packet = datagram(&dispatcher, data_packet(&cid(1), 2));
    dispatcher.process_packet(packet);
    dispatcher.writer().with(|queue| assert_eq!(queue.transmissions.len(), 2));

    // and then backs off
    let packet = datagram(&dispatcher, data_packet(&cid(1), 3));
    dispatcher.process_packet(packet);
    dispatcher.writer().with(|queue| assert_eq!(queue.transmissions.len(), 2));
}

#[test]
fn async_reject_discards_buffered_datagrams() {
    let mut dispatcher = dispatcher::<validate::testing::DeferAll>();

    let packet = datagram(&dispatcher, chlo_packet(&cid(1)));
    dispatcher.process_packet(packet);
    let packet = datagram(&dispatcher, data_packet(&cid(1), 2));
    dispatcher.process_packet(packet);
    assert_eq!(dispatcher.buffered_connection_count(), 1);

    let (token, _) = dispatcher.config().chlo_validator.pending[0];
    dispatcher.on_chlo_validated(
        token,
        validate::Validation::Reject(Bytes::from_static(b"no")),
    );

    assert_eq!(dispatcher.session_count(), 0);
    assert_eq!(dispatcher.buffered_connection_count(), 0);
    assert!(dispatcher.is_in_time_wait(&cid(1)));
}

#[test]
fn write_blocked_sessions_are_served_in_insertion_order() {
    let mut dispatcher = dispatcher::<validate::AcceptAll>();

    for value in 1..=3u64 {
        let packet = datagram(&dispatcher, chlo_packet(&cid(value)));
        dispatcher.process_packet(packet);
    }

    // sessions 2 then 1 report the writer blocked (3 stays unblocked)
    for value in [2u64, 1] {
        let state = dispatcher
            .config()
            .session_factory
            .state_for(&cid(value))
            .unwrap();
        state.borrow_mut().write_block_next = true;
        let packet = datagram(&dispatcher, data_packet(&cid(value), 2));
        dispatcher.process_packet(packet);
    }

    dispatcher.on_can_write();

    let calls = |value: u64| {
        dispatcher
            .config()
            .session_factory
            .state_for(&cid(value))
            .unwrap()
            .borrow()
            .can_write_calls
    };
    assert_eq!(calls(2), 1);
    assert_eq!(calls(1), 1);
    assert_eq!(calls(3), 0);
}

#[test]
fn session_blocking_during_its_serve_waits_for_the_next_drain() {
    let mut dispatcher = dispatcher::<validate::AcceptAll>();

    let packet = datagram(&dispatcher, chlo_packet(&cid(1)));
    dispatcher.process_packet(packet);

    let state = dispatcher.config().session_factory.state_for(&cid(1)).unwrap();

    state.borrow_mut().write_block_next = true;
    let packet = datagram(&dispatcher, data_packet(&cid(1), 2));
    dispatcher.process_packet(packet);

    // the serve itself reports blocked again
    state.borrow_mut().write_block_next = true;
    dispatcher.on_can_write();
    assert_eq!(state.borrow().can_write_calls, 1, "served once per drain");

    dispatcher.on_can_write();
    assert_eq!(state.borrow().can_write_calls, 2);

    // no longer blocked: further drains skip it
    dispatcher.on_can_write();
    assert_eq!(state.borrow().can_write_calls, 2);
}

#[test]
fn session_closing_during_dispatch_is_destroyed_at_end_of_tick() {
    let mut dispatcher = dispatcher::<validate::AcceptAll>();

    let packet = datagram(&dispatcher, chlo_packet(&cid(1)));
    dispatcher.process_packet(packet);

    let state = dispatcher.config().session_factory.state_for(&cid(1)).unwrap();
    state.borrow_mut().close_on_next_datagram = Some(session::Error {
        source: session::CloseSource::Peer,
        close_frame: Some(Bytes::from_static(b"bye")),
    });

    let packet = datagram(&dispatcher, data_packet(&cid(1), 2));
    dispatcher.process_packet(packet);

    assert!(!dispatcher.has_session(&cid(1)));
    assert!(dispatcher.is_in_time_wait(&cid(1)));
    assert!(state.borrow().closed.is_some());

    // stragglers now draw the stored close frame
    let packet = datagram(&dispatcher, data_packet(&cid(1), 3));
    dispatcher.process_packet(packet);
    dispatcher.writer().with(|queue| {
        assert_eq!(queue.transmissions.len(), 1);
        assert_eq!(queue.transmissions[0].payload, &b"bye"[..]);
    });
}

#[test]
fn embedder_veto_drops_without_state() {
    let mut dispatcher = dispatcher::<validate::AcceptAll>();
    dispatcher
        .config_mut()
        .session_factory
        .vetoed
        .push(cid(1));

    let packet = datagram(&dispatcher, chlo_packet(&cid(1)));
    dispatcher.process_packet(packet);

    assert_eq!(dispatcher.session_count(), 0);
    assert_eq!(dispatcher.buffered_connection_count(), 0);
    assert_eq!(
        dispatcher.config().event_subscriber.dropped,
        vec![DatagramDropReason::VetoedByEmbedder]
    );
}

#[test]
fn short_initial_connection_ids_are_replaced_when_allowed() {
    let mut dispatcher = dispatcher::<validate::AcceptAll>();
    dispatcher.set_allow_short_initial_connection_ids(true);

    let short_id = connection::Id::try_from_bytes(&[9, 9]).unwrap();
    let mut payload = chlo::testing::chlo_payload(DRAFT_29, b"h3");
    payload.resize(1300, 0);
    let packet = packets::ietf_initial(&short_id, &cid(2), DRAFT_29, 1, &payload);
    let packet = datagram(&dispatcher, packet);
    dispatcher.process_packet(packet);

    assert_eq!(dispatcher.session_count(), 1);
    assert!(!dispatcher.has_session(&short_id), "client id is not kept");

    let state = dispatcher.config().session_factory.state(0);
    let state = state.borrow();
    assert_eq!(state.connection_id.len(), 8);
    assert_eq!(state.alpn.as_deref(), Some(&b"h3"[..]));
    assert_eq!(state.version, DRAFT_29);
}

#[test]
fn zero_length_initial_connection_id_is_replaced_when_allowed() {
    let mut dispatcher = dispatcher::<validate::AcceptAll>();
    dispatcher.set_allow_short_initial_connection_ids(true);

    let empty = connection::Id::try_from_bytes(&[]).unwrap();
    let mut payload = chlo::testing::chlo_payload(DRAFT_29, b"h3");
    payload.resize(1300, 0);
    let packet = packets::ietf_initial(&empty, &cid(2), DRAFT_29, 1, &payload);
    let packet = datagram(&dispatcher, packet);
    dispatcher.process_packet(packet);

    assert_eq!(dispatcher.session_count(), 1);

    let state = dispatcher.config().session_factory.state(0);
    let state = state.borrow();
    assert_eq!(state.connection_id.len(), 8);
    assert_eq!(state.alpn.as_deref(), Some(&b"h3"[..]));

    // a follow-up under the replacement id reaches the session
    drop(state);
    let replacement = dispatcher.config().session_factory.state(0).borrow().connection_id;
    let packet = datagram(&dispatcher, packets::ietf_short(&replacement, 2, b"x"));
    dispatcher.process_packet(packet);
    let state = dispatcher.config().session_factory.state(0);
    assert_eq!(state.borrow().datagrams.len(), 2);
}

#[test]
fn short_initial_connection_ids_are_dropped_by_default() {
    let mut dispatcher = dispatcher::<validate::AcceptAll>();

    let short_id = connection::Id::try_from_bytes(&[9, 9]).unwrap();
    let mut payload = chlo::testing::chlo_payload(DRAFT_29, b"h3");
    payload.resize(1300, 0);
    let packet = packets::ietf_initial(&short_id, &cid(2), DRAFT_29, 1, &payload);
    let packet = datagram(&dispatcher, packet);
    dispatcher.process_packet(packet);

    assert_eq!(dispatcher.session_count(), 0);
    assert_eq!(
        dispatcher.config().event_subscriber.dropped,
        vec![DatagramDropReason::RejectedConnectionId]
    );
}

#[test]
fn port_zero_peers_are_dropped() {
    let mut dispatcher = dispatcher::<validate::AcceptAll>();

    let packet = datagram_from(&dispatcher, "127.0.0.1:0", chlo_packet(&cid(1)));
    dispatcher.process_packet(packet);

    assert_eq!(dispatcher.session_count(), 0);
    assert_eq!(
        dispatcher.config().event_subscriber.dropped,
        vec![DatagramDropReason::InvalidSourcePort]
    );
}

#[test]
fn shutdown_closes_everything() {
    let mut dispatcher = dispatcher::<validate::AcceptAll>();

    let packet = datagram(&dispatcher, chlo_packet(&cid(1)));
    dispatcher.process_packet(packet);
    let packet = datagram(&dispatcher, chlo_packet(&cid(2)));
    dispatcher.process_packet(packet);
    let packet = datagram(&dispatcher, data_packet(&cid(3), 1));
    dispatcher.process_packet(packet);

    dispatcher.shutdown();

    assert_eq!(dispatcher.session_count(), 0);
    assert_eq!(dispatcher.buffered_connection_count(), 0);
    assert!(dispatcher.is_in_time_wait(&cid(1)));
    assert!(dispatcher.is_in_time_wait(&cid(2)));

    for index in 0..2 {
        let state = dispatcher.config().session_factory.state(index);
        let closed = state.borrow().closed.clone().unwrap();
        assert!(closed.contains("ShuttingDown"), "got {closed}");
    }
}

#[test]
fn enabled_version_changes_affect_new_connections_only() {
    let mut dispatcher = dispatcher::<validate::AcceptAll>();

    let packet = datagram(&dispatcher, chlo_packet(&cid(1)));
    dispatcher.process_packet(packet);
    assert!(dispatcher.has_session(&cid(1)));

    dispatcher.set_enabled_versions(vec![DRAFT_29]);

    // the live session keeps receiving
    let packet = datagram(&dispatcher, data_packet(&cid(1), 2));
    dispatcher.process_packet(packet);
    let state = dispatcher.config().session_factory.state_for(&cid(1)).unwrap();
    assert_eq!(state.borrow().datagrams.len(), 2);

    // a new attempt with the dropped version draws version negotiation
    let packet = datagram(&dispatcher, chlo_packet(&cid(2)));
    dispatcher.process_packet(packet);
    assert!(!dispatcher.has_session(&cid(2)));
    assert_eq!(
        dispatcher.config().event_subscriber.emitted,
        vec![EmissionKind::VersionNegotiation]
    );
}

#[test]
fn embedder_quarantine_serves_stateless_resets() {
    use quic_dispatch::dispatch::time_wait::Action;

    let mut dispatcher = dispatcher::<validate::AcceptAll>();
    dispatcher.add_to_time_wait(
        cid(1),
        Action::SendStatelessReset(Bytes::from_static(b"reset")),
    );
    assert!(dispatcher.is_in_time_wait(&cid(1)));

    let packet = datagram(&dispatcher, data_packet(&cid(1), 1));
    dispatcher.process_packet(packet);

    assert_eq!(
        dispatcher.config().event_subscriber.emitted,
        vec![EmissionKind::StatelessReset]
    );
    dispatcher.writer().with(|queue| {
        assert_eq!(queue.transmissions.len(), 1);
        assert_eq!(queue.transmissions[0].payload, &b"reset"[..]);
    });
}

#[test]
fn buffered_connections_expire_into_time_wait() {
    let (mut dispatcher, clock) = dispatcher_with_limits::<validate::AcceptAll>(Limits::default());

    let now = clock.get_time();
    let packet = Datagram {
        local_address: addr(SERVER),
        remote_address: addr(CLIENT),
        payload: data_packet(&cid(1), 1),
        timestamp: now,
    };
    dispatcher.process_packet(packet);
    assert_eq!(dispatcher.buffered_connection_count(), 1);

    clock.inc_by(core::time::Duration::from_secs(6));
    dispatcher.on_timeout();

    assert_eq!(dispatcher.buffered_connection_count(), 0);
    assert!(dispatcher.is_in_time_wait(&cid(1)));
}
