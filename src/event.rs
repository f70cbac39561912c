// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Dispatcher observability hooks.
//!
//! Every disposition the dispatcher takes for a datagram is reported through
//! [`Subscriber`]; embedders adapt these callbacks to their own logging or
//! metrics. All methods default to no-ops.

use crate::{connection, time::Timestamp, version::Version};
use std::net::SocketAddr;

/// Why an inbound datagram was discarded without reaching a session
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum DatagramDropReason {
    /// The unauthenticated header prefix could not be parsed
    DecodingFailed,
    /// The peer claimed source port zero
    InvalidSourcePort,
    /// The version is not enabled and the datagram was too small to answer
    UnsupportedVersion,
    /// The connection ID failed the server's acceptance policy
    RejectedConnectionId,
    /// A legacy public-reset for an unknown connection
    StrayPublicReset,
    /// The embedder's decision hook vetoed buffering/creation
    VetoedByEmbedder,
    /// The pre-session buffer refused the datagram
    BufferFull,
    /// The initial packet number was beyond the reasonable range
    UnreasonableInitialPacketNumber,
    /// A second CHLO arrived for a connection that already buffered one
    DuplicateChlo,
    /// A CHLO below the anti-amplification size floor
    UndersizedChlo,
}

/// What kind of canned packet the dispatcher emitted on its own authority
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum EmissionKind {
    VersionNegotiation,
    CloseFrame,
    StatelessReset,
}

#[derive(Clone, Copy, Debug)]
pub struct DatagramMeta {
    pub remote_address: SocketAddr,
    pub len: usize,
    pub timestamp: Timestamp,
}

/// Receives dispatcher events.
pub trait Subscriber: 'static {
    /// A datagram was discarded before reaching any session
    fn on_datagram_dropped(&mut self, meta: &DatagramMeta, reason: DatagramDropReason) {
        let _ = (meta, reason);
    }

    /// A session was created and installed in the session table
    fn on_session_created(&mut self, id: &connection::Id, version: Version) {
        let _ = (id, version);
    }

    /// A connection ID entered the time-wait list
    fn on_time_wait_added(&mut self, id: &connection::Id) {
        let _ = id;
    }

    /// The dispatcher emitted (or queued) a canned response packet
    fn on_packet_emitted(&mut self, kind: EmissionKind) {
        let _ = kind;
    }

    /// A datagram was parked in the pre-session buffer
    fn on_packet_buffered(&mut self, id: &connection::Id) {
        let _ = id;
    }

    /// An asynchronous CHLO validation was submitted
    fn on_validation_deferred(&mut self, id: &connection::Id) {
        let _ = id;
    }
}

/// A subscriber that ignores every event
#[derive(Debug, Default)]
pub struct Disabled;

impl Subscriber for Disabled {}

#[cfg(any(test, feature = "testing"))]
pub mod testing {
    use super::*;

    /// Counts events for assertions
    #[derive(Debug, Default)]
    pub struct Subscriber {
        pub dropped: Vec<DatagramDropReason>,
        pub sessions_created: usize,
        pub time_wait_added: usize,
        pub emitted: Vec<EmissionKind>,
        pub buffered: usize,
        pub validations_deferred: usize,
    }

    impl super::Subscriber for Subscriber {
        fn on_datagram_dropped(&mut self, _meta: &DatagramMeta, reason: DatagramDropReason) {
            self.dropped.push(reason);
        }

        fn on_session_created(&mut self, _id: &connection::Id, _version: Version) {
            self.sessions_created += 1;
        }

        fn on_time_wait_added(&mut self, _id: &connection::Id) {
            self.time_wait_added += 1;
        }

        fn on_packet_emitted(&mut self, kind: EmissionKind) {
            self.emitted.push(kind);
        }

        fn on_packet_buffered(&mut self, _id: &connection::Id) {
            self.buffered += 1;
        }

        fn on_validation_deferred(&mut self, _id: &connection::Id) {
            self.validations_deferred += 1;
        }
    }
}
