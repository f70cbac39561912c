// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The collaborator record.
//!
//! Everything the dispatcher cannot decide by itself (session construction,
//! cryptographic validation, ID generation, randomness, time, the UDP
//! writer, observability) is provided by the embedder through a [`Config`]
//! implementation. Test doubles implement the same traits; there is no
//! separate testing surface.

use crate::{connection, crypto::validate, event, io::tx, random, session, time};

/// Configuration parameters for a [`Dispatcher`](crate::Dispatcher)
pub trait Config: 'static + Sized {
    /// The per-connection protocol engine
    type Session: session::Session;
    /// Creates sessions and vetoes unwanted connections
    type SessionFactory: session::Factory<Session = Self::Session, Writer = Self::Writer>;
    /// Validates handshake initiations, possibly asynchronously
    type ChloValidator: validate::Validator;
    /// Produces server-chosen connection IDs for the replacement policy
    type ConnectionIdGenerator: connection::id::Generator;
    /// Source of randomness
    type RandomGenerator: random::Generator;
    /// Source of time
    type Clock: time::Clock;
    /// The shared UDP writer
    type Writer: tx::Queue;
    /// Receives dispatch events
    type EventSubscriber: event::Subscriber;
    /// Caller-owned state saved and restored around asynchronous
    /// validation suspensions
    type PacketContext: 'static + Clone + Default;

    /// Borrows all collaborators for the current operation
    fn context(&mut self) -> Context<'_, Self>;
}

/// Mutable borrows of every collaborator, taken together so a single
/// dispatch step can use several without re-borrowing the config
pub struct Context<'a, Cfg: Config> {
    pub session_factory: &'a mut Cfg::SessionFactory,
    pub chlo_validator: &'a mut Cfg::ChloValidator,
    pub connection_id_generator: &'a mut Cfg::ConnectionIdGenerator,
    pub random_generator: &'a mut Cfg::RandomGenerator,
    pub event_subscriber: &'a mut Cfg::EventSubscriber,
}
