// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The per-connection protocol engine, as the dispatcher sees it.
//!
//! Sessions are owned by the dispatcher. They never destroy themselves:
//! a session reports closure through the `Err` arm of its handlers and the
//! dispatcher runs the close sequence (close hook, write-blocked removal,
//! time-wait registration, end-of-tick destruction).

use crate::{connection, inet::Datagram, io::tx, version::Version};
use bytes::Bytes;
use hashbrown::HashMap;
use std::net::SocketAddr;

/// What a session wants from the dispatcher after a handler ran
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Interests {
    /// The shared writer refused a datagram; notify the session on the next
    /// writable event
    pub write_blocked: bool,
}

/// A session-reported closure
#[derive(Clone, Debug)]
pub struct Error {
    pub source: CloseSource,
    /// Canned termination packet served to stragglers from time-wait, if the
    /// session produced one before closing
    pub close_frame: Option<Bytes>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseSource {
    Peer,
    Local,
}

/// Why the dispatcher is running a session's close hook
#[derive(Debug)]
pub enum CloseReason<'a> {
    /// The session itself reported the error
    Closed(&'a Error),
    /// The dispatcher is shutting down ("peer going away")
    ShuttingDown,
    /// The embedder closed the session through the dispatcher
    Requested(&'a Error),
}

pub trait Session: 'static {
    /// Delivers one datagram. Datagrams for the same connection arrive in
    /// their network arrival order; for a new connection the CHLO arrives
    /// first.
    fn on_datagram(&mut self, datagram: &Datagram) -> Result<Interests, Error>;

    /// The shared writer became writable. Returning `write_blocked` again
    /// defers the session to the next drain.
    fn on_can_write(&mut self) -> Result<Interests, Error>;

    /// Invoked exactly once before the session is scheduled for destruction.
    /// Must not re-enter the dispatcher.
    fn on_close(&mut self, reason: CloseReason<'_>);
}

/// Creates sessions and vetoes state creation for unwanted connections
pub trait Factory: 'static {
    type Session: Session;
    type Writer: tx::Queue;

    /// Builds the session for an accepted CHLO. The writer handle is the
    /// session's non-owning capability to the shared UDP writer.
    fn create_session(
        &mut self,
        connection_id: &connection::Id,
        remote_address: SocketAddr,
        alpn: Option<&[u8]>,
        version: Version,
        writer: &tx::Shared<Self::Writer>,
    ) -> Self::Session;

    /// Allows the embedder to refuse creating *any* state (session or
    /// buffer) for a connection ID before resources are committed
    fn should_create_or_buffer(&mut self, connection_id: &connection::Id, is_ietf: bool) -> bool {
        let _ = (connection_id, is_ietf);
        true
    }
}

/// Owns all live sessions, plus the closed list drained at end of tick.
///
/// A session removed mid-dispatch is parked on the closed list instead of
/// being dropped, because removal can happen inside the session's own
/// callback stack.
pub struct Table<S> {
    sessions: HashMap<connection::Id, S>,
    closed: Vec<S>,
}

impl<S: Session> Default for Table<S> {
    fn default() -> Self {
        Self {
            sessions: HashMap::new(),
            closed: Vec::new(),
        }
    }
}

impl<S: Session> Table<S> {
    #[inline]
    pub fn contains(&self, id: &connection::Id) -> bool {
        self.sessions.contains_key(id)
    }

    #[inline]
    pub fn get_mut(&mut self, id: &connection::Id) -> Option<&mut S> {
        self.sessions.get_mut(id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Installs a session. There is at most one live session per ID; a
    /// duplicate insert indicates dispatcher logic corruption.
    pub fn insert(&mut self, id: connection::Id, session: S) {
        let replaced = self.sessions.insert(id, session);
        debug_assert!(replaced.is_none(), "duplicate session for connection id");
        if let Some(replaced) = replaced {
            self.closed.push(replaced);
        }
    }

    /// Removes the session from the live set and parks it for end-of-tick
    /// destruction. Returns a reference for final hooks.
    pub fn retire(&mut self, id: &connection::Id) -> Option<&mut S> {
        let session = self.sessions.remove(id)?;
        self.closed.push(session);
        self.closed.last_mut()
    }

    /// Iterates live connection IDs (order unspecified)
    pub fn ids(&self) -> Vec<connection::Id> {
        self.sessions.keys().copied().collect()
    }

    /// Destroys sessions retired during this tick
    pub fn reap_closed(&mut self) {
        self.closed.clear();
    }

    #[cfg(test)]
    pub(crate) fn closed_len(&self) -> usize {
        self.closed.len()
    }
}

#[cfg(any(test, feature = "testing"))]
pub mod testing {
    use super::*;
    use core::marker::PhantomData;
    use std::{cell::RefCell, rc::Rc};

    /// Observable state of a test session, shared with the factory that
    /// created it
    #[derive(Debug)]
    pub struct State {
        pub connection_id: connection::Id,
        pub remote_address: SocketAddr,
        pub alpn: Option<Vec<u8>>,
        pub version: Version,
        pub datagrams: Vec<Datagram>,
        pub can_write_calls: usize,
        pub closed: Option<String>,
        /// Next handler invocation reports the writer blocked
        pub write_block_next: bool,
        /// Next datagram makes the session close itself
        pub close_on_next_datagram: Option<Error>,
    }

    pub struct Session {
        pub state: Rc<RefCell<State>>,
    }

    impl super::Session for Session {
        fn on_datagram(&mut self, datagram: &Datagram) -> Result<Interests, Error> {
            let mut state = self.state.borrow_mut();
            state.datagrams.push(datagram.clone());

            if let Some(error) = state.close_on_next_datagram.take() {
                return Err(error);
            }

            let write_blocked = core::mem::take(&mut state.write_block_next);
            Ok(Interests { write_blocked })
        }

        fn on_can_write(&mut self) -> Result<Interests, Error> {
            let mut state = self.state.borrow_mut();
            state.can_write_calls += 1;
            let write_blocked = core::mem::take(&mut state.write_block_next);
            Ok(Interests { write_blocked })
        }

        fn on_close(&mut self, reason: CloseReason<'_>) {
            self.state.borrow_mut().closed = Some(format!("{reason:?}"));
        }
    }

    /// Creates [`Session`]s and keeps handles to their state
    pub struct Factory<W> {
        pub created: Vec<Rc<RefCell<State>>>,
        /// IDs for which `should_create_or_buffer` answers `false`
        pub vetoed: Vec<connection::Id>,
        writer: PhantomData<W>,
    }

    impl<W> Default for Factory<W> {
        fn default() -> Self {
            Self {
                created: Vec::new(),
                vetoed: Vec::new(),
                writer: PhantomData,
            }
        }
    }

    impl<W> Factory<W> {
        /// State handle for the `index`-th created session
        pub fn state(&self, index: usize) -> Rc<RefCell<State>> {
            self.created[index].clone()
        }

        /// State handle for the session created for `id`
        pub fn state_for(&self, id: &connection::Id) -> Option<Rc<RefCell<State>>> {
            self.created
                .iter()
                .find(|state| state.borrow().connection_id == *id)
                .cloned()
        }
    }

    impl<W: tx::Queue> super::Factory for Factory<W> {
        type Session = Session;
        type Writer = W;

        fn create_session(
            &mut self,
            connection_id: &connection::Id,
            remote_address: SocketAddr,
            alpn: Option<&[u8]>,
            version: Version,
            _writer: &tx::Shared<Self::Writer>,
        ) -> Self::Session {
            let state = Rc::new(RefCell::new(State {
                connection_id: *connection_id,
                remote_address,
                alpn: alpn.map(<[u8]>::to_vec),
                version,
                datagrams: Vec::new(),
                can_write_calls: 0,
                closed: None,
                write_block_next: false,
                close_on_next_datagram: None,
            }));
            self.created.push(state.clone());
            Session { state }
        }

        fn should_create_or_buffer(
            &mut self,
            connection_id: &connection::Id,
            _is_ietf: bool,
        ) -> bool {
            !self.vetoed.contains(connection_id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::QUIC_V43;

    type TestFactory = testing::Factory<crate::io::tx::testing::Queue>;

    fn id(bytes: &[u8]) -> connection::Id {
        connection::Id::try_from_bytes(bytes).unwrap()
    }

    fn new_session(factory: &mut TestFactory) -> testing::Session {
        let writer = tx::Shared::new(crate::io::tx::testing::Queue::default());
        Factory::create_session(
            factory,
            &id(&[1; 8]),
            "127.0.0.1:1".parse().unwrap(),
            Some(b"hq"),
            QUIC_V43,
            &writer,
        )
    }

    #[test]
    fn retire_defers_destruction() {
        let mut factory = TestFactory::default();
        let mut table = Table::default();

        table.insert(id(&[1; 8]), new_session(&mut factory));
        assert!(table.contains(&id(&[1; 8])));

        assert!(table.retire(&id(&[1; 8])).is_some());
        assert!(!table.contains(&id(&[1; 8])));
        assert_eq!(table.closed_len(), 1);

        table.reap_closed();
        assert_eq!(table.closed_len(), 0);
    }

    #[test]
    fn retire_unknown_id() {
        let mut table = Table::<testing::Session>::default();
        assert!(table.retire(&id(&[9; 8])).is_none());
    }
}
