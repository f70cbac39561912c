// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Outbound datagram queue shared by the dispatcher and all of its sessions

use bytes::Bytes;
use core::{cell::Cell, fmt};
use std::{cell::RefCell, net::SocketAddr, rc::Rc};

/// A single outbound datagram
#[derive(Clone, Debug)]
pub struct Transmission {
    pub destination: SocketAddr,
    pub payload: Bytes,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Error {
    /// The OS send buffer refused the datagram; the caller must wait for a
    /// writable signal before pushing again.
    Blocked,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Blocked => write!(f, "writer is blocked"),
        }
    }
}

/// The embedder-provided UDP writer.
///
/// `push` either accepts the datagram or reports [`Error::Blocked`]; it never
/// blocks the calling thread.
pub trait Queue: 'static {
    fn push(&mut self, transmission: Transmission) -> Result<(), Error>;
}

/// The writer capability handed to sessions.
///
/// The dispatcher owns the queue; sessions hold non-owning clones of this
/// handle. The handle outlives no session-visible state: the dispatcher keeps
/// one clone for itself, so the queue lives as long as the dispatcher.
pub struct Shared<Q> {
    inner: Rc<Inner<Q>>,
}

struct Inner<Q> {
    queue: RefCell<Q>,
    blocked: Cell<bool>,
}

impl<Q> Clone for Shared<Q> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<Q: fmt::Debug> fmt::Debug for Shared<Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shared")
            .field("queue", &self.inner.queue)
            .field("blocked", &self.inner.blocked.get())
            .finish()
    }
}

impl<Q: Queue> Shared<Q> {
    pub fn new(queue: Q) -> Self {
        Self {
            inner: Rc::new(Inner {
                queue: RefCell::new(queue),
                blocked: Cell::new(false),
            }),
        }
    }

    /// Pushes a transmission, recording the blocked state on refusal
    pub fn push(&self, transmission: Transmission) -> Result<(), Error> {
        if self.inner.blocked.get() {
            return Err(Error::Blocked);
        }
        let result = self.inner.queue.borrow_mut().push(transmission);
        if result.is_err() {
            self.inner.blocked.set(true);
        }
        result
    }

    /// True while the writer has refused a datagram and has not yet signaled
    /// writability
    #[inline]
    pub fn is_blocked(&self) -> bool {
        self.inner.blocked.get()
    }

    /// Called when the socket layer reports the writer writable again
    pub fn set_writable(&self) {
        self.inner.blocked.set(false);
    }

    /// Grants scoped access to the underlying queue
    pub fn with<R>(&self, f: impl FnOnce(&mut Q) -> R) -> R {
        f(&mut self.inner.queue.borrow_mut())
    }
}

#[cfg(any(test, feature = "testing"))]
pub mod testing {
    use super::*;
    use std::collections::VecDeque;

    /// Records every accepted transmission; can be scripted to refuse
    /// datagrams to exercise write-blocked paths.
    #[derive(Debug, Default)]
    pub struct Queue {
        pub transmissions: VecDeque<Transmission>,
        pub refuse: bool,
    }

    impl super::Queue for Queue {
        fn push(&mut self, transmission: Transmission) -> Result<(), Error> {
            if self.refuse {
                return Err(Error::Blocked);
            }
            self.transmissions.push_back(transmission);
            Ok(())
        }
    }
}
