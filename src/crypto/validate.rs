// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Handshake-initiation validation.
//!
//! The dispatcher submits every CHLO that could create a session to the
//! embedder's validator, which may answer synchronously or defer. A deferred
//! validation completes when the embedder calls
//! `Dispatcher::on_chlo_validated` with the token from the request.

use crate::{connection, version::Version};
use bytes::Bytes;
use core::fmt;
use std::net::SocketAddr;

/// Correlates a deferred validation with its completion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Token(pub(crate) u64);

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "validation token {}", self.0)
    }
}

/// A CHLO submitted for validation
#[derive(Debug)]
pub struct Request<'a> {
    /// Token to echo back if the decision is deferred
    pub token: Token,
    pub connection_id: &'a connection::Id,
    pub remote_address: SocketAddr,
    pub local_address: SocketAddr,
    pub version: Version,
    pub alpn: Option<&'a [u8]>,
}

/// The validator's immediate answer
#[derive(Debug)]
pub enum Decision {
    /// Create the session now
    Accept,
    /// Refuse the handshake; the frame is the canned close/reject answer the
    /// time-wait list will serve
    Reject(Bytes),
    /// The answer will arrive later through `on_chlo_validated`
    Pending,
}

/// The deferred answer
#[derive(Debug, Clone)]
pub enum Validation {
    Accept,
    Reject(Bytes),
}

pub trait Validator: 'static {
    fn validate(&mut self, request: &Request<'_>) -> Decision;
}

/// Accepts every CHLO synchronously
#[derive(Debug, Default)]
pub struct AcceptAll;

impl Validator for AcceptAll {
    fn validate(&mut self, _request: &Request<'_>) -> Decision {
        Decision::Accept
    }
}

#[cfg(any(test, feature = "testing"))]
pub mod testing {
    use super::*;
    use std::collections::VecDeque;

    /// Defers every CHLO and records the tokens for later completion
    #[derive(Debug, Default)]
    pub struct DeferAll {
        pub pending: VecDeque<(Token, connection::Id)>,
    }

    impl Validator for DeferAll {
        fn validate(&mut self, request: &Request<'_>) -> Decision {
            self.pending
                .push_back((request.token, *request.connection_id));
            Decision::Pending
        }
    }

    /// Rejects every CHLO with a fixed close frame
    #[derive(Debug)]
    pub struct RejectAll {
        pub close_frame: Bytes,
    }

    impl Default for RejectAll {
        fn default() -> Self {
            Self {
                close_frame: Bytes::from_static(b"handshake rejected"),
            }
        }
    }

    impl Validator for RejectAll {
        fn validate(&mut self, _request: &Request<'_>) -> Decision {
            Decision::Reject(self.close_frame.clone())
        }
    }
}
