// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Inbound datagram representation

use crate::time::Timestamp;
use bytes::Bytes;
use std::net::SocketAddr;

/// A single received UDP datagram.
///
/// Immutable after receipt; the dispatcher clones the (cheaply
/// reference-counted) payload into the buffered store when a datagram must
/// outlive its dispatch.
#[derive(Clone, Debug)]
pub struct Datagram {
    /// The local address the datagram arrived on
    pub local_address: SocketAddr,
    /// The peer that sent the datagram
    pub remote_address: SocketAddr,
    /// The wire bytes
    pub payload: Bytes,
    /// When the socket layer received the datagram
    pub timestamp: Timestamp,
}

impl Datagram {
    #[inline]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}
