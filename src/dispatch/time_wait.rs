// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Quarantine for recently closed connection IDs.
//!
//! Stragglers for a quarantined ID are answered with the entry's canned
//! response under an exponential per-ID backoff, so a retransmitting peer
//! hears the closure without the server amplifying floods. Entries expire
//! after the configured period; the list is capacity-bounded with
//! oldest-first eviction.

use crate::{
    connection,
    event::EmissionKind,
    inet::Datagram,
    io::tx::{self, Transmission},
    time::Timestamp,
};
use bytes::Bytes;
use core::time::Duration;
use hashbrown::HashMap;
use std::collections::VecDeque;
use std::net::SocketAddr;

pub const DEFAULT_PERIOD: Duration = Duration::from_secs(5);
pub const DEFAULT_CAPACITY: usize = 10_000;

/// Responses stop doubling once this many packets separate them
const MAX_RESPONSE_BACKOFF: u32 = 1024;

/// What the list does when a straggler arrives for an entry
#[derive(Clone, Debug)]
pub enum Action {
    /// Discard without answering
    SilentDrop,
    /// Answer with the stored termination packet
    SendClose(Bytes),
    /// Answer with a pre-built stateless reset packet
    SendStatelessReset(Bytes),
    /// Answer with a pre-built version negotiation packet
    SendVersionNegotiation(Bytes),
}

impl Action {
    fn is_send_close(&self) -> bool {
        matches!(self, Action::SendClose(_))
    }

    fn response(&self) -> Option<(Bytes, EmissionKind)> {
        match self {
            Action::SilentDrop => None,
            Action::SendClose(frame) => Some((frame.clone(), EmissionKind::CloseFrame)),
            Action::SendStatelessReset(packet) => {
                Some((packet.clone(), EmissionKind::StatelessReset))
            }
            Action::SendVersionNegotiation(packet) => {
                Some((packet.clone(), EmissionKind::VersionNegotiation))
            }
        }
    }
}

#[derive(Debug)]
struct Entry {
    action: Action,
    deadline: Timestamp,
    /// Position stamp matching this entry's slot in the eviction order;
    /// stale slots are skipped during cleanup
    stamp: u64,
    packets_since_response: u32,
    response_backoff: u32,
}

pub struct List {
    entries: HashMap<connection::Id, Entry>,
    /// Eviction order; refreshed entries are re-stamped and re-queued
    order: VecDeque<(connection::Id, u64)>,
    transmissions: VecDeque<Transmission>,
    period: Duration,
    capacity: usize,
    next_stamp: u64,
}

impl List {
    pub fn new(period: Duration, capacity: usize) -> Self {
        debug_assert!(capacity > 0);
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            transmissions: VecDeque::new(),
            period,
            capacity,
            next_stamp: 0,
        }
    }

    #[inline]
    pub fn contains(&self, id: &connection::Id) -> bool {
        self.entries.contains_key(id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Quarantines `id`, or refreshes its deadline if already present.
    ///
    /// A refresh keeps the earlier action unless the new action is
    /// `SendClose`, which carries strictly more information for the peer.
    pub fn add(&mut self, id: connection::Id, action: Action, now: Timestamp) {
        self.cleanup(now);

        let stamp = self.next_stamp;
        self.next_stamp += 1;

        if let Some(entry) = self.entries.get_mut(&id) {
            entry.deadline = now + self.period;
            entry.stamp = stamp;
            if action.is_send_close() && !entry.action.is_send_close() {
                entry.action = action;
            }
            self.order.push_back((id, stamp));
            return;
        }

        if self.entries.len() == self.capacity {
            self.evict_oldest();
        }

        self.entries.insert(
            id,
            Entry {
                action,
                deadline: now + self.period,
                stamp,
                packets_since_response: 0,
                response_backoff: 1,
            },
        );
        self.order.push_back((id, stamp));
    }

    /// Handles a straggler datagram for a quarantined ID
    pub fn on_packet(&mut self, id: &connection::Id, datagram: &Datagram) -> Option<EmissionKind> {
        let entry = self.entries.get_mut(id)?;

        entry.packets_since_response += 1;
        if entry.packets_since_response < entry.response_backoff {
            return None;
        }
        entry.packets_since_response = 0;
        entry.response_backoff = (entry.response_backoff * 2).min(MAX_RESPONSE_BACKOFF);

        let (payload, kind) = entry.action.response()?;
        self.transmissions.push_back(Transmission {
            destination: datagram.remote_address,
            payload,
        });
        Some(kind)
    }

    /// Queues a one-shot response that is not tied to an entry: the single
    /// version negotiation reply for an unsupported version (the peer is
    /// expected to retry with a supported version under the same ID), or the
    /// first close frame of a cryptographic reject.
    pub fn queue_response(&mut self, destination: SocketAddr, payload: Bytes) {
        self.transmissions.push_back(Transmission {
            destination,
            payload,
        });
    }

    /// Evicts entries past their deadline
    pub fn cleanup(&mut self, now: Timestamp) {
        while let Some((id, stamp)) = self.order.front().copied() {
            match self.entries.get(&id) {
                Some(entry) if entry.stamp == stamp => {
                    if now.has_elapsed(entry.deadline) {
                        self.entries.remove(&id);
                        self.order.pop_front();
                    } else {
                        break;
                    }
                }
                _ => {
                    // stale slot left behind by a refresh or eviction
                    self.order.pop_front();
                }
            }
        }
    }

    /// Flushes queued responses until the writer blocks
    pub fn on_transmit<Q: tx::Queue>(&mut self, writer: &tx::Shared<Q>) {
        while let Some(transmission) = self.transmissions.pop_front() {
            if writer.push(transmission.clone()).is_err() {
                self.transmissions.push_front(transmission);
                return;
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn queued_transmissions(&self) -> usize {
        self.transmissions.len()
    }

    fn evict_oldest(&mut self) {
        while let Some((id, stamp)) = self.order.pop_front() {
            if let Some(entry) = self.entries.get(&id) {
                if entry.stamp == stamp {
                    self.entries.remove(&id);
                    return;
                }
            }
        }
    }
}
