// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Bounded buffering for datagrams that arrive before their session exists.
//!
//! Two populations share the store: connections still waiting for a CHLO
//! (early out-of-order data), and connections whose CHLO is parked behind
//! the per-tick session-creation budget or an in-flight asynchronous
//! validation. Every bound is enforced by dropping the newest datagram;
//! the store never blocks and never reports errors upward.

use crate::{connection, crypto::chlo::Chlo, inet::Datagram, time::Timestamp, version::Version};
use core::time::Duration;
use hashbrown::HashMap;
use std::collections::VecDeque;

pub const DEFAULT_MAX_CONNECTIONS: usize = 100;
pub const DEFAULT_MAX_CONNECTIONS_WITHOUT_CHLO: usize = DEFAULT_MAX_CONNECTIONS / 2;
pub const DEFAULT_MAX_PACKETS_PER_CONNECTION: usize = 16;
pub const DEFAULT_EXPIRATION: Duration = Duration::from_secs(5);

/// Everything the dispatcher needs to resume a buffered CHLO later
#[derive(Clone, Debug)]
pub struct ChloInfo {
    pub version: Version,
    pub chlo: Chlo,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Buffered,
    /// The datagram was a CHLO and anchored its connection for later
    /// session creation
    BufferedChlo,
    /// The store is at its connection capacity
    DroppedStoreFull,
    /// Too many connections are waiting for a CHLO
    DroppedChloLessLimit,
    /// This connection's queue is at capacity
    DroppedQueueFull,
    /// The connection already has a CHLO buffered
    DroppedDuplicateChlo,
}

impl EnqueueOutcome {
    #[inline]
    pub fn is_dropped(self) -> bool {
        !matches!(self, EnqueueOutcome::Buffered | EnqueueOutcome::BufferedChlo)
    }
}

#[derive(Debug)]
struct Queue {
    datagrams: VecDeque<Datagram>,
    chlo: Option<ChloInfo>,
    first_arrival: Timestamp,
}

pub struct Store {
    connections: HashMap<connection::Id, Queue>,
    /// First-arrival order, for expiration
    arrival_order: VecDeque<connection::Id>,
    /// Order in which connections became CHLO-ready
    chlo_order: VecDeque<connection::Id>,
    chlo_less: usize,
    max_connections: usize,
    max_connections_without_chlo: usize,
    max_packets_per_connection: usize,
    expiration: Duration,
}

impl Store {
    pub fn new(
        max_connections: usize,
        max_connections_without_chlo: usize,
        max_packets_per_connection: usize,
        expiration: Duration,
    ) -> Self {
        Self {
            connections: HashMap::new(),
            arrival_order: VecDeque::new(),
            chlo_order: VecDeque::new(),
            chlo_less: 0,
            max_connections,
            max_connections_without_chlo,
            max_packets_per_connection,
            expiration,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    #[inline]
    pub fn chlo_less_len(&self) -> usize {
        self.chlo_less
    }

    #[inline]
    pub fn contains(&self, id: &connection::Id) -> bool {
        self.connections.contains_key(id)
    }

    #[inline]
    pub fn has_chlo(&self, id: &connection::Id) -> bool {
        self.connections
            .get(id)
            .map_or(false, |queue| queue.chlo.is_some())
    }

    /// The buffered CHLO summary for `id`, if one is anchored
    pub fn chlo_info(&self, id: &connection::Id) -> Option<&ChloInfo> {
        self.connections.get(id)?.chlo.as_ref()
    }

    /// The first datagram that would be drained for `id`
    pub fn front(&self, id: &connection::Id) -> Option<&Datagram> {
        self.connections.get(id)?.datagrams.front()
    }

    pub fn enqueue(
        &mut self,
        id: connection::Id,
        datagram: Datagram,
        chlo: Option<ChloInfo>,
        now: Timestamp,
    ) -> EnqueueOutcome {
        let is_chlo = chlo.is_some();

        if let Some(queue) = self.connections.get_mut(&id) {
            if is_chlo && queue.chlo.is_some() {
                return EnqueueOutcome::DroppedDuplicateChlo;
            }
            if queue.datagrams.len() == self.max_packets_per_connection {
                return EnqueueOutcome::DroppedQueueFull;
            }
            if let Some(info) = chlo {
                // the CHLO anchors the queue; it is always drained first
                queue.datagrams.push_front(datagram);
                queue.chlo = Some(info);
                self.chlo_less -= 1;
                self.chlo_order.push_back(id);
                return EnqueueOutcome::BufferedChlo;
            }
            queue.datagrams.push_back(datagram);
            return EnqueueOutcome::Buffered;
        }

        if self.connections.len() == self.max_connections {
            return EnqueueOutcome::DroppedStoreFull;
        }
        if !is_chlo && self.chlo_less == self.max_connections_without_chlo {
            return EnqueueOutcome::DroppedChloLessLimit;
        }

        let mut datagrams = VecDeque::with_capacity(4);
        datagrams.push_back(datagram);
        self.connections.insert(
            id,
            Queue {
                datagrams,
                chlo: chlo.clone(),
                first_arrival: now,
            },
        );
        self.arrival_order.push_back(id);

        if chlo.is_some() {
            self.chlo_order.push_back(id);
            EnqueueOutcome::BufferedChlo
        } else {
            self.chlo_less += 1;
            EnqueueOutcome::Buffered
        }
    }

    /// Removes and returns everything buffered for `id`, CHLO first
    pub fn drain(&mut self, id: &connection::Id) -> Option<(VecDeque<Datagram>, Option<ChloInfo>)> {
        let queue = self.connections.remove(id)?;
        if queue.chlo.is_none() {
            self.chlo_less -= 1;
        }
        Some((queue.datagrams, queue.chlo))
    }

    /// Pops the next connection whose CHLO is ready for session creation,
    /// in the order the CHLOs arrived
    pub fn next_chlo_ready(&mut self) -> Option<connection::Id> {
        while let Some(id) = self.chlo_order.pop_front() {
            if self.has_chlo(&id) {
                return Some(id);
            }
        }
        None
    }

    /// Removes idle connections; returns their IDs for time-wait hand-off
    pub fn expire(&mut self, now: Timestamp) -> Vec<connection::Id> {
        let mut expired = Vec::new();
        while let Some(id) = self.arrival_order.front() {
            match self.connections.get(id) {
                Some(queue) => {
                    if now.has_elapsed(queue.first_arrival + self.expiration) {
                        let id = *id;
                        if self.connections.remove(&id).map_or(false, |q| q.chlo.is_none()) {
                            self.chlo_less -= 1;
                        }
                        self.arrival_order.pop_front();
                        expired.push(id);
                    } else {
                        break;
                    }
                }
                None => {
                    // drained earlier
                    self.arrival_order.pop_front();
                }
            }
        }
        expired
    }

    /// Discards everything (dispatcher shutdown)
    pub fn clear(&mut self) {
        self.connections.clear();
        self.arrival_order.clear();
        self.chlo_order.clear();
        self.chlo_less = 0;
    }
}
