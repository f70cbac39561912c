// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Resource bounds and feature toggles for the dispatcher

use crate::dispatch::{buffer, time_wait};
use core::{fmt, time::Duration};

pub const DEFAULT_NEW_SESSIONS_PER_TICK: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ValidationError(&'static str);

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid limit: {}", self.0)
    }
}

#[derive(Clone, Debug)]
pub struct Limits {
    pub(crate) max_buffered_connections: usize,
    pub(crate) max_buffered_connections_without_chlo: usize,
    pub(crate) max_buffered_packets_per_connection: usize,
    pub(crate) buffer_expiration: Duration,
    pub(crate) time_wait_period: Duration,
    pub(crate) time_wait_capacity: usize,
    pub(crate) new_sessions_per_tick: usize,
    pub(crate) validate_chlo_size: bool,
    pub(crate) random_initial_packet_numbers: bool,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_buffered_connections: buffer::DEFAULT_MAX_CONNECTIONS,
            max_buffered_connections_without_chlo: buffer::DEFAULT_MAX_CONNECTIONS_WITHOUT_CHLO,
            max_buffered_packets_per_connection: buffer::DEFAULT_MAX_PACKETS_PER_CONNECTION,
            buffer_expiration: buffer::DEFAULT_EXPIRATION,
            time_wait_period: time_wait::DEFAULT_PERIOD,
            time_wait_capacity: time_wait::DEFAULT_CAPACITY,
            new_sessions_per_tick: DEFAULT_NEW_SESSIONS_PER_TICK,
            validate_chlo_size: true,
            random_initial_packet_numbers: false,
        }
    }
}

impl Limits {
    pub fn with_max_buffered_connections(mut self, value: usize) -> Result<Self, ValidationError> {
        if value == 0 {
            return Err(ValidationError("buffered connections must be nonzero"));
        }
        self.max_buffered_connections = value;
        self.max_buffered_connections_without_chlo =
            self.max_buffered_connections_without_chlo.min(value);
        Ok(self)
    }

    pub fn with_max_buffered_connections_without_chlo(
        mut self,
        value: usize,
    ) -> Result<Self, ValidationError> {
        if value > self.max_buffered_connections {
            return Err(ValidationError(
                "chlo-less connection bound exceeds the store bound",
            ));
        }
        self.max_buffered_connections_without_chlo = value;
        Ok(self)
    }

    pub fn with_max_buffered_packets_per_connection(
        mut self,
        value: usize,
    ) -> Result<Self, ValidationError> {
        if value == 0 {
            return Err(ValidationError("per-connection packet bound must be nonzero"));
        }
        self.max_buffered_packets_per_connection = value;
        Ok(self)
    }

    pub fn with_buffer_expiration(mut self, value: Duration) -> Self {
        self.buffer_expiration = value;
        self
    }

    pub fn with_time_wait_period(mut self, value: Duration) -> Self {
        self.time_wait_period = value;
        self
    }

    pub fn with_time_wait_capacity(mut self, value: usize) -> Result<Self, ValidationError> {
        if value == 0 {
            return Err(ValidationError("time-wait capacity must be nonzero"));
        }
        self.time_wait_capacity = value;
        Ok(self)
    }

    pub fn with_new_sessions_per_tick(mut self, value: usize) -> Self {
        self.new_sessions_per_tick = value;
        self
    }

    /// Disabling CHLO size validation lets undersized handshake datagrams
    /// create sessions and draw version negotiation replies
    pub fn with_validate_chlo_size(mut self, value: bool) -> Self {
        self.validate_chlo_size = value;
        self
    }

    /// When clients randomize initial packet numbers, the reasonable-range
    /// check is widened by the randomization range
    pub fn with_random_initial_packet_numbers(mut self, value: bool) -> Self {
        self.random_initial_packet_numbers = value;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_consistent() {
        let limits = Limits::default();
        assert!(limits.max_buffered_connections_without_chlo <= limits.max_buffered_connections);
        assert!(limits.validate_chlo_size);
    }

    #[test]
    fn chlo_less_bound_cannot_exceed_store_bound() {
        let limits = Limits::default();
        assert!(limits.with_max_buffered_connections_without_chlo(101).is_err());
    }

    #[test]
    fn shrinking_store_clamps_chlo_less_bound() {
        let limits = Limits::default().with_max_buffered_connections(10).unwrap();
        assert_eq!(limits.max_buffered_connections_without_chlo, 10);
    }
}
