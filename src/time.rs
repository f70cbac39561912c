// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Monotonic time used by the dispatcher for buffer expiration and the
//! time-wait period.

use core::{
    fmt,
    ops::{Add, AddAssign, Sub},
    time::Duration,
};

/// A point in time, measured as the duration since the clock's epoch.
///
/// Timestamps from different clocks must not be compared.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(Duration);

impl Timestamp {
    /// Creates a timestamp at the given offset from the clock epoch.
    #[inline]
    pub const fn from_duration(duration: Duration) -> Self {
        Self(duration)
    }

    /// Returns the duration since the clock epoch.
    #[inline]
    pub const fn as_duration(self) -> Duration {
        self.0
    }

    /// Returns the amount of time elapsed from `earlier` to `self`,
    /// or `None` if `earlier` is later than `self`.
    #[inline]
    pub fn checked_duration_since(self, earlier: Self) -> Option<Duration> {
        self.0.checked_sub(earlier.0)
    }

    /// Returns the amount of time elapsed from `earlier` to `self`,
    /// saturating to zero.
    #[inline]
    pub fn saturating_duration_since(self, earlier: Self) -> Duration {
        self.0.saturating_sub(earlier.0)
    }

    /// True if `deadline` is in the past at time `self`.
    #[inline]
    pub fn has_elapsed(self, deadline: Self) -> bool {
        self >= deadline
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({:?})", self.0)
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    #[inline]
    fn add(self, rhs: Duration) -> Self::Output {
        Timestamp(self.0 + rhs)
    }
}

impl AddAssign<Duration> for Timestamp {
    #[inline]
    fn add_assign(&mut self, rhs: Duration) {
        self.0 += rhs;
    }
}

impl Sub<Duration> for Timestamp {
    type Output = Timestamp;

    #[inline]
    fn sub(self, rhs: Duration) -> Self::Output {
        Timestamp(self.0 - rhs)
    }
}

impl Sub<Timestamp> for Timestamp {
    type Output = Duration;

    #[inline]
    fn sub(self, rhs: Timestamp) -> Self::Output {
        self.0 - rhs.0
    }
}

/// A `Clock` is a source of [`Timestamp`]s.
pub trait Clock {
    /// Returns the current [`Timestamp`]
    fn get_time(&self) -> Timestamp;
}

impl<C: Clock> Clock for std::rc::Rc<C> {
    fn get_time(&self) -> Timestamp {
        (**self).get_time()
    }
}

/// A clock which always returns a timestamp of 1us past the epoch
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopClock;

impl Clock for NoopClock {
    fn get_time(&self) -> Timestamp {
        Timestamp::from_duration(Duration::from_micros(1))
    }
}

/// A clock backed by [`std::time::Instant`]
#[derive(Clone, Copy, Debug)]
pub struct StdClock {
    epoch: std::time::Instant,
}

impl Default for StdClock {
    fn default() -> Self {
        Self {
            epoch: std::time::Instant::now(),
        }
    }
}

impl Clock for StdClock {
    fn get_time(&self) -> Timestamp {
        Timestamp::from_duration(self.epoch.elapsed())
    }
}

#[cfg(any(test, feature = "testing"))]
pub mod testing {
    use super::*;
    use core::cell::Cell;

    /// A manually advanced clock
    #[derive(Debug)]
    pub struct Clock {
        now: Cell<Timestamp>,
    }

    impl Default for Clock {
        fn default() -> Self {
            Self {
                now: Cell::new(Timestamp::from_duration(Duration::from_micros(1))),
            }
        }
    }

    impl Clock {
        pub fn inc_by(&self, duration: Duration) {
            self.now.set(self.now.get() + duration);
        }

        pub fn set(&self, timestamp: Timestamp) {
            self.now.set(timestamp);
        }
    }

    impl super::Clock for Clock {
        fn get_time(&self) -> Timestamp {
            self.now.get()
        }
    }

    impl super::Clock for &Clock {
        fn get_time(&self) -> Timestamp {
            self.now.get()
        }
    }
}
