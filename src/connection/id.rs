// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Defines the QUIC connection ID

use crate::{random, version::Version};
use core::convert::TryFrom;
use s2n_codec::{decoder_value, Encoder, EncoderValue};

/// The maximum size of a connection ID.
pub const MAX_LEN: usize = 20;

/// The connection ID length this server hands out and expects on
/// short-header packets.
pub const SERVER_ACCEPTED_LEN: usize = 8;

/// Uniquely identifies a QUIC connection between 2 peers
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id {
    bytes: [u8; MAX_LEN],
    len: u8,
}

impl core::fmt::Debug for Id {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Id({:?})", self.as_bytes())
    }
}

impl Id {
    pub const EMPTY: Self = Self {
        bytes: [0; MAX_LEN],
        len: 0,
    };

    /// Copies `bytes` into an ID, refusing slices longer than [`MAX_LEN`].
    ///
    /// Any length up to the maximum is representable here, including zero;
    /// whether a given length is *routable* is [`Policy`]'s decision, not
    /// this type's.
    #[inline]
    pub fn try_from_bytes(bytes: &[u8]) -> Option<Id> {
        Self::try_from(bytes).ok()
    }

    /// The ID exactly as it appears on the wire
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        self.as_ref()
    }

    /// Number of wire bytes in the ID
    #[inline]
    pub const fn len(&self) -> usize {
        self.len as usize
    }

    /// True when the peer sent no connection ID at all
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl TryFrom<&[u8]> for Id {
    type Error = Error;

    #[inline]
    fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
        let len = slice.len();
        if len > MAX_LEN {
            return Err(Error::InvalidLength);
        }
        let mut bytes = [0; MAX_LEN];
        bytes[..len].copy_from_slice(slice);
        Ok(Self {
            bytes,
            len: len as u8,
        })
    }
}

impl AsRef<[u8]> for Id {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        &self.bytes[0..self.len as usize]
    }
}

decoder_value!(
    impl<'a> Id {
        fn decode(buffer: Buffer) -> Result<Self> {
            let len = buffer.len();
            let (value, buffer) = buffer.decode_slice(len)?;
            let value: &[u8] = value.into_less_safe_slice();
            let id = Id::try_from(value)
                .map_err(|_| s2n_codec::DecoderError::InvariantViolation("invalid connection id"))?;
            Ok((id, buffer))
        }
    }
);

impl EncoderValue for Id {
    #[inline]
    fn encode<E: Encoder>(&self, encoder: &mut E) {
        self.as_ref().encode(encoder)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    InvalidLength,
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            Error::InvalidLength => write!(f, "invalid connection id length"),
        }
    }
}

/// Generates server-chosen connection IDs.
///
/// Each call must produce a unique ID; the dispatcher does not detect
/// collisions between replacement IDs and live sessions.
pub trait Generator: 'static {
    /// Generates a connection ID of [`SERVER_ACCEPTED_LEN`] bytes
    fn generate(&mut self, random: &mut dyn FillRandom) -> Id;
}

/// Object-safe view of [`random::Generator`] handed to ID generators
pub trait FillRandom {
    fn fill(&mut self, dest: &mut [u8]);
}

impl<R: random::Generator> FillRandom for R {
    #[inline]
    fn fill(&mut self, dest: &mut [u8]) {
        self.public_random_fill(dest)
    }
}

/// The default generator: [`SERVER_ACCEPTED_LEN`] random bytes
#[derive(Debug, Default)]
pub struct RandomGenerator;

impl Generator for RandomGenerator {
    fn generate(&mut self, random: &mut dyn FillRandom) -> Id {
        let mut bytes = [0u8; SERVER_ACCEPTED_LEN];
        random.fill(&mut bytes);
        Id::try_from(&bytes[..]).expect("generated length is always valid")
    }
}

/// Outcome of applying the server's connection ID policy to a client-chosen
/// ID
#[derive(Debug, PartialEq, Eq)]
pub enum Decision {
    /// Route under the ID the client sent
    Accept(Id),
    /// Route under a freshly generated server ID; the mapping from the
    /// original ID is intentionally not remembered
    Replace(Id),
    /// Drop the datagram without creating any state
    Reject,
}

/// The server's acceptance policy for client-chosen connection IDs
#[derive(Debug, Clone)]
pub struct Policy {
    /// Inclusive length range accepted for versions that permit
    /// variable-length IDs
    pub min_len: usize,
    pub max_len: usize,
    /// Whether out-of-range IDs are rewritten rather than rejected
    pub allow_short_initial_ids: bool,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            min_len: SERVER_ACCEPTED_LEN,
            max_len: MAX_LEN,
            allow_short_initial_ids: false,
        }
    }
}

impl Policy {
    pub fn decide<G: Generator>(
        &self,
        id: &Id,
        version: Version,
        generator: &mut G,
        random: &mut dyn FillRandom,
    ) -> Decision {
        if version.allows_variable_length_connection_ids() {
            if (self.min_len..=self.max_len).contains(&id.len()) {
                return Decision::Accept(*id);
            }
            if self.allow_short_initial_ids {
                return Decision::Replace(generator.generate(random));
            }
            return Decision::Reject;
        }

        if id.len() == SERVER_ACCEPTED_LEN {
            Decision::Accept(*id)
        } else {
            Decision::Reject
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::{DRAFT_29, QUIC_V43};

    fn id(bytes: &[u8]) -> Id {
        Id::try_from_bytes(bytes).unwrap()
    }

    #[test]
    fn wire_bytes_survive_the_inline_copy() {
        let id = Id::try_from_bytes(&[0xab; 11]).unwrap();
        assert_eq!(id.as_bytes(), &[0xab; 11]);
        assert_eq!(id.len(), 11);
        assert!(!id.is_empty());

        // two IDs differing only past their own length must not collide
        let shorter = Id::try_from_bytes(&[0xab; 10]).unwrap();
        assert_ne!(id, shorter);
    }

    #[test]
    fn length_bounds() {
        // zero-length is representable; the policy decides whether to
        // route, rewrite, or reject it
        assert!(Id::try_from_bytes(&[]).is_some());
        assert!(Id::EMPTY.is_empty());

        assert!(Id::try_from_bytes(&[7; MAX_LEN]).is_some());
        assert!(Id::try_from_bytes(&[7; MAX_LEN + 1]).is_none());
        assert!(Id::try_from_bytes(&[7; 64]).is_none());
    }

    #[test]
    fn accept_in_range() {
        let policy = Policy::default();
        let mut generator = RandomGenerator;
        let mut random = crate::random::testing::Generator::default();

        let decision = policy.decide(&id(&[1; 8]), DRAFT_29, &mut generator, &mut random);
        assert_eq!(decision, Decision::Accept(id(&[1; 8])));
    }

    #[test]
    fn replace_when_short_ids_allowed() {
        let policy = Policy {
            allow_short_initial_ids: true,
            ..Default::default()
        };
        let mut generator = RandomGenerator;
        let mut random = crate::random::testing::Generator::default();

        match policy.decide(&id(&[1; 2]), DRAFT_29, &mut generator, &mut random) {
            Decision::Replace(replacement) => {
                assert_eq!(replacement.len(), SERVER_ACCEPTED_LEN);
                assert_ne!(replacement, id(&[1; 2]));
            }
            other => panic!("expected replacement, got {other:?}"),
        }
    }

    #[test]
    fn zero_length_follows_the_short_id_toggle() {
        let mut generator = RandomGenerator;
        let mut random = crate::random::testing::Generator::default();

        let policy = Policy {
            allow_short_initial_ids: true,
            ..Default::default()
        };
        match policy.decide(&Id::EMPTY, DRAFT_29, &mut generator, &mut random) {
            Decision::Replace(replacement) => {
                assert_eq!(replacement.len(), SERVER_ACCEPTED_LEN)
            }
            other => panic!("expected replacement, got {other:?}"),
        }

        let policy = Policy::default();
        let decision = policy.decide(&Id::EMPTY, DRAFT_29, &mut generator, &mut random);
        assert_eq!(decision, Decision::Reject);
    }

    #[test]
    fn reject_when_short_ids_disallowed() {
        let policy = Policy::default();
        let mut generator = RandomGenerator;
        let mut random = crate::random::testing::Generator::default();

        let decision = policy.decide(&id(&[1; 2]), DRAFT_29, &mut generator, &mut random);
        assert_eq!(decision, Decision::Reject);
    }

    #[test]
    fn fixed_length_versions_require_exact_length() {
        let policy = Policy {
            allow_short_initial_ids: true,
            ..Default::default()
        };
        let mut generator = RandomGenerator;
        let mut random = crate::random::testing::Generator::default();

        let decision = policy.decide(&id(&[1; 8]), QUIC_V43, &mut generator, &mut random);
        assert_eq!(decision, Decision::Accept(id(&[1; 8])));

        let decision = policy.decide(&id(&[1; 9]), QUIC_V43, &mut generator, &mut random);
        assert_eq!(decision, Decision::Reject);
    }
}
