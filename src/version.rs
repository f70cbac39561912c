// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! QUIC version identifiers and the set of versions this server will accept.

use core::fmt;
use s2n_codec::{decoder_value, Encoder, EncoderValue};

/// A wire version identifier
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version(pub u32);

/// Legacy versions carry the public-flags header form and a tag-value
/// handshake message on a dedicated crypto stream.
pub const QUIC_V43: Version = Version(0x5130_3433); // "Q043"
pub const QUIC_V44: Version = Version(0x5130_3434); // "Q044"
pub const QUIC_V46: Version = Version(0x5130_3436); // "Q046"

/// IETF versions carry the long/short header forms and a TLS ClientHello in
/// CRYPTO frames.
pub const DRAFT_29: Version = Version(0xff00_001d);

pub const SUPPORTED_VERSIONS: &[Version] = &[DRAFT_29, QUIC_V46, QUIC_V44, QUIC_V43];

impl Version {
    /// True when the version negotiates its handshake over TLS CRYPTO frames
    #[inline]
    pub fn uses_crypto_frames(self) -> bool {
        self.0 & 0xff00_0000 == 0xff00_0000
    }

    /// True when the version permits client-chosen variable-length
    /// connection IDs
    #[inline]
    pub fn allows_variable_length_connection_ids(self) -> bool {
        self.uses_crypto_frames() || self >= QUIC_V46
    }
}

impl fmt::Debug for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Version({:#010x})", self.0)
    }
}

decoder_value!(
    impl<'a> Version {
        fn decode(buffer: Buffer) -> Result<Self> {
            let (value, buffer) = buffer.decode::<u32>()?;
            Ok((Version(value), buffer))
        }
    }
);

impl EncoderValue for Version {
    #[inline]
    fn encode<E: Encoder>(&self, encoder: &mut E) {
        encoder.encode(&self.0);
    }
}

/// The currently enabled version set.
///
/// The set is reloadable at runtime; the dispatcher reads it once per
/// datagram so a mid-dispatch change cannot produce a torn decision.
#[derive(Clone, Debug)]
pub struct SupportedVersions {
    enabled: Vec<Version>,
}

impl Default for SupportedVersions {
    fn default() -> Self {
        Self {
            enabled: SUPPORTED_VERSIONS.to_vec(),
        }
    }
}

impl SupportedVersions {
    pub fn new(enabled: Vec<Version>) -> Self {
        debug_assert!(!enabled.is_empty());
        Self { enabled }
    }

    #[inline]
    pub fn is_supported(&self, version: Version) -> bool {
        self.enabled.contains(&version)
    }

    #[inline]
    pub fn enabled(&self) -> &[Version] {
        &self.enabled
    }

    /// Replaces the enabled set. Live sessions are unaffected; only new
    /// connection attempts observe the change.
    pub fn set_enabled(&mut self, enabled: Vec<Version>) {
        debug_assert!(!enabled.is_empty());
        self.enabled = enabled;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_classification() {
        assert!(DRAFT_29.uses_crypto_frames());
        assert!(!QUIC_V43.uses_crypto_frames());
        assert!(!QUIC_V46.uses_crypto_frames());
    }

    #[test]
    fn variable_length_ids() {
        assert!(DRAFT_29.allows_variable_length_connection_ids());
        assert!(QUIC_V46.allows_variable_length_connection_ids());
        assert!(!QUIC_V43.allows_variable_length_connection_ids());
    }

    #[test]
    fn reloadable_set() {
        let mut versions = SupportedVersions::default();
        assert!(versions.is_supported(QUIC_V43));

        versions.set_enabled(vec![DRAFT_29]);
        assert!(!versions.is_supported(QUIC_V43));
        assert!(versions.is_supported(DRAFT_29));
    }
}
