// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Version negotiation packet construction.
//!
//! The reply form mirrors the form of the triggering packet: IETF triggers
//! get a long-header packet with version zero and swapped connection IDs,
//! legacy triggers get a public-flags packet listing the enabled versions.

use crate::{connection, version::Version};
use bytes::Bytes;
use s2n_codec::{Encoder, EncoderBuffer, EncoderValue};

const MAX_PACKET_SIZE: usize = 128;

/// IETF form: the first byte only needs the long-header bit; the remaining
/// bits are unused and filled with entropy so the packet cannot be used for
/// version fingerprinting.
pub struct IetfVersionNegotiation<'a> {
    pub tag_entropy: u8,
    /// The triggering packet's source connection ID
    pub destination_id: &'a connection::Id,
    /// The triggering packet's destination connection ID
    pub source_id: &'a connection::Id,
    pub supported_versions: &'a [Version],
}

impl EncoderValue for IetfVersionNegotiation<'_> {
    fn encode<E: Encoder>(&self, encoder: &mut E) {
        encoder.encode(&(0x80u8 | (self.tag_entropy & 0x7f)));
        encoder.encode(&0u32);
        encoder.encode(&(self.destination_id.len() as u8));
        encoder.encode(&self.destination_id.as_bytes());
        encoder.encode(&(self.source_id.len() as u8));
        encoder.encode(&self.source_id.as_bytes());
        for version in self.supported_versions {
            encoder.encode(version);
        }
    }
}

/// Legacy form: version flag + 8-byte connection ID flag, the connection ID,
/// then the version list.
pub struct LegacyVersionNegotiation<'a> {
    pub connection_id: &'a connection::Id,
    pub supported_versions: &'a [Version],
}

impl EncoderValue for LegacyVersionNegotiation<'_> {
    fn encode<E: Encoder>(&self, encoder: &mut E) {
        encoder.encode(&0x09u8);
        encoder.encode(&self.connection_id.as_bytes());
        for version in self.supported_versions {
            encoder.encode(version);
        }
    }
}

/// Encodes a version negotiation packet into an owned buffer
pub fn encode<V: EncoderValue>(packet: V) -> Bytes {
    let mut bytes = [0u8; MAX_PACKET_SIZE];
    let mut encoder = EncoderBuffer::new(&mut bytes);
    encoder.encode(&packet);
    let len = encoder.len();
    Bytes::copy_from_slice(&bytes[..len])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::{DRAFT_29, QUIC_V43, QUIC_V46};

    fn id(bytes: &[u8]) -> connection::Id {
        connection::Id::try_from_bytes(bytes).unwrap()
    }

    #[test]
    fn ietf_layout() {
        let packet = encode(IetfVersionNegotiation {
            tag_entropy: 0x55,
            destination_id: &id(&[2; 4]),
            source_id: &id(&[1; 8]),
            supported_versions: &[DRAFT_29],
        });

        assert_eq!(packet[0] & 0x80, 0x80);
        assert_eq!(&packet[1..5], &[0, 0, 0, 0]);
        assert_eq!(packet[5], 4);
        assert_eq!(&packet[6..10], &[2; 4]);
        assert_eq!(packet[10], 8);
        assert_eq!(&packet[11..19], &[1; 8]);
        assert_eq!(&packet[19..23], &DRAFT_29.0.to_be_bytes());
        assert_eq!(packet.len(), 23);
    }

    #[test]
    fn legacy_layout() {
        let packet = encode(LegacyVersionNegotiation {
            connection_id: &id(&[7; 8]),
            supported_versions: &[QUIC_V46, QUIC_V43],
        });

        assert_eq!(packet[0], 0x09);
        assert_eq!(&packet[1..9], &[7; 8]);
        assert_eq!(&packet[9..13], &QUIC_V46.0.to_be_bytes());
        assert_eq!(&packet[13..17], &QUIC_V43.0.to_be_bytes());
        assert_eq!(packet.len(), 17);
    }
}
