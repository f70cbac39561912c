// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Unauthenticated header peek.
//!
//! Parses only the prefix of an inbound datagram that is needed for routing:
//! header form, version, destination connection ID, and the packet number
//! where the form carries it in the clear. No cryptographic keys are
//! consulted and nothing is decrypted.

use crate::{
    connection::{self, id},
    varint::{to_length, VarInt},
    version::Version,
};
use core::fmt;
use s2n_codec::{DecoderBuffer, DecoderError};

pub mod number;
pub mod version_negotiation;

/// Datagrams below this size never justify a version negotiation reply
/// (amplification guard).
pub const MINIMUM_INITIAL_SIZE: usize = 1200;

/// IETF long header form + fixed bit
const IETF_LONG_TAG: u8 = 0x80;
const IETF_FIXED_BIT: u8 = 0x40;
const IETF_LONG_TYPE_MASK: u8 = 0x30;
const IETF_PN_LEN_MASK: u8 = 0x03;

/// Legacy public-flags bits
const LEGACY_VERSION_FLAG: u8 = 0x01;
const LEGACY_RESET_FLAG: u8 = 0x02;
const LEGACY_CONNECTION_ID_FLAG: u8 = 0x08;
const LEGACY_PN_LEN_MASK: u8 = 0x30;
const LEGACY_PN_LEN_SHIFT: u8 = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Form {
    IetfLong,
    IetfShort,
    LegacyLong,
    LegacyShort,
}

impl Form {
    #[inline]
    pub fn is_ietf(self) -> bool {
        matches!(self, Form::IetfLong | Form::IetfShort)
    }

    #[inline]
    pub fn is_long(self) -> bool {
        matches!(self, Form::IetfLong | Form::LegacyLong)
    }
}

/// The routed view of a datagram prefix.
///
/// Fields a form does not carry are `None`; consumers must not assume more
/// than the form guarantees.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Peek {
    pub form: Form,
    /// Present on long forms only
    pub version: Option<Version>,
    /// The only ID used for routing
    pub destination_id: connection::Id,
    /// Present on IETF long forms; used to address version negotiation
    /// replies
    pub source_id: Option<connection::Id>,
    /// Cleartext packet number, where the form exposes one ahead of any
    /// protected bytes
    pub packet_number: Option<u64>,
    /// True for a long-form packet that may carry a handshake initiation
    pub is_initial: bool,
    /// Legacy public-reset flag
    pub public_reset: bool,
    /// Offset of the frame payload within the datagram, when the prefix
    /// parse reached it
    pub payload_offset: Option<usize>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParseError {
    /// The prefix ended before the fields the form requires
    Truncated,
    /// The first byte does not describe a form this server routes
    UnknownForm,
    /// A declared connection ID length exceeds the protocol maximum
    InvalidConnectionIdLength,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Truncated => write!(f, "truncated header prefix"),
            ParseError::UnknownForm => write!(f, "unknown header form"),
            ParseError::InvalidConnectionIdLength => {
                write!(f, "declared connection id length exceeds the maximum")
            }
        }
    }
}

impl From<DecoderError> for ParseError {
    fn from(_: DecoderError) -> Self {
        ParseError::Truncated
    }
}

impl Peek {
    /// Parses the routing prefix of `payload`.
    ///
    /// `short_id_len` is the server-accepted connection ID length assumed for
    /// IETF short headers, which do not self-describe their ID length.
    pub fn decode(payload: &[u8], short_id_len: usize) -> Result<Self, ParseError> {
        let buffer = DecoderBuffer::new(payload);
        let (first, buffer) = buffer.decode::<u8>()?;

        if first & IETF_LONG_TAG != 0 {
            if first & IETF_FIXED_BIT == 0 {
                return Err(ParseError::UnknownForm);
            }
            return Self::decode_ietf_long(first, buffer, payload.len());
        }

        if first & IETF_FIXED_BIT != 0 {
            return Self::decode_ietf_short(first, buffer, payload.len(), short_id_len);
        }

        Self::decode_legacy(first, buffer, payload.len())
    }

    fn decode_ietf_long(
        first: u8,
        buffer: DecoderBuffer<'_>,
        total_len: usize,
    ) -> Result<Self, ParseError> {
        let (version, buffer) = buffer.decode::<Version>()?;
        if version.0 == 0 {
            // version negotiation is a server-to-client packet
            return Err(ParseError::UnknownForm);
        }

        let (destination_id, buffer) = decode_prefixed_id(buffer)?;
        let (source_id, buffer) = decode_prefixed_id(buffer)?;

        let is_initial = first & IETF_LONG_TYPE_MASK == 0;
        let mut packet_number = None;
        let mut payload_offset = None;

        if is_initial {
            let (token_len, buffer) = buffer.decode::<VarInt>()?;
            let buffer = buffer.skip(to_length(token_len)?)?;
            let (_payload_len, buffer) = buffer.decode::<VarInt>()?;

            let pn_len = (first & IETF_PN_LEN_MASK) as usize + 1;
            let (pn, buffer) = number::decode(buffer, pn_len)?;
            packet_number = Some(pn);
            payload_offset = Some(total_len - buffer.len());
        }

        Ok(Self {
            form: Form::IetfLong,
            version: Some(version),
            destination_id,
            source_id: Some(source_id),
            packet_number,
            is_initial,
            public_reset: false,
            payload_offset,
        })
    }

    fn decode_ietf_short(
        first: u8,
        buffer: DecoderBuffer<'_>,
        total_len: usize,
        short_id_len: usize,
    ) -> Result<Self, ParseError> {
        let (id_bytes, buffer) = buffer.decode_slice(short_id_len)?;
        let destination_id = connection::Id::try_from_bytes(id_bytes.into_less_safe_slice())
            .ok_or(ParseError::InvalidConnectionIdLength)?;

        let pn_len = (first & IETF_PN_LEN_MASK) as usize + 1;
        let (packet_number, buffer) = number::decode(buffer, pn_len)?;

        Ok(Self {
            form: Form::IetfShort,
            version: None,
            destination_id,
            source_id: None,
            packet_number: Some(packet_number),
            is_initial: false,
            public_reset: false,
            payload_offset: Some(total_len - buffer.len()),
        })
    }

    fn decode_legacy(
        first: u8,
        buffer: DecoderBuffer<'_>,
        total_len: usize,
    ) -> Result<Self, ParseError> {
        let (destination_id, buffer) = if first & LEGACY_CONNECTION_ID_FLAG != 0 {
            let (id_bytes, buffer) = buffer.decode_slice(id::SERVER_ACCEPTED_LEN)?;
            let id = connection::Id::try_from_bytes(id_bytes.into_less_safe_slice())
                .ok_or(ParseError::InvalidConnectionIdLength)?;
            (id, buffer)
        } else {
            (connection::Id::EMPTY, buffer)
        };

        let has_version = first & LEGACY_VERSION_FLAG != 0;
        let public_reset = first & LEGACY_RESET_FLAG != 0;

        let (version, buffer) = if has_version {
            let (version, buffer) = buffer.decode::<Version>()?;
            (Some(version), buffer)
        } else {
            (None, buffer)
        };

        if public_reset {
            // resets carry no packet number; the remainder is the reset body
            return Ok(Self {
                form: if has_version {
                    Form::LegacyLong
                } else {
                    Form::LegacyShort
                },
                version,
                destination_id,
                source_id: None,
                packet_number: None,
                is_initial: false,
                public_reset: true,
                payload_offset: Some(total_len - buffer.len()),
            });
        }

        let pn_len = legacy_packet_number_len(first);
        let (packet_number, buffer) = number::decode(buffer, pn_len)?;

        Ok(Self {
            form: if has_version {
                Form::LegacyLong
            } else {
                Form::LegacyShort
            },
            version,
            destination_id,
            source_id: None,
            packet_number: Some(packet_number),
            is_initial: has_version,
            public_reset: false,
            payload_offset: Some(total_len - buffer.len()),
        })
    }
}

#[inline]
fn legacy_packet_number_len(first: u8) -> usize {
    match (first & LEGACY_PN_LEN_MASK) >> LEGACY_PN_LEN_SHIFT {
        0 => 1,
        1 => 2,
        2 => 4,
        _ => 6,
    }
}

fn decode_prefixed_id(
    buffer: DecoderBuffer<'_>,
) -> Result<(connection::Id, DecoderBuffer<'_>), ParseError> {
    let (len, buffer) = buffer.decode::<u8>()?;
    if len as usize > connection::id::MAX_LEN {
        return Err(ParseError::InvalidConnectionIdLength);
    }
    let (bytes, buffer) = buffer.decode_slice(len as usize)?;
    let id = connection::Id::try_from_bytes(bytes.into_less_safe_slice())
        .ok_or(ParseError::InvalidConnectionIdLength)?;
    Ok((id, buffer))
}

#[cfg(any(test, feature = "testing"))]
pub mod testing {
    //! Wire-format builders for exercising the dispatcher without a client
    //! implementation

    use super::*;
    use bytes::{BufMut, Bytes, BytesMut};

    fn legacy_packet_number_bits(len: usize) -> u8 {
        let code: u8 = match len {
            1 => 0,
            2 => 1,
            4 => 2,
            _ => 3,
        };
        code << LEGACY_PN_LEN_SHIFT
    }

    pub fn ietf_initial(
        destination_id: &connection::Id,
        source_id: &connection::Id,
        version: Version,
        packet_number: u64,
        payload: &[u8],
    ) -> Bytes {
        let mut bytes = BytesMut::new();
        bytes.put_u8(IETF_LONG_TAG | IETF_FIXED_BIT | 0x03); // initial, 4-byte pn
        bytes.put_u32(version.0);
        bytes.put_u8(destination_id.len() as u8);
        bytes.put_slice(destination_id.as_bytes());
        bytes.put_u8(source_id.len() as u8);
        bytes.put_slice(source_id.as_bytes());
        bytes.put_u8(0); // empty token
        put_varint(&mut bytes, (payload.len() + 4) as u64);
        bytes.put_u32(packet_number as u32);
        bytes.put_slice(payload);
        bytes.freeze()
    }

    pub fn ietf_short(destination_id: &connection::Id, packet_number: u64, payload: &[u8]) -> Bytes {
        let mut bytes = BytesMut::new();
        bytes.put_u8(IETF_FIXED_BIT | 0x03);
        bytes.put_slice(destination_id.as_bytes());
        bytes.put_u32(packet_number as u32);
        bytes.put_slice(payload);
        bytes.freeze()
    }

    pub fn legacy_long(
        destination_id: &connection::Id,
        version: Version,
        packet_number: u64,
        packet_number_len: usize,
        payload: &[u8],
    ) -> Bytes {
        let mut bytes = BytesMut::new();
        let mut flags = LEGACY_VERSION_FLAG | legacy_packet_number_bits(packet_number_len);
        if !destination_id.is_empty() {
            flags |= LEGACY_CONNECTION_ID_FLAG;
        }
        bytes.put_u8(flags);
        bytes.put_slice(destination_id.as_bytes());
        bytes.put_u32(version.0);
        let mut pn = [0u8; 8];
        number::encode(packet_number, packet_number_len, &mut pn);
        bytes.put_slice(&pn[..packet_number_len]);
        bytes.put_slice(payload);
        bytes.freeze()
    }

    pub fn legacy_short(destination_id: &connection::Id, packet_number: u64, payload: &[u8]) -> Bytes {
        let mut bytes = BytesMut::new();
        let mut flags = legacy_packet_number_bits(4);
        if !destination_id.is_empty() {
            flags |= LEGACY_CONNECTION_ID_FLAG;
        }
        bytes.put_u8(flags);
        bytes.put_slice(destination_id.as_bytes());
        let mut pn = [0u8; 8];
        number::encode(packet_number, 4, &mut pn);
        bytes.put_slice(&pn[..4]);
        bytes.put_slice(payload);
        bytes.freeze()
    }

    pub fn legacy_public_reset(destination_id: &connection::Id) -> Bytes {
        let mut bytes = BytesMut::new();
        bytes.put_u8(LEGACY_RESET_FLAG | LEGACY_CONNECTION_ID_FLAG);
        bytes.put_slice(destination_id.as_bytes());
        bytes.freeze()
    }

    fn put_varint(bytes: &mut BytesMut, value: u64) {
        match value {
            0..=0x3f => bytes.put_u8(value as u8),
            0x40..=0x3fff => bytes.put_u16(value as u16 | 0x4000),
            0x4000..=0x3fff_ffff => bytes.put_u32(value as u32 | 0x8000_0000),
            _ => bytes.put_u64(value | 0xc000_0000_0000_0000),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::{DRAFT_29, QUIC_V43};

    fn id(bytes: &[u8]) -> connection::Id {
        connection::Id::try_from_bytes(bytes).unwrap()
    }

    #[test]
    fn ietf_initial_fields() {
        let packet = testing::ietf_initial(&id(&[1; 8]), &id(&[2; 5]), DRAFT_29, 7, b"hello");
        let peek = Peek::decode(&packet, id::SERVER_ACCEPTED_LEN).unwrap();

        assert_eq!(peek.form, Form::IetfLong);
        assert_eq!(peek.version, Some(DRAFT_29));
        assert_eq!(peek.destination_id, id(&[1; 8]));
        assert_eq!(peek.source_id, Some(id(&[2; 5])));
        assert_eq!(peek.packet_number, Some(7));
        assert!(peek.is_initial);
        assert_eq!(&packet[peek.payload_offset.unwrap()..], b"hello");
    }

    #[test]
    fn legacy_long_fields() {
        let packet = testing::legacy_long(&id(&[3; 8]), QUIC_V43, 1, 4, b"payload");
        let peek = Peek::decode(&packet, id::SERVER_ACCEPTED_LEN).unwrap();

        assert_eq!(peek.form, Form::LegacyLong);
        assert_eq!(peek.version, Some(QUIC_V43));
        assert_eq!(peek.destination_id, id(&[3; 8]));
        assert_eq!(peek.packet_number, Some(1));
        assert!(peek.is_initial);
        assert_eq!(&packet[peek.payload_offset.unwrap()..], b"payload");
    }

    #[test]
    fn legacy_six_byte_packet_number() {
        let packet = testing::legacy_long(&id(&[3; 8]), QUIC_V43, 0x0102_0304_0506, 6, b"");
        let peek = Peek::decode(&packet, id::SERVER_ACCEPTED_LEN).unwrap();
        assert_eq!(peek.packet_number, Some(0x0102_0304_0506));
    }

    #[test]
    fn short_header_uses_accepted_length() {
        let packet = testing::ietf_short(&id(&[4; 8]), 42, b"x");
        let peek = Peek::decode(&packet, id::SERVER_ACCEPTED_LEN).unwrap();

        assert_eq!(peek.form, Form::IetfShort);
        assert_eq!(peek.destination_id, id(&[4; 8]));
        assert_eq!(peek.packet_number, Some(42));
        assert_eq!(peek.version, None);
    }

    #[test]
    fn packet_number_zero_is_routable() {
        let packet = testing::legacy_short(&id(&[4; 8]), 0, b"");
        let peek = Peek::decode(&packet, id::SERVER_ACCEPTED_LEN).unwrap();
        assert_eq!(peek.packet_number, Some(0));
    }

    #[test]
    fn public_reset_flag() {
        let packet = testing::legacy_public_reset(&id(&[5; 8]));
        let peek = Peek::decode(&packet, id::SERVER_ACCEPTED_LEN).unwrap();
        assert!(peek.public_reset);
        assert_eq!(peek.destination_id, id(&[5; 8]));
    }

    #[test]
    fn truncated_prefix() {
        let packet = testing::ietf_initial(&id(&[1; 8]), &id(&[2; 8]), DRAFT_29, 1, b"");
        for len in 0..packet.len().min(20) {
            assert_eq!(
                Peek::decode(&packet[..len], id::SERVER_ACCEPTED_LEN),
                Err(ParseError::Truncated),
                "prefix of {len} bytes should be truncated"
            );
        }
    }

    #[test]
    fn long_header_without_fixed_bit() {
        let packet = [IETF_LONG_TAG, 0, 0, 0, 1];
        assert_eq!(
            Peek::decode(&packet, id::SERVER_ACCEPTED_LEN),
            Err(ParseError::UnknownForm)
        );
    }

    #[test]
    fn oversized_declared_id() {
        let mut packet = vec![IETF_LONG_TAG | IETF_FIXED_BIT];
        packet.extend_from_slice(&DRAFT_29.0.to_be_bytes());
        packet.push(21);
        packet.extend_from_slice(&[0; 32]);
        assert_eq!(
            Peek::decode(&packet, id::SERVER_ACCEPTED_LEN),
            Err(ParseError::InvalidConnectionIdLength)
        );
    }

    #[test]
    fn decode_never_panics() {
        bolero::check!().for_each(|bytes| {
            let _ = Peek::decode(bytes, id::SERVER_ACCEPTED_LEN);
        });
    }
}
