// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Legacy tag-value handshake messages.
//!
//! Layout: message tag `u32`, entry count `u16`, two zero bytes, then per
//! entry a (`u32` tag, `u32` cumulative end offset) pair, then the
//! concatenated values. Multi-byte fields are little-endian on the wire.

use s2n_codec::{DecoderBuffer, DecoderError};

pub const CHLO_TAG: u32 = u32::from_le_bytes(*b"CHLO");
pub const ALPN_TAG: u32 = u32::from_le_bytes(*b"ALPN");

/// Entries are bounded to keep a hostile count field from driving a large
/// allocation before any validation has happened.
const MAX_ENTRIES: usize = 128;

#[derive(Debug)]
pub struct Message<'a> {
    tag: u32,
    entries: Vec<(u32, &'a [u8])>,
}

impl<'a> Message<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self, DecoderError> {
        let buffer = DecoderBuffer::new(data);
        let (tag, buffer) = decode_u32_le(buffer)?;
        let (count, buffer) = decode_u16_le(buffer)?;
        let buffer = buffer.skip(2)?;

        let count = count as usize;
        if count > MAX_ENTRIES {
            return Err(DecoderError::InvariantViolation("too many message entries"));
        }

        let mut offsets = Vec::with_capacity(count);
        let mut buffer = buffer;
        for _ in 0..count {
            let (entry_tag, rest) = decode_u32_le(buffer)?;
            let (end_offset, rest) = decode_u32_le(rest)?;
            offsets.push((entry_tag, end_offset as usize));
            buffer = rest;
        }

        let values = buffer.into_less_safe_slice();

        let mut entries = Vec::with_capacity(count);
        let mut start = 0usize;
        for (entry_tag, end) in offsets {
            if end < start || end > values.len() {
                return Err(DecoderError::InvariantViolation("entry offsets not monotonic"));
            }
            entries.push((entry_tag, &values[start..end]));
            start = end;
        }

        if start != values.len() {
            return Err(DecoderError::InvariantViolation("trailing value bytes"));
        }

        Ok(Self { tag, entries })
    }

    #[inline]
    pub fn tag(&self) -> u32 {
        self.tag
    }

    #[inline]
    pub fn is_chlo(&self) -> bool {
        self.tag == CHLO_TAG
    }

    /// Returns the value for `tag`, if present
    pub fn get(&self, tag: u32) -> Option<&'a [u8]> {
        self.entries
            .iter()
            .find(|(entry_tag, _)| *entry_tag == tag)
            .map(|(_, value)| *value)
    }
}

fn decode_u32_le(buffer: DecoderBuffer<'_>) -> Result<(u32, DecoderBuffer<'_>), DecoderError> {
    let (bytes, buffer) = buffer.decode_slice(4)?;
    let bytes: [u8; 4] = bytes
        .into_less_safe_slice()
        .try_into()
        .expect("slice length checked");
    Ok((u32::from_le_bytes(bytes), buffer))
}

fn decode_u16_le(buffer: DecoderBuffer<'_>) -> Result<(u16, DecoderBuffer<'_>), DecoderError> {
    let (bytes, buffer) = buffer.decode_slice(2)?;
    let bytes: [u8; 2] = bytes
        .into_less_safe_slice()
        .try_into()
        .expect("slice length checked");
    Ok((u16::from_le_bytes(bytes), buffer))
}

#[cfg(any(test, feature = "testing"))]
pub mod testing {
    use super::*;

    /// Serializes a tag-value message
    pub fn message(tag: u32, entries: &[(u32, &[u8])]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&tag.to_le_bytes());
        bytes.extend_from_slice(&(entries.len() as u16).to_le_bytes());
        bytes.extend_from_slice(&[0, 0]);

        let mut end = 0u32;
        for (entry_tag, value) in entries {
            end += value.len() as u32;
            bytes.extend_from_slice(&entry_tag.to_le_bytes());
            bytes.extend_from_slice(&end.to_le_bytes());
        }
        for (_, value) in entries {
            bytes.extend_from_slice(value);
        }
        bytes
    }

    /// A minimal CHLO advertising the given ALPN
    pub fn chlo(alpn: &[u8]) -> Vec<u8> {
        message(CHLO_TAG, &[(ALPN_TAG, alpn)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chlo_with_alpn() {
        let bytes = testing::chlo(b"hq");
        let message = Message::parse(&bytes).unwrap();

        assert!(message.is_chlo());
        assert_eq!(message.get(ALPN_TAG), Some(&b"hq"[..]));
    }

    #[test]
    fn multiple_entries_slice_by_offset() {
        let bytes = testing::message(CHLO_TAG, &[(0x1111, b"abc"), (ALPN_TAG, b"h3"), (0x2222, b"")]);
        let message = Message::parse(&bytes).unwrap();

        assert_eq!(message.get(0x1111), Some(&b"abc"[..]));
        assert_eq!(message.get(ALPN_TAG), Some(&b"h3"[..]));
        assert_eq!(message.get(0x2222), Some(&b""[..]));
        assert_eq!(message.get(0x3333), None);
    }

    #[test]
    fn rejects_non_monotonic_offsets() {
        let mut bytes = testing::message(CHLO_TAG, &[(0x1111, b"abc"), (0x2222, b"de")]);
        // swap the two end offsets
        bytes[12..16].copy_from_slice(&[5, 0, 0, 0]);
        bytes[20..24].copy_from_slice(&[3, 0, 0, 0]);
        assert!(Message::parse(&bytes).is_err());
    }

    #[test]
    fn rejects_truncated_values() {
        let mut bytes = testing::chlo(b"hq");
        bytes.pop();
        assert!(Message::parse(&bytes).is_err());
    }

    #[test]
    fn parse_never_panics() {
        bolero::check!().for_each(|bytes| {
            let _ = Message::parse(bytes);
        });
    }
}
