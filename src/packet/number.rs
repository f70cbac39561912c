// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use s2n_codec::{DecoderBuffer, DecoderBufferResult};

/// Decodes a cleartext packet number of `len` bytes (big-endian).
///
/// `len` is form-specific: 1, 2, 4, or 6 for the legacy header, 1..=4 for
/// IETF headers.
#[inline]
pub fn decode(buffer: DecoderBuffer<'_>, len: usize) -> DecoderBufferResult<'_, u64> {
    let (bytes, buffer) = buffer.decode_slice(len)?;
    let mut value = 0u64;
    for byte in bytes.into_less_safe_slice() {
        value = (value << 8) | *byte as u64;
    }
    Ok((value, buffer))
}

/// Encodes a packet number into `len` big-endian bytes
#[inline]
pub fn encode(value: u64, len: usize, out: &mut [u8]) {
    debug_assert!(out.len() >= len);
    for i in 0..len {
        out[i] = (value >> ((len - 1 - i) * 8)) as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        for (value, len) in [(0u64, 1), (1, 1), (256, 2), (0xaabbccdd, 4), (0x0102_0304_0506, 6)] {
            let mut bytes = [0u8; 8];
            encode(value, len, &mut bytes);
            let (decoded, _) = decode(DecoderBuffer::new(&bytes[..len]), len).unwrap();
            assert_eq!(decoded, value);
        }
    }

    #[test]
    fn truncation_wraps() {
        // packet number 256 in a 1-byte field decodes as 0
        let mut bytes = [0u8; 1];
        encode(256, 1, &mut bytes);
        let (decoded, _) = decode(DecoderBuffer::new(&bytes), 1).unwrap();
        assert_eq!(decoded, 0);
    }
}
