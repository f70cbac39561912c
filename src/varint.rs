// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Variable-length integer encoding used by IETF long headers and CRYPTO
//! frames. The two most significant bits of the first byte encode the
//! total field length (1, 2, 4, or 8 bytes).

use core::{convert::TryFrom, fmt};
use s2n_codec::{decoder_value, DecoderError, Encoder, EncoderValue};

pub const MAX_VARINT_VALUE: u64 = (1 << 62) - 1;

#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VarInt(u64);

impl VarInt {
    pub const MAX: Self = Self(MAX_VARINT_VALUE);
    pub const ZERO: Self = Self(0);

    /// Creates a varint without checking the value is in range.
    ///
    /// The value must not exceed [`MAX_VARINT_VALUE`].
    #[inline]
    pub const fn from_u32(value: u32) -> Self {
        Self(value as u64)
    }

    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// The number of bytes the value occupies on the wire
    #[inline]
    pub const fn len(self) -> usize {
        match self.0 {
            0..=0x3f => 1,
            0x40..=0x3fff => 2,
            0x4000..=0x3fff_ffff => 4,
            _ => 8,
        }
    }
}

impl fmt::Debug for VarInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VarInt({})", self.0)
    }
}

impl fmt::Display for VarInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VarIntError;

impl fmt::Display for VarIntError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "value exceeds the maximum varint range")
    }
}

impl TryFrom<u64> for VarInt {
    type Error = VarIntError;

    #[inline]
    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > MAX_VARINT_VALUE {
            return Err(VarIntError);
        }
        Ok(Self(value))
    }
}

impl TryFrom<usize> for VarInt {
    type Error = VarIntError;

    #[inline]
    fn try_from(value: usize) -> Result<Self, Self::Error> {
        Self::try_from(value as u64)
    }
}

impl TryFrom<VarInt> for usize {
    type Error = VarIntError;

    #[inline]
    fn try_from(value: VarInt) -> Result<Self, Self::Error> {
        usize::try_from(value.0).map_err(|_| VarIntError)
    }
}

impl From<VarInt> for u64 {
    #[inline]
    fn from(value: VarInt) -> Self {
        value.0
    }
}

decoder_value!(
    impl<'a> VarInt {
        fn decode(buffer: Buffer) -> Result<Self> {
            let (first, buffer) = buffer.decode::<u8>()?;
            let len = 1usize << (first >> 6);
            let mut value = (first & 0x3f) as u64;
            let (rest, buffer) = buffer.decode_slice(len - 1)?;
            for byte in rest.into_less_safe_slice() {
                value = (value << 8) | *byte as u64;
            }
            Ok((VarInt(value), buffer))
        }
    }
);

impl EncoderValue for VarInt {
    #[inline]
    fn encode<E: Encoder>(&self, encoder: &mut E) {
        match self.len() {
            1 => encoder.encode(&(self.0 as u8)),
            2 => encoder.encode(&(self.0 as u16 | 0x4000)),
            4 => encoder.encode(&(self.0 as u32 | 0x8000_0000)),
            _ => encoder.encode(&(self.0 | 0xc000_0000_0000_0000)),
        }
    }
}

/// Decoded-value guard used by frame decoders that need a `usize` length
#[inline]
pub fn to_length(value: VarInt) -> Result<usize, DecoderError> {
    usize::try_from(value).map_err(|_| DecoderError::InvariantViolation("length out of range"))
}
