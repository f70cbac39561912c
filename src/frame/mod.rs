// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The minimal frame layer the dispatcher understands.
//!
//! Only frames that can legitimately appear in an unauthenticated handshake
//! payload are decoded: PADDING, PING, CRYPTO (IETF handshake bytes), and the
//! legacy crypto-stream frame. Everything else makes the payload ineligible
//! for CHLO extraction; the session layer owns the full frame vocabulary.

use crate::varint::{to_length, VarInt};
use s2n_codec::{DecoderBuffer, DecoderError, Encoder, EncoderValue};

pub const PADDING_TAG: u8 = 0x00;
pub const PING_TAG: u8 = 0x01;
pub const CRYPTO_TAG: u8 = 0x06;

/// Legacy crypto-stream frame tag base; low bits flag the optional fields
pub const STREAM_TAG: u8 = 0x40;
const STREAM_LEN_BIT: u8 = 0x01;
const STREAM_OFFSET_BIT: u8 = 0x02;
const STREAM_FLAGS_MASK: u8 = STREAM_LEN_BIT | STREAM_OFFSET_BIT;

#[derive(Debug, PartialEq, Eq)]
pub enum Frame<'a> {
    /// One or more coalesced padding bytes
    Padding { len: usize },
    Ping,
    /// IETF handshake bytes
    Crypto(Crypto<'a>),
    /// Legacy handshake bytes
    Stream(Stream<'a>),
}

/// A CRYPTO frame (type 0x06): VarInt offset, VarInt length, data
#[derive(Debug, PartialEq, Eq)]
pub struct Crypto<'a> {
    pub offset: VarInt,
    pub data: &'a [u8],
}

impl EncoderValue for Crypto<'_> {
    fn encode<E: Encoder>(&self, encoder: &mut E) {
        encoder.encode(&CRYPTO_TAG);
        encoder.encode(&self.offset);
        encoder.encode_with_len_prefix::<VarInt, _>(&self.data);
    }
}

/// A legacy crypto-stream frame: optional u32 offset, optional u16 length
/// (no length ⇒ the frame extends to the end of the packet)
#[derive(Debug, PartialEq, Eq)]
pub struct Stream<'a> {
    pub offset: u64,
    pub data: &'a [u8],
}

impl EncoderValue for Stream<'_> {
    fn encode<E: Encoder>(&self, encoder: &mut E) {
        let mut tag = STREAM_TAG | STREAM_LEN_BIT;
        if self.offset != 0 {
            tag |= STREAM_OFFSET_BIT;
        }
        encoder.encode(&tag);
        if self.offset != 0 {
            encoder.encode(&(self.offset as u32));
        }
        encoder.encode(&(self.data.len() as u16));
        encoder.encode(&self.data);
    }
}

/// Iterates the frames of an unauthenticated payload
pub struct Iter<'a> {
    buffer: DecoderBuffer<'a>,
}

impl<'a> Iter<'a> {
    pub fn new(payload: &'a [u8]) -> Self {
        Self {
            buffer: DecoderBuffer::new(payload),
        }
    }

    fn decode_frame(&mut self) -> Result<Frame<'a>, DecoderError> {
        let buffer = self.buffer;
        let (tag, buffer) = buffer.decode::<u8>()?;

        let (frame, buffer) = match tag {
            PADDING_TAG => {
                // coalesce the padding run
                let mut len = 1;
                let mut buffer = buffer;
                while buffer.peek_byte(0).map_or(false, |byte| byte == PADDING_TAG) {
                    buffer = buffer.skip(1)?;
                    len += 1;
                }
                (Frame::Padding { len }, buffer)
            }
            PING_TAG => (Frame::Ping, buffer),
            CRYPTO_TAG => {
                let (offset, buffer) = buffer.decode::<VarInt>()?;
                let (len, buffer) = buffer.decode::<VarInt>()?;
                let (data, buffer) = buffer.decode_slice(to_length(len)?)?;
                (
                    Frame::Crypto(Crypto {
                        offset,
                        data: data.into_less_safe_slice(),
                    }),
                    buffer,
                )
            }
            tag if (tag & !STREAM_FLAGS_MASK) == STREAM_TAG => {
                let (offset, buffer) = if tag & STREAM_OFFSET_BIT != 0 {
                    let (offset, buffer) = buffer.decode::<u32>()?;
                    (offset as u64, buffer)
                } else {
                    (0, buffer)
                };
                let (data, buffer) = if tag & STREAM_LEN_BIT != 0 {
                    let (len, buffer) = buffer.decode::<u16>()?;
                    buffer.decode_slice(len as usize)?
                } else {
                    let len = buffer.len();
                    buffer.decode_slice(len)?
                };
                (
                    Frame::Stream(Stream {
                        offset,
                        data: data.into_less_safe_slice(),
                    }),
                    buffer,
                )
            }
            _ => return Err(DecoderError::InvariantViolation("unrecognized frame")),
        };

        self.buffer = buffer;
        Ok(frame)
    }
}

impl<'a> Iterator for Iter<'a> {
    type Item = Result<Frame<'a>, DecoderError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() {
            return None;
        }
        match self.decode_frame() {
            Ok(frame) => Some(Ok(frame)),
            Err(err) => {
                // stop iterating after a decode failure
                self.buffer = DecoderBuffer::new(&[]);
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use s2n_codec::EncoderBuffer;

    fn encode<V: EncoderValue>(value: V) -> Vec<u8> {
        let mut bytes = [0u8; 1500];
        let mut encoder = EncoderBuffer::new(&mut bytes);
        encoder.encode(&value);
        let len = encoder.len();
        bytes[..len].to_vec()
    }

    #[test]
    fn crypto_round_trip() {
        let mut payload = encode(Crypto {
            offset: VarInt::ZERO,
            data: b"client hello bytes",
        });
        payload.extend_from_slice(&[0, 0, 0]);

        let frames: Vec<_> = Iter::new(&payload).collect::<Result<_, _>>().unwrap();
        assert_eq!(
            frames,
            vec![
                Frame::Crypto(Crypto {
                    offset: VarInt::ZERO,
                    data: b"client hello bytes",
                }),
                Frame::Padding { len: 3 },
            ]
        );
    }

    #[test]
    fn stream_without_length_extends_to_end() {
        let payload = [STREAM_TAG, 1, 2, 3];
        let frames: Vec<_> = Iter::new(&payload).collect::<Result<_, _>>().unwrap();
        assert_eq!(
            frames,
            vec![Frame::Stream(Stream {
                offset: 0,
                data: &[1, 2, 3],
            })]
        );
    }

    #[test]
    fn stream_with_offset() {
        let payload = encode(Stream {
            offset: 100,
            data: b"late",
        });
        let frames: Vec<_> = Iter::new(&payload).collect::<Result<_, _>>().unwrap();
        assert_eq!(
            frames,
            vec![Frame::Stream(Stream {
                offset: 100,
                data: b"late",
            })]
        );
    }

    #[test]
    fn unknown_frame_stops_iteration() {
        let payload = [0xffu8, 1, 2];
        let mut iter = Iter::new(&payload);
        assert!(iter.next().unwrap().is_err());
        assert!(iter.next().is_none());
    }

    #[test]
    fn iteration_never_panics() {
        bolero::check!().for_each(|bytes| {
            for frame in Iter::new(bytes) {
                if frame.is_err() {
                    break;
                }
            }
        });
    }
}
