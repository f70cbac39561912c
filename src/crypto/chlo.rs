// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! CHLO detection.
//!
//! A datagram "is a CHLO" when the handshake bytes carried by its frames,
//! reassembled from offset zero within this single datagram, form a complete
//! handshake initiation for the packet's version. Reassembly never spans
//! datagrams; a CHLO split across datagrams waits in the buffered store
//! until its retransmission arrives whole.

use crate::{
    crypto::{handshake, tls},
    frame::{Frame, Iter},
    version::Version,
};

/// Summary of an accepted handshake initiation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chlo {
    pub alpn: Option<Vec<u8>>,
}

/// Attempts CHLO extraction from the frame payload of a long-header packet.
///
/// Returns `None` when the payload is not (yet) a complete CHLO; the caller
/// buffers such datagrams rather than dropping them.
pub fn extract(payload: &[u8], version: Version) -> Option<Chlo> {
    let mut handshake_bytes: Vec<u8> = Vec::new();
    let mut next_offset = 0u64;

    for frame in Iter::new(payload) {
        match frame.ok()? {
            Frame::Padding { .. } | Frame::Ping => {}
            Frame::Crypto(frame) if version.uses_crypto_frames() => {
                if frame.offset.as_u64() != next_offset {
                    return None;
                }
                handshake_bytes.extend_from_slice(frame.data);
                next_offset += frame.data.len() as u64;
            }
            Frame::Stream(frame) if !version.uses_crypto_frames() => {
                if frame.offset != next_offset {
                    return None;
                }
                handshake_bytes.extend_from_slice(frame.data);
                next_offset += frame.data.len() as u64;
            }
            _ => return None,
        }
    }

    if handshake_bytes.is_empty() {
        return None;
    }

    if version.uses_crypto_frames() {
        let hello = tls::ClientHello::parse(&handshake_bytes).ok()?;
        Some(Chlo {
            alpn: hello.alpn.map(<[u8]>::to_vec),
        })
    } else {
        let message = handshake::Message::parse(&handshake_bytes).ok()?;
        if !message.is_chlo() {
            return None;
        }
        Some(Chlo {
            alpn: message.get(handshake::ALPN_TAG).map(<[u8]>::to_vec),
        })
    }
}

#[cfg(any(test, feature = "testing"))]
pub mod testing {
    use crate::{
        crypto::{handshake, tls},
        frame::{Crypto, Stream},
        varint::VarInt,
        version::Version,
    };
    use s2n_codec::{Encoder, EncoderBuffer};

    /// Serializes a complete single-datagram CHLO payload for `version`
    pub fn chlo_payload(version: Version, alpn: &[u8]) -> Vec<u8> {
        let mut bytes = [0u8; 2048];
        let mut encoder = EncoderBuffer::new(&mut bytes);

        if version.uses_crypto_frames() {
            let hello = tls::testing::client_hello(alpn);
            encoder.encode(&Crypto {
                offset: VarInt::ZERO,
                data: &hello,
            });
        } else {
            let message = handshake::testing::chlo(alpn);
            encoder.encode(&Stream {
                offset: 0,
                data: &message,
            });
        }

        let len = encoder.len();
        bytes[..len].to_vec()
    }

    /// A payload that is valid frames but not a CHLO
    pub fn data_payload() -> Vec<u8> {
        vec![crate::frame::PING_TAG, 0, 0, 0]
    }
}
