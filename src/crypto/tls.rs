// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Minimal TLS ClientHello inspection.
//!
//! Parses exactly as far as needed to confirm a complete ClientHello and
//! pull the first entry of the ALPN extension; no other extension is
//! interpreted and nothing is validated beyond structural bounds.

use s2n_codec::{DecoderBuffer, DecoderError};

const CLIENT_HELLO_TYPE: u8 = 1;
const ALPN_EXTENSION: u16 = 16;

#[derive(Debug, PartialEq, Eq)]
pub struct ClientHello<'a> {
    pub alpn: Option<&'a [u8]>,
}

impl<'a> ClientHello<'a> {
    /// Parses a complete ClientHello handshake message from `data`
    pub fn parse(data: &'a [u8]) -> Result<Self, DecoderError> {
        let buffer = DecoderBuffer::new(data);

        let (msg_type, buffer) = buffer.decode::<u8>()?;
        if msg_type != CLIENT_HELLO_TYPE {
            return Err(DecoderError::InvariantViolation("not a client hello"));
        }

        let (len, buffer) = decode_u24(buffer)?;
        let (body, _rest) = buffer.decode_slice(len)?;

        let (_legacy_version, body) = body.decode::<u16>()?;
        let body = body.skip(32)?; // random
        let body = skip_u8_prefixed(body)?; // legacy_session_id
        let body = skip_u16_prefixed(body)?; // cipher_suites
        let body = skip_u8_prefixed(body)?; // legacy_compression_methods

        let (ext_len, body) = body.decode::<u16>()?;
        let (mut extensions, _) = body.decode_slice(ext_len as usize)?;

        let mut alpn = None;
        while !extensions.is_empty() {
            let (ext_type, rest) = extensions.decode::<u16>()?;
            let (ext_len, rest) = rest.decode::<u16>()?;
            let (ext_body, rest) = rest.decode_slice(ext_len as usize)?;

            if ext_type == ALPN_EXTENSION {
                alpn = Some(parse_alpn(ext_body)?);
            }
            extensions = rest;
        }

        Ok(Self { alpn })
    }
}

/// Returns the first protocol of the ALPN list
fn parse_alpn(buffer: DecoderBuffer<'_>) -> Result<&[u8], DecoderError> {
    let (_list_len, buffer) = buffer.decode::<u16>()?;
    let (entry_len, buffer) = buffer.decode::<u8>()?;
    let (entry, _) = buffer.decode_slice(entry_len as usize)?;
    Ok(entry.into_less_safe_slice())
}

fn decode_u24(buffer: DecoderBuffer<'_>) -> Result<(usize, DecoderBuffer<'_>), DecoderError> {
    let (bytes, buffer) = buffer.decode_slice(3)?;
    let bytes = bytes.into_less_safe_slice();
    let value = ((bytes[0] as usize) << 16) | ((bytes[1] as usize) << 8) | bytes[2] as usize;
    Ok((value, buffer))
}

fn skip_u8_prefixed(buffer: DecoderBuffer<'_>) -> Result<DecoderBuffer<'_>, DecoderError> {
    let (len, buffer) = buffer.decode::<u8>()?;
    buffer.skip(len as usize)
}

fn skip_u16_prefixed(buffer: DecoderBuffer<'_>) -> Result<DecoderBuffer<'_>, DecoderError> {
    let (len, buffer) = buffer.decode::<u16>()?;
    buffer.skip(len as usize)
}

#[cfg(any(test, feature = "testing"))]
pub mod testing {
    /// Serializes a structurally valid ClientHello advertising `alpn`
    pub fn client_hello(alpn: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&0x0303u16.to_be_bytes()); // legacy_version
        body.extend_from_slice(&[0u8; 32]); // random
        body.push(0); // empty legacy_session_id
        body.extend_from_slice(&2u16.to_be_bytes());
        body.extend_from_slice(&0x1301u16.to_be_bytes()); // one cipher suite
        body.extend_from_slice(&[1, 0]); // null compression

        let mut alpn_ext = Vec::new();
        alpn_ext.extend_from_slice(&((alpn.len() + 1) as u16).to_be_bytes());
        alpn_ext.push(alpn.len() as u8);
        alpn_ext.extend_from_slice(alpn);

        let mut extensions = Vec::new();
        extensions.extend_from_slice(&16u16.to_be_bytes()); // ALPN
        extensions.extend_from_slice(&(alpn_ext.len() as u16).to_be_bytes());
        extensions.extend_from_slice(&alpn_ext);

        body.extend_from_slice(&(extensions.len() as u16).to_be_bytes());
        body.extend_from_slice(&extensions);

        let mut message = Vec::new();
        message.push(super::CLIENT_HELLO_TYPE);
        message.extend_from_slice(&(body.len() as u32).to_be_bytes()[1..]);
        message.extend_from_slice(&body);
        message
    }
}
