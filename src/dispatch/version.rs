// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Decides how to answer a long-header packet's version field.

use crate::{
    connection,
    packet::{version_negotiation, Form, Peek, MINIMUM_INITIAL_SIZE},
    version::SupportedVersions,
};
use bytes::Bytes;

/// The disposition for a long-header packet's version
#[derive(Debug)]
pub enum Outcome {
    /// The version is enabled; continue dispatching
    Supported,
    /// Answer with this version negotiation packet
    Negotiate(Bytes),
    /// Not enabled and too small to answer
    Drop,
}

#[derive(Debug, Default)]
pub struct Negotiator;

impl Negotiator {
    /// `tag_entropy` masks the unused first-byte bits of IETF-form replies.
    pub fn on_packet(
        &mut self,
        peek: &Peek,
        payload_len: usize,
        versions: &SupportedVersions,
        validate_chlo_size: bool,
        tag_entropy: u8,
    ) -> Outcome {
        let version = match peek.version {
            Some(version) => version,
            None => return Outcome::Supported,
        };

        if versions.is_supported(version) {
            return Outcome::Supported;
        }

        // a small probe is not worth an amplified reply
        if validate_chlo_size && payload_len < MINIMUM_INITIAL_SIZE {
            return Outcome::Drop;
        }

        Outcome::Negotiate(build_packet(peek, versions, tag_entropy))
    }
}

/// Builds the reply in the same form family as the trigger
pub fn build_packet(peek: &Peek, versions: &SupportedVersions, tag_entropy: u8) -> Bytes {
    if peek.form == Form::IetfLong {
        version_negotiation::encode(version_negotiation::IetfVersionNegotiation {
            tag_entropy,
            destination_id: peek.source_id.as_ref().unwrap_or(&connection::Id::EMPTY),
            source_id: &peek.destination_id,
            supported_versions: versions.enabled(),
        })
    } else {
        version_negotiation::encode(version_negotiation::LegacyVersionNegotiation {
            connection_id: &peek.destination_id,
            supported_versions: versions.enabled(),
        })
    }
}

/// Builds a reply for a buffered connection whose version lost support
/// before its session could be created
pub fn build_packet_for_id(
    id: &connection::Id,
    is_ietf: bool,
    versions: &SupportedVersions,
    tag_entropy: u8,
) -> Bytes {
    if is_ietf {
        version_negotiation::encode(version_negotiation::IetfVersionNegotiation {
            tag_entropy,
            destination_id: &connection::Id::EMPTY,
            source_id: id,
            supported_versions: versions.enabled(),
        })
    } else {
        version_negotiation::encode(version_negotiation::LegacyVersionNegotiation {
            connection_id: id,
            supported_versions: versions.enabled(),
        })
    }
}
