// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Handshake-initiation inspection and validation.
//!
//! The dispatcher only needs to answer two questions about a payload it
//! cannot authenticate: "does this datagram begin a connection?" and "which
//! application protocol does it ask for?". Everything deeper belongs to the
//! handshake state machine behind [`validate::Validator`].

pub mod chlo;
pub mod handshake;
pub mod tls;
pub mod validate;
