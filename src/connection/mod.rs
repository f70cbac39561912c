// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Connection identifiers and the server's acceptance policy for them

pub mod id;

pub use id::Id;
