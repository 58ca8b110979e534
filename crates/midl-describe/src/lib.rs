// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Runtime interface description for MIDL services.
//!
//! A thin, thread-safe facade over merged [`midl::RuntimeTypeInfo`]
//! snapshots. A process embeds its generated type info blobs, merges them
//! into one snapshot, and hands it to a [`DescribeResponder`]; peers can
//! then ask which interface a service name speaks and fetch type
//! definitions key by key.
//!
//! Transports are external collaborators: the responder only ever touches
//! the narrow [`DescriptionChannel`] trait.

pub mod responder;

pub use responder::{DescribeResponder, DescriptionChannel};
