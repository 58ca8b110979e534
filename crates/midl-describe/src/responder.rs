// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The description responder.
//!
//!
//! Query semantics are deliberately forgiving at runtime: an unknown type
//! key yields `None`, never an error, and an unknown service name is
//! answered by closing the peer's channel without sending a byte. Only the
//! compiler front half treats bad names as fatal; by the time a responder
//! runs, a stale or foreign key is an expected condition.

use std::collections::BTreeMap;
use std::sync::Arc;

use midl::model::UserDefinedType;
use midl::registry::TypeKey;
use midl::rtti::{self, RuntimeTypeInfo};

// ============================================================================
// DescriptionChannel
// ============================================================================

/// Outbound half of a description session, as narrow as transports allow.
///
/// Implementations are message pipes, sockets, or in-process test doubles;
/// the responder never learns which.
pub trait DescriptionChannel {
    fn send(&mut self, bytes: &[u8]);
    fn close(&mut self);
}

// ============================================================================
// DescribeResponder
// ============================================================================

/// Answers description queries over one immutable type info snapshot.
///
/// The snapshot is taken at construction; there is no process-wide default
/// and no mutation path. Cloning shares the snapshot, so one responder can
/// serve any number of threads.
#[derive(Debug, Clone)]
pub struct DescribeResponder {
    info: Arc<RuntimeTypeInfo>,
    serve_bulk: bool,
}

impl DescribeResponder {
    pub fn new(info: RuntimeTypeInfo) -> Self {
        Self::from_shared(Arc::new(info))
    }

    /// Wrap an already-shared snapshot without copying it.
    pub fn from_shared(info: Arc<RuntimeTypeInfo>) -> Self {
        DescribeResponder {
            info,
            serve_bulk: true,
        }
    }

    /// Opt out of bulk queries: [`Self::all_type_definitions`] then returns
    /// `None` and peers must query per key. Large graphs use this to keep
    /// single responses bounded.
    pub fn without_bulk(mut self) -> Self {
        self.serve_bulk = false;
        self
    }

    /// Answer a service description request on a freshly accepted channel.
    ///
    /// A known name gets the top-level interface definition as one encoded
    /// record. An unknown name is rejected by closure: the channel is
    /// closed with zero bytes sent, which peers treat as "not here".
    pub fn describe_service(&self, service_name: &str, channel: &mut dyn DescriptionChannel) {
        match self.top_level_interface(service_name) {
            Some(decl) => channel.send(&rtti::encode_type(decl)),
            None => {
                log::warn!("[DESCRIBE] unknown service '{}', closing", service_name);
                channel.close();
            }
        }
    }

    /// The interface a service name speaks, when this snapshot knows it.
    ///
    /// A service key that points at anything other than an interface
    /// declaration (possible in a hand-assembled or badly merged snapshot)
    /// is treated the same as an unknown name.
    pub fn top_level_interface(&self, service_name: &str) -> Option<&UserDefinedType> {
        let key = self.info.lookup_service(service_name)?;
        match self.info.lookup_type(key) {
            Some(decl @ UserDefinedType::Interface(_)) => Some(decl),
            Some(decl) => {
                log::warn!(
                    "[DESCRIBE] service '{}' points at a {:?}, not an interface",
                    service_name,
                    decl.kind()
                );
                None
            }
            None => None,
        }
    }

    /// One definition by key. Unknown keys are `None`, never an error.
    pub fn type_definition(&self, key: &TypeKey) -> Option<&UserDefinedType> {
        self.info.lookup_type(key)
    }

    /// The whole type map, unless bulk serving is disabled.
    pub fn all_type_definitions(&self) -> Option<&BTreeMap<TypeKey, UserDefinedType>> {
        if self.serve_bulk {
            Some(&self.info.types)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use midl::model::{InterfaceType, Method, StructType};

    /// Records what the responder did to the channel.
    #[derive(Default)]
    struct RecordingChannel {
        sent: Vec<Vec<u8>>,
        closed: bool,
    }

    impl DescriptionChannel for RecordingChannel {
        fn send(&mut self, bytes: &[u8]) {
            self.sent.push(bytes.to_vec());
        }

        fn close(&mut self) {
            self.closed = true;
        }
    }

    fn snapshot() -> RuntimeTypeInfo {
        let mut iface = InterfaceType::new(vec![Method::new(0, StructType::empty())]);
        iface.service_name = Some("frame_host".to_string());
        let decl = UserDefinedType::Interface(iface);
        let key = TypeKey::for_declaration("interface", "content.FrameHost");

        let mut info = RuntimeTypeInfo::default();
        info.services.insert("frame_host".to_string(), key.clone());
        info.types.insert(key, decl);
        info
    }

    #[test]
    fn test_known_service_sends_interface_definition() {
        let responder = DescribeResponder::new(snapshot());
        let mut channel = RecordingChannel::default();

        responder.describe_service("frame_host", &mut channel);
        assert!(!channel.closed);
        assert_eq!(channel.sent.len(), 1);

        let decl = rtti::decode_type(&channel.sent[0]).unwrap();
        assert_eq!(
            Some(&decl),
            responder.top_level_interface("frame_host")
        );
    }

    #[test]
    fn test_unknown_service_closes_with_zero_bytes() {
        let responder = DescribeResponder::new(snapshot());
        let mut channel = RecordingChannel::default();

        responder.describe_service("no_such_service", &mut channel);
        assert!(channel.closed);
        assert!(channel.sent.is_empty());
    }

    #[test]
    fn test_service_pointing_at_non_interface_is_rejected() {
        // A badly merged snapshot can map a service name to a struct key;
        // that must be answered like an unknown name, not served.
        let key = TypeKey::for_declaration("struct", "content.FrameState");
        let mut info = RuntimeTypeInfo::default();
        info.services.insert("frame_host".to_string(), key.clone());
        info.types
            .insert(key, UserDefinedType::Struct(StructType::empty()));

        let responder = DescribeResponder::new(info);
        assert!(responder.top_level_interface("frame_host").is_none());

        let mut channel = RecordingChannel::default();
        responder.describe_service("frame_host", &mut channel);
        assert!(channel.closed);
        assert!(channel.sent.is_empty());
    }

    #[test]
    fn test_unknown_key_is_none_not_error() {
        let responder = DescribeResponder::new(snapshot());
        assert!(responder.type_definition(&TypeKey::from("feedface")).is_none());
    }

    #[test]
    fn test_known_key_returns_definition() {
        let responder = DescribeResponder::new(snapshot());
        let key = TypeKey::for_declaration("interface", "content.FrameHost");
        assert!(responder.type_definition(&key).is_some());
    }

    #[test]
    fn test_bulk_query_and_opt_out() {
        let responder = DescribeResponder::new(snapshot());
        assert_eq!(responder.all_type_definitions().unwrap().len(), 1);

        let restricted = responder.clone().without_bulk();
        assert!(restricted.all_type_definitions().is_none());
        // Per-key lookup still works after opting out of bulk.
        let key = TypeKey::for_declaration("interface", "content.FrameHost");
        assert!(restricted.type_definition(&key).is_some());
    }

    #[test]
    fn test_responder_is_shareable_across_threads() {
        let responder = DescribeResponder::new(snapshot());
        std::thread::scope(|s| {
            for _ in 0..4 {
                let responder = responder.clone();
                s.spawn(move || {
                    assert!(responder.top_level_interface("frame_host").is_some());
                });
            }
        });
    }
}
