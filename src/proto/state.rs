//! Gossip state snapshot
//!
//! Peers advertise their view of the overlay as a [`NodeState`] record: a
//! version scalar, two heartbeat flags, and the address book covering the
//! sender's leaf set and routing table. A snapshot with `updated == 0` is
//! not a state update at all but a join request for the node named by the
//! message destination.

use crate::id::Id;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A peer's advertised overlay state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeState {
    /// Monotonic version scalar of the sender; 0 denotes a join request
    pub updated: u64,
    /// Sender requests a reply snapshot
    pub repair: bool,
    /// Sender has seen no recent application traffic with the receiver
    pub passive: bool,
    /// Transport endpoints, keyed by decimal node id, each an ordered list
    /// of `host:port` strings
    pub addrs: BTreeMap<String, Vec<String>>,
}

impl NodeState {
    /// Build a join request advertising the joiner's own endpoints
    pub fn join_request(joiner: Id, endpoints: Vec<String>) -> Self {
        let mut addrs = BTreeMap::new();
        addrs.insert(joiner.to_string(), endpoints);
        Self {
            updated: 0,
            repair: false,
            passive: false,
            addrs,
        }
    }

    /// Whether this snapshot is a join request rather than a state update
    pub fn is_join(&self) -> bool {
        self.updated == 0
    }

    /// Advertised endpoints of the given node, if any
    pub fn endpoints_of(&self, id: Id) -> &[String] {
        self.addrs
            .get(&id.to_string())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Identifiers named by the address book
    ///
    /// Keys that do not parse as decimal identifiers are skipped; a
    /// malformed entry from a remote peer must not poison the whole
    /// snapshot.
    pub fn ids(&self) -> Vec<Id> {
        self.addrs
            .keys()
            .filter_map(|key| match key.parse::<Id>() {
                Ok(id) => Some(id),
                Err(_) => {
                    tracing::warn!(key = %key, "ignoring malformed id in state snapshot");
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_request_shape() {
        let joiner = Id(42);
        let state = NodeState::join_request(joiner, vec!["127.0.0.1:7000".into()]);

        assert!(state.is_join());
        assert_eq!(state.endpoints_of(joiner), ["127.0.0.1:7000".to_string()]);
        assert_eq!(state.ids(), vec![joiner]);
    }

    #[test]
    fn malformed_keys_are_skipped() {
        let mut state = NodeState::default();
        state.addrs.insert("17".into(), vec!["a:1".into()]);
        state.addrs.insert("not-an-id".into(), vec!["b:2".into()]);

        assert_eq!(state.ids(), vec![Id(17)]);
    }

    #[test]
    fn unknown_node_has_no_endpoints() {
        let state = NodeState::default();
        assert!(state.endpoints_of(Id(9)).is_empty());
    }
}
