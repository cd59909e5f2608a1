//! Overlay routing envelope
//!
//! The envelope is the overlay's slice of a message header: the destination
//! identifier, an optional state snapshot (whose presence marks the message
//! as a system message), and the upper layer's metadata preserved across the
//! traversal. On the wire the envelope is serialized into the carrier
//! message's meta slot; [`Envelope::unpack`] reverses that exactly once per
//! hop.

use super::{decode, encode, Message, NodeState};
use crate::error::Result;
use crate::id::Id;
use serde::{Deserialize, Serialize};

/// Overlay metadata wrapped around a message for the duration of a traversal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Destination identifier the message is routed toward
    pub dest: Id,
    /// State snapshot; present if and only if this is a system message
    pub state: Option<NodeState>,
    /// Upper-layer metadata held for the destination
    pub meta: Vec<u8>,
}

impl Envelope {
    /// Envelope for an application message, preserving the upper layer's meta
    pub fn data(dest: Id, meta: Vec<u8>) -> Self {
        Self {
            dest,
            state: None,
            meta,
        }
    }

    /// Envelope for a system message carrying a state snapshot
    pub fn system(dest: Id, state: NodeState) -> Self {
        Self {
            dest,
            state: Some(state),
            meta: Vec::new(),
        }
    }

    /// Serialize this envelope into the message's meta slot
    pub fn pack(&self, msg: &mut Message) -> Result<()> {
        msg.head.meta = encode(self)?;
        Ok(())
    }

    /// Extract the envelope from the message's meta slot, leaving the slot
    /// empty for the upper layer's metadata to be restored into
    pub fn unpack(msg: &mut Message) -> Result<Self> {
        let env = decode(&msg.head.meta)?;
        msg.head.meta.clear();
        Ok(env)
    }
}
