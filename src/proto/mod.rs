//! Wire types and serialization
//!
//! This module defines the carrier message exchanged between peers and the
//! binary codec used for every frame on the wire. All wire types use serde
//! with the bincode codec for compact, deterministic binary serialization.
//!
//! A carrier [`Message`] is deliberately dumb: a payload plus a header whose
//! `meta` slot is an opaque byte string. Each layer of the stack owns the
//! slot while the message traverses it; the overlay packs its
//! [`Envelope`](envelope::Envelope) around whatever the upper layer left
//! there, and restores it before handing the message back up.

pub mod envelope;
pub mod state;

pub use envelope::Envelope;
pub use state::NodeState;

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Message header
///
/// `meta` is the layer-owned metadata slot. `key` and `iv` carry the
/// symmetric material while the payload is encrypted; both are `None` on a
/// cleartext message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Header {
    /// Metadata slot owned by whichever layer currently carries the message
    pub meta: Vec<u8>,
    /// Symmetric payload key, present only while the payload is encrypted
    pub key: Option<Vec<u8>>,
    /// Cipher nonce, present only while the payload is encrypted
    pub iv: Option<Vec<u8>>,
}

/// A message travelling through the overlay
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message header
    pub head: Header,
    /// Opaque payload
    pub data: Vec<u8>,
}

impl Message {
    /// Create a cleartext message around a payload
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            head: Header::default(),
            data,
        }
    }

    /// Whether the payload is currently encrypted
    pub fn encrypted(&self) -> bool {
        self.head.key.is_some()
    }
}

/// Serialize a wire value to bytes
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    bincode::serialize(value).map_err(|e| Error::Codec(format!("encode failed: {}", e)))
}

/// Deserialize a wire value from bytes
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    bincode::deserialize(bytes).map_err(|e| Error::Codec(format!("decode failed: {}", e)))
}
