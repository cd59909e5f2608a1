//! Network module
//!
//! TCP transport for overlay sessions: length-prefixed bincode framing, a
//! signed hello handshake, and the dial scheduler. The overlay core only
//! assumes ordered, authenticated bytes per peer; everything in here is the
//! lean reference transport satisfying that contract.

pub mod connection;
pub mod dialer;

/// Maximum frame size in bytes (16 MB)
/// This prevents DoS attacks via oversized frames
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;
