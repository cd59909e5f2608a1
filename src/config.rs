//! Overlay configuration
//!
//! This module fixes the parameters of the identifier space and defines the
//! tunable knobs of a running overlay node. The space parameters are
//! compile-time constants: every node in a network must agree on them, so
//! they are not part of the runtime configuration.

use std::time::Duration;

/// Width of the identifier space in bits.
///
/// Identifiers live on a circle of size `2^SPACE_BITS`.
pub const SPACE_BITS: usize = 128;

/// Bits per routing digit. With 4 bits a digit is one hex nibble.
pub const DIGIT_BITS: usize = 4;

/// Number of digits in an identifier, which is also the number of rows in
/// the prefix routing table.
pub const DIGIT_COUNT: usize = SPACE_BITS / DIGIT_BITS;

/// Number of distinct digit values, which is also the number of columns in
/// each routing table row.
pub const RADIX: usize = 1 << DIGIT_BITS;

/// Runtime configuration for an overlay node
///
/// All fields have sensible defaults; construct with `OverlayConfig::default()`
/// and override what you need.
#[derive(Debug, Clone)]
pub struct OverlayConfig {
    /// Maximum number of leaf-set peers kept around the local identifier
    pub leaf_count: usize,

    /// Interval between heartbeat state broadcasts
    pub heartbeat: Duration,

    /// Window after the last application exchange during which a peer
    /// counts as active for the passive-drop rule
    pub idle_window: Duration,

    /// Capacity of the maintenance channel carrying admitted state snapshots
    pub maintenance_buffer: usize,

    /// Capacity of the maintenance channel carrying peer-drop requests
    pub drop_buffer: usize,

    /// Capacity of the per-peer outbound message queue
    pub outbound_queue: usize,

    /// Capacity of the dial scheduler queue
    pub dial_buffer: usize,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            leaf_count: 8,
            heartbeat: Duration::from_secs(1),
            idle_window: Duration::from_secs(3),
            maintenance_buffer: 64,
            drop_buffer: 16,
            outbound_queue: 64,
            dial_buffer: 32,
        }
    }
}
