//! Peer handles and the peer pool
//!
//! Peers are owned exclusively by the [`PeerPool`] arena; the routing table
//! and leaf set refer to them by identifier only. A peer handle couples the
//! remote node's identity and advertised endpoints with its outbound
//! message queue and the two per-peer scalars the state engine maintains:
//! the version of the peer's last admitted snapshot and its last advertised
//! passivity.
//!
//! Outbound sends are non-blocking: a full queue drops the frame (upper
//! layers own end-to-end retransmission) and the connection's writer task
//! drains in order.

use crate::id::Id;
use crate::proto::Message;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};

/// Handle to a connected remote node
pub struct Peer {
    /// Overlay identifier of the remote node
    pub node_id: Id,
    /// Endpoints the remote advertised during the handshake
    pub endpoints: Vec<String>,
    /// Version scalar of the peer's last admitted state snapshot
    state_time: AtomicU64,
    /// Passivity advertised by the peer's previous heartbeat
    passive: AtomicBool,
    /// Outbound frame queue, drained by the connection's writer task
    outbound: mpsc::Sender<Message>,
    /// Closes the connection tasks when flipped to true
    closing: watch::Sender<bool>,
}

impl Peer {
    /// Create a peer handle around an outbound queue
    pub fn new(node_id: Id, endpoints: Vec<String>, outbound: mpsc::Sender<Message>) -> Self {
        let (closing, _) = watch::channel(false);
        Self {
            node_id,
            endpoints,
            state_time: AtomicU64::new(0),
            passive: AtomicBool::new(false),
            outbound,
            closing,
        }
    }

    /// Queue a message for the peer without blocking
    ///
    /// Returns false if the frame was dropped because the queue is full or
    /// the connection is gone.
    pub fn enqueue(&self, msg: Message) -> bool {
        match self.outbound.try_send(msg) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::debug!(peer = %self.node_id, "outbound queue full, dropping frame");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Version of the last admitted state snapshot
    pub fn state_time(&self) -> u64 {
        self.state_time.load(Ordering::Acquire)
    }

    /// Advance the admitted-state version, keeping it monotonic
    pub fn advance_state_time(&self, updated: u64) {
        self.state_time.fetch_max(updated, Ordering::AcqRel);
    }

    /// Passivity the peer advertised on its previous heartbeat
    pub fn passive(&self) -> bool {
        self.passive.load(Ordering::Acquire)
    }

    /// Record the passivity from the latest heartbeat
    pub fn set_passive(&self, passive: bool) {
        self.passive.store(passive, Ordering::Release);
    }

    /// Ask the connection tasks to shut down
    pub fn close(&self) {
        let _ = self.closing.send(true);
    }

    /// Subscribe to the close signal
    pub fn closed(&self) -> watch::Receiver<bool> {
        self.closing.subscribe()
    }
}

/// Arena owning every connected peer, keyed by identifier
#[derive(Default)]
pub struct PeerPool {
    peers: DashMap<Id, Arc<Peer>>,
}

impl PeerPool {
    /// Create an empty pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a peer, rejecting a duplicate identifier
    pub fn insert(&self, peer: Arc<Peer>) -> bool {
        match self.peers.entry(peer.node_id) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(peer);
                true
            }
        }
    }

    /// Look up a peer by identifier
    pub fn get(&self, id: Id) -> Option<Arc<Peer>> {
        self.peers.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// Whether a connection to the identifier exists
    pub fn contains(&self, id: Id) -> bool {
        self.peers.contains_key(&id)
    }

    /// Remove and return a peer
    pub fn remove(&self, id: Id) -> Option<Arc<Peer>> {
        self.peers.remove(&id).map(|(_, peer)| peer)
    }

    /// Snapshot of every pooled peer
    pub fn peers(&self) -> Vec<Arc<Peer>> {
        self.peers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Number of pooled peers
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Whether the pool is empty
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Remove every peer, returning the handles for cleanup
    pub fn drain(&self) -> Vec<Arc<Peer>> {
        let ids: Vec<Id> = self.peers.iter().map(|entry| *entry.key()).collect();
        ids.into_iter().filter_map(|id| self.remove(id)).collect()
    }
}

/// Tracks the most recent application-level exchange per peer
///
/// Feeds the passive-drop rule: a peer counts as active while an
/// application message moved in either direction within the window.
pub struct TrafficLog {
    last: DashMap<Id, Instant>,
    window: Duration,
}

impl TrafficLog {
    /// Create a log with the given activity window
    pub fn new(window: Duration) -> Self {
        Self {
            last: DashMap::new(),
            window,
        }
    }

    /// Record an application exchange with the peer
    pub fn touch(&self, id: Id) {
        self.last.insert(id, Instant::now());
    }

    /// Whether the peer saw application traffic within the window
    pub fn active(&self, id: Id) -> bool {
        self.last
            .get(&id)
            .map(|at| at.elapsed() <= self.window)
            .unwrap_or(false)
    }

    /// Drop the record of a departed peer
    pub fn forget(&self, id: Id) {
        self.last.remove(&id);
    }
}
