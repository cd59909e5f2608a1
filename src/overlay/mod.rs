//! Overlay node and its background drivers
//!
//! This module wires the routing core together: the [`Overlay`] owns the
//! routing table, the peer pool, and the channels feeding the single
//! maintenance task that is allowed to mutate the table. Routing threads
//! (one per peer connection) only ever take shared reads; everything that
//! changes topology (admitted state snapshots, peer drops) funnels through
//! the bounded `up` and `drop` channels and is applied by the maintenance
//! task in arrival order.
//!
//! # Lifecycle
//!
//! ```no_run
//! use lattica::crypto::Identity;
//! use lattica::config::OverlayConfig;
//! use lattica::overlay::{Application, Overlay};
//! use lattica::proto::Message;
//! use lattica::id::Id;
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl Application for Printer {
//!     fn deliver(&self, msg: Message, _dest: Id) {
//!         println!("got {} bytes", msg.data.len());
//!     }
//!     fn forward(&self, _msg: &mut Message, _dest: Id) -> bool {
//!         true
//!     }
//! }
//!
//! # async fn example() -> lattica::error::Result<()> {
//! let overlay = Overlay::new(Identity::generate(), OverlayConfig::default(), Arc::new(Printer));
//! overlay.start("0.0.0.0:0".parse().unwrap()).await?;
//! overlay.join("203.0.113.7:7100".parse().unwrap());
//! # Ok(())
//! # }
//! ```

mod peer;
mod router;
mod state;
mod table;

pub use peer::{Peer, PeerPool, TrafficLog};
pub use router::Application;
pub use table::{RouteDecision, RoutingTable};

use crate::config::OverlayConfig;
use crate::crypto::Identity;
use crate::error::{Error, Result};
use crate::id::Id;
use crate::network::connection;
use crate::network::dialer::{self, DialQueue, Dialer};
use crate::proto::{Envelope, Message, NodeState};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Join progress of the local node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    /// Freshly constructed, not yet dialing anyone
    Booting = 0,
    /// Join request in flight, waiting for the first merged state
    Joining = 1,
    /// Member of the overlay
    Done = 2,
}

impl Status {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Status::Booting,
            1 => Status::Joining,
            _ => Status::Done,
        }
    }
}

/// Receivers handed to the background tasks on startup
pub(crate) struct PendingTasks {
    pub(crate) up_rx: mpsc::Receiver<NodeState>,
    pub(crate) drop_rx: mpsc::Receiver<Id>,
    pub(crate) dial_rx: Option<mpsc::Receiver<Vec<SocketAddr>>>,
}

/// A node of the structured overlay
pub struct Overlay {
    pub(crate) identity: Identity,
    pub(crate) node_id: Id,
    pub(crate) config: OverlayConfig,
    pub(crate) app: Arc<dyn Application>,

    /// Routing state; shared reads from routing threads, exclusive writes
    /// from the maintenance task only
    pub(crate) table: RwLock<RoutingTable>,
    pub(crate) pool: PeerPool,
    pub(crate) traffic: TrafficLog,

    status: AtomicU8,
    /// Local state version, bumped once per heartbeat; 0 is reserved for
    /// join requests so the counter starts at 1
    version: AtomicU64,
    /// Endpoints advertised for the local node, set when the listener binds
    pub(crate) endpoints: RwLock<Vec<String>>,

    pub(crate) up_tx: mpsc::Sender<NodeState>,
    pub(crate) drop_tx: mpsc::Sender<Id>,
    pub(crate) dialer: Arc<dyn Dialer>,

    pub(crate) pending: Mutex<Option<PendingTasks>>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Overlay {
    /// Create an overlay node with the built-in TCP dialer
    pub fn new(identity: Identity, config: OverlayConfig, app: Arc<dyn Application>) -> Arc<Self> {
        let (dial_queue, dial_rx) = DialQueue::new(config.dial_buffer);
        Self::build(identity, config, app, dial_queue, Some(dial_rx))
    }

    /// Create an overlay node with a caller-supplied dial scheduler
    ///
    /// The overlay submits "dial these endpoints" batches to the scheduler
    /// and expects completed handshakes to surface as registered peers.
    pub fn with_dialer(
        identity: Identity,
        config: OverlayConfig,
        app: Arc<dyn Application>,
        dialer: Arc<dyn Dialer>,
    ) -> Arc<Self> {
        Self::build(identity, config, app, dialer, None)
    }

    fn build(
        identity: Identity,
        config: OverlayConfig,
        app: Arc<dyn Application>,
        dialer: Arc<dyn Dialer>,
        dial_rx: Option<mpsc::Receiver<Vec<SocketAddr>>>,
    ) -> Arc<Self> {
        let node_id = identity.node_id();
        let (up_tx, up_rx) = mpsc::channel(config.maintenance_buffer);
        let (drop_tx, drop_rx) = mpsc::channel(config.drop_buffer);
        let (shutdown_tx, _) = watch::channel(false);

        Arc::new(Self {
            table: RwLock::new(RoutingTable::new(node_id, config.leaf_count)),
            pool: PeerPool::new(),
            traffic: TrafficLog::new(config.idle_window),
            status: AtomicU8::new(Status::Booting as u8),
            version: AtomicU64::new(1),
            endpoints: RwLock::new(Vec::new()),
            up_tx,
            drop_tx,
            dialer,
            pending: Mutex::new(Some(PendingTasks {
                up_rx,
                drop_rx,
                dial_rx,
            })),
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
            identity,
            node_id,
            config,
            app,
        })
    }

    /// Identifier of the local node
    pub fn node_id(&self) -> Id {
        self.node_id
    }

    /// Current join status
    pub fn status(&self) -> Status {
        Status::from_u8(self.status.load(Ordering::Acquire))
    }

    pub(crate) fn set_status(&self, status: Status) {
        self.status.store(status as u8, Ordering::Release);
    }

    /// Number of connected peers
    pub fn peer_count(&self) -> usize {
        self.pool.len()
    }

    /// Snapshot of the current leaf set, local node included
    pub fn leaves(&self) -> Vec<Id> {
        self.table.read().leaves().to_vec()
    }

    /// Bind the listener and launch the background drivers
    ///
    /// Returns the bound address (useful with port 0). Must be called
    /// exactly once.
    pub async fn start(self: &Arc<Self>, listen: SocketAddr) -> Result<SocketAddr> {
        let listener = TcpListener::bind(listen).await?;
        let local = listener.local_addr()?;
        *self.endpoints.write() = vec![local.to_string()];

        let pending = self
            .pending
            .lock()
            .take()
            .ok_or_else(|| Error::Network("overlay already started".into()))?;
        self.launch(pending);

        let overlay = Arc::clone(self);
        let mut shutdown = self.shutdown_tx.subscribe();
        self.tasks.lock().push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    accepted = listener.accept() => match accepted {
                        Ok((stream, _)) => {
                            tokio::spawn(connection::inbound(Arc::clone(&overlay), stream));
                        }
                        Err(err) => {
                            tracing::warn!(%err, "accept failed");
                        }
                    },
                    _ = shutdown.wait_for(|stop| *stop) => break,
                }
            }
        }));

        tracing::info!(node = %self.node_id, %local, "overlay node listening");
        Ok(local)
    }

    /// Spawn the maintenance, heartbeat, and dialer tasks
    fn launch(self: &Arc<Self>, pending: PendingTasks) {
        let mut tasks = self.tasks.lock();
        tasks.push(tokio::spawn(maintenance(
            Arc::clone(self),
            pending.up_rx,
            pending.drop_rx,
        )));
        tasks.push(tokio::spawn(heartbeat(Arc::clone(self))));
        if let Some(dial_rx) = pending.dial_rx {
            tasks.push(tokio::spawn(dialer::run(Arc::clone(self), dial_rx)));
        }
    }

    /// Dial a bootstrap node and begin the join procedure
    ///
    /// The join request itself goes out once the handshake with the seed
    /// completes. Call after [`Overlay::start`].
    pub fn join(&self, seed: SocketAddr) {
        self.set_status(Status::Joining);
        self.dialer.schedule(vec![seed]);
    }

    /// Route an application message toward the node closest to `dest`
    ///
    /// Routing failures are local and silent: if no progress can be made
    /// the message is delivered back to the local application, and a peer
    /// vanishing mid-send drops the message (end-to-end retransmission is
    /// the caller's concern).
    pub async fn send(&self, dest: Id, mut msg: Message) {
        let env = Envelope::data(dest, std::mem::take(&mut msg.head.meta));
        self.route(None, env, msg).await;
    }

    /// Stop the overlay: close every peer connection, stop the background
    /// drivers, and wait for them to exit
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        for peer in self.pool.drain() {
            peer.close();
        }
        let handles: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
        tracing::info!(node = %self.node_id, "overlay node stopped");
    }

    pub(crate) fn subscribe_shutdown(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Register a freshly handshaken peer's follow-up traffic: the initial
    /// state exchange, plus the join request while the local node is still
    /// an outsider
    pub(crate) fn on_peer_connected(&self, peer: &Arc<Peer>) {
        self.send_state(peer, true);
        if self.status() != Status::Done {
            self.send_join(peer);
        }
    }

    /// Feed a lost connection back into the maintenance path
    pub(crate) async fn connection_lost(&self, id: Id) {
        let _ = self.drop_tx.send(id).await;
    }

    /// Whether the connection to a peer is still earning its keep: either
    /// application traffic moved within the idle window or the routing
    /// table references the peer
    pub(crate) fn is_active(&self, id: Id) -> bool {
        self.traffic.active(id) || self.table.read().contains(id)
    }

    /// Queue a state snapshot for the peer
    pub(crate) fn send_state(&self, peer: &Peer, repair: bool) -> bool {
        let state = NodeState {
            updated: self.version.load(Ordering::Acquire),
            repair,
            passive: !self.is_active(peer.node_id),
            addrs: self.snapshot_addrs(),
        };
        self.send_system(peer, peer.node_id, state)
    }

    /// Queue a join request for the local node via the given peer
    fn send_join(&self, peer: &Peer) -> bool {
        let state = NodeState::join_request(self.node_id, self.endpoints.read().clone());
        self.send_system(peer, self.node_id, state)
    }

    fn send_system(&self, peer: &Peer, dest: Id, state: NodeState) -> bool {
        let env = Envelope::system(dest, state);
        let mut msg = Message::default();
        if env.pack(&mut msg).is_err() {
            return false;
        }
        peer.enqueue(msg)
    }

    /// Address book covering the local node, the leaf set, and the routing
    /// table, keyed by decimal identifier
    fn snapshot_addrs(&self) -> BTreeMap<String, Vec<String>> {
        let mut addrs = BTreeMap::new();
        addrs.insert(self.node_id.to_string(), self.endpoints.read().clone());
        let entries = { self.table.read().entries() };
        for id in entries {
            if let Some(peer) = self.pool.get(id) {
                if !peer.endpoints.is_empty() {
                    addrs.insert(id.to_string(), peer.endpoints.clone());
                }
            }
        }
        addrs
    }

    /// Merge an admitted snapshot into the table and dial whoever is new
    ///
    /// Runs on the maintenance task, the only writer of the table.
    fn apply_state(&self, state: NodeState) {
        let ids = state.ids();
        let fresh = {
            let mut table = self.table.write();
            table.merge(&ids, |id| self.pool.contains(id))
        };

        for id in fresh {
            // Deterministic dial direction: the smaller identifier
            // initiates, so two nodes discovering each other in the same
            // gossip round do not cross-connect
            if id < self.node_id {
                continue;
            }
            let endpoints = dialer::resolve(state.endpoints_of(id));
            if !endpoints.is_empty() {
                self.dialer.schedule(endpoints);
            }
        }

        if self.status() != Status::Done {
            self.set_status(Status::Done);
            tracing::info!(node = %self.node_id, "joined the overlay");
        }
    }

    /// Tear down a dropped peer: pool, table, traffic log, connection
    fn drop_peer(&self, id: Id) {
        if let Some(peer) = self.pool.remove(id) {
            peer.close();
            tracing::debug!(peer = %id, "dropped peer connection");
        }
        self.table.write().remove(id);
        self.traffic.forget(id);
    }

    /// One heartbeat: bump the local version and gossip state to everyone
    fn beat(&self) {
        self.version.fetch_add(1, Ordering::AcqRel);
        for peer in self.pool.peers() {
            // Ask for a repair snapshot from peers we know nothing about yet
            self.send_state(&peer, peer.state_time() == 0);
        }
    }
}

/// Single consumer of the maintenance channels; the only table writer
async fn maintenance(
    overlay: Arc<Overlay>,
    mut up_rx: mpsc::Receiver<NodeState>,
    mut drop_rx: mpsc::Receiver<Id>,
) {
    let mut shutdown = overlay.subscribe_shutdown();
    loop {
        tokio::select! {
            state = up_rx.recv() => match state {
                Some(state) => overlay.apply_state(state),
                None => break,
            },
            id = drop_rx.recv() => match id {
                Some(id) => overlay.drop_peer(id),
                None => break,
            },
            _ = shutdown.wait_for(|stop| *stop) => break,
        }
    }
}

/// Periodic state gossip
async fn heartbeat(overlay: Arc<Overlay>) {
    let mut shutdown = overlay.subscribe_shutdown();
    let mut ticker = tokio::time::interval(overlay.config.heartbeat);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => overlay.beat(),
            _ = shutdown.wait_for(|stop| *stop) => break,
        }
    }
}
