//! Dial scheduling
//!
//! The overlay core never dials synchronously: it submits "dial these
//! endpoints" batches to a [`Dialer`] and moves on. The built-in
//! [`DialQueue`] feeds a worker task that attempts each batch on its own
//! task, so one unresponsive address cannot stall membership changes.

use crate::network::connection;
use crate::overlay::Overlay;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Scheduler accepting dial requests from the overlay core
///
/// `schedule` must not block; each batch is the address list of a single
/// peer, tried in order until a session is established.
pub trait Dialer: Send + Sync {
    /// Submit one peer's endpoints for dialing
    fn schedule(&self, endpoints: Vec<SocketAddr>);
}

/// The built-in dial scheduler: a bounded queue drained by a worker task
pub struct DialQueue {
    tx: mpsc::Sender<Vec<SocketAddr>>,
}

impl DialQueue {
    /// Create the queue and hand back the worker's receiving end
    pub(crate) fn new(capacity: usize) -> (Arc<Self>, mpsc::Receiver<Vec<SocketAddr>>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Arc::new(Self { tx }), rx)
    }
}

impl Dialer for DialQueue {
    fn schedule(&self, endpoints: Vec<SocketAddr>) {
        // A full queue sheds the batch; membership converges through the
        // next gossip round anyway
        if self.tx.try_send(endpoints).is_err() {
            tracing::debug!("dial queue full, dropping batch");
        }
    }
}

/// Worker loop draining the dial queue until shutdown
pub(crate) async fn run(overlay: Arc<Overlay>, mut rx: mpsc::Receiver<Vec<SocketAddr>>) {
    let mut shutdown = overlay.subscribe_shutdown();
    loop {
        tokio::select! {
            batch = rx.recv() => match batch {
                Some(endpoints) => {
                    tokio::spawn(connection::outbound(Arc::clone(&overlay), endpoints));
                }
                None => break,
            },
            _ = shutdown.wait_for(|stop| *stop) => break,
        }
    }
}

/// Resolve advertised `host:port` strings to socket addresses
///
/// Endpoints that fail to resolve are logged and skipped; one bad entry
/// never aborts the batch.
pub(crate) fn resolve(endpoints: &[String]) -> Vec<SocketAddr> {
    endpoints
        .iter()
        .filter_map(|endpoint| match endpoint.parse::<SocketAddr>() {
            Ok(addr) => Some(addr),
            Err(err) => {
                tracing::warn!(%endpoint, %err, "failed to resolve endpoint");
                None
            }
        })
        .collect()
}
