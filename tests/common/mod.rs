//! Common test helpers and utilities
//!
//! Shared fixtures for spinning up in-process overlay nodes on loopback
//! sockets and observing what their applications receive.

use lattica::{Application, Id, Identity, Message, Overlay, OverlayConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Application sink that records every terminal delivery
pub struct TestApp {
    delivered_tx: mpsc::UnboundedSender<(Message, Id)>,
}

impl Application for TestApp {
    fn deliver(&self, msg: Message, dest: Id) {
        let _ = self.delivered_tx.send((msg, dest));
    }

    fn forward(&self, _msg: &mut Message, _dest: Id) -> bool {
        true
    }
}

/// A running overlay node plus the stream of messages its app received
pub struct TestNode {
    pub overlay: Arc<Overlay>,
    pub addr: SocketAddr,
    pub delivered: mpsc::UnboundedReceiver<(Message, Id)>,
}

/// Create a deterministic identity from a single seed byte
pub fn identity(seed: u8) -> Identity {
    Identity::from_seed(&[seed; 32])
}

/// Initialize logging for the test binary; `RUST_LOG` overrides the default
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("lattica=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Start a node on an ephemeral loopback port
pub async fn spawn_node(seed: u8, config: OverlayConfig) -> TestNode {
    init_logging();
    let (delivered_tx, delivered) = mpsc::unbounded_channel();
    let overlay = Overlay::new(identity(seed), config, Arc::new(TestApp { delivered_tx }));
    let addr = overlay
        .start("127.0.0.1:0".parse().unwrap())
        .await
        .expect("node should bind a loopback port");
    TestNode {
        overlay,
        addr,
        delivered,
    }
}

/// A configuration with a fast gossip cadence for tests
pub fn fast_config() -> OverlayConfig {
    OverlayConfig {
        heartbeat: Duration::from_millis(200),
        idle_window: Duration::from_millis(600),
        ..OverlayConfig::default()
    }
}

/// Poll a condition until it holds or the deadline passes
pub async fn wait_for<F: FnMut() -> bool>(mut cond: F, deadline: Duration) -> bool {
    let started = tokio::time::Instant::now();
    while started.elapsed() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    cond()
}
