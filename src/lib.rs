//! # Lattica
//!
//! A structured peer-to-peer overlay routing core for decentralized
//! messaging: a simplified Pastry design with a leaf set and prefix
//! routing table, but no proximity metric. Messages are addressed by a
//! point on a circular 128-bit identifier space and routed to the live
//! node numerically closest to it, while gossip-style state exchange and
//! heartbeats keep the routing state converging under churn.
//!
//! ## Quick Start
//!
//! ```no_run
//! use lattica::{Application, Id, Identity, Message, Overlay, OverlayConfig};
//! use std::sync::Arc;
//!
//! struct Sink;
//!
//! impl Application for Sink {
//!     fn deliver(&self, msg: Message, _dest: Id) {
//!         println!("delivered {} bytes", msg.data.len());
//!     }
//!     fn forward(&self, _msg: &mut Message, _dest: Id) -> bool {
//!         true
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> lattica::Result<()> {
//!     let overlay = Overlay::new(Identity::generate(), OverlayConfig::default(), Arc::new(Sink));
//!     overlay.start("0.0.0.0:7100".parse().unwrap()).await?;
//!     overlay.join("203.0.113.7:7100".parse().unwrap());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod crypto;
pub mod error;
pub mod id;
pub mod network;
pub mod overlay;
pub mod proto;

// Re-export main types
pub use config::OverlayConfig;
pub use crypto::Identity;
pub use error::{Error, Result};
pub use id::Id;
pub use network::dialer::Dialer;
pub use overlay::{Application, Overlay, RouteDecision, RoutingTable, Status};
pub use proto::{Envelope, Message, NodeState};
