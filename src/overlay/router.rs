//! Per-message routing decision and dispatch
//!
//! `route` is the hot path: every inbound or locally originated message
//! takes one shared-lock table lookup and dispatches on the returned
//! decision. Application callbacks and channel publishes happen with no
//! lock held, so a callback is free to re-enter `route`; the price is that
//! the forwarding target must be re-validated against the pool before the
//! actual send, and a vanished target silently drops the message.

use super::{Overlay, Peer, RouteDecision};
use crate::id::Id;
use crate::proto::{Envelope, Message};
use std::sync::Arc;

/// Application-layer sink for messages leaving the overlay
///
/// Both callbacks run on routing tasks and must return promptly.
pub trait Application: Send + Sync {
    /// Terminal delivery of a message addressed to (or closest to) the
    /// local node
    fn deliver(&self, msg: Message, dest: Id);

    /// Interception hook invoked before a message is forwarded onward;
    /// returning false drops the message. The implementation may mutate
    /// the message's meta slot and the mutation travels with it.
    fn forward(&self, msg: &mut Message, dest: Id) -> bool;
}

impl Overlay {
    /// Route a message one hop: deliver locally or forward to the peer the
    /// table names
    pub(crate) async fn route(&self, src: Option<&Arc<Peer>>, env: Envelope, msg: Message) {
        let decision = { self.table.read().lookup(env.dest) };
        match decision {
            RouteDecision::Local => self.deliver(src, env, msg).await,
            RouteDecision::Forward(next) => self.forward(src, env, msg, next).await,
        }
    }

    /// Terminal handling: system messages go to the state engine, data
    /// messages to the application with the overlay metadata stripped
    async fn deliver(&self, src: Option<&Arc<Peer>>, env: Envelope, mut msg: Message) {
        match env.state {
            Some(state) => self.process(src, env.dest, state).await,
            None => {
                if let Some(src) = src {
                    self.traffic.touch(src.node_id);
                }
                msg.head.meta = env.meta;
                self.app.deliver(msg, env.dest);
            }
        }
    }

    /// Forward a message to the given peer, processing it first if it is a
    /// system message and consulting the application if it is not
    async fn forward(&self, src: Option<&Arc<Peer>>, mut env: Envelope, mut msg: Message, next: Id) {
        // System messages transit: process locally, then re-emit intact
        if let Some(state) = env.state.clone() {
            self.process(src, env.dest, state).await;
            if let Some(peer) = self.pool.get(next) {
                self.transmit(&peer, &env, msg);
            }
            return;
        }

        // Application message: hand the upper layer its meta back and ask
        // whether the traversal may continue
        msg.head.meta = std::mem::take(&mut env.meta);
        if !self.app.forward(&mut msg, env.dest) {
            return;
        }

        // Repack around whatever meta the application left and send, unless
        // the target disappeared between lookup and now
        if let Some(peer) = self.pool.get(next) {
            env.meta = std::mem::take(&mut msg.head.meta);
            self.traffic.touch(next);
            self.transmit(&peer, &env, msg);
        }
    }

    fn transmit(&self, peer: &Peer, env: &Envelope, mut msg: Message) -> bool {
        if env.pack(&mut msg).is_err() {
            return false;
        }
        peer.enqueue(msg)
    }
}
