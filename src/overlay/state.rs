//! System-message processing
//!
//! Every message carrying a state snapshot passes through [`Overlay::process`],
//! whether it terminates here or transits on its way elsewhere. Three
//! disjoint cases, keyed on the snapshot's shape:
//!
//! - **Join** (`updated == 0`): connect the joiner, or answer with state if
//!   the connection already exists and the local node is itself mid-join.
//! - **State update** (`updated > 0`): admit if newer than the peer's last
//!   snapshot, answer repair requests, and publish to the maintenance task.
//! - **Heartbeat filtering**: two consecutive passive beats from a peer the
//!   local node has no application traffic with push the peer onto the drop
//!   channel; one passive beat is merely remembered for the next.
//!
//! Channel publishes may wait for the maintenance task; no table lock is
//! ever held across them.

use super::{Overlay, Peer, Status};
use crate::id::Id;
use crate::network::dialer;
use crate::proto::NodeState;
use std::sync::Arc;

impl Overlay {
    /// Process a system message addressed to (or transiting through) the
    /// local node
    ///
    /// `src` is the connection the message arrived on; locally originated
    /// system messages carry no source and their update branch is a no-op.
    pub(crate) async fn process(&self, src: Option<&Arc<Peer>>, dest: Id, state: NodeState) {
        if state.is_join() {
            self.process_join(dest, &state);
            return;
        }

        let Some(src) = src else { return };

        if state.updated > src.state_time() {
            src.advance_state_time(state.updated);
            if state.repair {
                self.send_state(src, false);
            }
            // Never drop an admitted snapshot: wait for the maintenance
            // task if its channel is full. Send failure means shutdown.
            if self.up_tx.send(state.clone()).await.is_err() {
                return;
            }
        }

        // Drop after two consecutive passive beats, provided the local
        // node is idle toward the peer as well
        if src.passive() && state.passive && !self.is_active(src.node_id) {
            let _ = self.drop_tx.send(src.node_id).await;
        } else {
            src.set_passive(state.passive);
        }
    }

    fn process_join(&self, dest: Id, state: &NodeState) {
        // Rare self-join race during an update: discard
        if dest == self.node_id {
            return;
        }

        match self.pool.get(dest) {
            None => {
                // Unknown joiner: dial whatever endpoints resolved and let
                // the handshake run the state exchange
                self.dialer.schedule(dialer::resolve(state.endpoints_of(dest)));
            }
            Some(peer) => {
                // The handshake already exchanged state unless the local
                // node is still an outsider itself
                if self.status() != Status::Done {
                    self.send_state(&peer, false);
                }
            }
        }
    }
}
