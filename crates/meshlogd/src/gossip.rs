//! Gossip callback surface
//!
//! The log and the mesh transport are wired at construction: the transport
//! factory receives a weak log handle and returns the broadcast channel the
//! log owns. The transport drives replication exclusively through the
//! [`Gossiper`] callbacks; the log never performs network I/O itself.

use crate::log::{LogError, NotificationLog};
use meshlog_core::GossipState;
use std::sync::{Arc, Weak};
use tracing::debug;

/// Transport-level peer identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PeerName(pub u64);

impl std::fmt::Display for PeerName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "peer-{:x}", self.0)
    }
}

/// The callbacks a mesh transport invokes on the log.
pub trait Gossiper: Send + Sync {
    /// Complete state for introducing this replica to newcomers.
    fn full_state(&self) -> GossipState;

    /// Merge a received gossip payload. Returns the changed subset for
    /// onward propagation, or `None` when the payload carried no new
    /// information (a suppression hint to the transport).
    fn on_gossip(&self, msg: &[u8]) -> Result<Option<GossipState>, LogError>;

    /// Merge a broadcast payload from `src`. Always returns the delta,
    /// possibly empty.
    fn on_broadcast(&self, src: PeerName, msg: &[u8]) -> Result<GossipState, LogError>;

    /// Unicast payloads are not part of the protocol. Receiving one is a
    /// programmer error in the transport wiring.
    fn on_unicast(&self, src: PeerName, msg: &[u8]);
}

/// The transport handle the log broadcasts deltas through.
pub trait GossipChannel: Send + Sync {
    fn broadcast(&self, delta: &GossipState);
}

/// Produces the transport handle for a log replica.
///
/// The factory receives a weak back-reference to the log: the log owns the
/// returned channel, so a transport holding a strong handle would form a
/// reference cycle and leak both. Upgrade the reference per callback
/// dispatch and treat a failed upgrade as the log having shut down.
pub type TransportFactory =
    Box<dyn FnOnce(Weak<NotificationLog>) -> Arc<dyn GossipChannel> + Send>;

impl Gossiper for NotificationLog {
    fn full_state(&self) -> GossipState {
        self.state.read().clone()
    }

    fn on_gossip(&self, msg: &[u8]) -> Result<Option<GossipState>, LogError> {
        let incoming = GossipState::decode(msg)?;
        let delta = self.state.write().merge_delta(incoming);
        if delta.is_empty() {
            Ok(None)
        } else {
            Ok(Some(delta))
        }
    }

    fn on_broadcast(&self, src: PeerName, msg: &[u8]) -> Result<GossipState, LogError> {
        let incoming = GossipState::decode(msg)?;
        let delta = self.state.write().merge_delta(incoming);
        debug!(%src, changed = delta.len(), "merged broadcast");
        Ok(delta)
    }

    fn on_unicast(&self, src: PeerName, _msg: &[u8]) {
        panic!("unicast gossip from {src} is not supported");
    }
}
