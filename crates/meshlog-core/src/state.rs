//! Convergent notification state
//!
//! The replicated state is a map from composite key to the single most
//! recent [`MeshEntry`] for that key. Each key is a last-writer-wins
//! register: merging keeps whichever side carries the strictly greater
//! timestamp, so replicas that have exchanged all messages agree pointwise
//! regardless of delivery order or duplication.

use crate::codec;
use crate::error::Result;
use crate::types::{MeshEntry, Receiver};
use bytes::{BufMut, Bytes, BytesMut};
use std::collections::hash_map::Entry as MapEntry;
use std::collections::HashMap;
use std::io::Read;

/// Separator between group key and canonical receiver in a state key.
/// NUL cannot appear in a canonical receiver form.
const KEY_SEPARATOR: u8 = 0;

/// Split threshold for gossip payload blocks (1 MiB), chosen to stay under
/// the transport MTU for a single gossip message.
const MAX_BLOCK_BYTES: usize = 1024 * 1024;

/// Composite state-map key for a (group key, receiver) pair.
pub fn state_key(group_key: &[u8], receiver: &Receiver) -> Vec<u8> {
    let canonical = receiver.canonical();
    let mut key = Vec::with_capacity(group_key.len() + 1 + canonical.len());
    key.extend_from_slice(group_key);
    key.push(KEY_SEPARATOR);
    key.extend_from_slice(canonical.as_bytes());
    key
}

/// The per-replica notification state, shared over gossip.
#[derive(Clone, Debug, Default)]
pub struct GossipState {
    entries: HashMap<Vec<u8>, MeshEntry>,
}

impl GossipState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a gossip payload into a transient state.
    pub fn decode(msg: &[u8]) -> Result<Self> {
        Self::read_from(&mut &*msg)
    }

    /// Read length-delimited entries until end of stream. Shared by gossip
    /// payload decoding and snapshot loading.
    pub fn read_from(r: &mut impl Read) -> Result<Self> {
        let mut st = Self::new();
        while let Some(e) = codec::read_entry(r)? {
            st.insert(e);
        }
        Ok(st)
    }

    /// Insert an entry under its own composite key, unconditionally.
    pub fn insert(&mut self, e: MeshEntry) {
        let key = state_key(&e.entry.group_key, &e.entry.receiver);
        self.entries.insert(key, e);
    }

    pub fn get(&self, key: &[u8]) -> Option<&MeshEntry> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over all entries in unspecified order.
    pub fn entries(&self) -> impl Iterator<Item = &MeshEntry> {
        self.entries.values()
    }

    /// Keep only entries satisfying the predicate. Returns the number of
    /// entries removed.
    pub fn retain(&mut self, f: impl FnMut(&Vec<u8>, &mut MeshEntry) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(f);
        before - self.entries.len()
    }

    /// Merge `other` into this state pointwise.
    ///
    /// A remote entry replaces the local one only when its timestamp is
    /// strictly greater; on equal timestamps the incumbent wins. The
    /// tie-break must stay "local wins" for convergence when the same update
    /// arrives via different peers.
    pub fn merge(&mut self, other: GossipState) {
        for (key, e) in other.entries {
            match self.entries.entry(key) {
                MapEntry::Vacant(slot) => {
                    slot.insert(e);
                }
                MapEntry::Occupied(mut slot) => {
                    if slot.get().entry.timestamp < e.entry.timestamp {
                        slot.insert(e);
                    }
                }
            }
        }
    }

    /// Merge like [`merge`](Self::merge), additionally collecting exactly
    /// the entries that changed this state. An empty delta means the merge
    /// was a no-op, which the transport uses as a suppression hint.
    pub fn merge_delta(&mut self, other: GossipState) -> GossipState {
        let mut delta = GossipState::new();
        for (key, e) in other.entries {
            match self.entries.entry(key.clone()) {
                MapEntry::Vacant(slot) => {
                    slot.insert(e.clone());
                    delta.entries.insert(key, e);
                }
                MapEntry::Occupied(mut slot) => {
                    if slot.get().entry.timestamp < e.entry.timestamp {
                        slot.insert(e.clone());
                        delta.entries.insert(key, e);
                    }
                }
            }
        }
        delta
    }

    /// Encode all entries into gossip payload blocks of at most 1 MiB
    /// each. Order across blocks is unspecified. An empty state yields no
    /// blocks.
    pub fn encode(&self) -> Vec<Bytes> {
        let mut blocks = Vec::new();
        let mut buf = BytesMut::new();
        for e in self.entries.values() {
            let mut framed = BytesMut::new().writer();
            codec::write_entry(&mut framed, e)
                .expect("encoding to an in-memory buffer cannot fail");
            let framed = framed.into_inner();
            if !buf.is_empty() && buf.len() + framed.len() > MAX_BLOCK_BYTES {
                blocks.push(buf.split().freeze());
            }
            buf.extend_from_slice(&framed);
        }
        if !buf.is_empty() {
            blocks.push(buf.freeze());
        }
        blocks
    }
}

impl FromIterator<MeshEntry> for GossipState {
    fn from_iter<T: IntoIterator<Item = MeshEntry>>(iter: T) -> Self {
        let mut st = Self::new();
        for e in iter {
            st.insert(e);
        }
        st
    }
}
