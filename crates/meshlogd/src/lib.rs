//! meshlogd - replicated notification log service
//!
//! This crate provides:
//! - The locked notification log (append, query, GC, snapshot)
//! - Snapshot persistence with atomic file replacement
//! - The gossip callback surface for mesh transports
//! - Background maintenance (GC + snapshot rotation + graceful shutdown)

pub mod config;
pub mod gossip;
pub mod log;
pub mod maintenance;
pub mod snapshot;

pub use config::Config;
pub use gossip::{GossipChannel, Gossiper, PeerName, TransportFactory};
pub use log::{q_group_key, q_receiver, LogError, LogOptions, NotificationLog, QueryParam};
