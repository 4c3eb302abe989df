//! Meshlog Core Library
//!
//! This crate provides the protocol types, the length-delimited entry codec,
//! and the convergent state map for the meshlog replicated notification log.
//!
//! # Modules
//!
//! - [`types`]: Protocol types (Receiver, Entry, MeshEntry, LogInstant)
//! - [`codec`]: Length-delimited binary framing shared by snapshots and gossip
//! - [`state`]: Last-writer-wins state map with delta merge and block encoding
//! - [`error`]: Error types

pub mod codec;
pub mod error;
pub mod state;
pub mod types;

pub use error::{Error, Result};
pub use state::{state_key, GossipState};
pub use types::*;
