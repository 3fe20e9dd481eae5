//! Peerlease: coordination primitives on a shared versioned document.
//!
//! This crate builds two small primitives on top of a single
//! externally-owned, versioned document: a replicated peer-list register
//! that accumulates cluster membership, and lease-based leader election
//! that keeps at most one live leader per group.  There is no purpose-built
//! consensus service behind either; every race reduces to the store's
//! optimistic-concurrency contract, where each write carries the last
//! observed version token and stale writers observe a conflict instead of
//! losing an update.
//!
//! A caller binds a [`DocumentHandle`] to one document, populates its cache
//! with `init`, then drives the peer register and/or the election against
//! that cache.  Write conflicts are expected events: the peer register
//! re-fetches and recomputes, the election simply waits for its next tick.

pub mod codec;
pub mod config;
pub mod document;
pub mod election;
pub mod errors;
pub mod peers;
pub mod store;

pub use config::{Config, DocumentConfig, ElectionConfig, RetryConfig};
pub use document::DocumentHandle;
pub use election::{
    LeaseElection, LeaseRecord, Role, DEFAULT_LEASE_DURATION, LEADER_ANNOTATION_KEY,
};
pub use errors::CoordError;
pub use peers::{PeerInfo, PeerList, PEERS_ANNOTATION_KEY};
pub use store::backend::{DocumentStore, VersionedDocument};
pub use store::memory::MemoryDocumentStore;
