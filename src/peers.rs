//! Peer-list register.
//!
//! Cluster membership accumulates in one annotation of the shared document
//! as an append-only list of peers.  The list itself enforces nothing; the
//! register stays correct under races because writers go through
//! conditional updates and recompute their desired list against a fresh
//! copy after every conflict.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::codec;
use crate::config::RetryConfig;
use crate::document::DocumentHandle;
use crate::errors::CoordError;

/// Annotation key the peer list is stored under.
pub const PEERS_ANNOTATION_KEY: &str = "peerlease.io/peers";

/// One cluster member.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PeerInfo {
    /// Globally unique, stable identifier of the process or node.
    pub peer_id: String,
    /// Human-readable name, e.g. the host name.
    pub display_name: String,
}

/// The membership register: insertion-ordered, grows monotonically.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct PeerList {
    #[serde(default)]
    pub peers: Vec<PeerInfo>,
}

impl PeerList {
    /// Whether some entry carries this `peer_id`.
    pub fn contains(&self, peer_id: &str) -> bool {
        self.peers.iter().any(|peer| peer.peer_id == peer_id)
    }

    /// Append unconditionally.  Callers wanting at-most-once registration
    /// check [`PeerList::contains`] first; under retries the register keeps
    /// at-least-once semantics.
    pub fn add(&mut self, peer_id: impl Into<String>, display_name: impl Into<String>) {
        self.peers.push(PeerInfo {
            peer_id: peer_id.into(),
            display_name: display_name.into(),
        });
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

/// Decode the peer list from the handle's cached document.  An absent
/// annotation is an empty list.
pub fn peer_list(handle: &DocumentHandle) -> Result<PeerList, CoordError> {
    codec::decode(PEERS_ANNOTATION_KEY, handle.annotation(PEERS_ANNOTATION_KEY)?)
}

/// Encode the list and submit it through a conditional update.
///
/// A [`CoordError::Conflict`] propagates: the caller must re-`fetch` and
/// recompute its desired list against the refreshed state before retrying.
/// Blindly resubmitting the stale list would silently drop whatever a
/// concurrent writer just added.
pub async fn update_peer_list(
    handle: &mut DocumentHandle,
    list: &PeerList,
) -> Result<(), CoordError> {
    let blob = codec::encode(PEERS_ANNOTATION_KEY, list)?;
    handle.conditional_update(PEERS_ANNOTATION_KEY, &blob).await
}

/// Register a peer once, racing politely with concurrent registrants.
///
/// Reads the cached list and returns it unchanged when `peer_id` is already
/// present.  Otherwise appends and attempts the conditional write; on a
/// conflict it backs off, re-fetches, re-checks containment against the
/// refreshed list and tries again, bounded by `retry.max_attempts`.
/// Returns the list as last observed.
pub async fn register_peer(
    handle: &mut DocumentHandle,
    peer_id: &str,
    display_name: &str,
    retry: &RetryConfig,
) -> Result<PeerList, CoordError> {
    for attempt in 0..retry.max_attempts {
        if attempt > 0 {
            tokio::time::sleep(retry.backoff(attempt)).await;
            handle.fetch().await?;
        }

        let mut list = peer_list(handle)?;
        if list.contains(peer_id) {
            return Ok(list);
        }
        list.add(peer_id, display_name);

        match update_peer_list(handle, &list).await {
            Ok(()) => return Ok(list),
            Err(err) if err.is_conflict() => {
                debug!("peer list write for {} lost a version race", peer_id);
            }
            Err(err) => return Err(err),
        }
    }
    Err(CoordError::RetriesExhausted {
        attempts: retry.max_attempts,
    })
}
