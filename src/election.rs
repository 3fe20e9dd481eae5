//! Lease-based leader election.
//!
//! Leadership is a time-bounded lease stored in one annotation of the
//! shared document.  Contenders race on conditional updates; the store's
//! version check guarantees at most one winner per document version, and
//! lease expiry bounds how long a crashed leader blocks the group.
//!
//! Each contender runs its own periodic loop, external to this crate,
//! calling [`LeaseElection::attempt_acquire_or_renew`] at an interval
//! shorter than the lease duration and refreshing the handle with `fetch`
//! before each tick.  A conflict means somebody else is mutating leadership
//! state right now, so the attempt simply reports follower and leaves the
//! re-evaluation to the next tick; the cost of the missed cycle is bounded
//! by the lease duration.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::codec;
use crate::config::ElectionConfig;
use crate::document::DocumentHandle;
use crate::errors::CoordError;

/// Annotation key the lease record is stored under.
pub const LEADER_ANNOTATION_KEY: &str = "peerlease.io/leader";

/// Lease duration used when none is configured.
pub const DEFAULT_LEASE_DURATION: Duration = Duration::from_secs(5);

/// The lease record persisted in the document.
///
/// The zero value (empty holder with epoch timestamps) decodes from an
/// absent annotation and is always already expired, so it never blocks a
/// contender.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct LeaseRecord {
    /// Identity of the current holder; empty means vacant.
    pub holder_identity: String,
    /// How long the lease stays live past `renewed_at`, in seconds.
    pub lease_duration_secs: i64,
    /// When the holder first acquired the lease.  Preserved across
    /// renewals, reset on a fresh acquisition.
    pub acquired_at: DateTime<Utc>,
    /// When the holder last renewed the lease.
    pub renewed_at: DateTime<Utc>,
}

impl LeaseRecord {
    /// Instant the lease stops being live unless renewed first.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.renewed_at + ChronoDuration::seconds(self.lease_duration_secs)
    }

    /// Whether the lease is live at `now`.  Strict comparison: a lease is
    /// dead at exactly `renewed_at + lease_duration`.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at()
    }

    pub fn is_held_by(&self, identity: &str) -> bool {
        self.holder_identity == identity
    }

    /// An empty holder means no process has ever acquired the lease, or the
    /// previous holder resigned.
    pub fn is_vacant(&self) -> bool {
        self.holder_identity.is_empty()
    }
}

/// What this process currently believes about its leadership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Follower,
    Leader,
}

/// Per-contender election state machine.
pub struct LeaseElection {
    identity: String,
    lease_duration: Duration,
    role: Role,
}

impl LeaseElection {
    /// A contender with the default lease duration.
    pub fn new(identity: impl Into<String>) -> Self {
        Self::with_lease_duration(identity, DEFAULT_LEASE_DURATION)
    }

    pub fn with_lease_duration(identity: impl Into<String>, lease_duration: Duration) -> Self {
        Self {
            identity: identity.into(),
            lease_duration,
            role: Role::Follower,
        }
    }

    pub fn from_config(identity: impl Into<String>, config: &ElectionConfig) -> Self {
        Self::with_lease_duration(identity, config.lease_duration())
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_leader(&self) -> bool {
        self.role == Role::Leader
    }

    pub fn lease_duration(&self) -> Duration {
        self.lease_duration
    }

    /// One election attempt against the handle's cached document.
    ///
    /// Returns `Ok(true)` when this process holds the lease after the
    /// attempt.  A conditional-update conflict or an unreachable store is an
    /// expected outcome, not an error: the attempt reports `Ok(false)`, the
    /// process drops to follower, and the next tick re-evaluates from
    /// scratch.  Only decode failures and handle misuse surface as `Err`.
    pub async fn attempt_acquire_or_renew(
        &mut self,
        handle: &mut DocumentHandle,
    ) -> Result<bool, CoordError> {
        // One clock read per attempt: the liveness check and the candidate
        // record must not disagree about "now".
        let now = Utc::now();
        self.attempt_acquire_or_renew_at(handle, now).await
    }

    /// Same as [`LeaseElection::attempt_acquire_or_renew`] with the clock
    /// pinned to `now`.
    pub async fn attempt_acquire_or_renew_at(
        &mut self,
        handle: &mut DocumentHandle,
        now: DateTime<Utc>,
    ) -> Result<bool, CoordError> {
        let existing: LeaseRecord =
            codec::decode(LEADER_ANNOTATION_KEY, handle.annotation(LEADER_ANNOTATION_KEY)?)?;

        if !existing.is_vacant() && !existing.is_held_by(&self.identity) && existing.is_live(now) {
            debug!(
                "lease held by {} until {}, {} stays follower",
                existing.holder_identity,
                existing.expires_at(),
                self.identity
            );
            self.role = Role::Follower;
            return Ok(false);
        }

        let mut candidate = LeaseRecord {
            holder_identity: self.identity.clone(),
            lease_duration_secs: self.lease_duration.as_secs() as i64,
            acquired_at: now,
            renewed_at: now,
        };
        // A renewal keeps the original acquisition time; this is the only
        // state the algorithm carries across iterations.
        if existing.is_held_by(&self.identity) {
            candidate.acquired_at = existing.acquired_at;
        }

        let blob = codec::encode(LEADER_ANNOTATION_KEY, &candidate)?;
        match handle.conditional_update(LEADER_ANNOTATION_KEY, &blob).await {
            Ok(()) => {
                self.role = Role::Leader;
                Ok(true)
            }
            Err(CoordError::NotInitialized) => Err(CoordError::NotInitialized),
            Err(err) if err.is_conflict() => {
                debug!("lease write by {} lost a version race", self.identity);
                self.role = Role::Follower;
                Ok(false)
            }
            Err(err) => {
                warn!("lease write by {} failed: {}", self.identity, err);
                self.role = Role::Follower;
                Ok(false)
            }
        }
    }

    /// Give up the lease without waiting for it to expire.
    ///
    /// Writes a vacated record (empty holder) instead of deleting the
    /// annotation, so concurrent acquirers still linearize against it.
    /// Returns `Ok(true)` when the vacated record was written; on a conflict
    /// or store failure the record is left to expire on its own.  Either
    /// way this process drops to follower.
    pub async fn resign(&mut self, handle: &mut DocumentHandle) -> Result<bool, CoordError> {
        self.role = Role::Follower;
        let existing: LeaseRecord =
            codec::decode(LEADER_ANNOTATION_KEY, handle.annotation(LEADER_ANNOTATION_KEY)?)?;
        if !existing.is_held_by(&self.identity) {
            return Ok(false);
        }

        let blob = codec::encode(LEADER_ANNOTATION_KEY, &LeaseRecord::default())?;
        match handle.conditional_update(LEADER_ANNOTATION_KEY, &blob).await {
            Ok(()) => Ok(true),
            Err(CoordError::NotInitialized) => Err(CoordError::NotInitialized),
            Err(err) => {
                warn!("lease release by {} failed: {}", self.identity, err);
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::store::memory::MemoryDocumentStore;
    use std::sync::Arc;

    async fn init_handle(store: &Arc<MemoryDocumentStore>) -> DocumentHandle {
        let mut handle = DocumentHandle::new(store.clone(), "kube-system", "leader");
        handle.init(&RetryConfig::default()).await.unwrap();
        handle
    }

    fn record_in(handle: &DocumentHandle) -> LeaseRecord {
        codec::decode(
            LEADER_ANNOTATION_KEY,
            handle.annotation(LEADER_ANNOTATION_KEY).unwrap(),
        )
        .unwrap()
    }

    fn secs(n: i64) -> ChronoDuration {
        ChronoDuration::seconds(n)
    }

    #[test]
    fn test_vacant_record_is_expired() {
        let record = LeaseRecord::default();
        assert!(record.is_vacant());
        assert!(!record.is_live(Utc::now()));
        assert!(!record.is_held_by("p1"));
    }

    #[test]
    fn test_liveness_comparison_is_strict() {
        let now = Utc::now();
        let record = LeaseRecord {
            holder_identity: "p1".to_string(),
            lease_duration_secs: 5,
            acquired_at: now,
            renewed_at: now,
        };
        assert!(record.is_live(now + secs(4)));
        assert!(!record.is_live(now + secs(5)));
    }

    #[tokio::test]
    async fn test_first_contender_acquires_vacant_lease() {
        let store = Arc::new(MemoryDocumentStore::new());
        let mut handle = init_handle(&store).await;
        let mut election = LeaseElection::new("p1");
        let now = Utc::now();

        assert!(election
            .attempt_acquire_or_renew_at(&mut handle, now)
            .await
            .unwrap());
        assert!(election.is_leader());
        assert_eq!(election.role(), Role::Leader);

        let record = record_in(&handle);
        assert_eq!(record.holder_identity, "p1");
        assert_eq!(record.lease_duration_secs, 5);
        assert_eq!(record.acquired_at, now);
        assert_eq!(record.renewed_at, now);
    }

    #[tokio::test]
    async fn test_acquisition_is_mutually_exclusive() {
        let store = Arc::new(MemoryDocumentStore::new());
        let mut h1 = init_handle(&store).await;
        // Both handles cache the same document version before either writes.
        let mut h2 = init_handle(&store).await;
        let mut e1 = LeaseElection::new("p1");
        let mut e2 = LeaseElection::new("p2");
        let now = Utc::now();

        let first = e1.attempt_acquire_or_renew_at(&mut h1, now).await.unwrap();
        let second = e2.attempt_acquire_or_renew_at(&mut h2, now).await.unwrap();

        assert!(first);
        assert!(!second);
        assert!(e1.is_leader());
        assert!(!e2.is_leader());
    }

    #[tokio::test]
    async fn test_live_lease_blocks_other_contender_without_write() {
        let store = Arc::new(MemoryDocumentStore::new());
        let mut h1 = init_handle(&store).await;
        let mut e1 = LeaseElection::new("p1");
        let now = Utc::now();
        e1.attempt_acquire_or_renew_at(&mut h1, now).await.unwrap();

        let mut h2 = init_handle(&store).await;
        let version_before = h2.version().unwrap().to_string();
        let mut e2 = LeaseElection::new("p2");
        let blocked = e2
            .attempt_acquire_or_renew_at(&mut h2, now + secs(2))
            .await
            .unwrap();

        assert!(!blocked);
        assert!(!e2.is_leader());
        // The liveness check failed before any write: the document version
        // seen by p2 did not move.
        assert_eq!(h2.version().unwrap(), version_before);
        assert_eq!(record_in(&h2).holder_identity, "p1");
    }

    #[tokio::test]
    async fn test_renewal_preserves_acquired_at_and_advances_renewed_at() {
        let store = Arc::new(MemoryDocumentStore::new());
        let mut handle = init_handle(&store).await;
        let mut election = LeaseElection::new("p1");
        let t0 = Utc::now();
        election
            .attempt_acquire_or_renew_at(&mut handle, t0)
            .await
            .unwrap();

        // Renewing just before nominal expiry always succeeds for the
        // holder; the same-identity path skips the liveness check.
        let renewed = election
            .attempt_acquire_or_renew_at(&mut handle, t0 + secs(4))
            .await
            .unwrap();
        assert!(renewed);

        let record = record_in(&handle);
        assert_eq!(record.acquired_at, t0);
        assert_eq!(record.renewed_at, t0 + secs(4));
    }

    #[tokio::test]
    async fn test_holder_renews_even_after_own_lease_expired() {
        let store = Arc::new(MemoryDocumentStore::new());
        let mut handle = init_handle(&store).await;
        let mut election = LeaseElection::new("p1");
        let t0 = Utc::now();
        election
            .attempt_acquire_or_renew_at(&mut handle, t0)
            .await
            .unwrap();

        let renewed = election
            .attempt_acquire_or_renew_at(&mut handle, t0 + secs(60))
            .await
            .unwrap();
        assert!(renewed);
        assert_eq!(record_in(&handle).acquired_at, t0);
    }

    #[tokio::test]
    async fn test_expired_lease_is_taken_over_as_fresh_acquisition() {
        let store = Arc::new(MemoryDocumentStore::new());
        let mut h1 = init_handle(&store).await;
        let mut e1 = LeaseElection::new("p1");
        let t0 = Utc::now();
        e1.attempt_acquire_or_renew_at(&mut h1, t0).await.unwrap();

        let mut h2 = init_handle(&store).await;
        let mut e2 = LeaseElection::new("p2");
        let takeover_at = t0 + secs(6);
        let taken = e2
            .attempt_acquire_or_renew_at(&mut h2, takeover_at)
            .await
            .unwrap();

        assert!(taken);
        let record = record_in(&h2);
        assert_eq!(record.holder_identity, "p2");
        assert_eq!(record.acquired_at, takeover_at);
        assert_eq!(record.renewed_at, takeover_at);
    }

    #[tokio::test]
    async fn test_deposed_leader_observes_conflict_and_follows() {
        let store = Arc::new(MemoryDocumentStore::new());
        let mut h1 = init_handle(&store).await;
        let mut e1 = LeaseElection::new("p1");
        let t0 = Utc::now();
        e1.attempt_acquire_or_renew_at(&mut h1, t0).await.unwrap();

        let mut h2 = init_handle(&store).await;
        let mut e2 = LeaseElection::new("p2");
        e2.attempt_acquire_or_renew_at(&mut h2, t0 + secs(6))
            .await
            .unwrap();

        // p1 still believes its own (stale) cached record and tries to
        // renew; the stale token loses the race and p1 drops to follower.
        let renewed = e1
            .attempt_acquire_or_renew_at(&mut h1, t0 + secs(7))
            .await
            .unwrap();
        assert!(!renewed);
        assert!(!e1.is_leader());
    }

    #[tokio::test]
    async fn test_scenario_two_processes_over_a_lease_lifetime() {
        let store = Arc::new(MemoryDocumentStore::new());
        let mut h1 = init_handle(&store).await;
        let mut e1 = LeaseElection::new("p1");
        let mut e2 = LeaseElection::new("p2");
        let t0 = Utc::now();

        assert!(e1.attempt_acquire_or_renew_at(&mut h1, t0).await.unwrap());

        let mut h2 = init_handle(&store).await;
        assert!(!e2
            .attempt_acquire_or_renew_at(&mut h2, t0 + secs(2))
            .await
            .unwrap());

        h2.fetch().await.unwrap();
        assert!(e2
            .attempt_acquire_or_renew_at(&mut h2, t0 + secs(6))
            .await
            .unwrap());
        assert!(e2.is_leader());
    }

    #[tokio::test]
    async fn test_resign_vacates_the_lease() {
        let store = Arc::new(MemoryDocumentStore::new());
        let mut h1 = init_handle(&store).await;
        let mut e1 = LeaseElection::new("p1");
        let t0 = Utc::now();
        e1.attempt_acquire_or_renew_at(&mut h1, t0).await.unwrap();

        assert!(e1.resign(&mut h1).await.unwrap());
        assert!(!e1.is_leader());
        assert!(record_in(&h1).is_vacant());

        // Another contender can take the lease immediately, well inside
        // what would have been p1's live window.
        let mut h2 = init_handle(&store).await;
        let mut e2 = LeaseElection::new("p2");
        assert!(e2
            .attempt_acquire_or_renew_at(&mut h2, t0 + secs(1))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_resign_by_non_holder_is_a_no_op() {
        let store = Arc::new(MemoryDocumentStore::new());
        let mut h1 = init_handle(&store).await;
        let mut e1 = LeaseElection::new("p1");
        e1.attempt_acquire_or_renew_at(&mut h1, Utc::now())
            .await
            .unwrap();

        let mut h2 = init_handle(&store).await;
        let mut e2 = LeaseElection::new("p2");
        assert!(!e2.resign(&mut h2).await.unwrap());
        assert_eq!(record_in(&h1).holder_identity, "p1");
    }

    #[tokio::test]
    async fn test_unreachable_store_means_follower_not_error() {
        let store = Arc::new(MemoryDocumentStore::new());
        let mut handle = init_handle(&store).await;
        let mut election = LeaseElection::new("p1");

        store.set_unavailable(true);
        let acquired = election
            .attempt_acquire_or_renew_at(&mut handle, Utc::now())
            .await
            .unwrap();
        assert!(!acquired);
        assert!(!election.is_leader());

        // Store comes back; the next tick succeeds without special casing.
        store.set_unavailable(false);
        assert!(election
            .attempt_acquire_or_renew_at(&mut handle, Utc::now())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_corrupt_lease_record_surfaces_decode_error() {
        let store = Arc::new(MemoryDocumentStore::new());
        let mut handle = init_handle(&store).await;
        handle
            .conditional_update(LEADER_ANNOTATION_KEY, "not a record")
            .await
            .unwrap();

        let mut election = LeaseElection::new("p1");
        let err = election
            .attempt_acquire_or_renew_at(&mut handle, Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "Decode");
    }

    #[tokio::test]
    async fn test_attempt_before_init_is_not_initialized() {
        let store = Arc::new(MemoryDocumentStore::new());
        let mut handle = DocumentHandle::new(store, "kube-system", "leader");
        let mut election = LeaseElection::new("p1");
        let err = election
            .attempt_acquire_or_renew(&mut handle)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NotInitialized");
    }
}
