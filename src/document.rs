//! Versioned document handle.
//!
//! [`DocumentHandle`] binds one `(namespace, name)` document and owns a
//! single-writer cache of its last-fetched state.  Every write carries the
//! cached version token, so the store linearizes racing writers: exactly one
//! wins, the rest observe [`CoordError::Conflict`] and apply their own retry
//! policy.  The handle itself never retries a conditional update; deciding
//! whether to re-fetch and recompute, or to abandon the attempt, belongs to
//! the caller.
//!
//! The cache is not safe for concurrent mutation from multiple tasks.  Every
//! mutating method takes `&mut self`; callers that share a handle must
//! funnel access through a single owning task.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::config::RetryConfig;
use crate::errors::CoordError;
use crate::store::backend::{DocumentStore, VersionedDocument};

/// Handle to one shared document, with a locally cached copy.
pub struct DocumentHandle {
    namespace: String,
    name: String,
    store: Arc<dyn DocumentStore>,
    cached: Option<VersionedDocument>,
}

impl DocumentHandle {
    /// Bind a handle to `(namespace, name)` without touching the store.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            store,
            cached: None,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether `init` or `fetch` has populated the cache.
    pub fn is_initialized(&self) -> bool {
        self.cached.is_some()
    }

    /// Version token of the cached copy, if any.
    pub fn version(&self) -> Option<&str> {
        self.cached.as_ref().map(|doc| doc.version.as_str())
    }

    /// Ensure the document exists and cache it.
    ///
    /// Fetches first; when the store reports the document absent, creates an
    /// empty one.  Losing the creation race (`AlreadyExists`) sends the loop
    /// back to another fetch.  Only that benign race is retried, bounded by
    /// `retry.max_attempts`; any other error surfaces immediately.  Safe to
    /// call repeatedly; a later call simply refreshes the cache.
    pub async fn init(&mut self, retry: &RetryConfig) -> Result<(), CoordError> {
        for attempt in 0..retry.max_attempts {
            if attempt > 0 {
                tokio::time::sleep(retry.backoff(attempt)).await;
            }

            match self.store.get(&self.namespace, &self.name).await {
                Ok(doc) => {
                    self.cached = Some(doc);
                    return Ok(());
                }
                Err(err) if err.is_not_found() => {}
                Err(err) => return Err(err),
            }

            match self
                .store
                .create(&self.namespace, &self.name, HashMap::new())
                .await
            {
                Ok(doc) => {
                    self.cached = Some(doc);
                    return Ok(());
                }
                Err(err) if err.is_already_exists() => {
                    debug!(
                        "create of {}/{} raced, refetching",
                        self.namespace, self.name
                    );
                }
                Err(err) => return Err(err),
            }
        }
        Err(CoordError::RetriesExhausted {
            attempts: retry.max_attempts,
        })
    }

    /// Replace the cache with the store's current copy unconditionally.
    pub async fn fetch(&mut self) -> Result<(), CoordError> {
        let doc = self.store.get(&self.namespace, &self.name).await?;
        self.cached = Some(doc);
        Ok(())
    }

    /// Read an annotation from the cached copy.  Pure local read; fails with
    /// [`CoordError::NotInitialized`] before the first `init`/`fetch`.
    pub fn annotation(&self, key: &str) -> Result<Option<&str>, CoordError> {
        let cached = self.cached.as_ref().ok_or(CoordError::NotInitialized)?;
        Ok(cached.annotations.get(key).map(String::as_str))
    }

    /// Write one annotation through a conditional update carrying the cached
    /// version token.
    ///
    /// On success the cache is replaced with the store's response and its
    /// fresh token.  On failure the cache keeps the pre-write snapshot; the
    /// caller decides between re-fetch-and-recompute and abandoning.
    pub async fn conditional_update(&mut self, key: &str, value: &str) -> Result<(), CoordError> {
        let cached = self.cached.as_ref().ok_or(CoordError::NotInitialized)?;
        let mut annotations = cached.annotations.clone();
        annotations.insert(key.to_string(), value.to_string());
        let doc = self
            .store
            .update(&self.namespace, &self.name, annotations, &cached.version)
            .await?;
        self.cached = Some(doc);
        Ok(())
    }
}
