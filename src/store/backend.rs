//! Abstract versioned document store trait.
//!
//! Any remote store must implement [`DocumentStore`].  The trait uses
//! `async_trait`-style methods (manual desugaring with pinned futures) so
//! handles can hold a backend as `Arc<dyn DocumentStore>`.
//!
//! The contract is optimistic concurrency: every document carries an opaque
//! version token assigned by the store, `update` is accepted only while the
//! presented token is still current, and two racing writers see exactly one
//! success and one [`CoordError::Conflict`], never a lost update.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use crate::errors::CoordError;

/// A point-in-time copy of a document together with the version token the
/// store assigned to that copy.
#[derive(Debug, Clone)]
pub struct VersionedDocument {
    /// Namespace the document lives in.
    pub namespace: String,
    /// Document name, unique within its namespace.
    pub name: String,
    /// Annotation map: opaque string blobs under well-known string keys.
    pub annotations: HashMap<String, String>,
    /// Opaque version token; changes on every successful write.
    pub version: String,
}

/// Async versioned document store contract.
pub trait DocumentStore: Send + Sync + 'static {
    /// Read the current document and its version token.
    ///
    /// Fails with [`CoordError::NotFound`] when the document is absent.
    fn get(
        &self,
        namespace: &str,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = Result<VersionedDocument, CoordError>> + Send + '_>>;

    /// Create the document with the given initial annotations.
    ///
    /// Fails with [`CoordError::AlreadyExists`] when another process won the
    /// creation race.
    fn create(
        &self,
        namespace: &str,
        name: &str,
        annotations: HashMap<String, String>,
    ) -> Pin<Box<dyn Future<Output = Result<VersionedDocument, CoordError>> + Send + '_>>;

    /// Replace the annotation map, conditional on `expected_version` still
    /// being the document's current token.
    ///
    /// Fails with [`CoordError::Conflict`] when the token is stale and
    /// [`CoordError::NotFound`] when the document has vanished.  On success
    /// the returned copy carries the freshly assigned token.
    fn update(
        &self,
        namespace: &str,
        name: &str,
        annotations: HashMap<String, String>,
        expected_version: &str,
    ) -> Pin<Box<dyn Future<Output = Result<VersionedDocument, CoordError>> + Send + '_>>;
}
