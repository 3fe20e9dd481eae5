//! In-memory document store.
//!
//! Keeps every document in process memory with no persistence.  Useful for
//! testing and single-process deployments.  Uses `RwLock<HashMap>` for
//! thread-safe access; a store-wide counter hands out version tokens, and
//! `update` accepts exactly one write per token, which makes this backend a
//! faithful double for conditional-update races.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use super::backend::{DocumentStore, VersionedDocument};
use crate::errors::CoordError;

type DocKey = (String, String);

#[derive(Debug, Default)]
struct StoredDocument {
    annotations: HashMap<String, String>,
    version: u64,
}

#[derive(Debug, Default)]
struct Inner {
    documents: HashMap<DocKey, StoredDocument>,
    version_counter: u64,
}

pub struct MemoryDocumentStore {
    inner: RwLock<Inner>,
    unavailable: AtomicBool,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Make every subsequent call fail as if the transport were down.
    /// Intended for exercising outage paths in tests.
    pub fn set_unavailable(&self, down: bool) {
        self.unavailable.store(down, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), CoordError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CoordError::Unavailable(anyhow::anyhow!(
                "memory store marked unavailable"
            )));
        }
        Ok(())
    }

    fn snapshot(namespace: &str, name: &str, doc: &StoredDocument) -> VersionedDocument {
        VersionedDocument {
            namespace: namespace.to_string(),
            name: name.to_string(),
            annotations: doc.annotations.clone(),
            version: doc.version.to_string(),
        }
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn get(
        &self,
        namespace: &str,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = Result<VersionedDocument, CoordError>> + Send + '_>> {
        let namespace = namespace.to_string();
        let name = name.to_string();
        Box::pin(async move {
            self.check_available()?;
            let inner = self.inner.read().expect("rwlock poisoned");
            match inner.documents.get(&(namespace.clone(), name.clone())) {
                Some(doc) => Ok(Self::snapshot(&namespace, &name, doc)),
                None => Err(CoordError::NotFound { namespace, name }),
            }
        })
    }

    fn create(
        &self,
        namespace: &str,
        name: &str,
        annotations: HashMap<String, String>,
    ) -> Pin<Box<dyn Future<Output = Result<VersionedDocument, CoordError>> + Send + '_>> {
        let namespace = namespace.to_string();
        let name = name.to_string();
        Box::pin(async move {
            self.check_available()?;
            let mut inner = self.inner.write().expect("rwlock poisoned");
            let key = (namespace.clone(), name.clone());
            if inner.documents.contains_key(&key) {
                return Err(CoordError::AlreadyExists { namespace, name });
            }
            inner.version_counter += 1;
            let doc = StoredDocument {
                annotations,
                version: inner.version_counter,
            };
            let snapshot = Self::snapshot(&namespace, &name, &doc);
            inner.documents.insert(key, doc);
            Ok(snapshot)
        })
    }

    fn update(
        &self,
        namespace: &str,
        name: &str,
        annotations: HashMap<String, String>,
        expected_version: &str,
    ) -> Pin<Box<dyn Future<Output = Result<VersionedDocument, CoordError>> + Send + '_>> {
        let namespace = namespace.to_string();
        let name = name.to_string();
        let expected_version = expected_version.to_string();
        Box::pin(async move {
            self.check_available()?;
            let mut inner = self.inner.write().expect("rwlock poisoned");
            // Tokens are opaque to callers, so burning one on a failed
            // attempt is harmless.
            inner.version_counter += 1;
            let next_version = inner.version_counter;
            let key = (namespace.clone(), name.clone());
            match inner.documents.get_mut(&key) {
                None => Err(CoordError::NotFound { namespace, name }),
                Some(doc) => {
                    if doc.version.to_string() != expected_version {
                        return Err(CoordError::Conflict { namespace, name });
                    }
                    doc.annotations = annotations;
                    doc.version = next_version;
                    Ok(Self::snapshot(&namespace, &name, doc))
                }
            }
        })
    }
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}
