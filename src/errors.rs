//! Coordination error types.
//!
//! Every variant maps to one outcome of talking to the versioned document
//! store.  The benign races (`NotFound`/`AlreadyExists` during init,
//! `Conflict` on a stale write) are part of normal operation; retry loops
//! match on them through the `is_*` predicates instead of destructuring.

use thiserror::Error;

/// Errors produced by the document handle and the coordination primitives.
#[derive(Debug, Error)]
pub enum CoordError {
    /// The document does not exist in the store.
    #[error("document {namespace}/{name} not found")]
    NotFound { namespace: String, name: String },

    /// A create raced with another process that created the document first.
    #[error("document {namespace}/{name} already exists")]
    AlreadyExists { namespace: String, name: String },

    /// A conditional update carried a version token the store no longer
    /// recognizes as current.  Another writer got there first.
    #[error("conditional update of {namespace}/{name} lost a version race")]
    Conflict { namespace: String, name: String },

    /// The handle was used before `init` or `fetch` populated its cache.
    #[error("document handle used before init or fetch")]
    NotInitialized,

    /// A stored annotation is not valid serialized data.  This indicates
    /// external corruption and is never masked with a default value.
    #[error("annotation {key} holds malformed data")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// A bounded retry loop used up every attempt without succeeding.
    #[error("gave up after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    /// The store could not be reached or refused the request outright.
    #[error("document store unavailable: {0}")]
    Unavailable(#[from] anyhow::Error),
}

impl CoordError {
    /// Short stable code string for logs.
    pub fn code(&self) -> &'static str {
        match self {
            CoordError::NotFound { .. } => "NotFound",
            CoordError::AlreadyExists { .. } => "AlreadyExists",
            CoordError::Conflict { .. } => "Conflict",
            CoordError::NotInitialized => "NotInitialized",
            CoordError::Decode { .. } => "Decode",
            CoordError::RetriesExhausted { .. } => "RetriesExhausted",
            CoordError::Unavailable(_) => "StoreUnavailable",
        }
    }

    /// Whether this is a version-race conflict on a conditional update.
    pub fn is_conflict(&self) -> bool {
        matches!(self, CoordError::Conflict { .. })
    }

    /// Whether the document was reported absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CoordError::NotFound { .. })
    }

    /// Whether a create lost the creation race.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, CoordError::AlreadyExists { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        let conflict = CoordError::Conflict {
            namespace: "ns".to_string(),
            name: "doc".to_string(),
        };
        assert_eq!(conflict.code(), "Conflict");
        assert!(conflict.is_conflict());
        assert!(!conflict.is_not_found());

        let unavailable = CoordError::Unavailable(anyhow::anyhow!("connection refused"));
        assert_eq!(unavailable.code(), "StoreUnavailable");
    }

    #[test]
    fn test_messages_name_the_document() {
        let err = CoordError::NotFound {
            namespace: "kube-system".to_string(),
            name: "peers".to_string(),
        };
        assert_eq!(err.to_string(), "document kube-system/peers not found");
    }
}
