//! Annotation codec.
//!
//! Annotation values are stored as JSON text blobs.  An absent key decodes
//! to the type's zero value; a malformed blob is surfaced as corruption,
//! never silently replaced with a default.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::errors::CoordError;

/// Serialize `value` into the text blob stored under `key`.
pub fn encode<T: Serialize>(key: &str, value: &T) -> Result<String, CoordError> {
    serde_json::to_string(value).map_err(|source| CoordError::Decode {
        key: key.to_string(),
        source,
    })
}

/// Deserialize the blob stored under `key`.  `None` means the key has never
/// been written and yields the type's zero value.
pub fn decode<T>(key: &str, blob: Option<&str>) -> Result<T, CoordError>
where
    T: DeserializeOwned + Default,
{
    match blob {
        None => Ok(T::default()),
        Some(raw) => serde_json::from_str(raw).map_err(|source| CoordError::Decode {
            key: key.to_string(),
            source,
        }),
    }
}
