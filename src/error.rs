//! Error and annotation types
//!
//! Three tiers:
//! - [`SourceError`]: one pseudo-file or OS query could not be read
//! - [`PartialData`]: one record was missing or inconsistent; recorded on the
//!   result, never returned as an error
//! - [`DiscoveryError`]: the top-level call produced nothing at all

use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

use crate::topology::CacheType;

/// Failure to read a single logical source
#[derive(Error, Debug)]
pub enum SourceError {
    /// The source does not exist or could not be read
    #[error("source unavailable: {source_id}: {reason}")]
    Unavailable {
        source_id: String,
        kind: io::ErrorKind,
        reason: String,
    },

    /// The source was read but its content could not be interpreted
    #[error("malformed content in {source_id}: {reason}")]
    Malformed { source_id: String, reason: String },
}

impl SourceError {
    pub(crate) fn unavailable(source_id: impl Into<String>, err: &io::Error) -> Self {
        SourceError::Unavailable {
            source_id: source_id.into(),
            kind: err.kind(),
            reason: err.to_string(),
        }
    }

    pub(crate) fn malformed(source_id: impl Into<String>, reason: impl Into<String>) -> Self {
        SourceError::Malformed {
            source_id: source_id.into(),
            reason: reason.into(),
        }
    }

    /// True when the source is simply absent, as opposed to present but unreadable
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            SourceError::Unavailable {
                kind: io::ErrorKind::NotFound,
                ..
            }
        )
    }

    /// Identifier of the source that failed
    pub fn source_id(&self) -> &str {
        match self {
            SourceError::Unavailable { source_id, .. } | SourceError::Malformed { source_id, .. } => {
                source_id
            }
        }
    }
}

/// The topology could not be discovered at all
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("topology discovery failed: {0}")]
    Failed(#[source] SourceError),
}

/// Non-fatal condition attached to an otherwise successful result
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PartialData {
    /// No core identifier could be read; the processor was left out of the core list
    #[error("logical processor {processor}: core id unavailable, processor skipped")]
    MissingCoreId { processor: usize },

    /// A summary thread count disagreed with the processors actually grouped on the core
    #[error("core {core_id}: sibling list reports {reported} threads, {observed} grouped")]
    ThreadCountMismatch {
        core_id: usize,
        reported: usize,
        observed: usize,
    },

    /// Two reports of the same cache instance disagreed on its size; the first was kept
    #[error(
        "level {level} {cache_type} cache reported by processor {processor}: size {other} differs from {kept}, keeping {kept}"
    )]
    CacheSizeMismatch {
        processor: usize,
        level: u8,
        cache_type: CacheType,
        kept: u64,
        other: u64,
    },

    /// The cache type code was not recognised and was classified as unified
    #[error("logical processor {processor}: unknown cache type {code:?}, treated as unified")]
    UnknownCacheType { processor: usize, code: String },

    /// A cache record could not be used at all
    #[error("logical processor {processor}: cache {index} skipped: {reason}")]
    MalformedCacheRecord {
        processor: usize,
        index: String,
        reason: String,
    },

    /// No usable sharing information was present; the cache was attributed to its reporter only
    #[error("logical processor {processor}: cache {index} has no usable sharing information")]
    MissingSharedCpus { processor: usize, index: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_detection() {
        let err = io::Error::new(io::ErrorKind::NotFound, "gone");
        let source = SourceError::unavailable("sys/devices/system/node", &err);
        assert!(source.is_not_found());
        assert_eq!(source.source_id(), "sys/devices/system/node");

        let err = io::Error::new(io::ErrorKind::PermissionDenied, "nope");
        assert!(!SourceError::unavailable("x", &err).is_not_found());
        assert!(!SourceError::malformed("x", "bad").is_not_found());
    }

    #[test]
    fn test_partial_data_messages() {
        let note = PartialData::MissingCoreId { processor: 3 };
        assert_eq!(
            note.to_string(),
            "logical processor 3: core id unavailable, processor skipped"
        );

        let note = PartialData::CacheSizeMismatch {
            processor: 1,
            level: 1,
            cache_type: CacheType::Data,
            kept: 32768,
            other: 65536,
        };
        assert!(note.to_string().contains("keeping 32768"));
    }

    #[test]
    fn test_partial_data_serialization() {
        let note = PartialData::UnknownCacheType {
            processor: 0,
            code: "Trace".to_string(),
        };
        let json = serde_json::to_string(&note).unwrap();
        assert!(json.contains("\"kind\":\"unknown_cache_type\""));
        let back: PartialData = serde_json::from_str(&json).unwrap();
        assert_eq!(back, note);
    }
}
