//! Error types surfaced by the bridge.

use rule_engine::{ExtensionId, ImportError};
use std::time::Duration;
use thiserror::Error;

use crate::storage::StorageError;

/// Failure to read or write persisted state
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PersistenceError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Stored data under \"{key}\" is unreadable: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("Storage worker is not running")]
    WorkerUnavailable,

    #[error("Storage worker did not answer within {0:?}")]
    Timeout(Duration),

    #[error("Unexpected reply to {0}")]
    UnexpectedReply(&'static str),
}

impl PersistenceError {
    pub(crate) fn corrupt(key: &str, error: ImportError) -> Self {
        PersistenceError::Corrupt {
            key: key.to_string(),
            reason: error.to_string(),
        }
    }

    /// True when the write lost a race against another writer
    pub fn is_stale(&self) -> bool {
        matches!(self, PersistenceError::Storage(StorageError::StaleRevision { .. }))
    }

    /// True when the caller's copy of the collection may be behind storage
    /// and should be re-read before the next save. A timed out request may
    /// still have been carried out by the worker.
    pub fn needs_reload(&self) -> bool {
        self.is_stale() || matches!(self, PersistenceError::Timeout(_))
    }
}

/// Failure reported by the platform's extension management API
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ManagementError {
    #[error("Extension {0} is not installed")]
    NotInstalled(ExtensionId),

    #[error("Management call failed: {0}")]
    Failed(String),
}
