//! Engine error types.

use crate::model::ResourceIdentity;
use crate::naming::NamespaceError;
use crate::store::StoreError;
use thiserror::Error;
use triplegraph_config::ConfigError;

/// Errors that stop a flush or a run.
#[derive(Debug, Error)]
pub enum ImportError {
    /// Invalid policy values, raised before any mutation
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// Store failure inside a flush; the flush is rolled back
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Namespace prefix conflict: {0}")]
    Namespace(#[from] NamespaceError),

    /// More than one node matches an identity
    #[error("Ambiguous identity {identity}: {matches} matching nodes")]
    AmbiguousIdentity {
        identity: ResourceIdentity,
        matches: usize,
    },

    #[error("Commit pool is shut down")]
    PoolClosed,

    #[error("Commit job panicked before producing a result")]
    JobPanicked,
}

/// A failed run, with the counters accumulated up to the failure.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct ImportFailure<S: std::fmt::Debug> {
    /// Counters reflecting only flushes committed before the failure
    pub partial: S,
    #[source]
    pub error: ImportError,
}

impl<S: std::fmt::Debug> ImportFailure<S> {
    pub fn new(partial: S, error: ImportError) -> Self {
        Self { partial, error }
    }
}
