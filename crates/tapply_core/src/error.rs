//! Error types for the apply engine.

use thiserror::Error;

use crate::record::ObjectRef;

/// Result type alias for engine operations.
pub type ApplyResult<T> = Result<T, ApplyError>;

/// Result type alias for store calls.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by the reconcile engine.
#[derive(Error, Debug)]
pub enum ApplyError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid engine configuration: {0}")]
    Configuration(String),

    #[error("Owner reference error: {0}")]
    OwnerRef(#[from] OwnerRefError),

    #[error("Unable to update {namespace}/{name} of kind {kind}: the merge policy is not set")]
    Merge {
        kind: String,
        namespace: String,
        name: String,
    },

    /// Store failures are passed through untouched once retries are exhausted.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApplyError {
    /// The underlying store error, if this is one.
    pub fn as_store_error(&self) -> Option<&StoreError> {
        match self {
            ApplyError::Store(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.as_store_error().is_some_and(StoreError::is_not_found)
    }
}

/// Errors returned by a [`Store`](crate::store::Store) implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(ObjectRef),

    #[error("{0} already exists")]
    AlreadyExists(ObjectRef),

    #[error("Conflict on {object}: {message}")]
    Conflict { object: ObjectRef, message: String },

    #[error("Invalid object {object}: {message}")]
    Invalid { object: ObjectRef, message: String },

    #[error("Store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Not-found is the only classification the engine branches on.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Errors raised while stamping an owner reference onto a record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OwnerRefError {
    #[error("no type registered in the scheme for owner kind {0}")]
    UnknownType(String),

    #[error(
        "cross-namespace owner references are disallowed, owner's namespace {owner}, obj's namespace {object}"
    )]
    CrossNamespace { owner: String, object: String },

    #[error("cluster-scoped resource must not have a namespace-scoped owner, owner's namespace {0}")]
    ClusterScopedChild(String),

    #[error("{object} is already owned by another controller {kind} {name}")]
    AlreadyOwned {
        object: ObjectRef,
        kind: String,
        name: String,
    },
}

/// Errors raised while decoding rendered documents into records.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("document {index}: {source}")]
    Yaml {
        index: usize,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("document {index} is not a mapping")]
    NotAMapping { index: usize },

    #[error("document is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}
