//! The store seam: where records live.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreResult;
use crate::record::{ObjectRef, Record};

pub mod memory;

pub use memory::{CapturedCall, MemoryStore, Verb};

/// Options forwarded with every create.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOptions {
    /// Ask the store to validate without persisting.
    pub dry_run: bool,
    pub field_manager: Option<String>,
}

impl CreateOptions {
    pub fn field_manager(mut self, manager: impl Into<String>) -> Self {
        self.field_manager = Some(manager.into());
        self
    }
}

/// Options forwarded with every update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateOptions {
    pub dry_run: bool,
    pub field_manager: Option<String>,
}

impl UpdateOptions {
    pub fn field_manager(mut self, manager: impl Into<String>) -> Self {
        self.field_manager = Some(manager.into());
        self
    }
}

/// How dependents are handled when their owner is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropagationPolicy {
    Orphan,
    Background,
    Foreground,
}

/// Options forwarded with every delete.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteOptions {
    pub dry_run: bool,
    pub grace_period_seconds: Option<u32>,
    pub propagation_policy: Option<PropagationPolicy>,
}

impl DeleteOptions {
    pub fn propagation_policy(mut self, policy: PropagationPolicy) -> Self {
        self.propagation_policy = Some(policy);
        self
    }

    pub fn grace_period_seconds(mut self, seconds: u32) -> Self {
        self.grace_period_seconds = Some(seconds);
        self
    }
}

/// A mutable resource store addressed by kind, namespace and name.
///
/// Implementations must report a missing object as
/// [`StoreError::NotFound`](crate::error::StoreError::NotFound); every other
/// error is treated as retryable by the engine.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Store: Send + Sync {
    /// Fetch the live record.
    async fn get(&self, object: &ObjectRef) -> StoreResult<Record>;

    /// Persist a new record.
    async fn create(&self, record: &Record, options: &CreateOptions) -> StoreResult<()>;

    /// Replace an existing record.
    async fn update(&self, record: &Record, options: &UpdateOptions) -> StoreResult<()>;

    /// Remove a record.
    async fn delete(&self, record: &Record, options: &DeleteOptions) -> StoreResult<()>;
}
