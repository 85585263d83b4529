//! # tapply_core
//!
//! Apply/reconcile engine for tapply.
//!
//! This crate turns decoded resource records into create, update and delete
//! calls against a pluggable store:
//!
//! - **Records**: weakly-typed documents with a kind, name, namespace and an
//!   open attribute tree
//! - **Decoding**: multi-document YAML streams into records
//! - **Ordering**: kind-weighted apply order and its reverse for delete
//! - **Merging**: pluggable merge policies with a root-attribute default
//! - **Retry**: bounded exponential backoff with jitter around every store call
//! - **Dry-Run**: would-be mutations rendered to a sink instead of the store
//! - **Memory Store**: an in-memory store for tests and offline rendering
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tapply_core::{DocumentDecoder, KindOrder, MemoryStore, OrderMode, ReconcileEngine, RootAttributeMerger};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let records = DocumentDecoder::new().decode(
//!         "apiVersion: v1\nkind: Namespace\nmetadata:\n  name: demo\n",
//!     )?;
//!     let records = KindOrder::default().sorted(records, OrderMode::Apply);
//!
//!     let engine = ReconcileEngine::builder()
//!         .store(Arc::new(MemoryStore::new()))
//!         .merger(RootAttributeMerger::default())
//!         .build()?;
//!
//!     let outcomes = engine.create_or_updates(&records).await?;
//!     println!("{:?}", outcomes);
//!     Ok(())
//! }
//! ```

pub mod decoder;
pub mod engine;
pub mod error;
pub mod merge;
pub mod ordering;
pub mod owner;
pub mod record;
pub mod retry;
pub mod sink;
pub mod store;

pub use decoder::{DocumentDecoder, DOCUMENT_DELIMITER_PATTERN};
pub use engine::{
    ApplyOutcome, EngineOptions, ReconcileEngine, ReconcileEngineBuilder,
    FORCE_DELETE_EXEMPT_KINDS,
};
pub use error::{ApplyError, ApplyResult, DecodeError, OwnerRefError, StoreError, StoreResult};
pub use merge::{MergePolicy, MergeResult, RootAttributeMerger, DEFAULT_ROOT_ATTRIBUTES};
pub use ordering::{KindOrder, OrderMode, DEFAULT_CREATE_UPDATE_KINDS_ORDER};
pub use owner::{set_owner_reference, Owner, OwnerReference, TypeScheme};
pub use record::{ObjectRef, Record};
pub use retry::{retry_on_error, RetryPolicy};
pub use sink::{DryRunSink, MemorySink, SinkError, YamlSink, YAML_DOCUMENT_DELIMITER};
pub use store::{
    CapturedCall, CreateOptions, DeleteOptions, MemoryStore, PropagationPolicy, Store,
    UpdateOptions, Verb,
};
