//! # tapply_kube
//!
//! Kubernetes API server store for tapply.
//!
//! [`KubeStore`] implements the engine's [`Store`](tapply_core::Store) seam
//! over the dynamic object API: kinds are resolved through discovery, HTTP
//! statuses are mapped onto [`StoreError`](tapply_core::StoreError) and the
//! per-verb dry-run, field-manager and propagation options are forwarded.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tapply_core::{ReconcileEngine, RootAttributeMerger};
//! use tapply_kube::KubeStore;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let store = KubeStore::try_default().await?;
//! let engine = ReconcileEngine::builder()
//!     .store(Arc::new(store))
//!     .merger(RootAttributeMerger::default())
//!     .build()?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod store;

pub use error::{KubeStoreError, KubeStoreResult};
pub use store::{classify_status, parse_gvk, KubeStore};
