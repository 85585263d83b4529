//! # tapply_templates
//!
//! Template sources, rendering and path-based apply for tapply.
//!
//! This crate reads raw templates from an [`AssetSource`], renders them
//! against a value tree, decodes the output into records and feeds them to
//! the reconcile engine:
//!
//! - Directory, in-memory map, multi-document string and embedded sources
//! - `{{ .path | fn }}` expressions with defaults and required values
//! - Values files with an optional prefix key
//! - Kind-ordered apply and reverse-ordered delete by path or asset name
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tapply_core::{MemoryStore, ReconcileEngine, RootAttributeMerger};
//! use tapply_templates::{parse_values, Applier, DirectoryReader, ProcessorOptions, TemplateProcessor};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let processor = TemplateProcessor::new(
//!         Arc::new(DirectoryReader::new("deploy")),
//!         ProcessorOptions::default(),
//!     );
//!     let engine = ReconcileEngine::builder()
//!         .store(Arc::new(MemoryStore::new()))
//!         .merger(RootAttributeMerger::default())
//!         .build()?;
//!
//!     let values = parse_values("name: demo", Some("Values"))?;
//!     let applier = Applier::new(processor, engine);
//!     applier.create_or_update_in_path("", &[], true, &values).await?;
//!     Ok(())
//! }
//! ```

pub mod applier;
pub mod error;
pub mod processor;
pub mod readers;
pub mod renderer;
pub mod source;
pub mod values;

pub use applier::Applier;
pub use error::{TemplateError, TemplateResult};
pub use processor::{ProcessorOptions, TemplateProcessor};
pub use readers::{DirectoryReader, EmbeddedReader, MapReader, StringReader};
pub use renderer::TemplateRenderer;
pub use source::{extract_assets, is_excluded, AssetSource};
pub use values::{load_values, parse_values};
