//! CLI command definitions.
//!
//! Each subcommand lives in its own module with an `Args` struct and an
//! async `execute` function.

use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use tapply_templates::{load_values, DirectoryReader, ProcessorOptions, TemplateProcessor};
use tracing::debug;

pub mod apply;
pub mod render;
pub mod version;

/// tapply - render templated resources and reconcile them with a cluster
#[derive(Parser)]
#[command(name = "tapply")]
#[command(version, about = "Render templated resources and reconcile them with a cluster")]
#[command(long_about = r#"
tapply renders a directory of templated resource documents against a values
file and creates, updates or deletes the resulting objects in kind order.

COMMANDS:
  apply    → Create or update (or delete) everything under a directory
  render   → Print the rendered, sorted documents
  version  → Print the version

EXIT CODES:
  0 - Success
  1 - General error
  2 - Invalid arguments
  3 - Template error
  4 - Store/apply error
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Apply (or delete) the templates under a directory
    Apply(apply::ApplyArgs),

    /// Render the templates under a directory to stdout
    Render(render::RenderArgs),

    /// Print version information
    Version,
}

/// Template location and values shared by `apply` and `render`.
#[derive(Args, Debug)]
pub struct TemplateArgs {
    /// Directory (or single file) holding the templates (repeatable)
    #[arg(short, long, required = true)]
    pub directory: Vec<PathBuf>,

    /// File prepended to every template before rendering
    #[arg(long, value_name = "FILE")]
    pub header: Option<PathBuf>,

    /// YAML values file; piped stdin is appended to it
    #[arg(long)]
    pub values: Option<PathBuf>,

    /// Nest the values under this key (e.g. `Values`)
    #[arg(short, long)]
    pub prefix: Option<String>,

    /// Keep the order in which templates were rendered
    #[arg(long)]
    pub no_sort: bool,

    /// Skip a template, named relative to the directory (repeatable)
    #[arg(long = "exclude", value_name = "NAME")]
    pub exclude: Vec<String>,
}

impl TemplateArgs {
    /// A processor over every `-d` root. A header inside one of the roots
    /// is addressed by its name there; any other header file becomes an
    /// extra root of its own.
    pub fn processor(&self) -> TemplateProcessor {
        let mut roots = self.directory.clone();
        let mut options = ProcessorOptions::default().sort(!self.no_sort);
        if let Some(header) = &self.header {
            match self.name_under_roots(header) {
                Some(name) => options = options.header(name),
                None => {
                    let name = header
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    roots.push(header.clone());
                    options = options.header(name);
                }
            }
        }
        TemplateProcessor::new(Arc::new(DirectoryReader::with_roots(roots)), options)
    }

    fn name_under_roots(&self, header: &Path) -> Option<String> {
        self.directory
            .iter()
            .filter(|root| root.is_dir())
            .find_map(|root| header.strip_prefix(root).ok())
            .map(|relative| {
                relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/")
            })
    }

    /// The `-d` roots for log fields.
    pub fn directories(&self) -> String {
        self.directory
            .iter()
            .map(|d| d.display().to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Values from `--values` plus anything piped on stdin.
    pub fn values(&self) -> Result<Value> {
        let piped = read_piped_stdin()?;
        load_values(self.values.as_deref(), piped.as_deref(), self.prefix.as_deref())
            .context("Failed to load values")
    }
}

fn read_piped_stdin() -> Result<Option<String>> {
    let mut stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }
    let mut text = String::new();
    stdin
        .read_to_string(&mut text)
        .context("Failed to read values from stdin")?;
    debug!(bytes = text.len(), "Read piped values");
    Ok(Some(text).filter(|t| !t.trim().is_empty()))
}
