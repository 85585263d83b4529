//! Dry-run sinks: where would-be mutations are rendered.

use std::io::{self, Write};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

use crate::record::Record;

/// Separator written before every rendered record.
pub const YAML_DOCUMENT_DELIMITER: &str = "---\n";

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("failed to serialize record: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("failed to write record: {0}")]
    Io(#[from] io::Error),
}

/// Receives one record per mutation the engine would have made.
///
/// The engine logs a failed render and carries on.
pub trait DryRunSink: Send + Sync {
    fn render(&self, record: &Record) -> Result<(), SinkError>;
}

/// Writes each record as a YAML document.
pub struct YamlSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> YamlSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl YamlSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> DryRunSink for YamlSink<W> {
    fn render(&self, record: &Record) -> Result<(), SinkError> {
        let yaml = record.to_yaml()?;
        let mut writer = self.writer.lock();
        writer.write_all(YAML_DOCUMENT_DELIMITER.as_bytes())?;
        writer.write_all(yaml.as_bytes())?;
        writer.flush()?;
        Ok(())
    }
}

/// Keeps rendered records in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<Record>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<Record> {
        self.records.lock().clone()
    }
}

impl DryRunSink for MemorySink {
    fn render(&self, record: &Record) -> Result<(), SinkError> {
        self.records.lock().push(record.clone());
        Ok(())
    }
}
