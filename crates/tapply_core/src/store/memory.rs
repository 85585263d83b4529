//! In-memory store.
//!
//! Keeps records in a map, mimics the Kubernetes API server's behavior that
//! matters to the engine (not-found, already-exists, resource versions,
//! finalizers blocking deletion), captures every call and can inject
//! failures. Used by tests and by callers who want to render against an
//! empty cluster.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use super::{CreateOptions, DeleteOptions, Store, UpdateOptions};
use crate::error::{StoreError, StoreResult};
use crate::record::{ObjectRef, Record};

/// Store operation, used for call capture and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    Create,
    Update,
    Delete,
}

/// Captured call information for verification.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedCall {
    pub verb: Verb,
    pub object: ObjectRef,
    /// The record sent with a create or update.
    pub record: Option<Record>,
}

#[derive(Debug, Clone)]
struct InjectedFailure {
    verb: Verb,
    /// `None` fails forever.
    remaining: Option<usize>,
    error: StoreError,
}

type StoreKey = (String, Option<String>, String);

fn key_of(object: &ObjectRef) -> StoreKey {
    (object.kind.clone(), object.namespace.clone(), object.name.clone())
}

/// In-memory [`Store`].
#[derive(Clone, Default)]
pub struct MemoryStore {
    objects: Arc<RwLock<BTreeMap<StoreKey, Record>>>,
    captured_calls: Arc<RwLock<Vec<CapturedCall>>>,
    failures: Arc<RwLock<Vec<InjectedFailure>>>,
    next_version: Arc<AtomicU64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate the store, as if the record had been created earlier.
    pub fn with_object(self, record: Record) -> Self {
        self.insert(record);
        self
    }

    /// Fail the next `times` calls of `verb` with `error`.
    pub fn fail_times(self, verb: Verb, times: usize, error: StoreError) -> Self {
        self.failures.write().push(InjectedFailure {
            verb,
            remaining: Some(times),
            error,
        });
        self
    }

    /// Fail every call of `verb` with `error`.
    pub fn fail_always(self, verb: Verb, error: StoreError) -> Self {
        self.failures.write().push(InjectedFailure {
            verb,
            remaining: None,
            error,
        });
        self
    }

    pub fn object(&self, object: &ObjectRef) -> Option<Record> {
        self.objects.read().get(&key_of(object)).cloned()
    }

    /// All stored records, ordered by kind, namespace and name.
    pub fn objects(&self) -> Vec<Record> {
        self.objects.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    pub fn calls(&self) -> Vec<CapturedCall> {
        self.captured_calls.read().clone()
    }

    pub fn call_count(&self, verb: Verb) -> usize {
        self.captured_calls
            .read()
            .iter()
            .filter(|c| c.verb == verb)
            .count()
    }

    pub fn clear_calls(&self) {
        self.captured_calls.write().clear();
    }

    fn record_call(&self, verb: Verb, object: ObjectRef, record: Option<&Record>) {
        self.captured_calls.write().push(CapturedCall {
            verb,
            object,
            record: record.cloned(),
        });
    }

    fn check_failure(&self, verb: Verb) -> StoreResult<()> {
        let mut failures = self.failures.write();
        let Some(index) = failures
            .iter()
            .position(|f| f.verb == verb && f.remaining != Some(0))
        else {
            return Ok(());
        };
        let failure = &mut failures[index];
        if let Some(remaining) = failure.remaining.as_mut() {
            *remaining -= 1;
        }
        Err(failure.error.clone())
    }

    fn insert(&self, mut record: Record) {
        let version = self.next_version.fetch_add(1, Ordering::SeqCst) + 1;
        let metadata = record.metadata_mut();
        metadata
            .entry("uid")
            .or_insert_with(|| Value::String(format!("uid-{version}")));
        metadata.insert(
            "resourceVersion".to_string(),
            Value::String(version.to_string()),
        );
        self.objects.write().insert(key_of(&record.object_ref()), record);
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, object: &ObjectRef) -> StoreResult<Record> {
        self.record_call(Verb::Get, object.clone(), None);
        self.check_failure(Verb::Get)?;
        self.object(object)
            .ok_or_else(|| StoreError::NotFound(object.clone()))
    }

    async fn create(&self, record: &Record, options: &CreateOptions) -> StoreResult<()> {
        let object = record.object_ref();
        self.record_call(Verb::Create, object.clone(), Some(record));
        self.check_failure(Verb::Create)?;
        if self.objects.read().contains_key(&key_of(&object)) {
            return Err(StoreError::AlreadyExists(object));
        }
        if !options.dry_run {
            self.insert(record.clone());
        }
        Ok(())
    }

    async fn update(&self, record: &Record, options: &UpdateOptions) -> StoreResult<()> {
        let object = record.object_ref();
        self.record_call(Verb::Update, object.clone(), Some(record));
        self.check_failure(Verb::Update)?;

        let key = key_of(&object);
        let Some(stored) = self.objects.read().get(&key).cloned() else {
            return Err(StoreError::NotFound(object));
        };
        if let Some(version) = record.resource_version() {
            if Some(version) != stored.resource_version() {
                return Err(StoreError::Conflict {
                    object,
                    message: format!(
                        "resource version {version} is stale, current is {}",
                        stored.resource_version().unwrap_or_default()
                    ),
                });
            }
        }
        if options.dry_run {
            return Ok(());
        }

        if stored.is_terminating() && record.finalizers().is_empty() {
            self.objects.write().remove(&key);
            return Ok(());
        }

        let mut next = record.clone();
        if let Some(uid) = stored.uid() {
            next.metadata_mut()
                .insert("uid".to_string(), Value::String(uid.to_string()));
        }
        if stored.is_terminating() {
            if let Some(ts) = stored.metadata().and_then(|m| m.get("deletionTimestamp")) {
                next.metadata_mut()
                    .insert("deletionTimestamp".to_string(), ts.clone());
            }
        }
        self.insert(next);
        Ok(())
    }

    async fn delete(&self, record: &Record, options: &DeleteOptions) -> StoreResult<()> {
        let object = record.object_ref();
        self.record_call(Verb::Delete, object.clone(), None);
        self.check_failure(Verb::Delete)?;

        let key = key_of(&object);
        let mut objects = self.objects.write();
        let Some(stored) = objects.get_mut(&key) else {
            return Err(StoreError::NotFound(object));
        };
        if options.dry_run {
            return Ok(());
        }
        if stored.finalizers().is_empty() {
            objects.remove(&key);
        } else {
            // Finalizers hold the object in a terminating state.
            stored.metadata_mut().insert(
                "deletionTimestamp".to_string(),
                Value::String("terminating".to_string()),
            );
        }
        Ok(())
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("objects", &self.len())
            .field("calls", &self.captured_calls.read().len())
            .finish()
    }
}
