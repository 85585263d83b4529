//! The reconcile engine.
//!
//! Drives records to their desired state in a [`Store`]: decides whether a
//! record is new or existing, folds desired state into current state through
//! a [`MergePolicy`], stamps owner references and wraps every store call in
//! the configured [`RetryPolicy`].
//!
//! Calls are awaited one after the other. Batch forms walk the input in
//! order and stop at the first error without undoing earlier writes;
//! re-running a batch is safe.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn, Instrument, Span};

use crate::error::{ApplyError, ApplyResult, StoreError, StoreResult};
use crate::merge::MergePolicy;
use crate::owner::{set_owner_reference, Owner, TypeScheme};
use crate::record::Record;
use crate::retry::{retry_on_error, RetryPolicy};
use crate::sink::{DryRunSink, YamlSink};
use crate::store::{CreateOptions, DeleteOptions, Store, UpdateOptions};

/// Kinds whose finalizers are never cleared by a forced delete.
pub const FORCE_DELETE_EXEMPT_KINDS: &[&str] = &["CustomResourceDefinition", "Namespace"];

/// Engine-wide options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineOptions {
    pub create: CreateOptions,
    pub update: UpdateOptions,
    pub delete: DeleteOptions,
    pub retry: RetryPolicy,
    /// Render mutations to the sink instead of sending them to the store.
    pub dry_run: bool,
    /// Clear finalizers after a delete.
    pub force_delete: bool,
}

impl EngineOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn force_delete(mut self, force_delete: bool) -> Self {
        self.force_delete = force_delete;
        self
    }

    pub fn create_options(mut self, options: CreateOptions) -> Self {
        self.create = options;
        self
    }

    pub fn update_options(mut self, options: UpdateOptions) -> Self {
        self.update = options;
        self
    }

    pub fn delete_options(mut self, options: DeleteOptions) -> Self {
        self.delete = options;
        self
    }
}

/// What a single-record operation did (or, under dry-run, would have done).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyOutcome {
    Created,
    Updated,
    /// The merge policy reported no change; nothing was written.
    Unchanged,
    Deleted,
    /// Delete found nothing to remove.
    AlreadyAbsent,
}

impl fmt::Display for ApplyOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ApplyOutcome::Created => "created",
            ApplyOutcome::Updated => "updated",
            ApplyOutcome::Unchanged => "unchanged",
            ApplyOutcome::Deleted => "deleted",
            ApplyOutcome::AlreadyAbsent => "already absent",
        };
        write!(f, "{}", s)
    }
}

/// Builder for [`ReconcileEngine`].
#[derive(Default)]
pub struct ReconcileEngineBuilder {
    store: Option<Arc<dyn Store>>,
    owner: Option<(Owner, TypeScheme)>,
    merger: Option<Arc<dyn MergePolicy>>,
    options: EngineOptions,
    sink: Option<Arc<dyn DryRunSink>>,
    span: Option<Span>,
}

impl ReconcileEngineBuilder {
    pub fn store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    /// Owner stamped on every created or updated record. Ignored unless both
    /// the owner and the scheme are given.
    pub fn owner(mut self, owner: Option<Owner>, scheme: Option<TypeScheme>) -> Self {
        self.owner = owner.zip(scheme);
        self
    }

    pub fn merger(mut self, merger: impl MergePolicy + 'static) -> Self {
        self.merger = Some(Arc::new(merger));
        self
    }

    pub fn shared_merger(mut self, merger: Arc<dyn MergePolicy>) -> Self {
        self.merger = Some(merger);
        self
    }

    pub fn options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    /// Where dry-run renderings go. Defaults to YAML on stdout.
    pub fn sink(mut self, sink: Arc<dyn DryRunSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Span every engine event is recorded under.
    pub fn span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn build(self) -> ApplyResult<ReconcileEngine> {
        let store = self
            .store
            .ok_or_else(|| ApplyError::Configuration("a store is required".to_string()))?;
        Ok(ReconcileEngine {
            store,
            owner: self.owner,
            merger: self.merger,
            options: self.options,
            sink: self.sink.unwrap_or_else(|| Arc::new(YamlSink::stdout())),
            span: self.span.unwrap_or_else(|| info_span!("reconcile")),
        })
    }
}

/// Create/update/delete records against a store.
pub struct ReconcileEngine {
    store: Arc<dyn Store>,
    owner: Option<(Owner, TypeScheme)>,
    merger: Option<Arc<dyn MergePolicy>>,
    options: EngineOptions,
    sink: Arc<dyn DryRunSink>,
    span: Span,
}

impl ReconcileEngine {
    pub fn builder() -> ReconcileEngineBuilder {
        ReconcileEngineBuilder::default()
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn is_dry_run(&self) -> bool {
        self.options.dry_run
    }

    /// Create `record`. An existing record is reported as the store's error.
    pub async fn create(&self, record: &Record) -> ApplyResult<ApplyOutcome> {
        self.create_record(record.clone())
            .instrument(self.span.clone())
            .await
    }

    /// Merge `record` into the live record. A missing record is an error;
    /// use [`create_or_update`](Self::create_or_update) to create it instead.
    pub async fn update(&self, record: &Record) -> ApplyResult<ApplyOutcome> {
        self.update_record(record.clone())
            .instrument(self.span.clone())
            .await
    }

    /// Create `record` if the store does not have it, update it otherwise.
    pub async fn create_or_update(&self, record: &Record) -> ApplyResult<ApplyOutcome> {
        self.create_or_update_record(record.clone())
            .instrument(self.span.clone())
            .await
    }

    /// Delete `record`. Deleting a missing record succeeds.
    pub async fn delete(&self, record: &Record) -> ApplyResult<ApplyOutcome> {
        self.delete_record(record.clone())
            .instrument(self.span.clone())
            .await
    }

    pub async fn creates(&self, records: &[Record]) -> ApplyResult<Vec<ApplyOutcome>> {
        let mut outcomes = Vec::with_capacity(records.len());
        for record in records {
            outcomes.push(self.create(record).await?);
        }
        Ok(outcomes)
    }

    pub async fn updates(&self, records: &[Record]) -> ApplyResult<Vec<ApplyOutcome>> {
        let mut outcomes = Vec::with_capacity(records.len());
        for record in records {
            outcomes.push(self.update(record).await?);
        }
        Ok(outcomes)
    }

    pub async fn create_or_updates(&self, records: &[Record]) -> ApplyResult<Vec<ApplyOutcome>> {
        let mut outcomes = Vec::with_capacity(records.len());
        for record in records {
            outcomes.push(self.create_or_update(record).await?);
        }
        Ok(outcomes)
    }

    /// Delete every record in the given order; callers pass the delete order.
    pub async fn deletes(&self, records: &[Record]) -> ApplyResult<Vec<ApplyOutcome>> {
        let mut outcomes = Vec::with_capacity(records.len());
        for record in records {
            outcomes.push(self.delete(record).await?);
        }
        Ok(outcomes)
    }

    async fn create_record(&self, mut record: Record) -> ApplyResult<ApplyOutcome> {
        validate(&record)?;
        debug!(
            kind = %record.kind(),
            name = %record.name(),
            namespace = ?record.namespace(),
            "Create"
        );
        self.stamp_owner(&mut record)?;

        if self.options.dry_run {
            self.render(&record);
            return Ok(ApplyOutcome::Created);
        }

        self.with_retry("create", true, || {
            self.store.create(&record, &self.options.create)
        })
        .await
        .map_err(|e| {
            warn!(
                kind = %record.kind(),
                name = %record.name(),
                namespace = ?record.namespace(),
                error = %e,
                "Unable to create"
            );
            e
        })?;
        info!(kind = %record.kind(), name = %record.name(), namespace = ?record.namespace(), "Created");
        Ok(ApplyOutcome::Created)
    }

    async fn update_record(&self, mut record: Record) -> ApplyResult<ApplyOutcome> {
        validate(&record)?;
        debug!(
            kind = %record.kind(),
            name = %record.name(),
            namespace = ?record.namespace(),
            "Update"
        );
        self.stamp_owner(&mut record)?;
        let current = self.fetch(&record).await?;
        self.merge_and_write(current, &record).await
    }

    async fn create_or_update_record(&self, mut record: Record) -> ApplyResult<ApplyOutcome> {
        validate(&record)?;
        debug!(
            kind = %record.kind(),
            name = %record.name(),
            namespace = ?record.namespace(),
            "Create or update"
        );
        match self.fetch(&record).await {
            Ok(current) => {
                self.stamp_owner(&mut record)?;
                self.merge_and_write(current, &record).await
            }
            Err(ApplyError::Store(StoreError::NotFound(_))) => self.create_record(record).await,
            Err(e) => Err(e),
        }
    }

    async fn delete_record(&self, mut record: Record) -> ApplyResult<ApplyOutcome> {
        validate(&record)?;
        debug!(
            kind = %record.kind(),
            name = %record.name(),
            namespace = ?record.namespace(),
            "Delete"
        );

        if self.options.dry_run {
            self.render(&record);
            return Ok(ApplyOutcome::Deleted);
        }

        let deleted = self
            .with_retry("delete", false, || {
                self.store.delete(&record, &self.options.delete)
            })
            .await;
        let outcome = match deleted {
            Ok(()) => {
                info!(kind = %record.kind(), name = %record.name(), namespace = ?record.namespace(), "Deleted");
                ApplyOutcome::Deleted
            }
            Err(e) if e.is_not_found() => {
                debug!(kind = %record.kind(), name = %record.name(), "Already absent");
                ApplyOutcome::AlreadyAbsent
            }
            Err(e) => {
                warn!(
                    kind = %record.kind(),
                    name = %record.name(),
                    namespace = ?record.namespace(),
                    error = %e,
                    "Unable to delete"
                );
                return Err(e.into());
            }
        };

        if self.options.force_delete && !FORCE_DELETE_EXEMPT_KINDS.contains(&record.kind()) {
            record.set_finalizers(Vec::new());
            let cleared = self
                .with_retry("remove finalizers", false, || {
                    self.store.update(&record, &self.options.update)
                })
                .await;
            match cleared {
                Ok(()) => debug!(kind = %record.kind(), name = %record.name(), "Finalizers removed"),
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    warn!(
                        kind = %record.kind(),
                        name = %record.name(),
                        namespace = ?record.namespace(),
                        error = %e,
                        "Unable to remove finalizers"
                    );
                    return Err(e.into());
                }
            }
        }
        Ok(outcome)
    }

    /// Read the live counterpart of `record`. Every error is retried,
    /// not-found included.
    async fn fetch(&self, record: &Record) -> ApplyResult<Record> {
        let object = record.object_ref();
        let current = self
            .with_retry("get", true, || self.store.get(&object))
            .await?;
        Ok(current)
    }

    async fn merge_and_write(&self, current: Record, desired: &Record) -> ApplyResult<ApplyOutcome> {
        let Some(merger) = self.merger.as_ref() else {
            return Err(ApplyError::Merge {
                kind: current.kind().to_string(),
                namespace: current.namespace().unwrap_or_default().to_string(),
                name: current.name().to_string(),
            });
        };

        let merged = merger.merge(current, desired);
        if !merged.changed {
            debug!(kind = %desired.kind(), name = %desired.name(), "No update needed");
            return Ok(ApplyOutcome::Unchanged);
        }

        let future = merged.record;
        if self.options.dry_run {
            self.render(&future);
            return Ok(ApplyOutcome::Updated);
        }

        self.with_retry("update", true, || {
            self.store.update(&future, &self.options.update)
        })
        .await
        .map_err(|e| {
            warn!(
                kind = %future.kind(),
                name = %future.name(),
                namespace = ?future.namespace(),
                error = %e,
                "Unable to update"
            );
            e
        })?;
        info!(kind = %future.kind(), name = %future.name(), namespace = ?future.namespace(), "Updated");
        Ok(ApplyOutcome::Updated)
    }

    fn stamp_owner(&self, record: &mut Record) -> ApplyResult<()> {
        if let Some((owner, scheme)) = &self.owner {
            set_owner_reference(record, owner, scheme)?;
        }
        Ok(())
    }

    fn render(&self, record: &Record) {
        if let Err(e) = self.sink.render(record) {
            warn!(kind = %record.kind(), name = %record.name(), error = %e, "Unable to render record");
        }
    }

    /// Run a store call under the retry policy. With `retry_not_found`
    /// unset, not-found ends the loop at once.
    async fn with_retry<T, F, Fut>(
        &self,
        operation: &str,
        retry_not_found: bool,
        call: F,
    ) -> StoreResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        retry_on_error(
            &self.options.retry,
            operation,
            |e: &StoreError| retry_not_found || !e.is_not_found(),
            call,
        )
        .await
    }
}

impl fmt::Debug for ReconcileEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReconcileEngine")
            .field("owner", &self.owner.as_ref().map(|(o, _)| &o.name))
            .field("has_merger", &self.merger.is_some())
            .field("options", &self.options)
            .finish()
    }
}

fn validate(record: &Record) -> ApplyResult<()> {
    if record.kind().is_empty() {
        return Err(ApplyError::Validation(format!(
            "Kind is missing for Name: {}, Namespace: {}",
            record.name(),
            record.namespace().unwrap_or_default()
        )));
    }
    if record.name().is_empty() {
        return Err(ApplyError::Validation(format!(
            "Name is missing for Kind: {}, Namespace: {}",
            record.kind(),
            record.namespace().unwrap_or_default()
        )));
    }
    Ok(())
}
