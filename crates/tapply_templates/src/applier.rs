//! Apply templates straight from an asset source.

use serde_json::Value;
use tapply_core::{ApplyOutcome, OrderMode, ReconcileEngine};
use tracing::info;

use crate::error::TemplateResult;
use crate::processor::TemplateProcessor;

/// Renders templates with a [`TemplateProcessor`] and hands the records to a
/// [`ReconcileEngine`].
///
/// Creates and updates run in apply order, deletes in delete order (unless
/// the processor is configured not to sort).
pub struct Applier {
    processor: TemplateProcessor,
    engine: ReconcileEngine,
}

impl Applier {
    pub fn new(processor: TemplateProcessor, engine: ReconcileEngine) -> Self {
        Self { processor, engine }
    }

    pub fn processor(&self) -> &TemplateProcessor {
        &self.processor
    }

    pub fn engine(&self) -> &ReconcileEngine {
        &self.engine
    }

    pub async fn create_or_update_in_path(
        &self,
        path: &str,
        excluded: &[String],
        recursive: bool,
        values: &Value,
    ) -> TemplateResult<Vec<ApplyOutcome>> {
        let names = self.processor.asset_names_in_path(path, excluded, recursive)?;
        self.create_or_update_assets(&names, values).await
    }

    pub async fn create_in_path(
        &self,
        path: &str,
        excluded: &[String],
        recursive: bool,
        values: &Value,
    ) -> TemplateResult<Vec<ApplyOutcome>> {
        let names = self.processor.asset_names_in_path(path, excluded, recursive)?;
        self.create_assets(&names, values).await
    }

    pub async fn update_in_path(
        &self,
        path: &str,
        excluded: &[String],
        recursive: bool,
        values: &Value,
    ) -> TemplateResult<Vec<ApplyOutcome>> {
        let names = self.processor.asset_names_in_path(path, excluded, recursive)?;
        self.update_assets(&names, values).await
    }

    pub async fn delete_in_path(
        &self,
        path: &str,
        excluded: &[String],
        recursive: bool,
        values: &Value,
    ) -> TemplateResult<Vec<ApplyOutcome>> {
        let names = self.processor.asset_names_in_path(path, excluded, recursive)?;
        self.delete_assets(&names, values).await
    }

    pub async fn create_or_update_assets(
        &self,
        names: &[String],
        values: &Value,
    ) -> TemplateResult<Vec<ApplyOutcome>> {
        let records = self.processor.records_from_assets(names, values, OrderMode::Apply)?;
        info!(records = records.len(), "Applying");
        Ok(self.engine.create_or_updates(&records).await?)
    }

    pub async fn create_assets(
        &self,
        names: &[String],
        values: &Value,
    ) -> TemplateResult<Vec<ApplyOutcome>> {
        let records = self.processor.records_from_assets(names, values, OrderMode::Apply)?;
        info!(records = records.len(), "Creating");
        Ok(self.engine.creates(&records).await?)
    }

    pub async fn update_assets(
        &self,
        names: &[String],
        values: &Value,
    ) -> TemplateResult<Vec<ApplyOutcome>> {
        let records = self.processor.records_from_assets(names, values, OrderMode::Apply)?;
        info!(records = records.len(), "Updating");
        Ok(self.engine.updates(&records).await?)
    }

    pub async fn delete_assets(
        &self,
        names: &[String],
        values: &Value,
    ) -> TemplateResult<Vec<ApplyOutcome>> {
        let records = self.processor.records_from_assets(names, values, OrderMode::Delete)?;
        info!(records = records.len(), "Deleting");
        Ok(self.engine.deletes(&records).await?)
    }

    pub async fn create_or_update_asset(
        &self,
        name: &str,
        values: &Value,
    ) -> TemplateResult<Vec<ApplyOutcome>> {
        self.create_or_update_assets(&[name.to_string()], values).await
    }

    pub async fn create_asset(&self, name: &str, values: &Value) -> TemplateResult<Vec<ApplyOutcome>> {
        self.create_assets(&[name.to_string()], values).await
    }

    pub async fn update_asset(&self, name: &str, values: &Value) -> TemplateResult<Vec<ApplyOutcome>> {
        self.update_assets(&[name.to_string()], values).await
    }

    pub async fn delete_asset(&self, name: &str, values: &Value) -> TemplateResult<Vec<ApplyOutcome>> {
        self.delete_assets(&[name.to_string()], values).await
    }
}
