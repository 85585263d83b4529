//! Merge policies: how desired state is folded into the current record.

use tracing::trace;

use crate::record::Record;

/// Root attributes reconciled by [`RootAttributeMerger`].
pub const DEFAULT_ROOT_ATTRIBUTES: &[&str] = &[
    "spec",
    "rules",
    "roleRef",
    "subjects",
    "secrets",
    "imagePullSecrets",
    "automountServiceAccountToken",
];

/// The record to send to the store and whether a write is needed.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeResult {
    pub record: Record,
    pub changed: bool,
}

impl MergeResult {
    pub fn new(record: Record, changed: bool) -> Self {
        Self { record, changed }
    }

    pub fn unchanged(record: Record) -> Self {
        Self::new(record, false)
    }
}

/// Merges the `desired` record into the `current` one.
///
/// Implementations may modify and return `current`; the returned record is
/// what gets written when `changed` is true.
pub trait MergePolicy: Send + Sync {
    fn merge(&self, current: Record, desired: &Record) -> MergeResult;
}

impl<F> MergePolicy for F
where
    F: Fn(Record, &Record) -> MergeResult + Send + Sync,
{
    fn merge(&self, current: Record, desired: &Record) -> MergeResult {
        self(current, desired)
    }
}

/// Replaces a fixed list of root attributes and leaves everything else alone.
///
/// For each listed attribute:
/// - present in desired and structurally different from current: replaced,
///   marks the record changed;
/// - absent from desired but present on current: removed from current;
///   marks the record changed unless built with
///   [`preserving_changed_flag`](Self::preserving_changed_flag).
///
/// Attributes outside the list (status, metadata, custom fields) are never
/// touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootAttributeMerger {
    attributes: Vec<String>,
    clear_marks_changed: bool,
}

impl Default for RootAttributeMerger {
    fn default() -> Self {
        Self {
            attributes: DEFAULT_ROOT_ATTRIBUTES.iter().map(|a| a.to_string()).collect(),
            clear_marks_changed: true,
        }
    }
}

impl RootAttributeMerger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clearing an attribute does not by itself trigger a write.
    pub fn preserving_changed_flag() -> Self {
        Self {
            clear_marks_changed: false,
            ..Self::default()
        }
    }

    pub fn with_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes = attributes.into_iter().map(Into::into).collect();
        self
    }

    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }
}

impl MergePolicy for RootAttributeMerger {
    fn merge(&self, mut current: Record, desired: &Record) -> MergeResult {
        let mut changed = false;
        for attribute in &self.attributes {
            match desired.attribute(attribute) {
                Some(wanted) => {
                    if current.attribute(attribute) != Some(wanted) {
                        trace!(attribute = %attribute, "Attribute differs");
                        current.set_attribute(attribute.clone(), wanted.clone());
                        changed = true;
                    }
                }
                None => {
                    if current.remove_attribute(attribute).is_some() {
                        trace!(attribute = %attribute, "Attribute cleared");
                        changed |= self.clear_marks_changed;
                    }
                }
            }
        }
        MergeResult::new(current, changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(attrs: serde_json::Value) -> Record {
        let mut r = Record::new("v1", "ServiceAccount", "mysa").with_namespace("ns");
        if let serde_json::Value::Object(map) = attrs {
            for (k, v) in map {
                r.set_attribute(k, v);
            }
        }
        r
    }

    #[test]
    fn test_replaces_differing_attribute_keeps_custom_fields() {
        let current = record(json!({"spec": {"replicas": 1}, "customField": "x"}));
        let desired = record(json!({"spec": {"replicas": 2}}));

        let result = RootAttributeMerger::default().merge(current, &desired);

        assert!(result.changed);
        assert_eq!(result.record.attribute("spec"), Some(&json!({"replicas": 2})));
        assert_eq!(result.record.attribute("customField"), Some(&json!("x")));
    }

    #[test]
    fn test_equal_attributes_unchanged() {
        let current = record(json!({"spec": {"replicas": 1}, "status": {"ready": true}}));
        let desired = record(json!({"spec": {"replicas": 1}}));

        let result = RootAttributeMerger::default().merge(current.clone(), &desired);

        assert!(!result.changed);
        assert_eq!(result.record, current);
    }

    #[test]
    fn test_clearing_marks_changed_by_default() {
        let current = record(json!({"spec": {"replicas": 1}}));
        let desired = record(json!({}));

        let result = RootAttributeMerger::default().merge(current, &desired);

        assert!(result.changed);
        assert!(!result.record.has_attribute("spec"));
    }

    #[test]
    fn test_clearing_with_preserved_changed_flag() {
        let current = record(json!({"spec": {"replicas": 1}}));
        let desired = record(json!({}));

        let result = RootAttributeMerger::preserving_changed_flag().merge(current, &desired);

        assert!(!result.changed);
        assert!(!result.record.has_attribute("spec"));
    }

    #[test]
    fn test_secrets_cleared_when_template_omits_them() {
        let current = record(json!({"secrets": [{"name": "objectname"}]}));
        let desired = record(json!({}));

        let result = RootAttributeMerger::default().merge(current, &desired);

        assert!(!result.record.has_attribute("secrets"));
    }

    #[test]
    fn test_metadata_never_merged() {
        let mut current = record(json!({}));
        current
            .metadata_mut()
            .insert("resourceVersion".to_string(), json!("42"));
        let desired = record(json!({}));

        let result = RootAttributeMerger::default().merge(current, &desired);

        assert_eq!(result.record.resource_version(), Some("42"));
        assert!(!result.changed);
    }

    #[test]
    fn test_closure_policy() {
        let always = |current: Record, _desired: &Record| MergeResult::new(current, true);
        let result = always.merge(record(json!({})), &record(json!({})));
        assert!(result.changed);
    }

    #[test]
    fn test_custom_attribute_list() {
        let merger = RootAttributeMerger::new().with_attributes(["data"]);
        let current = record(json!({"data": {"a": "1"}, "spec": {"old": true}}));
        let desired = record(json!({"data": {"a": "2"}}));

        let result = merger.merge(current, &desired);

        assert!(result.changed);
        assert_eq!(result.record.attribute("spec"), Some(&json!({"old": true})));
    }
}
