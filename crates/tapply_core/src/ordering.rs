//! Kind-based apply/delete ordering.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::record::Record;

/// Default create/update order: namespaces and policies first, RBAC before
/// workloads, API services last.
pub const DEFAULT_CREATE_UPDATE_KINDS_ORDER: &[&str] = &[
    "Namespace",
    "NetworkPolicy",
    "ResourceQuota",
    "LimitRange",
    "PodSecurityPolicy",
    "PodDisruptionBudget",
    "ServiceAccount",
    "Secret",
    "SecretList",
    "ConfigMap",
    "StorageClass",
    "PersistentVolume",
    "PersistentVolumeClaim",
    "CustomResourceDefinition",
    "ClusterRole",
    "ClusterRoleList",
    "ClusterRoleBinding",
    "ClusterRoleBindingList",
    "Role",
    "RoleList",
    "RoleBinding",
    "RoleBindingList",
    "Service",
    "DaemonSet",
    "Pod",
    "ReplicationController",
    "ReplicaSet",
    "Deployment",
    "HorizontalPodAutoscaler",
    "StatefulSet",
    "Job",
    "CronJob",
    "Ingress",
    "APIService",
];

/// How a batch is ordered before it reaches the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderMode {
    /// Ascending kind weight, then namespace, then name.
    #[default]
    Apply,
    /// The exact reverse of the apply order.
    Delete,
    /// Keep the caller's order.
    AsIs,
}

/// An ordered list of kinds assigning each record a sort weight.
///
/// Kinds missing from the list share the weight `kinds.len()` and therefore
/// sort after every listed kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindOrder {
    kinds: Vec<String>,
}

impl Default for KindOrder {
    fn default() -> Self {
        Self::new(DEFAULT_CREATE_UPDATE_KINDS_ORDER.iter().copied())
    }
}

impl KindOrder {
    pub fn new<I, S>(kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kinds: kinds.into_iter().map(Into::into).collect(),
        }
    }

    pub fn kinds(&self) -> &[String] {
        &self.kinds
    }

    pub fn weight(&self, kind: &str) -> usize {
        self.kinds
            .iter()
            .position(|k| k == kind)
            .unwrap_or(self.kinds.len())
    }

    /// Apply-order comparison: weight, namespace, name.
    pub fn compare(&self, a: &Record, b: &Record) -> Ordering {
        self.weight(a.kind())
            .cmp(&self.weight(b.kind()))
            .then_with(|| a.namespace().unwrap_or_default().cmp(b.namespace().unwrap_or_default()))
            .then_with(|| a.name().cmp(b.name()))
    }

    /// Sort `records` in place for the given mode. The sort is stable.
    pub fn sort(&self, records: &mut [Record], mode: OrderMode) {
        match mode {
            OrderMode::AsIs => {}
            OrderMode::Apply => records.sort_by(|a, b| self.compare(a, b)),
            OrderMode::Delete => {
                records.sort_by(|a, b| self.compare(a, b));
                records.reverse();
            }
        }
    }

    pub fn sorted(&self, mut records: Vec<Record>, mode: OrderMode) -> Vec<Record> {
        self.sort(&mut records, mode);
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(records: &[Record]) -> Vec<&str> {
        records.iter().map(Record::kind).collect()
    }

    fn sample() -> Vec<Record> {
        vec![
            Record::new("rbac.authorization.k8s.io/v1", "ClusterRoleBinding", "crb"),
            Record::new("v1", "ServiceAccount", "sa").with_namespace("ns"),
            Record::new("v1", "Namespace", "ns"),
        ]
    }

    #[test]
    fn test_apply_order() {
        let sorted = KindOrder::default().sorted(sample(), OrderMode::Apply);
        assert_eq!(kinds(&sorted), ["Namespace", "ServiceAccount", "ClusterRoleBinding"]);
    }

    #[test]
    fn test_delete_order_is_reverse() {
        let sorted = KindOrder::default().sorted(sample(), OrderMode::Delete);
        assert_eq!(kinds(&sorted), ["ClusterRoleBinding", "ServiceAccount", "Namespace"]);
    }

    #[test]
    fn test_as_is_keeps_input() {
        let sorted = KindOrder::default().sorted(sample(), OrderMode::AsIs);
        assert_eq!(kinds(&sorted), ["ClusterRoleBinding", "ServiceAccount", "Namespace"]);
    }

    #[test]
    fn test_unknown_kinds_last_sorted_by_namespace_then_name() {
        let records = vec![
            Record::new("example.com/v1", "Widget", "b").with_namespace("x"),
            Record::new("example.com/v1", "Gadget", "a").with_namespace("y"),
            Record::new("example.com/v1", "Widget", "a").with_namespace("x"),
            Record::new("v1", "ConfigMap", "z"),
        ];
        let sorted = KindOrder::default().sorted(records, OrderMode::Apply);
        let ids: Vec<_> = sorted
            .iter()
            .map(|r| format!("{}:{}", r.kind(), r.name()))
            .collect();
        assert_eq!(ids, ["ConfigMap:z", "Widget:a", "Widget:b", "Gadget:a"]);
    }

    #[test]
    fn test_custom_order() {
        let order = KindOrder::new(["ClusterRole", "ClusterRoleBinding", "ServiceAccount"]);
        let records = vec![
            Record::new("v1", "ServiceAccount", "sa"),
            Record::new("rbac.authorization.k8s.io/v1", "ClusterRoleBinding", "crb"),
            Record::new("rbac.authorization.k8s.io/v1", "ClusterRole", "cr"),
        ];
        let sorted = order.sorted(records, OrderMode::Apply);
        assert_eq!(kinds(&sorted), ["ClusterRole", "ClusterRoleBinding", "ServiceAccount"]);
    }

    #[test]
    fn test_weight_of_unknown_kind() {
        let order = KindOrder::new(["A", "B"]);
        assert_eq!(order.weight("A"), 0);
        assert_eq!(order.weight("B"), 1);
        assert_eq!(order.weight("C"), 2);
    }
}
