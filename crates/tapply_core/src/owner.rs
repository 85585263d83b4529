//! Owner reference stamping.
//!
//! When the engine is built with an [`Owner`] and a [`TypeScheme`], every
//! created or updated record gets a back-link to the owner in
//! `metadata.ownerReferences`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::OwnerRefError;
use crate::record::Record;

/// A `metadata.ownerReferences` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerReference {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_owner_deletion: Option<bool>,
}

impl OwnerReference {
    fn is_controller(&self) -> bool {
        self.controller.unwrap_or(false)
    }

    /// Same referent: matching group, kind and name (the version may differ).
    fn refers_to_same(&self, other: &OwnerReference) -> bool {
        api_group(&self.api_version) == api_group(&other.api_version)
            && self.kind == other.kind
            && self.name == other.name
    }
}

fn api_group(api_version: &str) -> &str {
    match api_version.split_once('/') {
        Some((group, _)) => group,
        None => "",
    }
}

/// Resolves a kind to its `apiVersion`.
#[derive(Debug, Clone, Default)]
pub struct TypeScheme {
    types: HashMap<String, String>,
}

impl TypeScheme {
    pub fn new() -> Self {
        Self::default()
    }

    /// A scheme pre-loaded with the built-in Kubernetes kinds most often
    /// used as owners.
    pub fn kubernetes() -> Self {
        Self::new()
            .with_type("Namespace", "v1")
            .with_type("ConfigMap", "v1")
            .with_type("Secret", "v1")
            .with_type("Service", "v1")
            .with_type("ServiceAccount", "v1")
            .with_type("Pod", "v1")
            .with_type("Deployment", "apps/v1")
            .with_type("StatefulSet", "apps/v1")
            .with_type("DaemonSet", "apps/v1")
            .with_type("ReplicaSet", "apps/v1")
            .with_type("Job", "batch/v1")
            .with_type("CronJob", "batch/v1")
            .with_type("ClusterRole", "rbac.authorization.k8s.io/v1")
            .with_type("Role", "rbac.authorization.k8s.io/v1")
            .with_type(
                "CustomResourceDefinition",
                "apiextensions.k8s.io/v1",
            )
    }

    pub fn with_type(mut self, kind: impl Into<String>, api_version: impl Into<String>) -> Self {
        self.register(kind, api_version);
        self
    }

    pub fn register(&mut self, kind: impl Into<String>, api_version: impl Into<String>) {
        self.types.insert(kind.into(), api_version.into());
    }

    pub fn api_version_for(&self, kind: &str) -> Option<&str> {
        self.types.get(kind).map(String::as_str)
    }
}

/// The parent every applied record is attached to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner {
    pub kind: String,
    pub name: String,
    pub uid: String,
    /// `None` for cluster-scoped owners.
    pub namespace: Option<String>,
    pub controller: bool,
    pub block_owner_deletion: bool,
}

impl Owner {
    /// A controlling owner that blocks deletion of its children.
    pub fn new(kind: impl Into<String>, name: impl Into<String>, uid: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            uid: uid.into(),
            namespace: None,
            controller: true,
            block_owner_deletion: true,
        }
    }

    pub fn namespaced(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into()).filter(|ns: &String| !ns.is_empty());
        self
    }

    pub fn controller(mut self, controller: bool) -> Self {
        self.controller = controller;
        self
    }

    pub fn block_owner_deletion(mut self, block: bool) -> Self {
        self.block_owner_deletion = block;
        self
    }

    fn reference(&self, api_version: &str) -> OwnerReference {
        OwnerReference {
            api_version: api_version.to_string(),
            kind: self.kind.clone(),
            name: self.name.clone(),
            uid: self.uid.clone(),
            controller: Some(self.controller),
            block_owner_deletion: Some(self.block_owner_deletion),
        }
    }

    /// A namespaced owner may only own records in its own namespace.
    fn validate_scope(&self, record: &Record) -> Result<(), OwnerRefError> {
        let Some(owner_ns) = self.namespace.as_deref() else {
            return Ok(());
        };
        match record.namespace() {
            None => Err(OwnerRefError::ClusterScopedChild(owner_ns.to_string())),
            Some(ns) if ns != owner_ns => Err(OwnerRefError::CrossNamespace {
                owner: owner_ns.to_string(),
                object: ns.to_string(),
            }),
            Some(_) => Ok(()),
        }
    }
}

/// Add or refresh the owner's reference on `record`.
pub fn set_owner_reference(
    record: &mut Record,
    owner: &Owner,
    scheme: &TypeScheme,
) -> Result<(), OwnerRefError> {
    let api_version = scheme
        .api_version_for(&owner.kind)
        .ok_or_else(|| OwnerRefError::UnknownType(owner.kind.clone()))?;
    owner.validate_scope(record)?;

    let reference = owner.reference(api_version);
    let mut references = record.owner_references();

    if reference.is_controller() {
        if let Some(existing) = references
            .iter()
            .find(|r| r.is_controller() && !r.refers_to_same(&reference))
        {
            return Err(OwnerRefError::AlreadyOwned {
                object: record.object_ref(),
                kind: existing.kind.clone(),
                name: existing.name.clone(),
            });
        }
    }

    match references.iter_mut().find(|r| r.refers_to_same(&reference)) {
        Some(existing) => *existing = reference,
        None => references.push(reference),
    }
    record.set_owner_references(&references);
    Ok(())
}
