//! [`Store`] over the Kubernetes API using the dynamic object API.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use kube::api::{Api, DeleteParams, DynamicObject, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::core::GroupVersionKind;
use kube::discovery::{self, ApiResource, Scope};
use kube::{Client, Config};
use parking_lot::RwLock;
use tapply_core::{
    CreateOptions, DeleteOptions, ObjectRef, PropagationPolicy, Record, Store, StoreError,
    StoreResult, UpdateOptions,
};
use tracing::{debug, info};

use crate::error::KubeStoreResult;

/// Stores records in a live cluster.
///
/// Each record's `apiVersion`/`kind` is resolved through API discovery once
/// and cached. Namespaced kinds without a namespace use the client's default
/// namespace.
pub struct KubeStore {
    client: Client,
    resources: RwLock<HashMap<GroupVersionKind, (ApiResource, Scope)>>,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            resources: RwLock::new(HashMap::new()),
        }
    }

    /// Connect with the in-cluster config or `$KUBECONFIG` / `~/.kube/config`.
    pub async fn try_default() -> KubeStoreResult<Self> {
        let client = Client::try_default().await?;
        Ok(Self::new(client))
    }

    /// Connect using an explicit kubeconfig file.
    pub async fn from_kubeconfig(path: &Path) -> KubeStoreResult<Self> {
        info!(path = ?path, "Loading kubeconfig");
        let kubeconfig = Kubeconfig::read_from(path)?;
        let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default()).await?;
        let client = Client::try_from(config)?;
        Ok(Self::new(client))
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    async fn resolve(&self, object: &ObjectRef) -> StoreResult<(ApiResource, Scope)> {
        let gvk = parse_gvk(&object.api_version, &object.kind);
        if let Some(cached) = self.resources.read().get(&gvk) {
            return Ok(cached.clone());
        }

        debug!(api_version = %object.api_version, kind = %object.kind, "Discovering resource");
        let (resource, capabilities) = discovery::pinned_kind(&self.client, &gvk)
            .await
            .map_err(|e| {
                StoreError::Backend(format!(
                    "unable to resolve {} {}: {}",
                    object.api_version, object.kind, e
                ))
            })?;
        let entry = (resource, capabilities.scope);
        self.resources.write().insert(gvk, entry.clone());
        Ok(entry)
    }

    async fn api_for(&self, object: &ObjectRef) -> StoreResult<Api<DynamicObject>> {
        let (resource, scope) = self.resolve(object).await?;
        Ok(match scope {
            Scope::Cluster => Api::all_with(self.client.clone(), &resource),
            Scope::Namespaced => {
                let namespace = object
                    .namespace
                    .as_deref()
                    .unwrap_or_else(|| self.client.default_namespace());
                Api::namespaced_with(self.client.clone(), namespace, &resource)
            }
        })
    }
}

impl std::fmt::Debug for KubeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeStore")
            .field("default_namespace", &self.client.default_namespace())
            .field("cached_resources", &self.resources.read().len())
            .finish()
    }
}

#[async_trait]
impl Store for KubeStore {
    async fn get(&self, object: &ObjectRef) -> StoreResult<Record> {
        let api = self.api_for(object).await?;
        let live = api
            .get(&object.name)
            .await
            .map_err(|e| map_kube_error(e, object))?;
        from_dynamic(&live, object)
    }

    async fn create(&self, record: &Record, options: &CreateOptions) -> StoreResult<()> {
        let object = record.object_ref();
        let api = self.api_for(&object).await?;
        let params = post_params(options.dry_run, options.field_manager.as_deref());
        api.create(&params, &to_dynamic(record, &object)?)
            .await
            .map_err(|e| map_kube_error(e, &object))?;
        Ok(())
    }

    async fn update(&self, record: &Record, options: &UpdateOptions) -> StoreResult<()> {
        let object = record.object_ref();
        let api = self.api_for(&object).await?;
        let params = post_params(options.dry_run, options.field_manager.as_deref());
        api.replace(&object.name, &params, &to_dynamic(record, &object)?)
            .await
            .map_err(|e| map_kube_error(e, &object))?;
        Ok(())
    }

    async fn delete(&self, record: &Record, options: &DeleteOptions) -> StoreResult<()> {
        let object = record.object_ref();
        let api = self.api_for(&object).await?;
        api.delete(&object.name, &delete_params(options))
            .await
            .map_err(|e| map_kube_error(e, &object))?;
        Ok(())
    }
}

/// Split `apiVersion` into group and version; the core group is `""`.
pub fn parse_gvk(api_version: &str, kind: &str) -> GroupVersionKind {
    let (group, version) = match api_version.split_once('/') {
        Some((group, version)) => (group, version),
        None => ("", api_version),
    };
    GroupVersionKind::gvk(group, version, kind)
}

fn post_params(dry_run: bool, field_manager: Option<&str>) -> PostParams {
    PostParams {
        dry_run,
        field_manager: field_manager.map(String::from),
    }
}

fn delete_params(options: &DeleteOptions) -> DeleteParams {
    DeleteParams {
        dry_run: options.dry_run,
        grace_period_seconds: options.grace_period_seconds,
        propagation_policy: options.propagation_policy.map(|p| match p {
            PropagationPolicy::Orphan => kube::api::PropagationPolicy::Orphan,
            PropagationPolicy::Background => kube::api::PropagationPolicy::Background,
            PropagationPolicy::Foreground => kube::api::PropagationPolicy::Foreground,
        }),
        ..DeleteParams::default()
    }
}

fn to_dynamic(record: &Record, object: &ObjectRef) -> StoreResult<DynamicObject> {
    serde_json::from_value(record.clone().into_value()).map_err(|e| StoreError::Invalid {
        object: object.clone(),
        message: e.to_string(),
    })
}

fn from_dynamic(live: &DynamicObject, object: &ObjectRef) -> StoreResult<Record> {
    let value = serde_json::to_value(live).map_err(|e| StoreError::Backend(e.to_string()))?;
    let mut record = Record::from_value(value).map_err(|e| StoreError::Invalid {
        object: object.clone(),
        message: e.to_string(),
    })?;
    // The API server omits apiVersion/kind on some responses.
    if record.kind().is_empty() {
        record.set_attribute("apiVersion", object.api_version.clone().into());
        record.set_attribute("kind", object.kind.clone().into());
    }
    Ok(record)
}

fn map_kube_error(error: kube::Error, object: &ObjectRef) -> StoreError {
    match error {
        kube::Error::Api(response) => {
            classify_status(response.code, &response.reason, &response.message, object)
        }
        other => StoreError::Backend(other.to_string()),
    }
}

/// Map an API status onto the store error taxonomy.
pub fn classify_status(code: u16, reason: &str, message: &str, object: &ObjectRef) -> StoreError {
    match code {
        404 => StoreError::NotFound(object.clone()),
        409 if reason == "AlreadyExists" => StoreError::AlreadyExists(object.clone()),
        409 => StoreError::Conflict {
            object: object.clone(),
            message: message.to_string(),
        },
        422 => StoreError::Invalid {
            object: object.clone(),
            message: message.to_string(),
        },
        _ => StoreError::Backend(format!("{} ({}): {}", reason, code, message)),
    }
}
