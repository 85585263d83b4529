//! Integration tests for template sources, rendering and path-based apply.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde_json::json;
use tapply_core::{
    ApplyOutcome, EngineOptions, MemorySink, MemoryStore, ReconcileEngine, Record, RetryPolicy,
    RootAttributeMerger, Verb,
};
use tapply_templates::{
    extract_assets, parse_values, Applier, AssetSource, DirectoryReader, EmbeddedReader,
    ProcessorOptions, TemplateError, TemplateProcessor,
};
use tempfile::tempdir;

const SERVICE_ACCOUNT: &str = r#"apiVersion: v1
kind: ServiceAccount
metadata:
  name: {{ .Values.name }}
  namespace: {{ .Values.namespace | default "default" }}
"#;

const CLUSTER_ROLE: &str = r#"{{/* Cluster-wide read access */}}
apiVersion: rbac.authorization.k8s.io/v1
kind: ClusterRole
metadata:
  name: {{ .Values.name }}
rules:
- apiGroups: [""]
  resources: ["pods"]
  verbs: ["get", "list"]
"#;

const CLUSTER_ROLE_BINDING: &str = r#"apiVersion: rbac.authorization.k8s.io/v1
kind: ClusterRoleBinding
metadata:
  name: {{ .Values.name }}
roleRef:
  apiGroup: rbac.authorization.k8s.io
  kind: ClusterRole
  name: {{ .Values.name }}
subjects:
- kind: ServiceAccount
  name: {{ .Values.name }}
  namespace: {{ .Values.namespace | default "default" }}
"#;

fn write_templates(dir: &Path) {
    fs::create_dir_all(dir.join("rbac")).unwrap();
    fs::write(dir.join("rbac/binding.yaml"), CLUSTER_ROLE_BINDING).unwrap();
    fs::write(dir.join("rbac/role.yaml"), CLUSTER_ROLE).unwrap();
    fs::write(dir.join("service_account.yaml"), SERVICE_ACCOUNT).unwrap();
}

fn applier(root: &Path, store: &MemoryStore, options: EngineOptions) -> Applier {
    let processor = TemplateProcessor::new(
        Arc::new(DirectoryReader::new(root)),
        ProcessorOptions::default(),
    );
    let engine = ReconcileEngine::builder()
        .store(Arc::new(store.clone()))
        .merger(RootAttributeMerger::default())
        .options(options.retry(RetryPolicy::immediate(2)))
        .build()
        .unwrap();
    Applier::new(processor, engine)
}

#[tokio::test]
async fn test_apply_directory_end_to_end() {
    let temp = tempdir().unwrap();
    write_templates(temp.path());
    let store = MemoryStore::new();
    let values = parse_values("name: mysa\nnamespace: ns\n", Some("Values")).unwrap();

    let outcomes = applier(temp.path(), &store, EngineOptions::new())
        .create_or_update_in_path("", &[], true, &values)
        .await
        .unwrap();

    assert_eq!(outcomes, vec![ApplyOutcome::Created; 3]);
    let binding = store
        .object(&Record::new("rbac.authorization.k8s.io/v1", "ClusterRoleBinding", "mysa").object_ref())
        .unwrap();
    assert_eq!(binding.attribute("roleRef").unwrap()["name"], json!("mysa"));
    assert_eq!(binding.attribute("subjects").unwrap()[0]["name"], json!("mysa"));
    assert_eq!(binding.attribute("subjects").unwrap()[0]["namespace"], json!("ns"));

    let kinds: Vec<_> = store
        .calls()
        .into_iter()
        .filter(|c| c.verb == Verb::Create)
        .map(|c| c.object.kind)
        .collect();
    assert_eq!(kinds, ["ServiceAccount", "ClusterRole", "ClusterRoleBinding"]);
}

#[tokio::test]
async fn test_reapply_is_unchanged_and_delete_reverses() {
    let temp = tempdir().unwrap();
    write_templates(temp.path());
    let store = MemoryStore::new();
    let values = parse_values("name: mysa", Some("Values")).unwrap();
    let applier = applier(temp.path(), &store, EngineOptions::new());

    applier.create_or_update_in_path("", &[], true, &values).await.unwrap();
    let again = applier
        .create_or_update_in_path("", &[], true, &values)
        .await
        .unwrap();
    assert_eq!(again, vec![ApplyOutcome::Unchanged; 3]);

    store.clear_calls();
    applier.delete_in_path("", &[], true, &values).await.unwrap();
    assert!(store.is_empty());
    let kinds: Vec<_> = store.calls().into_iter().map(|c| c.object.kind).collect();
    assert_eq!(kinds, ["ClusterRoleBinding", "ClusterRole", "ServiceAccount"]);
}

#[tokio::test]
async fn test_non_recursive_and_excluded() {
    let temp = tempdir().unwrap();
    write_templates(temp.path());
    let store = MemoryStore::new();
    let values = parse_values("name: mysa", Some("Values")).unwrap();
    let applier = applier(temp.path(), &store, EngineOptions::new());

    applier.create_or_update_in_path("", &[], false, &values).await.unwrap();
    assert_eq!(store.len(), 1);

    applier
        .create_or_update_in_path("rbac", &["rbac/binding.yaml".to_string()], true, &values)
        .await
        .unwrap();
    assert_eq!(store.len(), 2);
}

#[tokio::test]
async fn test_missing_value_stops_before_any_write() {
    let temp = tempdir().unwrap();
    write_templates(temp.path());
    let store = MemoryStore::new();

    let err = applier(temp.path(), &store, EngineOptions::new())
        .create_or_update_in_path("", &[], true, &json!({}))
        .await
        .unwrap_err();

    assert!(matches!(err, TemplateError::MissingVariable { .. }));
    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn test_dry_run_through_applier() {
    let temp = tempdir().unwrap();
    write_templates(temp.path());
    let store = MemoryStore::new();
    let sink = MemorySink::new();
    let processor = TemplateProcessor::new(
        Arc::new(DirectoryReader::new(temp.path())),
        ProcessorOptions::default(),
    );
    let engine = ReconcileEngine::builder()
        .store(Arc::new(store.clone()))
        .merger(RootAttributeMerger::default())
        .options(EngineOptions::new().dry_run(true))
        .sink(Arc::new(sink.clone()))
        .build()
        .unwrap();
    let values = parse_values("name: mysa", Some("Values")).unwrap();

    Applier::new(processor, engine)
        .create_or_update_in_path("", &[], true, &values)
        .await
        .unwrap();

    assert!(store.is_empty());
    assert_eq!(sink.records().len(), 3);
}

#[tokio::test]
async fn test_single_asset_update_requires_existing_record() {
    static ASSETS: &[(&str, &str)] = &[("sa.yaml", SERVICE_ACCOUNT)];
    let store = MemoryStore::new();
    let processor = TemplateProcessor::new(
        Arc::new(EmbeddedReader::new(ASSETS)),
        ProcessorOptions::default(),
    );
    let engine = ReconcileEngine::builder()
        .store(Arc::new(store.clone()))
        .merger(RootAttributeMerger::default())
        .options(EngineOptions::new().retry(RetryPolicy::immediate(1)))
        .build()
        .unwrap();
    let applier = Applier::new(processor, engine);
    let values = parse_values("name: mysa", Some("Values")).unwrap();

    let err = applier.update_asset("sa.yaml", &values).await.unwrap_err();
    assert!(matches!(err, TemplateError::Apply(ref e) if e.is_not_found()));

    applier.create_asset("sa.yaml", &values).await.unwrap();
    assert_eq!(
        applier.update_asset("sa.yaml", &values).await.unwrap(),
        [ApplyOutcome::Unchanged]
    );
}

#[test]
fn test_extract_assets_keeps_layout() {
    let source_dir = tempdir().unwrap();
    write_templates(source_dir.path());
    let target = tempdir().unwrap();
    let reader = DirectoryReader::new(source_dir.path());

    let written = extract_assets(&reader, "rbac", target.path(), &[]).unwrap();

    assert_eq!(written.len(), 2);
    assert!(target.path().join("binding.yaml").exists());
    assert_eq!(
        fs::read_to_string(target.path().join("role.yaml")).unwrap(),
        CLUSTER_ROLE
    );
    assert_eq!(reader.asset_names(&[], &[]).unwrap().len(), 3);
}
