//! Template processing: render assets and decode them into ordered records.

use std::sync::Arc;

use serde_json::Value;
use tapply_core::{DocumentDecoder, KindOrder, OrderMode, Record};
use tracing::{debug, info};

use crate::error::{TemplateError, TemplateResult};
use crate::renderer::TemplateRenderer;
use crate::source::AssetSource;

/// Options for template processing.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessorOptions {
    /// Kind order used to sort decoded records.
    pub kind_order: KindOrder,
    /// When unset, records keep the order in which they were rendered.
    pub sort: bool,
    /// Asset prepended to every template before rendering. It is never
    /// listed or rendered on its own.
    pub header: Option<String>,
}

impl Default for ProcessorOptions {
    fn default() -> Self {
        Self {
            kind_order: KindOrder::default(),
            sort: true,
            header: None,
        }
    }
}

impl ProcessorOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind_order(mut self, kind_order: KindOrder) -> Self {
        self.kind_order = kind_order;
        self
    }

    pub fn sort(mut self, sort: bool) -> Self {
        self.sort = sort;
        self
    }

    pub fn header(mut self, header: impl Into<String>) -> Self {
        self.header = Some(header.into());
        self
    }
}

/// Renders assets from a source and turns them into records.
pub struct TemplateProcessor {
    source: Arc<dyn AssetSource>,
    renderer: TemplateRenderer,
    decoder: DocumentDecoder,
    options: ProcessorOptions,
}

impl TemplateProcessor {
    pub fn new(source: Arc<dyn AssetSource>, options: ProcessorOptions) -> Self {
        Self {
            source,
            renderer: TemplateRenderer::new(),
            decoder: DocumentDecoder::new(),
            options,
        }
    }

    pub fn options(&self) -> &ProcessorOptions {
        &self.options
    }

    pub fn source(&self) -> &dyn AssetSource {
        self.source.as_ref()
    }

    /// Asset names under `path`. `""` and `"."` mean the whole source; when
    /// not `recursive`, only direct children of `path` are returned.
    pub fn asset_names_in_path(
        &self,
        path: &str,
        excluded: &[String],
        recursive: bool,
    ) -> TemplateResult<Vec<String>> {
        let path = normalize_path(path);
        let prefixes = if path.is_empty() {
            Vec::new()
        } else {
            vec![path.to_string()]
        };

        let mut excluded = excluded.to_vec();
        if let Some(header) = &self.options.header {
            excluded.push(header.clone());
        }

        let names = self.source.asset_names(&prefixes, &excluded)?;
        if recursive {
            return Ok(names);
        }
        Ok(names
            .into_iter()
            .filter(|name| {
                let rest = name.strip_prefix(path).unwrap_or(name).trim_start_matches('/');
                !rest.contains('/')
            })
            .collect())
    }

    /// Render one asset to text, after the header if one is configured.
    pub fn render_asset(&self, name: &str, values: &Value) -> TemplateResult<String> {
        let mut template = match &self.options.header {
            Some(header) => {
                let mut text = self.read_asset(header)?;
                if !text.is_empty() && !text.ends_with('\n') {
                    text.push('\n');
                }
                text
            }
            None => String::new(),
        };
        template.push_str(&self.read_asset(name)?);
        debug!(asset = %name, header = ?self.options.header, "Rendering asset");
        self.renderer.render(name, &template, values)
    }

    fn read_asset(&self, name: &str) -> TemplateResult<String> {
        let bytes = self.source.asset(name)?;
        String::from_utf8(bytes).map_err(|_| TemplateError::NotUtf8 {
            name: name.to_string(),
        })
    }

    /// Render assets and decode them into records sorted for `mode`.
    pub fn records_from_assets(
        &self,
        names: &[String],
        values: &Value,
        mode: OrderMode,
    ) -> TemplateResult<Vec<Record>> {
        let mut records = Vec::new();
        for name in names {
            let rendered = self.render_asset(name, values)?;
            let decoded = self
                .decoder
                .decode(&rendered)
                .map_err(|source| TemplateError::Decode {
                    template: name.clone(),
                    source,
                })?;
            records.extend(decoded);
        }

        let mode = if self.options.sort { mode } else { OrderMode::AsIs };
        self.options.kind_order.sort(&mut records, mode);
        info!(assets = names.len(), records = records.len(), "Rendered templates");
        Ok(records)
    }

    /// Render every asset under `path` into records sorted for `mode`.
    pub fn records_in_path(
        &self,
        path: &str,
        excluded: &[String],
        recursive: bool,
        values: &Value,
        mode: OrderMode,
    ) -> TemplateResult<Vec<Record>> {
        let names = self.asset_names_in_path(path, excluded, recursive)?;
        self.records_from_assets(&names, values, mode)
    }

    /// Render every asset under `path` into YAML documents in apply order.
    pub fn yaml_in_path(
        &self,
        path: &str,
        excluded: &[String],
        recursive: bool,
        values: &Value,
    ) -> TemplateResult<Vec<String>> {
        self.records_in_path(path, excluded, recursive, values, OrderMode::Apply)?
            .iter()
            .map(|record| record.to_yaml().map_err(TemplateError::from))
            .collect()
    }
}

fn normalize_path(path: &str) -> &str {
    let path = path.trim_start_matches("./");
    if path == "." {
        ""
    } else {
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::readers::{MapReader, StringReader};
    use serde_json::json;

    fn processor() -> TemplateProcessor {
        let reader = MapReader::new()
            .with_asset("rbac/crb.yaml", "apiVersion: rbac.authorization.k8s.io/v1\nkind: ClusterRoleBinding\nmetadata:\n  name: {{ .name }}\n")
            .with_asset("rbac/sa.yaml", "apiVersion: v1\nkind: ServiceAccount\nmetadata:\n  name: {{ .name }}\n  namespace: ns\n")
            .with_asset("rbac/nested/cm.yaml", "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cm\n")
            .with_asset("ns.yaml", "apiVersion: v1\nkind: Namespace\nmetadata:\n  name: ns\n");
        TemplateProcessor::new(Arc::new(reader), ProcessorOptions::default())
    }

    #[test]
    fn test_asset_names_recursive_and_not() {
        let p = processor();
        assert_eq!(
            p.asset_names_in_path("rbac", &[], true).unwrap(),
            ["rbac/crb.yaml", "rbac/nested/cm.yaml", "rbac/sa.yaml"]
        );
        assert_eq!(
            p.asset_names_in_path("rbac", &[], false).unwrap(),
            ["rbac/crb.yaml", "rbac/sa.yaml"]
        );
        assert_eq!(p.asset_names_in_path(".", &[], false).unwrap(), ["ns.yaml"]);
    }

    #[test]
    fn test_string_reader_whole_path() {
        let reader = StringReader::new("kind: A\n---\nkind: B\n---\nkind: C").unwrap();
        let p = TemplateProcessor::new(Arc::new(reader), ProcessorOptions::default());
        assert_eq!(p.asset_names_in_path(".", &[], false).unwrap(), ["0", "1", "2"]);
        assert_eq!(p.asset_names_in_path("", &[], true).unwrap(), ["0", "1", "2"]);
    }

    #[test]
    fn test_records_sorted_by_kind() {
        let records = processor()
            .records_in_path("", &[], true, &json!({"name": "mysa"}), OrderMode::Apply)
            .unwrap();
        let kinds: Vec<_> = records.iter().map(Record::kind).collect();
        assert_eq!(kinds, ["Namespace", "ServiceAccount", "ConfigMap", "ClusterRoleBinding"]);
        assert_eq!(records[1].name(), "mysa");
    }

    #[test]
    fn test_unsorted_keeps_render_order() {
        let p = TemplateProcessor::new(
            processor().source,
            ProcessorOptions::default().sort(false),
        );
        let records = p
            .records_in_path("rbac", &[], false, &json!({"name": "x"}), OrderMode::Apply)
            .unwrap();
        let kinds: Vec<_> = records.iter().map(Record::kind).collect();
        assert_eq!(kinds, ["ClusterRoleBinding", "ServiceAccount"]);
    }

    #[test]
    fn test_missing_value_fails() {
        let err = processor()
            .records_in_path("rbac", &[], false, &json!({}), OrderMode::Apply)
            .unwrap_err();
        assert!(err.is_render_error());
    }

    #[test]
    fn test_header_is_prepended_and_not_listed() {
        let reader = MapReader::new()
            .with_asset("header.tmpl", "# rendered for {{ .env }}")
            .with_asset("cm.yaml", "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cm\n");
        let p = TemplateProcessor::new(
            Arc::new(reader),
            ProcessorOptions::default().header("header.tmpl"),
        );

        assert_eq!(p.asset_names_in_path("", &[], true).unwrap(), ["cm.yaml"]);
        let rendered = p.render_asset("cm.yaml", &json!({"env": "prod"})).unwrap();
        assert!(rendered.starts_with("# rendered for prod\napiVersion: v1\n"));

        let records = p
            .records_in_path("", &[], true, &json!({"env": "prod"}), OrderMode::Apply)
            .unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_header_values_are_required_per_asset() {
        let reader = MapReader::new()
            .with_asset("header.tmpl", "# {{ .missing }}\n")
            .with_asset("cm.yaml", "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cm\n");
        let p = TemplateProcessor::new(
            Arc::new(reader),
            ProcessorOptions::default().header("header.tmpl"),
        );
        let err = p.render_asset("cm.yaml", &json!({})).unwrap_err();
        assert!(matches!(err, TemplateError::MissingVariable { .. }));
    }

    #[test]
    fn test_missing_header_asset_fails() {
        let reader = MapReader::new().with_asset("cm.yaml", "kind: ConfigMap\n");
        let p = TemplateProcessor::new(
            Arc::new(reader),
            ProcessorOptions::default().header("nope.tmpl"),
        );
        assert!(matches!(
            p.render_asset("cm.yaml", &json!({})).unwrap_err(),
            TemplateError::NotFound(_)
        ));
    }

    #[test]
    fn test_yaml_in_path() {
        let docs = processor()
            .yaml_in_path("", &["rbac/crb.yaml".to_string()], true, &json!({"name": "mysa"}))
            .unwrap();
        assert_eq!(docs.len(), 3);
        assert!(docs[0].contains("kind: Namespace"));
    }
}
