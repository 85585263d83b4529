//! Asset source implementations.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use tapply_core::DOCUMENT_DELIMITER_PATTERN;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{TemplateError, TemplateResult};
use crate::source::{is_excluded, AssetSource};

/// Reads templates from one or more directories (or single files).
///
/// Asset names are paths relative to their root, `/`-separated. A root that
/// is a file contributes one asset named after the file.
#[derive(Debug, Clone)]
pub struct DirectoryReader {
    roots: Vec<PathBuf>,
}

impl DirectoryReader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            roots: vec![root.into()],
        }
    }

    pub fn with_roots<I, P>(roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            roots: roots.into_iter().map(Into::into).collect(),
        }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    fn files(&self) -> TemplateResult<Vec<(String, PathBuf)>> {
        let mut files = Vec::new();
        for root in &self.roots {
            if !root.exists() {
                return Err(TemplateError::PathNotFound(root.clone()));
            }
            if root.is_file() {
                let name = root
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                files.push((name, root.clone()));
                continue;
            }

            for entry in WalkDir::new(root)
                .min_depth(1)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
            {
                let path = entry.path();
                let Ok(relative) = path.strip_prefix(root) else {
                    continue;
                };
                files.push((to_asset_name(relative), path.to_path_buf()));
            }
        }
        Ok(files)
    }
}

fn to_asset_name(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

impl AssetSource for DirectoryReader {
    fn asset_names(&self, prefixes: &[String], excluded: &[String]) -> TemplateResult<Vec<String>> {
        Ok(self
            .files()?
            .into_iter()
            .map(|(name, _)| name)
            .filter(|name| !is_excluded(name, prefixes, excluded))
            .collect())
    }

    fn asset(&self, name: &str) -> TemplateResult<Vec<u8>> {
        let path = self
            .files()?
            .into_iter()
            .find(|(n, _)| n == name)
            .map(|(_, path)| path)
            .ok_or_else(|| TemplateError::NotFound(name.to_string()))?;
        debug!(asset = %name, path = ?path, "Reading asset");
        Ok(fs::read(path)?)
    }
}

/// In-memory templates keyed by name.
#[derive(Debug, Clone, Default)]
pub struct MapReader {
    assets: BTreeMap<String, String>,
}

impl MapReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_asset(mut self, name: impl Into<String>, contents: impl Into<String>) -> Self {
        self.assets.insert(name.into(), contents.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, contents: impl Into<String>) {
        self.assets.insert(name.into(), contents.into());
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MapReader {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            assets: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl AssetSource for MapReader {
    fn asset_names(&self, prefixes: &[String], excluded: &[String]) -> TemplateResult<Vec<String>> {
        Ok(self
            .assets
            .keys()
            .filter(|name| !is_excluded(name, prefixes, excluded))
            .cloned()
            .collect())
    }

    fn asset(&self, name: &str) -> TemplateResult<Vec<u8>> {
        self.assets
            .get(name)
            .map(|s| s.as_bytes().to_vec())
            .ok_or_else(|| TemplateError::NotFound(name.to_string()))
    }
}

/// Templates cut out of one multi-document string.
///
/// Sections are split on a delimiter pattern, trimmed, and blank ones
/// dropped; the rest are named `"0"`, `"1"`, ... in order.
#[derive(Debug, Clone, Default)]
pub struct StringReader {
    documents: Vec<String>,
}

impl StringReader {
    /// Split on `---` lines.
    pub fn new(text: &str) -> TemplateResult<Self> {
        Self::with_delimiter(text, DOCUMENT_DELIMITER_PATTERN)
    }

    pub fn with_delimiter(text: &str, delimiter: &str) -> TemplateResult<Self> {
        let delimiter = Regex::new(delimiter)?;
        let documents = delimiter
            .split(text)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        Ok(Self { documents })
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

impl AssetSource for StringReader {
    fn asset_names(&self, prefixes: &[String], excluded: &[String]) -> TemplateResult<Vec<String>> {
        Ok((0..self.documents.len())
            .map(|i| i.to_string())
            .filter(|name| !is_excluded(name, prefixes, excluded))
            .collect())
    }

    fn asset(&self, name: &str) -> TemplateResult<Vec<u8>> {
        name.parse::<usize>()
            .ok()
            .and_then(|i| self.documents.get(i))
            .map(|s| s.as_bytes().to_vec())
            .ok_or_else(|| TemplateError::NotFound(name.to_string()))
    }
}

/// Templates compiled into the binary, usually with `include_str!`.
///
/// ```rust
/// use tapply_templates::EmbeddedReader;
///
/// static ASSETS: &[(&str, &str)] = &[
///     ("ns.yaml", "apiVersion: v1\nkind: Namespace\nmetadata:\n  name: demo\n"),
/// ];
/// let reader = EmbeddedReader::new(ASSETS);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct EmbeddedReader {
    assets: &'static [(&'static str, &'static str)],
}

impl EmbeddedReader {
    pub const fn new(assets: &'static [(&'static str, &'static str)]) -> Self {
        Self { assets }
    }
}

impl AssetSource for EmbeddedReader {
    fn asset_names(&self, prefixes: &[String], excluded: &[String]) -> TemplateResult<Vec<String>> {
        Ok(self
            .assets
            .iter()
            .map(|(name, _)| name.to_string())
            .filter(|name| !is_excluded(name, prefixes, excluded))
            .collect())
    }

    fn asset(&self, name: &str) -> TemplateResult<Vec<u8>> {
        self.assets
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, contents)| contents.as_bytes().to_vec())
            .ok_or_else(|| TemplateError::NotFound(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_directory_reader_names_are_relative() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("rbac")).unwrap();
        fs::write(temp.path().join("ns.yaml"), "kind: Namespace").unwrap();
        fs::write(temp.path().join("rbac/sa.yaml"), "kind: ServiceAccount").unwrap();

        let reader = DirectoryReader::new(temp.path());
        let names = reader.asset_names(&[], &[]).unwrap();

        assert_eq!(names, ["ns.yaml", "rbac/sa.yaml"]);
        assert_eq!(reader.asset("rbac/sa.yaml").unwrap(), b"kind: ServiceAccount");
    }

    #[test]
    fn test_directory_reader_single_file() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("only.yaml");
        fs::write(&file, "kind: ConfigMap").unwrap();

        let reader = DirectoryReader::new(&file);
        assert_eq!(reader.asset_names(&[], &[]).unwrap(), ["only.yaml"]);
    }

    #[test]
    fn test_directory_reader_missing_root() {
        let reader = DirectoryReader::new("/does/not/exist");
        let err = reader.asset_names(&[], &[]).unwrap_err();
        assert!(matches!(err, TemplateError::PathNotFound(_)));
    }

    #[test]
    fn test_map_reader_sorted_and_filtered() {
        let reader: MapReader = [("b/x.yaml", "b"), ("a/y.yaml", "a"), ("a/z.yaml", "z")]
            .into_iter()
            .collect();
        let names = reader
            .asset_names(&["a/".to_string()], &["a/z.yaml".to_string()])
            .unwrap();
        assert_eq!(names, ["a/y.yaml"]);
        assert!(matches!(reader.asset("nope"), Err(TemplateError::NotFound(_))));
    }

    #[test]
    fn test_string_reader_splits_and_drops_blank() {
        let reader = StringReader::new("kind: A\n---\n\n---\nkind: B\n").unwrap();
        assert_eq!(reader.asset_names(&[], &[]).unwrap(), ["0", "1"]);
        assert_eq!(reader.asset("1").unwrap(), b"kind: B");
        assert!(reader.asset("2").is_err());
    }

    #[test]
    fn test_embedded_reader() {
        static ASSETS: &[(&str, &str)] = &[("one.yaml", "kind: A"), ("two.yaml", "kind: B")];
        let reader = EmbeddedReader::new(ASSETS);
        assert_eq!(reader.asset_names(&[], &["one.yaml".to_string()]).unwrap(), ["two.yaml"]);
        assert_eq!(reader.asset("one.yaml").unwrap(), b"kind: A");
    }
}
