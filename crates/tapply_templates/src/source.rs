//! Asset sources: named raw templates.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::TemplateResult;

/// A read-only collection of named templates.
pub trait AssetSource: Send + Sync {
    /// Names of the assets that start with one of `prefixes` (all assets
    /// when `prefixes` is empty) and are not listed in `excluded`.
    fn asset_names(&self, prefixes: &[String], excluded: &[String]) -> TemplateResult<Vec<String>>;

    /// Raw contents of one asset.
    fn asset(&self, name: &str) -> TemplateResult<Vec<u8>>;
}

/// Whether `name` is filtered out by the prefix and exclusion lists.
pub fn is_excluded(name: &str, prefixes: &[String], excluded: &[String]) -> bool {
    if excluded.iter().any(|e| e == name) {
        return true;
    }
    !prefixes.is_empty() && !prefixes.iter().any(|p| name.starts_with(p.as_str()))
}

/// Write every asset under `prefix` into `dir`, keeping the layout below
/// the prefix. An asset named exactly `prefix` lands at `dir/<file name>`.
pub fn extract_assets(
    source: &dyn AssetSource,
    prefix: &str,
    dir: &Path,
    excluded: &[String],
) -> TemplateResult<Vec<PathBuf>> {
    let prefixes = if prefix.is_empty() {
        Vec::new()
    } else {
        vec![prefix.to_string()]
    };

    let mut written = Vec::new();
    for name in source.asset_names(&prefixes, excluded)? {
        let relative = name
            .strip_prefix(prefix)
            .unwrap_or(&name)
            .trim_start_matches('/');
        let target = if relative.is_empty() {
            let file_name = Path::new(&name)
                .file_name()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(&name));
            dir.join(file_name)
        } else {
            dir.join(relative)
        };

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, source.asset(&name)?)?;
        debug!(asset = %name, path = ?target, "Extracted asset");
        written.push(target);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_no_prefixes_keeps_everything() {
        assert!(!is_excluded("rbac/sa.yaml", &[], &[]));
    }

    #[test]
    fn test_prefix_filter() {
        let prefixes = strings(&["rbac/"]);
        assert!(!is_excluded("rbac/sa.yaml", &prefixes, &[]));
        assert!(is_excluded("apps/deploy.yaml", &prefixes, &[]));
    }

    #[test]
    fn test_exact_exclusion_wins() {
        let prefixes = strings(&["rbac/"]);
        let excluded = strings(&["rbac/sa.yaml"]);
        assert!(is_excluded("rbac/sa.yaml", &prefixes, &excluded));
        assert!(!is_excluded("rbac/sa.yaml.bak", &prefixes, &excluded));
    }
}
