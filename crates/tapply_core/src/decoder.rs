//! Decoding of rendered YAML streams into records.

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::error::DecodeError;
use crate::record::Record;

/// Pattern separating documents in a multi-document YAML stream.
pub const DOCUMENT_DELIMITER_PATTERN: &str = r"(?m)^---[ \t]*(?:#.*)?$";

/// Splits a YAML stream into documents and decodes each one into a [`Record`].
///
/// Sections that are empty or contain only comments are dropped, as are
/// documents that decode to `null`.
#[derive(Debug, Clone)]
pub struct DocumentDecoder {
    delimiter: Regex,
}

impl Default for DocumentDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentDecoder {
    pub fn new() -> Self {
        Self {
            delimiter: Regex::new(DOCUMENT_DELIMITER_PATTERN).unwrap(),
        }
    }

    /// Non-blank document sections of `text`, in order.
    pub fn split<'a>(&self, text: &'a str) -> Vec<&'a str> {
        self.delimiter
            .split(text)
            .filter(|section| !is_blank(section))
            .collect()
    }

    /// Decode every document of a stream.
    pub fn decode(&self, text: &str) -> Result<Vec<Record>, DecodeError> {
        let mut records = Vec::new();
        for (index, section) in self.split(text).into_iter().enumerate() {
            let value: Value = serde_yaml::from_str(section)
                .map_err(|source| DecodeError::Yaml { index, source })?;
            match value {
                Value::Null => debug!(index, "Skipping null document"),
                Value::Object(object) => records.push(Record::from_map(object)),
                _ => return Err(DecodeError::NotAMapping { index }),
            }
        }
        Ok(records)
    }

    pub fn decode_bytes(&self, bytes: &[u8]) -> Result<Vec<Record>, DecodeError> {
        self.decode(std::str::from_utf8(bytes)?)
    }
}

/// True when a section has no content besides whitespace and `#` comments.
fn is_blank(section: &str) -> bool {
    section
        .lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with('#'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_multi_document() {
        let text = r#"
apiVersion: v1
kind: ServiceAccount
metadata:
  name: mysa
  namespace: ns
---
apiVersion: rbac.authorization.k8s.io/v1
kind: ClusterRole
metadata:
  name: reader
rules:
- apiGroups: [""]
  resources: ["pods"]
  verbs: ["get"]
"#;
        let records = DocumentDecoder::new().decode(text).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].kind(), "ServiceAccount");
        assert_eq!(records[0].namespace(), Some("ns"));
        assert_eq!(records[1].kind(), "ClusterRole");
        assert!(records[1].attribute("rules").is_some());
    }

    #[test]
    fn test_blank_and_comment_sections_dropped() {
        let text = "---\n# only a comment\n---\n\n   \n---\nkind: ConfigMap\nmetadata:\n  name: c\n---\n";
        let records = DocumentDecoder::new().decode(text).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name(), "c");
    }

    #[test]
    fn test_delimiter_with_trailing_comment() {
        let text = "kind: A\nmetadata:\n  name: a\n--- # next\nkind: B\nmetadata:\n  name: b\n";
        let records = DocumentDecoder::new().decode(text).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_scalar_document_rejected() {
        let err = DocumentDecoder::new().decode("just a string").unwrap_err();
        assert!(matches!(err, DecodeError::NotAMapping { index: 0 }));
    }

    #[test]
    fn test_invalid_yaml_reports_index() {
        let text = "kind: A\n---\nkind: [unclosed\n";
        let err = DocumentDecoder::new().decode(text).unwrap_err();
        assert!(matches!(err, DecodeError::Yaml { index: 1, .. }));
    }
}
