//! Traversal configuration supplied by the consumer.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Which parts of a class the traversal decodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VisitorConfig {
    /// Run the instruction decoder over Code attributes.
    pub decode_code: bool,
    pub visit_annotations: bool,
    /// Decode `RuntimeInvisible*Annotations` as well as the visible ones.
    pub include_invisible_annotations: bool,
    pub visit_parameter_annotations: bool,
}

impl Default for VisitorConfig {
    fn default() -> Self {
        Self {
            decode_code: true,
            visit_annotations: true,
            include_invisible_annotations: true,
            visit_parameter_annotations: true,
        }
    }
}

impl VisitorConfig {
    /// Parses a JSON config; errors name the offending JSON path.
    pub fn from_json(text: &str) -> Result<Self> {
        let deserializer = &mut serde_json::Deserializer::from_str(text);
        serde_path_to_error::deserialize(deserializer).map_err(|err| {
            let path = err.path().to_string();
            anyhow::anyhow!("invalid config at {path}: {}", err.into_inner())
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text =
            fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("failed to parse {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_use_defaults() {
        let config = VisitorConfig::from_json(r#"{"decode_code": false}"#).expect("parse");

        assert!(!config.decode_code);
        assert!(config.visit_annotations);
        assert!(config.include_invisible_annotations);
    }

    #[test]
    fn type_errors_report_the_json_path() {
        let err = VisitorConfig::from_json(r#"{"include_invisible_annotations": "no"}"#)
            .expect_err("string is not a bool");

        assert!(
            err.to_string()
                .contains("invalid config at include_invisible_annotations"),
            "{err}"
        );
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = VisitorConfig::from_json(r#"{"decode_everything": true}"#).expect_err("unknown");

        assert!(err.to_string().contains("decode_everything"), "{err}");
    }

    #[test]
    fn load_reads_a_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"visit_parameter_annotations": false}"#).expect("write config");

        let config = VisitorConfig::load(&path).expect("load");

        assert!(!config.visit_parameter_annotations);
        assert!(config.decode_code);
    }
}
