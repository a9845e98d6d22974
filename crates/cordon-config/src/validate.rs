//! Validation helpers for batch manifest documents.

use std::collections::HashSet;
use std::path::PathBuf;

use crate::error::{ConfigError, ConfigResult};
use crate::model::BatchManifest;

/// Validate a parsed manifest before it reaches the batch pipeline.
///
/// # Errors
///
/// Returns the first structural problem found: an empty batch, blank paths or
/// label identifiers, a degenerate retry policy, or two mappings colliding on
/// one output artifact.
pub fn validate_manifest(manifest: &BatchManifest) -> ConfigResult<()> {
    if path_is_blank(&manifest.canonical_plaintext) {
        return Err(ConfigError::invalid(
            "canonical_plaintext",
            "must not be empty",
        ));
    }
    if path_is_blank(&manifest.template_dir) {
        return Err(ConfigError::invalid("template_dir", "must not be empty"));
    }
    if path_is_blank(&manifest.output_dir) {
        return Err(ConfigError::invalid("output_dir", "must not be empty"));
    }
    if manifest.template_dir == manifest.output_dir {
        return Err(ConfigError::invalid(
            "output_dir",
            "must differ from template_dir",
        ));
    }
    if manifest.files.is_empty() {
        return Err(ConfigError::invalid("files", "must not be empty"));
    }
    if manifest.retry.max_attempts == 0 {
        return Err(ConfigError::invalid(
            "retry.max_attempts",
            "must be at least 1",
        ));
    }

    let mut outputs: HashSet<PathBuf> = HashSet::with_capacity(manifest.files.len());
    for mapping in &manifest.files {
        if path_is_blank(&mapping.source) {
            return Err(ConfigError::invalid("files.source", "must not be empty"));
        }
        if mapping.label_id.trim().is_empty() {
            return Err(ConfigError::invalid("files.label_id", "must not be empty"));
        }
        let output = manifest.output_path_for(mapping);
        if !outputs.insert(output.clone()) {
            return Err(ConfigError::DuplicateOutput { output });
        }
    }

    Ok(())
}

fn path_is_blank(path: &std::path::Path) -> bool {
    path.as_os_str().is_empty() || path.to_string_lossy().trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FileMapping, LoggingSettings, RetryPolicy};

    fn manifest_with_files(files: Vec<FileMapping>) -> BatchManifest {
        BatchManifest {
            canonical_plaintext: PathBuf::from("input/canonical.txt"),
            template_dir: PathBuf::from("templates"),
            output_dir: PathBuf::from("output"),
            files,
            retry: RetryPolicy::default(),
            logging: LoggingSettings::default(),
        }
    }

    #[test]
    fn valid_manifest_passes() {
        let manifest = manifest_with_files(vec![
            FileMapping::new("input/a.txt", "l1"),
            FileMapping::new("input/b.txt", "l1"),
            FileMapping::new("input/c.txt", "l2"),
        ]);
        assert!(validate_manifest(&manifest).is_ok());
    }

    #[test]
    fn empty_batch_is_rejected() {
        let manifest = manifest_with_files(vec![]);
        let err = validate_manifest(&manifest).expect_err("empty batch");
        assert!(matches!(err, ConfigError::InvalidField { field: "files", .. }));
    }

    #[test]
    fn blank_label_is_rejected() {
        let manifest = manifest_with_files(vec![FileMapping::new("input/a.txt", "  ")]);
        let err = validate_manifest(&manifest).expect_err("blank label");
        assert!(matches!(
            err,
            ConfigError::InvalidField {
                field: "files.label_id",
                ..
            }
        ));
    }

    #[test]
    fn colliding_outputs_are_rejected() {
        let manifest = manifest_with_files(vec![
            FileMapping::new("staging/report.txt", "l1"),
            FileMapping::new("archive/report.txt", "l2"),
        ]);
        let err = validate_manifest(&manifest).expect_err("output collision");
        assert!(matches!(err, ConfigError::DuplicateOutput { .. }));
    }

    #[test]
    fn zero_retry_attempts_are_rejected() {
        let mut manifest = manifest_with_files(vec![FileMapping::new("input/a.txt", "l1")]);
        manifest.retry.max_attempts = 0;
        let err = validate_manifest(&manifest).expect_err("zero attempts");
        assert!(matches!(
            err,
            ConfigError::InvalidField {
                field: "retry.max_attempts",
                ..
            }
        ));
    }

    #[test]
    fn shared_template_and_output_dir_is_rejected() {
        let mut manifest = manifest_with_files(vec![FileMapping::new("input/a.txt", "l1")]);
        manifest.output_dir = manifest.template_dir.clone();
        let err = validate_manifest(&manifest).expect_err("shared dir");
        assert!(matches!(
            err,
            ConfigError::InvalidField {
                field: "output_dir",
                ..
            }
        ));
    }
}
