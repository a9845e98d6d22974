//! Filesystem loading and parsing for batch manifests.

use std::path::Path;

use tokio::fs;

use crate::error::{ConfigError, ConfigResult};
use crate::model::BatchManifest;
use crate::validate::validate_manifest;

/// Load, parse and validate a manifest from `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be read, is not valid JSON for the
/// manifest schema, or fails structural validation.
pub async fn load_manifest(path: impl AsRef<Path>) -> ConfigResult<BatchManifest> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).await.map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let manifest: BatchManifest =
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: Some(path.to_path_buf()),
            source,
        })?;
    validate_manifest(&manifest)?;
    Ok(manifest)
}

/// Parse and validate a manifest from an in-memory JSON document.
///
/// # Errors
///
/// Returns an error if the document is not valid JSON for the manifest schema
/// or fails structural validation.
pub fn parse_manifest(raw: &str) -> ConfigResult<BatchManifest> {
    let manifest: BatchManifest =
        serde_json::from_str(raw).map_err(|source| ConfigError::Parse { path: None, source })?;
    validate_manifest(&manifest)?;
    Ok(manifest)
}
