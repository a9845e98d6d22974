//! Local envelope-format adapter for the protection service seam.
//!
//! Stands in for a production protection SDK during development and
//! demonstrations: "protection" wraps the plaintext in a JSON envelope
//! carrying the label, the license token and the content identifier. Content
//! is stored as UTF-8 text; this adapter is not a cryptographic protection
//! format and never will be.

use std::path::Path;

use async_trait::async_trait;
use cordon_protect::{
    ContentId, IssuedLicense, LabelId, LicenseHandle, PreparedFile, ProtectionClient,
    ServiceError, ServiceResult,
};
use serde::{Deserialize, Serialize};
use tokio::fs;
use uuid::Uuid;

const LICENSE_TOKEN_PREFIX: &str = "pl-";
const CONTENT_ID_PREFIX: &str = "cid-";

/// Protected artifact layout written by the adapter.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    format: String,
    label_id: String,
    license_token: String,
    content_id: String,
    body: String,
}

impl Envelope {
    const FORMAT: &'static str = "cordon-envelope/1";
}

/// Filesystem-backed protection client writing JSON envelopes.
#[derive(Debug, Default, Clone)]
pub struct EnvelopeProtectionClient;

impl EnvelopeProtectionClient {
    /// Construct the adapter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    async fn read_body(path: &Path) -> ServiceResult<String> {
        let bytes = fs::read(path).await.map_err(|source| ServiceError::Io {
            operation: "read_source",
            path: path.to_path_buf(),
            source,
        })?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn write_envelope(path: &Path, envelope: &Envelope) -> ServiceResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| ServiceError::Io {
                    operation: "create_dir",
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        let document = serde_json::to_string_pretty(envelope).map_err(|_| {
            ServiceError::InvalidSource {
                path: path.to_path_buf(),
                reason: "envelope not serializable",
            }
        })?;
        fs::write(path, document)
            .await
            .map_err(|source| ServiceError::Io {
                operation: "write_envelope",
                path: path.to_path_buf(),
                source,
            })
    }

    /// Derive the content identifier bound to a license token.
    fn content_id_for(token: &str, path: &Path) -> ServiceResult<String> {
        token
            .strip_prefix(LICENSE_TOKEN_PREFIX)
            .map(|key| format!("{CONTENT_ID_PREFIX}{key}"))
            .ok_or_else(|| ServiceError::InvalidSource {
                path: path.to_path_buf(),
                reason: "malformed license token",
            })
    }
}

#[async_trait]
impl ProtectionClient for EnvelopeProtectionClient {
    async fn issue_license(
        &self,
        plaintext_path: &Path,
        label_id: &LabelId,
        artifact_path: &Path,
    ) -> ServiceResult<IssuedLicense> {
        let body = Self::read_body(plaintext_path).await?;
        let key = Uuid::new_v4();
        let token = format!("{LICENSE_TOKEN_PREFIX}{key}");
        let content_id = format!("{CONTENT_ID_PREFIX}{key}");

        let envelope = Envelope {
            format: Envelope::FORMAT.to_string(),
            label_id: label_id.to_string(),
            license_token: token.clone(),
            content_id: content_id.clone(),
            body,
        };
        Self::write_envelope(artifact_path, &envelope).await?;

        Ok(IssuedLicense {
            handle: LicenseHandle::from_token(token),
            content_id: ContentId::new(content_id),
            artifact_path: artifact_path.to_path_buf(),
        })
    }

    async fn apply_license(
        &self,
        source_path: &Path,
        label_id: &LabelId,
        handle: &LicenseHandle,
    ) -> ServiceResult<PreparedFile> {
        if !source_path.is_file() {
            return Err(ServiceError::InvalidSource {
                path: source_path.to_path_buf(),
                reason: "source file does not exist",
            });
        }
        Ok(PreparedFile {
            token: handle.token().to_string(),
            source_path: source_path.to_path_buf(),
            label_id: label_id.clone(),
        })
    }

    async fn commit(&self, prepared: PreparedFile, output_path: &Path) -> ServiceResult<()> {
        let body = Self::read_body(&prepared.source_path).await?;
        let content_id = Self::content_id_for(&prepared.token, output_path)?;
        let envelope = Envelope {
            format: Envelope::FORMAT.to_string(),
            label_id: prepared.label_id.to_string(),
            license_token: prepared.token,
            content_id,
            body,
        };
        Self::write_envelope(output_path, &envelope).await
    }

    async fn read_content_id(&self, path: &Path) -> ServiceResult<ContentId> {
        let document = fs::read_to_string(path)
            .await
            .map_err(|source| ServiceError::Io {
                operation: "read_envelope",
                path: path.to_path_buf(),
                source,
            })?;
        let envelope: Envelope =
            serde_json::from_str(&document).map_err(|_| ServiceError::InvalidSource {
                path: path.to_path_buf(),
                reason: "not a cordon envelope",
            })?;
        if envelope.format != Envelope::FORMAT {
            return Err(ServiceError::InvalidSource {
                path: path.to_path_buf(),
                reason: "unsupported envelope format",
            });
        }
        Ok(ContentId::new(envelope.content_id))
    }
}
