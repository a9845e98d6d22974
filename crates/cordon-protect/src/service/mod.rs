//! The protection service trait implemented by SDK adapters.

use std::path::Path;

use async_trait::async_trait;

use crate::error::ServiceResult;
use crate::model::{ContentId, IssuedLicense, LabelId, LicenseHandle, PreparedFile};

/// Client capability the batch pipeline consumes.
///
/// Adapters wrap the real protection SDK; tests substitute scripted mocks.
/// Every method may block on remote calls and is fallible; transient failures
/// are distinguished through [`crate::ServiceError::is_transient`].
#[async_trait]
pub trait ProtectionClient: Send + Sync {
    /// Issue a fresh protection license by protecting `plaintext_path` under
    /// `label_id`, committing the protected template artifact to
    /// `artifact_path`.
    async fn issue_license(
        &self,
        plaintext_path: &Path,
        label_id: &LabelId,
        artifact_path: &Path,
    ) -> ServiceResult<IssuedLicense>;

    /// Apply label metadata and an already-issued license to `source_path`,
    /// returning prepared state for a later [`Self::commit`].
    async fn apply_license(
        &self,
        source_path: &Path,
        label_id: &LabelId,
        handle: &LicenseHandle,
    ) -> ServiceResult<PreparedFile>;

    /// Commit prepared protection state to `output_path`.
    async fn commit(&self, prepared: PreparedFile, output_path: &Path) -> ServiceResult<()>;

    /// Read the content identifier embedded in a committed protected artifact.
    async fn read_content_id(&self, path: &Path) -> ServiceResult<ContentId>;
}
