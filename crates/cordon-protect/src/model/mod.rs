//! Domain models for protection service interactions.
//!
//! # Design
//! - Keep identifier types opaque; their contents are issued by the service.
//! - `LicenseHandle` deliberately does not implement `Clone`: one handle is
//!   issued per label and every consumer borrows it from its owning entry.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Opaque identifier of a sensitivity label, issued by the label taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelId(String);

impl LabelId {
    /// Wrap an externally issued label identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LabelId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

/// Identifier derived from a protection license by the service.
///
/// Two protected artifacts sharing a `ContentId` are provably protected under
/// the same license. Used only for verification, never for lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    /// Wrap a service-derived content identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

/// Opaque reference to an issued protection license.
///
/// Carries enough adapter-defined state to re-apply the same cryptographic
/// policy to additional content without re-issuance. Owned exclusively by the
/// template entry for its label; consumers only ever borrow it.
#[derive(Debug, PartialEq, Eq)]
pub struct LicenseHandle {
    token: String,
}

impl LicenseHandle {
    /// Wrap the adapter-defined handle state.
    #[must_use]
    pub fn from_token(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    /// Borrow the adapter-defined handle state.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }
}

/// Result of issuing a fresh protection license for a label.
#[derive(Debug)]
pub struct IssuedLicense {
    /// Handle re-usable for further protection under the same license.
    pub handle: LicenseHandle,
    /// Content identifier derived from the issued license.
    pub content_id: ContentId,
    /// Location of the committed protected template artifact.
    pub artifact_path: PathBuf,
}

/// Prepared protection state for a single file, produced by
/// [`crate::ProtectionClient::apply_license`] and consumed by
/// [`crate::ProtectionClient::commit`].
#[derive(Debug)]
pub struct PreparedFile {
    /// Adapter-defined state describing the pending protected write.
    pub token: String,
    /// Source artifact the protection was applied to.
    pub source_path: PathBuf,
    /// Label the prepared state was computed for.
    pub label_id: LabelId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_and_content_ids_round_trip_as_strings() {
        let label = LabelId::new("cf3f4243-49e2-4f99-af45-df2b9e7146fd");
        assert_eq!(label.as_str(), "cf3f4243-49e2-4f99-af45-df2b9e7146fd");
        assert_eq!(label.to_string(), label.as_str());

        let content = ContentId::new("cid-42");
        assert_eq!(content.as_str(), "cid-42");
        assert_eq!(content, ContentId::new("cid-42"));
    }

    #[test]
    fn license_handle_exposes_opaque_token() {
        let handle = LicenseHandle::from_token("pl-token-1");
        assert_eq!(handle.token(), "pl-token-1");
    }
}
