//! Engine-agnostic protection service interfaces and DTOs.
//!
//! Layout: `model/` (label, license and content identifier types),
//! `service/` (the `ProtectionClient` trait implemented by adapters),
//! `error.rs` (the service error taxonomy).

pub mod error;
pub mod model;
pub mod service;

pub use error::{ServiceError, ServiceResult};
pub use model::{ContentId, IssuedLicense, LabelId, LicenseHandle, PreparedFile};
pub use service::ProtectionClient;
