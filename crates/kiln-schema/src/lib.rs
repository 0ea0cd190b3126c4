//! Shared types and the package identity scheme for kiln.
//!
//! Everything here is plain data: references and requirements, the per-node
//! configuration model, package IDs and binary statuses. The resolution engine
//! lives in `kiln-core`.

pub mod config;
pub mod package_id;
pub mod requirement;
pub mod status;
pub mod types;

// Re-exports
pub use config::{ConfigurationModel, Section, ValueMap};
pub use package_id::{PACKAGE_ID_SCHEME, PackageId, PackageIdMode};
pub use requirement::{Requirement, RequirementError, VersionConstraint};
pub use status::BinaryStatus;
pub use types::{PackageName, Reference, ReferenceError, Version};
