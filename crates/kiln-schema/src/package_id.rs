//! Package identity: the binary cache key of a configured package.
//!
//! Scheme v2 hashes the canonical rendering of a (pruned)
//! [`ConfigurationModel`] with SHA-256:
//!
//! ```text
//! kiln-package-id/2
//! [settings]
//! os=Linux
//! [options]
//! shared=False
//! [requires]
//! zlib=zlib/1.Y.Z
//! ```
//!
//! Empty sections are omitted and keys are sorted, so the digest only depends
//! on the retained entries. Keys and values escape `\`, `=`, `[` and line
//! breaks with a backslash, so no value can spill into another entry or
//! section. Dependents embed dependency digests in their own
//! `[requires]` section under `full_package_mode`, which is why the scheme is
//! frozen: changing the rendering changes every ID in the network.

use crate::config::{ConfigurationModel, Section};
use crate::types::{Reference, Version};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Version tag of the hashing scheme, hashed as the first line of every ID.
pub const PACKAGE_ID_SCHEME: &str = "kiln-package-id/2";

/// A computed package ID.
///
/// Equality and hashing only consider the digest; the contributions are kept
/// for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageId {
    digest: String,
    contributions: Vec<(String, String)>,
}

impl PackageId {
    /// Compute the ID of a configuration model.
    pub fn compute(model: &ConfigurationModel) -> Self {
        let text = canonical_text(model);
        let mut hasher = Sha256::new();
        hasher.update(PACKAGE_ID_SCHEME.as_bytes());
        hasher.update(b"\n");
        hasher.update(text.as_bytes());
        Self {
            digest: hex::encode(hasher.finalize()),
            contributions: model.fields(),
        }
    }

    /// The 64-character lowercase hex digest.
    pub fn as_str(&self) -> &str {
        &self.digest
    }

    /// The `(section.key, value)` pairs that produced this ID, in hashing order.
    pub fn contributions(&self) -> &[(String, String)] {
        &self.contributions
    }
}

impl PartialEq for PackageId {
    fn eq(&self, other: &Self) -> bool {
        self.digest == other.digest
    }
}

impl Eq for PackageId {}

impl std::hash::Hash for PackageId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.digest.hash(state);
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.digest)
    }
}

impl AsRef<str> for PackageId {
    fn as_ref(&self) -> &str {
        &self.digest
    }
}

/// Render the canonical hashing input of a model (without the scheme line).
pub fn canonical_text(model: &ConfigurationModel) -> String {
    let mut out = String::new();
    for section in [Section::Settings, Section::Options, Section::Requires] {
        let values = model.section(section);
        if values.is_empty() {
            continue;
        }
        out.push('[');
        out.push_str(section.as_str());
        out.push_str("]\n");
        for (key, value) in values.iter() {
            push_escaped(&mut out, key);
            out.push('=');
            push_escaped(&mut out, value);
            out.push('\n');
        }
    }
    out
}

fn push_escaped(out: &mut String, token: &str) {
    for c in token.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '=' => out.push_str("\\="),
            '[' => out.push_str("\\["),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
}

/// How a dependency contributes to the package ID of its dependents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PackageIdMode {
    /// The dependency does not contribute at all.
    #[serde(rename = "unrelated_mode")]
    Unrelated,
    /// Name and major version (`zlib/1.Y.Z`); pre-1.0 versions contribute in full.
    #[default]
    #[serde(rename = "semver_mode")]
    Semver,
    /// Name, major and minor version (`zlib/1.2.Z`).
    #[serde(rename = "minor_mode")]
    Minor,
    /// Name and full `major.minor.patch` (`zlib/1.2.13`).
    #[serde(rename = "patch_mode")]
    Patch,
    /// Name and the version string verbatim, including pre-release tags.
    #[serde(rename = "full_version_mode")]
    FullVersion,
    /// Name, version and the dependency's own package ID.
    #[serde(rename = "full_package_mode")]
    FullPackage,
}

impl PackageIdMode {
    /// Configuration-file spelling of the mode.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unrelated => "unrelated_mode",
            Self::Semver => "semver_mode",
            Self::Minor => "minor_mode",
            Self::Patch => "patch_mode",
            Self::FullVersion => "full_version_mode",
            Self::FullPackage => "full_package_mode",
        }
    }

    /// Render the contribution of `dependency` (with its package ID, if any).
    ///
    /// Returns `None` when the mode ignores dependencies. Versions that are
    /// not semantic versions always contribute verbatim.
    pub fn render(self, dependency: &Reference, package_id: Option<&PackageId>) -> Option<String> {
        let name = &dependency.name;
        let raw = &dependency.version;
        match self {
            Self::Unrelated => None,
            Self::FullVersion => Some(format!("{name}/{raw}")),
            Self::FullPackage => Some(match package_id {
                Some(id) => format!("{name}/{raw}:{id}"),
                None => format!("{name}/{raw}"),
            }),
            Self::Semver | Self::Minor | Self::Patch => {
                Some(format!("{name}/{}", self.render_version(raw)))
            }
        }
    }

    fn render_version(self, version: &Version) -> String {
        let Some(v) = version.semver() else {
            return version.to_string();
        };
        match self {
            Self::Semver if v.major == 0 => format!("{}.{}.{}", v.major, v.minor, v.patch),
            Self::Semver => format!("{}.Y.Z", v.major),
            Self::Minor => format!("{}.{}.Z", v.major, v.minor),
            _ => format!("{}.{}.{}", v.major, v.minor, v.patch),
        }
    }
}

impl fmt::Display for PackageIdMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PackageIdMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unrelated_mode" => Ok(Self::Unrelated),
            "semver_mode" => Ok(Self::Semver),
            "minor_mode" => Ok(Self::Minor),
            "patch_mode" => Ok(Self::Patch),
            "full_version_mode" => Ok(Self::FullVersion),
            "full_package_mode" => Ok(Self::FullPackage),
            _ => Err(format!("Unknown package_id mode: {s}")),
        }
    }
}
