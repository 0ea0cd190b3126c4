//! Requirement declarations and version constraints.
//!
//! Textual form: `name/1.2.0` for an exact version, `name/[>=1.0 <2.0]` for a
//! range. Range comparators may be separated by whitespace or commas.

use crate::types::{PackageName, Version};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Errors produced when parsing a requirement string.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RequirementError {
    /// The input had no `/` separating name and constraint.
    #[error("Invalid requirement '{0}': expected 'name/version' or 'name/[range]'")]
    Malformed(String),

    /// The bracketed range could not be parsed.
    #[error("Invalid version range '{range}' in '{input}': {reason}")]
    BadRange {
        /// Full requirement text.
        input: String,
        /// Range text between the brackets.
        range: String,
        /// Parser message.
        reason: String,
    },
}

/// A constraint on the version a requirement may resolve to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionConstraint {
    /// Exactly this version.
    Exact(Version),
    /// Any version inside the semantic-version range.
    Range(semver::VersionReq),
}

impl VersionConstraint {
    /// Parse a range body such as `>=1.0 <2.0` or `^1.2`.
    ///
    /// # Errors
    ///
    /// Returns the `semver` parser message if the range is not valid.
    pub fn parse_range(body: &str) -> Result<Self, String> {
        let normalized = body
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(", ");
        let normalized = if normalized.is_empty() {
            "*".to_string()
        } else {
            normalized
        };
        semver::VersionReq::parse(&normalized)
            .map(Self::Range)
            .map_err(|e| e.to_string())
    }

    /// Whether `version` satisfies this constraint.
    ///
    /// Exact constraints compare the semantic value when both sides parse
    /// (so `1.2` matches `1.2.0`), otherwise the raw strings.
    pub fn matches(&self, version: &Version) -> bool {
        match self {
            Self::Exact(expected) => match (expected.semver(), version.semver()) {
                (Some(a), Some(b)) => a == b,
                _ => expected == version,
            },
            Self::Range(req) => version.semver().is_some_and(|v| req.matches(&v)),
        }
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(v) => write!(f, "{v}"),
            Self::Range(req) => write!(f, "[{req}]"),
        }
    }
}

/// A declared dependency of one package on another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "RequirementSpec", try_from = "RequirementSpec")]
pub struct Requirement {
    /// Name of the required package.
    pub name: PackageName,
    /// Versions this requirement accepts.
    pub constraint: VersionConstraint,
    /// Pins the version of `name` for the whole graph without adding an edge.
    pub is_override: bool,
    /// Whether consumers of the requiring package also see this dependency.
    pub transitive: bool,
}

impl Requirement {
    /// Parse a plain (transitive, non-override) requirement.
    ///
    /// # Errors
    ///
    /// Returns a [`RequirementError`] if the text is malformed.
    pub fn parse(s: &str) -> Result<Self, RequirementError> {
        s.parse()
    }

    /// Turn this requirement into a version override.
    pub fn overriding(mut self) -> Self {
        self.is_override = true;
        self
    }

    /// Make this requirement visible only to the direct requirer.
    pub fn non_transitive(mut self) -> Self {
        self.transitive = false;
        self
    }
}

impl FromStr for Requirement {
    type Err = RequirementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, rest) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| RequirementError::Malformed(s.to_string()))?;
        let rest = rest.trim();
        if name.trim().is_empty() || rest.is_empty() {
            return Err(RequirementError::Malformed(s.to_string()));
        }

        let constraint = if let Some(body) = rest.strip_prefix('[') {
            let body = body
                .strip_suffix(']')
                .ok_or_else(|| RequirementError::Malformed(s.to_string()))?;
            VersionConstraint::parse_range(body).map_err(|reason| RequirementError::BadRange {
                input: s.to_string(),
                range: body.to_string(),
                reason,
            })?
        } else {
            VersionConstraint::Exact(Version::new(rest))
        };

        Ok(Self {
            name: PackageName::new(name),
            constraint,
            is_override: false,
            transitive: true,
        })
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.constraint)
    }
}

/// Serialized shape of a [`Requirement`] in package definitions.
///
/// Accepts either a bare string (`"zlib/[>=1.2 <2]"`) or a table with
/// `ref`, `override` and `transitive` keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequirementSpec {
    /// Plain requirement text.
    Short(String),
    /// Requirement text with flags.
    Detailed {
        /// Requirement text.
        #[serde(rename = "ref")]
        reference: String,
        /// See [`Requirement::is_override`].
        #[serde(default, rename = "override")]
        is_override: bool,
        /// See [`Requirement::transitive`].
        #[serde(default = "default_transitive")]
        transitive: bool,
    },
}

fn default_transitive() -> bool {
    true
}

impl From<Requirement> for RequirementSpec {
    fn from(r: Requirement) -> Self {
        if !r.is_override && r.transitive {
            Self::Short(r.to_string())
        } else {
            Self::Detailed {
                reference: r.to_string(),
                is_override: r.is_override,
                transitive: r.transitive,
            }
        }
    }
}

impl TryFrom<RequirementSpec> for Requirement {
    type Error = RequirementError;

    fn try_from(spec: RequirementSpec) -> Result<Self, Self::Error> {
        match spec {
            RequirementSpec::Short(s) => s.parse(),
            RequirementSpec::Detailed {
                reference,
                is_override,
                transitive,
            } => {
                let mut req: Requirement = reference.parse()?;
                req.is_override = is_override;
                req.transitive = transitive;
                Ok(req)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_requirement() {
        let req = Requirement::parse("dep/0.1").unwrap();
        assert_eq!(req.name, "dep");
        assert_eq!(req.constraint, VersionConstraint::Exact(Version::new("0.1")));
        assert!(req.transitive);
        assert!(!req.is_override);
        assert!(req.constraint.matches(&Version::new("0.1.0")));
        assert!(!req.constraint.matches(&Version::new("0.2")));
    }

    #[test]
    fn range_requirement_accepts_spaces_and_commas() {
        for text in ["dep/[>=1.0 <2.0]", "dep/[>=1.0, <2.0]"] {
            let req = Requirement::parse(text).unwrap();
            assert!(req.constraint.matches(&Version::new("1.5")));
            assert!(!req.constraint.matches(&Version::new("2.0")));
        }
    }

    #[test]
    fn malformed_requirements_fail() {
        assert!(matches!(
            Requirement::parse("dep"),
            Err(RequirementError::Malformed(_))
        ));
        assert!(matches!(
            Requirement::parse("dep/[>=1.0"),
            Err(RequirementError::Malformed(_))
        ));
        assert!(matches!(
            Requirement::parse("dep/[banana]"),
            Err(RequirementError::BadRange { .. })
        ));
    }

    #[test]
    fn detailed_spec_carries_flags() {
        let json = r#"{"ref": "zlib/1.3", "override": true, "transitive": false}"#;
        let req: Requirement = serde_json::from_str(json).unwrap();
        assert!(req.is_override);
        assert!(!req.transitive);

        let short: Requirement = serde_json::from_str(r#""zlib/[^1.2]""#).unwrap();
        assert!(short.transitive);
    }
}
