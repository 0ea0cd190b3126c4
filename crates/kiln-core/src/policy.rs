//! Build policy: which references may be compiled from source.
//!
//! Entries follow the usual `--build` vocabulary:
//!
//! - `never`: nothing is built (the default)
//! - `missing`: build anything that has no binary
//! - `missing:<pattern>`: build matching references that have no binary
//! - `<pattern>`: always build matching references, ignoring existing remote
//!   binaries

use kiln_schema::Reference;

use crate::config::ConfigError;

/// A glob over `name/version`, also tried against the bare name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefPattern(glob::Pattern);

impl RefPattern {
    /// # Errors
    ///
    /// Returns `ConfigError::Pattern` if the glob is malformed.
    pub fn new(pattern: &str) -> Result<Self, ConfigError> {
        glob::Pattern::new(pattern.trim())
            .map(Self)
            .map_err(|e| ConfigError::Pattern {
                pattern: pattern.to_string(),
                message: e.to_string(),
            })
    }

    pub fn matches(&self, reference: &Reference) -> bool {
        self.0.matches(&reference.to_string()) || self.0.matches(reference.name.as_str())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildPolicy {
    /// `None` when missing binaries are never built; an empty list means
    /// every reference qualifies.
    missing: Option<Vec<RefPattern>>,
    forced: Vec<RefPattern>,
}

impl BuildPolicy {
    pub fn never() -> Self {
        Self::default()
    }

    /// Build every reference that has no binary.
    pub fn missing() -> Self {
        Self {
            missing: Some(Vec::new()),
            forced: Vec::new(),
        }
    }

    /// Parse a list of policy entries.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Pattern` for a malformed glob.
    pub fn parse<S: AsRef<str>>(entries: &[S]) -> Result<Self, ConfigError> {
        let mut policy = Self::default();
        for entry in entries {
            let entry = entry.as_ref().trim();
            if entry == "never" || entry.is_empty() {
                continue;
            }
            if entry == "missing" {
                policy.missing = Some(Vec::new());
            } else if let Some(pattern) = entry.strip_prefix("missing:") {
                let pattern = RefPattern::new(pattern)?;
                match &mut policy.missing {
                    // plain `missing` already covers everything
                    Some(patterns) if patterns.is_empty() => {}
                    Some(patterns) => patterns.push(pattern),
                    None => policy.missing = Some(vec![pattern]),
                }
            } else {
                policy.forced.push(RefPattern::new(entry)?);
            }
        }
        Ok(policy)
    }

    /// Always build references matching `pattern`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Pattern` for a malformed glob.
    pub fn force(mut self, pattern: &str) -> Result<Self, ConfigError> {
        self.forced.push(RefPattern::new(pattern)?);
        Ok(self)
    }

    /// Whether a build from source is forced for `reference`.
    pub fn is_forced(&self, reference: &Reference) -> bool {
        self.forced.iter().any(|p| p.matches(reference))
    }

    /// Whether `reference` may be built when no binary exists.
    pub fn builds_missing(&self, reference: &Reference) -> bool {
        match &self.missing {
            None => false,
            Some(patterns) if patterns.is_empty() => true,
            Some(patterns) => patterns.iter().any(|p| p.matches(reference)),
        }
    }

    /// Whether the policy selects `reference` for building at all.
    pub fn selects(&self, reference: &Reference) -> bool {
        self.is_forced(reference) || self.builds_missing(reference)
    }
}
