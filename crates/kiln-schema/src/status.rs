//! Binary status of a resolved node.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What has to happen to obtain the binary of a resolved node.
///
/// Assigned once per node per resolution pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryStatus {
    /// Must be compiled from source.
    Build,
    /// A binary for the effective package ID is in the local cache.
    Cache,
    /// A binary exists only on a remote and has to be fetched.
    Download,
    /// No binary exists anywhere and building was not requested.
    Missing,
    /// No binary can legally exist for the requested configuration.
    Invalid,
    /// Nothing to do for this node.
    Skip,
}

impl BinaryStatus {
    /// Display name of the status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Build => "Build",
            Self::Cache => "Cache",
            Self::Download => "Download",
            Self::Missing => "Missing",
            Self::Invalid => "Invalid",
            Self::Skip => "Skip",
        }
    }

    /// Whether an existing binary satisfies the node.
    pub fn has_binary(self) -> bool {
        matches!(self, Self::Cache | Self::Download)
    }
}

impl fmt::Display for BinaryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
