//! Process exit statuses for front ends driving a resolution.

use crate::error::ResolveError;
use crate::resolver::{Outcome, Resolution};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ExitStatus {
    Success = 0,
    GeneralFailure = 1,
    /// Setup failed before resolution started. Never produced by the engine.
    MigrationError = 2,
    InvalidConfiguration = 6,
    UnsolvableGraph = 7,
}

impl ExitStatus {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_outcome(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Ready => Self::Success,
            Outcome::MissingBinaries => Self::GeneralFailure,
            Outcome::InvalidPackages => Self::InvalidConfiguration,
        }
    }

    pub fn from_error(error: &ResolveError) -> Self {
        if error.is_structural() {
            Self::UnsolvableGraph
        } else {
            Self::GeneralFailure
        }
    }

    pub fn from_result(result: &Result<Resolution, ResolveError>) -> Self {
        match result {
            Ok(resolution) => Self::from_outcome(resolution.outcome()),
            Err(error) => Self::from_error(error),
        }
    }
}

impl From<ExitStatus> for std::process::ExitCode {
    fn from(status: ExitStatus) -> Self {
        std::process::ExitCode::from(status.code())
    }
}
