//! Request tasks, protocol stages and the outcomes that drive transitions.

use std::fmt;
use std::sync::Arc;

use crate::retry::{RequestError, StatusClass};
use crate::session::UploadSession;

/// Which request of the upload protocol a task issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Whole-file existence check.
    Precheck,
    /// Chunk existence check.
    Test(usize),
    /// Chunk upload.
    Real(usize),
    Merge,
}

impl Stage {
    /// Chunk index for per-chunk stages.
    pub fn chunk(self) -> Option<usize> {
        match self {
            Stage::Test(i) | Stage::Real(i) => Some(i),
            Stage::Precheck | Stage::Merge => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Stage::Precheck => "precheck",
            Stage::Test(_) => "test",
            Stage::Real(_) => "upload",
            Stage::Merge => "merge",
        }
    }

    /// Map a response class to this stage's outcome. `None` means resend.
    pub(crate) fn outcome_for(self, class: StatusClass, status: u16) -> Option<Outcome> {
        match (self, class) {
            (_, StatusClass::Fail) => Some(Outcome::Fail(RequestError::Rejected { status })),
            (_, StatusClass::Unclassified) => None,
            (Stage::Precheck, StatusClass::Success) => Some(Outcome::Precheck),
            (Stage::Precheck, StatusClass::Skip) => Some(Outcome::Success),
            (Stage::Test(_), StatusClass::Success) => Some(Outcome::Test),
            (Stage::Test(_), StatusClass::Skip) => Some(Outcome::Skip),
            (Stage::Real(_), StatusClass::Success) => Some(Outcome::Real),
            (Stage::Merge, StatusClass::Success) => Some(Outcome::Success),
            (Stage::Real(_) | Stage::Merge, StatusClass::Skip) => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.chunk() {
            Some(i) => write!(f, "{} (chunk {})", self.name(), i),
            None => f.write_str(self.name()),
        }
    }
}

/// Result of one request task.
#[derive(Debug)]
pub enum Outcome {
    /// Precheck found no copy on the server; test every chunk.
    Precheck,
    /// Chunk is missing on the server; upload it.
    Test,
    /// Chunk already present.
    Skip,
    /// Chunk body accepted.
    Real,
    /// Merge accepted, or precheck found the whole file.
    Success,
    Fail(RequestError),
    Abort,
}

impl Outcome {
    pub fn name(&self) -> &'static str {
        match self {
            Outcome::Precheck => "precheck",
            Outcome::Test => "test",
            Outcome::Skip => "skip",
            Outcome::Real => "real",
            Outcome::Success => "success",
            Outcome::Fail(_) => "fail",
            Outcome::Abort => "abort",
        }
    }
}

/// One pending or in-flight request. `run` is the submission it belongs to:
/// outcomes from an earlier submission of the same session are discarded.
#[derive(Debug, Clone)]
pub(crate) struct RequestTask {
    pub(crate) session: Arc<UploadSession>,
    pub(crate) stage: Stage,
    pub(crate) run: u64,
}
