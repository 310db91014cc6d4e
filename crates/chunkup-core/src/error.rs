//! Top-level error surfaced by the scheduler and the uploader.

use crate::partition::PartitionError;
use crate::retry::RequestError;
use crate::scheduler::Stage;
use crate::session::SessionId;
use crate::uploader::FileStatus;

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// A request exhausted its resends or was rejected; the session was torn down.
    #[error("{stage} request failed: {source}")]
    Request {
        stage: Stage,
        #[source]
        source: RequestError,
    },
    #[error(transparent)]
    Partition(#[from] PartitionError),
    #[error("scheduler has shut down")]
    SchedulerClosed,
    #[error("session {0} has not been partitioned")]
    NotReady(SessionId),
    #[error("session {0} is already uploading")]
    AlreadyRunning(SessionId),
    #[error("session {0} is not uploading")]
    NotRunning(SessionId),
    #[error("no file with id {0}")]
    UnknownFile(SessionId),
    #[error("file {0:?} was not accepted")]
    Rejected(String),
    #[error("cannot {action} file {id} while it is {status}")]
    InvalidState {
        id: SessionId,
        status: FileStatus,
        action: &'static str,
    },
}

impl UploadError {
    /// Chunk index the failing request was for (None for whole-file requests).
    pub fn chunk(&self) -> Option<usize> {
        match self {
            UploadError::Request { stage, .. } => stage.chunk(),
            _ => None,
        }
    }
}
