//! Lifecycle event sink.
//!
//! Every method has a no-op default so callers implement only what they
//! observe. Calls are synchronous and come from the scheduler loop, except
//! `on_progress` during a chunk upload, which comes from the transport's
//! progress callback.

use crate::error::UploadError;
use crate::session::UploadSession;
use crate::source::SourceFile;

pub trait UploadEvents: Send + Sync + 'static {
    /// Admission filter for the uploader. Returning false rejects the file.
    fn on_file_added(&self, _source: &SourceFile) -> bool {
        true
    }

    /// Partitioning and hashing finished; the file can be uploaded.
    fn on_file_ready(&self, _session: &UploadSession) {}

    fn on_file_removed(&self, _session: &UploadSession) {}

    fn on_start(&self, _session: &UploadSession) {}

    fn on_progress(&self, _session: &UploadSession) {}

    fn on_pause(&self, _session: &UploadSession) {}

    fn on_cancel(&self, _session: &UploadSession) {}

    /// Every chunk landed; the merge request is queued.
    fn on_complete(&self, _session: &UploadSession) {}

    fn on_success(&self, _session: &UploadSession) {}

    fn on_fail(&self, _session: &UploadSession, _error: &UploadError) {}
}

/// Sink that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoEvents;

impl UploadEvents for NoEvents {}
