//! File-list manager on top of the scheduler.
//!
//! Keeps an ordered list of files with a per-file status, gates every
//! operation on that status, and forwards all lifecycle events to the
//! caller's sink. Statuses change only in response to scheduler events, so
//! the list always agrees with what the sink has seen.

use std::fmt;
use std::sync::{Arc, Mutex};

use crate::config::{ConfigError, RequestOptions};
use crate::error::UploadError;
use crate::events::UploadEvents;
use crate::partition::partition_session;
use crate::scheduler::Scheduler;
use crate::session::{SessionId, UploadSession};
use crate::source::SourceFile;
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    /// Partitioning and hashing in progress.
    Calculating,
    Waiting,
    Uploading,
    /// Every chunk landed; merge pending.
    Complete,
    Paused,
    Success,
    Failed,
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FileStatus::Calculating => "calculating",
            FileStatus::Waiting => "waiting",
            FileStatus::Uploading => "uploading",
            FileStatus::Complete => "complete",
            FileStatus::Paused => "paused",
            FileStatus::Success => "success",
            FileStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Snapshot of one list entry.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub id: SessionId,
    pub name: String,
    pub size: u64,
    pub status: FileStatus,
    /// Percent with one decimal.
    pub progress: f64,
    /// Bytes/sec.
    pub current_speed: f64,
    pub average_speed: f64,
    pub session: Arc<UploadSession>,
}

struct Entry {
    session: Arc<UploadSession>,
    status: FileStatus,
}

impl Entry {
    fn snapshot(&self) -> UploadFile {
        let snap = self.session.progress_snapshot();
        UploadFile {
            id: self.session.id(),
            name: self.session.source().name().to_string(),
            size: self.session.total_size(),
            status: self.status,
            progress: snap.percent(),
            current_speed: snap.current_speed,
            average_speed: snap.average_speed,
            session: Arc::clone(&self.session),
        }
    }
}

#[derive(Default)]
struct FileList {
    entries: Mutex<Vec<Entry>>,
}

impl FileList {
    fn set_status(&self, id: SessionId, status: FileStatus) {
        let mut entries = self.entries.lock().unwrap();
        if let Some(e) = entries.iter_mut().find(|e| e.session.id() == id) {
            e.status = status;
        }
    }

    fn remove(&self, id: SessionId) {
        self.entries.lock().unwrap().retain(|e| e.session.id() != id);
    }

    fn lookup(&self, id: SessionId) -> Result<(Arc<UploadSession>, FileStatus), UploadError> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.session.id() == id)
            .map(|e| (Arc::clone(&e.session), e.status))
            .ok_or(UploadError::UnknownFile(id))
    }

    fn ids_with(&self, status: FileStatus) -> Vec<SessionId> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.status == status)
            .map(|e| e.session.id())
            .collect()
    }
}

/// Event sink installed in the scheduler: updates statuses, then forwards.
struct StatusTracker {
    files: Arc<FileList>,
    inner: Arc<dyn UploadEvents>,
}

impl UploadEvents for StatusTracker {
    fn on_start(&self, session: &UploadSession) {
        self.files.set_status(session.id(), FileStatus::Uploading);
        self.inner.on_start(session);
    }

    fn on_progress(&self, session: &UploadSession) {
        self.inner.on_progress(session);
    }

    fn on_pause(&self, session: &UploadSession) {
        self.files.set_status(session.id(), FileStatus::Paused);
        self.inner.on_pause(session);
    }

    fn on_cancel(&self, session: &UploadSession) {
        self.files.remove(session.id());
        self.inner.on_cancel(session);
    }

    fn on_complete(&self, session: &UploadSession) {
        self.files.set_status(session.id(), FileStatus::Complete);
        self.inner.on_complete(session);
    }

    fn on_success(&self, session: &UploadSession) {
        self.files.set_status(session.id(), FileStatus::Success);
        self.inner.on_success(session);
    }

    fn on_fail(&self, session: &UploadSession, error: &UploadError) {
        self.files.set_status(session.id(), FileStatus::Failed);
        self.inner.on_fail(session, error);
    }
}

fn require(
    id: SessionId,
    status: FileStatus,
    allowed: &[FileStatus],
    action: &'static str,
) -> Result<(), UploadError> {
    if allowed.contains(&status) {
        Ok(())
    } else {
        Err(UploadError::InvalidState { id, status, action })
    }
}

/// Ordered file list driving one [`Scheduler`].
pub struct Uploader {
    options: Arc<RequestOptions>,
    scheduler: Scheduler,
    files: Arc<FileList>,
    events: Arc<dyn UploadEvents>,
}

impl Uploader {
    /// Validate the configuration and spawn a scheduler on the current runtime.
    pub fn new(
        options: RequestOptions,
        transport: Arc<dyn Transport>,
        events: Arc<dyn UploadEvents>,
    ) -> Result<Self, ConfigError> {
        let files = Arc::new(FileList::default());
        let tracker = Arc::new(StatusTracker {
            files: Arc::clone(&files),
            inner: Arc::clone(&events),
        });
        let scheduler = Scheduler::spawn(options.clone(), transport, tracker)?;
        Ok(Self {
            options: Arc::new(options),
            scheduler,
            files,
            events,
        })
    }

    /// Admit `source`, partition and hash it, and list it as waiting.
    ///
    /// The file is listed as calculating while the partition pass runs; if
    /// the pass fails it is dropped from the list again.
    pub async fn add_file(&self, source: SourceFile) -> Result<SessionId, UploadError> {
        if !self.options.config.accepts(source.name()) || !self.events.on_file_added(&source) {
            tracing::debug!(file = source.name(), "file not accepted");
            return Err(UploadError::Rejected(source.name().to_string()));
        }
        let session = Arc::new(UploadSession::new(source));
        let id = session.id();
        self.files.entries.lock().unwrap().push(Entry {
            session: Arc::clone(&session),
            status: FileStatus::Calculating,
        });

        if let Err(e) = partition_session(&session, self.options.config.chunk_size).await {
            self.files.remove(id);
            let file = session.source().name();
            tracing::warn!(session = %id, file, "partition failed: {}", e);
            return Err(e.into());
        }
        self.files.set_status(id, FileStatus::Waiting);
        self.events.on_file_ready(&session);
        Ok(id)
    }

    /// Add each source in order. Stops at the first error.
    pub async fn add_files(
        &self,
        sources: impl IntoIterator<Item = SourceFile>,
    ) -> Result<Vec<SessionId>, UploadError> {
        let mut ids = Vec::new();
        for source in sources {
            ids.push(self.add_file(source).await?);
        }
        Ok(ids)
    }

    pub fn remove_file(&self, id: SessionId) -> Result<(), UploadError> {
        let (session, status) = self.files.lookup(id)?;
        require(
            id,
            status,
            &[FileStatus::Waiting, FileStatus::Success, FileStatus::Failed],
            "remove",
        )?;
        self.files.remove(id);
        self.events.on_file_removed(&session);
        Ok(())
    }

    /// Start a waiting file, or retry a failed one.
    pub async fn upload(&self, id: SessionId) -> Result<(), UploadError> {
        let (session, status) = self.files.lookup(id)?;
        require(id, status, &[FileStatus::Waiting, FileStatus::Failed], "upload")?;
        self.scheduler.upload(session).await
    }

    pub async fn upload_all(&self) -> Result<(), UploadError> {
        for id in self.files.ids_with(FileStatus::Waiting) {
            self.upload(id).await?;
        }
        Ok(())
    }

    pub async fn pause(&self, id: SessionId) -> Result<(), UploadError> {
        let (session, status) = self.files.lookup(id)?;
        require(id, status, &[FileStatus::Uploading], "pause")?;
        self.scheduler.pause(session).await
    }

    pub async fn pause_all(&self) -> Result<(), UploadError> {
        for id in self.files.ids_with(FileStatus::Uploading) {
            self.pause(id).await?;
        }
        Ok(())
    }

    pub async fn resume(&self, id: SessionId) -> Result<(), UploadError> {
        let (session, status) = self.files.lookup(id)?;
        require(id, status, &[FileStatus::Paused], "resume")?;
        self.scheduler.resume(session).await
    }

    /// Cancel and drop a file from the list.
    pub async fn cancel(&self, id: SessionId) -> Result<(), UploadError> {
        let (session, status) = self.files.lookup(id)?;
        require(
            id,
            status,
            &[FileStatus::Uploading, FileStatus::Paused, FileStatus::Complete],
            "cancel",
        )?;
        self.scheduler.cancel(session).await
    }

    /// Cancel every uploading file.
    pub async fn cancel_all(&self) -> Result<(), UploadError> {
        for id in self.files.ids_with(FileStatus::Uploading) {
            self.cancel(id).await?;
        }
        Ok(())
    }

    pub fn files(&self) -> Vec<UploadFile> {
        self.files
            .entries
            .lock()
            .unwrap()
            .iter()
            .map(Entry::snapshot)
            .collect()
    }

    pub fn file(&self, id: SessionId) -> Option<UploadFile> {
        self.files
            .entries
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.session.id() == id)
            .map(Entry::snapshot)
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Stop the scheduler, aborting whatever is in flight.
    pub async fn shutdown(self) {
        self.scheduler.shutdown().await;
    }
}
