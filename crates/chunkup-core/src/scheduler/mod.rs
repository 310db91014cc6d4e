//! Request scheduler.
//!
//! Drives sessions through precheck, per-chunk test, per-chunk upload and
//! merge with one concurrency budget shared by every session submitted to
//! the same scheduler. The loop itself runs as a spawned task (see `run`);
//! [`Scheduler`] is the handle callers talk to.

mod confirm;
mod execute;
mod request;
mod run;
mod task;


pub use request::FILE_FIELD;
pub use task::{Outcome, Stage};

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::config::{ConfigError, RequestOptions};
use crate::control::RequestRegistry;
use crate::error::UploadError;
use crate::events::UploadEvents;
use crate::session::UploadSession;
use crate::transport::Transport;

use execute::ExecContext;
use run::{ClearKind, Command, SchedulerLoop};

/// Handle to a running scheduling loop.
///
/// Dropping every handle (or calling [`shutdown`](Self::shutdown)) stops the
/// loop and aborts whatever is still in flight.
pub struct Scheduler {
    commands: mpsc::UnboundedSender<Command>,
    registry: Arc<RequestRegistry>,
    handle: JoinHandle<()>,
}

impl Scheduler {
    /// Validate `options` and spawn the loop on the current tokio runtime.
    pub fn spawn(
        options: RequestOptions,
        transport: Arc<dyn Transport>,
        events: Arc<dyn UploadEvents>,
    ) -> Result<Self, ConfigError> {
        options.config.validate()?;
        let registry = Arc::new(RequestRegistry::new());
        let ctx = ExecContext {
            options: Arc::new(options),
            transport,
            events,
        };
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(SchedulerLoop::new(ctx, Arc::clone(&registry)).run(rx));
        Ok(Self {
            commands: tx,
            registry,
            handle,
        })
    }

    async fn request(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<(), UploadError>>) -> Command,
    ) -> Result<(), UploadError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(make(reply))
            .map_err(|_| UploadError::SchedulerClosed)?;
        rx.await.map_err(|_| UploadError::SchedulerClosed)?
    }

    /// Submit a partitioned session: precheck first, then test every chunk.
    ///
    /// Returns once the loop accepted the submission and fired `on_start`.
    pub async fn upload(&self, session: Arc<UploadSession>) -> Result<(), UploadError> {
        self.request(|reply| Command::Upload {
            session,
            resume: false,
            reply,
        })
        .await
    }

    /// Resubmit a paused session. Every chunk is tested again; nothing is
    /// trusted from before the pause.
    pub async fn resume(&self, session: Arc<UploadSession>) -> Result<(), UploadError> {
        self.request(|reply| Command::Upload {
            session,
            resume: true,
            reply,
        })
        .await
    }

    /// Drop queued work, abort in-flight requests, zero transfer state and
    /// fire `on_pause`. Fails with [`UploadError::NotRunning`] if the session
    /// is not uploading.
    pub async fn pause(&self, session: Arc<UploadSession>) -> Result<(), UploadError> {
        self.request(|reply| Command::Clear {
            session,
            kind: ClearKind::Pause,
            reply,
        })
        .await
    }

    /// Like [`pause`](Self::pause) but fires `on_cancel`, and also applies to
    /// sessions that are not running.
    pub async fn cancel(&self, session: Arc<UploadSession>) -> Result<(), UploadError> {
        self.request(|reply| Command::Clear {
            session,
            kind: ClearKind::Cancel,
            reply,
        })
        .await
    }

    /// Registry of in-flight requests, keyed by session id.
    pub fn registry(&self) -> &Arc<RequestRegistry> {
        &self.registry
    }

    /// Stop the loop, abort in-flight requests and wait for them to settle.
    pub async fn shutdown(self) {
        drop(self.commands);
        if let Err(e) = self.handle.await {
            tracing::error!("scheduler loop join: {}", e);
        }
    }
}
