//! The scheduling loop.
//!
//! One task owns the FIFO queue, the set of in-flight request tasks and the
//! per-session run state. Commands from [`Scheduler`](super::Scheduler)
//! handles and request completions are both handled here, one at a time, so
//! no two outcome transitions ever interleave.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinSet};

use crate::control::{AbortToken, Registration, RequestRegistry};
use crate::error::UploadError;
use crate::retry::RequestError;
use crate::session::{SessionId, UploadSession};

use super::confirm::ChunkBitmap;
use super::execute::{execute, ExecContext};
use super::task::{Outcome, RequestTask, Stage};

pub(crate) type Reply = oneshot::Sender<Result<(), UploadError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ClearKind {
    Pause,
    Cancel,
}

pub(crate) enum Command {
    /// Start a fresh submission (precheck first) or resume (test every chunk).
    Upload {
        session: Arc<UploadSession>,
        resume: bool,
        reply: Reply,
    },
    Clear {
        session: Arc<UploadSession>,
        kind: ClearKind,
        reply: Reply,
    },
}

/// One active submission of a session.
struct RunState {
    run: u64,
    confirmed: ChunkBitmap,
    merge_queued: bool,
}

struct Completion {
    task: RequestTask,
    token: Arc<AbortToken>,
    outcome: Outcome,
}

pub(crate) struct SchedulerLoop {
    ctx: ExecContext,
    registry: Arc<RequestRegistry>,
    limit: usize,
    queue: VecDeque<RequestTask>,
    in_flight: JoinSet<Completion>,
    runs: HashMap<SessionId, RunState>,
    next_run: u64,
}

impl SchedulerLoop {
    pub(crate) fn new(ctx: ExecContext, registry: Arc<RequestRegistry>) -> Self {
        let limit = ctx.options.config.effective_concurrency();
        Self {
            ctx,
            registry,
            limit,
            queue: VecDeque::new(),
            in_flight: JoinSet::new(),
            runs: HashMap::new(),
            next_run: 0,
        }
    }

    /// Runs until every command sender is gone, then aborts whatever is in flight.
    pub(crate) async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        loop {
            self.fill();
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(cmd) => self.handle(cmd),
                    None => break,
                },
                Some(joined) = self.in_flight.join_next(), if !self.in_flight.is_empty() => {
                    self.complete(joined);
                }
            }
        }

        tracing::debug!(in_flight = self.in_flight.len(), "scheduler shutting down");
        self.queue.clear();
        self.registry.abort_all();
        while self.in_flight.join_next().await.is_some() {}
    }

    /// Start queued tasks while concurrency slots are free.
    fn fill(&mut self) {
        while self.in_flight.len() < self.limit {
            let Some(task) = self.queue.pop_front() else {
                break;
            };
            self.dispatch(task);
        }
    }

    fn dispatch(&mut self, task: RequestTask) {
        let session_id = task.session.id();
        let (request, token) = self.registry.register(session_id);
        let guard = Registration {
            registry: Arc::clone(&self.registry),
            session: session_id,
            request,
        };
        let ctx = self.ctx.clone();
        self.in_flight.spawn(async move {
            let _guard = guard;
            let outcome = execute(ctx, &task, &token).await;
            Completion { task, token, outcome }
        });
    }

    fn enqueue(&mut self, session: &Arc<UploadSession>, run: u64, stage: Stage) {
        self.queue.push_back(RequestTask {
            session: Arc::clone(session),
            stage,
            run,
        });
    }

    fn enqueue_tests(&mut self, session: &Arc<UploadSession>, run: u64) {
        for i in 0..session.chunk_count() {
            self.enqueue(session, run, Stage::Test(i));
        }
    }

    fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Upload {
                session,
                resume,
                reply,
            } => {
                let _ = reply.send(self.start(session, resume));
            }
            Command::Clear {
                session,
                kind,
                reply,
            } => {
                let _ = reply.send(self.clear(session, kind));
            }
        }
    }

    fn start(&mut self, session: Arc<UploadSession>, resume: bool) -> Result<(), UploadError> {
        let id = session.id();
        if !session.is_ready() {
            return Err(UploadError::NotReady(id));
        }
        if self.runs.contains_key(&id) {
            tracing::warn!(session = %id, "upload requested for a session that is already running");
            return Err(UploadError::AlreadyRunning(id));
        }
        let run = self.next_run;
        self.next_run += 1;
        self.runs.insert(
            id,
            RunState {
                run,
                confirmed: ChunkBitmap::new(session.chunk_count()),
                merge_queued: false,
            },
        );

        session.touch();
        tracing::info!(
            session = %id,
            file = session.source().name(),
            chunks = session.chunk_count(),
            resume,
            "upload started"
        );
        self.ctx.events.on_start(&session);
        if resume {
            self.enqueue_tests(&session, run);
        } else {
            self.enqueue(&session, run, Stage::Precheck);
        }
        Ok(())
    }

    /// Drop the session's queued tasks, abort its in-flight ones and zero its transfer state.
    fn tear_down(&mut self, session: &UploadSession) -> usize {
        let id = session.id();
        self.queue.retain(|t| t.session.id() != id);
        let aborted = self.registry.abort_session(id);
        session.reset_transfer();
        self.runs.remove(&id);
        aborted
    }

    fn clear(&mut self, session: Arc<UploadSession>, kind: ClearKind) -> Result<(), UploadError> {
        let id = session.id();
        if kind == ClearKind::Pause && !self.runs.contains_key(&id) {
            return Err(UploadError::NotRunning(id));
        }
        let aborted = self.tear_down(&session);
        match kind {
            ClearKind::Pause => {
                tracing::info!(session = %id, aborted, "upload paused");
                self.ctx.events.on_pause(&session);
            }
            ClearKind::Cancel => {
                tracing::info!(session = %id, aborted, "upload cancelled");
                self.ctx.events.on_cancel(&session);
            }
        }
        Ok(())
    }

    fn complete(&mut self, joined: Result<Completion, JoinError>) {
        let Completion {
            task,
            token,
            outcome,
        } = match joined {
            Ok(c) => c,
            Err(e) => {
                tracing::error!("request task join: {}", e);
                return;
            }
        };
        let id = task.session.id();
        let current = self.runs.get(&id).map(|r| r.run) == Some(task.run);
        let outcome = if token.is_aborted() || !current {
            Outcome::Abort
        } else {
            outcome
        };
        tracing::debug!(
            session = %id,
            stage = task.stage.name(),
            chunk = ?task.stage.chunk(),
            outcome = outcome.name(),
            "request settled"
        );
        self.apply(task, outcome);
    }

    fn apply(&mut self, task: RequestTask, outcome: Outcome) {
        let session = &task.session;
        let interval = self.ctx.progress_interval();
        match (outcome, task.stage.chunk()) {
            (Outcome::Abort, _) => {}
            (Outcome::Precheck, _) => self.enqueue_tests(session, task.run),
            (Outcome::Test, Some(i)) => self.enqueue(session, task.run, Stage::Real(i)),
            (Outcome::Skip, Some(i)) => {
                let size = session.chunk(i).map_or(0, |c| c.current_size);
                if session.record_chunk_bytes(i, size, interval, Instant::now()) {
                    self.ctx.events.on_progress(session);
                }
                self.confirm(&task, i);
            }
            (Outcome::Real, Some(i)) => {
                session.mark_chunk_loaded(i);
                self.confirm(&task, i);
            }
            (Outcome::Success, _) => {
                let now = Instant::now();
                if session.interval_elapsed(interval, now) {
                    session.mark_all_loaded();
                    session.update_progress_at(now);
                    self.ctx.events.on_progress(session);
                }
                self.runs.remove(&session.id());
                tracing::info!(
                    session = %session.id(),
                    file = session.source().name(),
                    "upload succeeded"
                );
                self.ctx.events.on_success(session);
            }
            (Outcome::Fail(source), _) => self.fail(&task, source),
            (outcome, None) => {
                tracing::error!(
                    session = %session.id(),
                    stage = task.stage.name(),
                    outcome = outcome.name(),
                    "per-chunk outcome for a whole-file request"
                );
            }
        }
    }

    /// Record a server-confirmed chunk; queue the merge on the transition to complete.
    fn confirm(&mut self, task: &RequestTask, index: usize) {
        let session = &task.session;
        let Some(state) = self.runs.get_mut(&session.id()) else {
            return;
        };
        state.confirmed.confirm(index);
        if state.merge_queued || !state.confirmed.all_confirmed() || !session.is_complete() {
            return;
        }
        state.merge_queued = true;
        tracing::info!(session = %session.id(), "all chunks transferred, merging");
        self.ctx.events.on_complete(session);
        self.enqueue(session, task.run, Stage::Merge);
    }

    fn fail(&mut self, task: &RequestTask, source: RequestError) {
        let session = &task.session;
        let aborted = self.tear_down(session);
        let error = UploadError::Request {
            stage: task.stage,
            source,
        };
        tracing::warn!(session = %session.id(), aborted, "upload failed: {}", error);
        self.ctx.events.on_fail(session, &error);
    }
}
