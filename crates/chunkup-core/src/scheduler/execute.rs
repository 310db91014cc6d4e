//! Run one request task to its outcome.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::RequestOptions;
use crate::control::AbortToken;
use crate::events::UploadEvents;
use crate::retry::{
    classify_status, run_with_retry, AttemptError, RequestError, RetryExit, RetryPolicy,
};
use crate::transport::{ProgressFn, Transport};

use super::request::build_request;
use super::task::{Outcome, RequestTask, Stage};

/// What every request task needs, shared across tasks.
#[derive(Clone)]
pub(crate) struct ExecContext {
    pub(crate) options: Arc<RequestOptions>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) events: Arc<dyn UploadEvents>,
}

impl ExecContext {
    pub(crate) fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.options.config.progress_callbacks_interval_ms)
    }
}

/// Upload byte progress for chunk `index`: scale the transport's counters to
/// the chunk size, store them, and emit a progress event when the throttle
/// window has elapsed. Ignored once the task's token fired so a late callback
/// cannot undo a reset.
fn chunk_progress(
    ctx: &ExecContext,
    task: &RequestTask,
    index: usize,
    token: &Arc<AbortToken>,
) -> ProgressFn {
    let session = Arc::clone(&task.session);
    let events = Arc::clone(&ctx.events);
    let token = Arc::clone(token);
    let interval = ctx.progress_interval();
    let current_size = session.chunk(index).map_or(0, |c| c.current_size);
    Arc::new(move |sent: u64, total: u64| {
        if token.is_aborted() || total == 0 {
            return;
        }
        let loaded = ((sent.min(total) as f64 / total as f64) * current_size as f64) as u64;
        if session.record_chunk_bytes(index, loaded, interval, Instant::now()) {
            events.on_progress(&session);
        }
    })
}

pub(crate) async fn execute(
    ctx: ExecContext,
    task: &RequestTask,
    token: &Arc<AbortToken>,
) -> Outcome {
    let stage = task.stage;
    let request = match build_request(&ctx.options, &task.session, stage).await {
        Ok(r) => r,
        Err(e) => return Outcome::Fail(e),
    };
    let progress: ProgressFn = match stage {
        Stage::Real(i) => chunk_progress(&ctx, task, i, token),
        _ => Arc::new(|_, _| {}),
    };
    let config = &ctx.options.config;
    let transport = &ctx.transport;
    let policy = RetryPolicy::new(config.retry_count);

    tracing::debug!(
        session = %task.session.id(),
        stage = stage.name(),
        chunk = ?stage.chunk(),
        "dispatch"
    );
    let result = run_with_retry(&policy, token, || {
        let request = request.clone();
        let progress = Arc::clone(&progress);
        let token = Arc::clone(token);
        async move {
            let response = transport.send(request, progress, token).await?;
            let class = classify_status(config, response.status);
            stage
                .outcome_for(class, response.status)
                .ok_or(AttemptError::Unclassified(response.status))
        }
    })
    .await;

    match result {
        Ok(outcome) => outcome,
        Err(RetryExit::Aborted) => Outcome::Abort,
        Err(RetryExit::Exhausted { resends, last }) => {
            Outcome::Fail(RequestError::RetriesExhausted { resends, last })
        }
    }
}
