//! Task objects: a unit of work bundled with its cancellation scope,
//! optional deadline, and single-shot result channel.

use futures::future::BoxFuture;
use tokio::sync::oneshot;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::errors::{BoxError, TaskResult};

/// The future a submitter hands to the pool.
pub(crate) type UnitOfWork = BoxFuture<'static, Result<(), BoxError>>;

/// Receiver side of a task's outcome channel.
///
/// Resolves with the task's outcome once it has run, or with a channel
/// error if the task was abandoned by a non-draining shutdown.
pub type OutcomeReceiver = oneshot::Receiver<TaskResult>;

pub(crate) struct Task {
    /// `None` marks the kill pill that tells a worker to exit.
    pub(crate) work: Option<UnitOfWork>,
    /// The submitter's cancellation scope. A fresh token when the
    /// submitter supplied none, so it never fires.
    pub(crate) cancel: CancellationToken,
    /// Absolute deadline, fixed at submission time.
    pub(crate) deadline: Option<Instant>,
    result: Option<oneshot::Sender<TaskResult>>,
}

impl Task {
    pub(crate) fn new(
        ctx: Option<CancellationToken>,
        work: UnitOfWork,
        timeout: Duration,
    ) -> (Self, OutcomeReceiver) {
        let (tx, rx) = oneshot::channel();
        let deadline = (timeout > Duration::ZERO).then(|| Instant::now() + timeout);
        let task = Task {
            work: Some(work),
            cancel: ctx.unwrap_or_default(),
            deadline,
            result: Some(tx),
        };
        (task, rx)
    }

    /// Sentinel task instructing the worker that receives it to terminate.
    pub(crate) fn pill() -> Self {
        Task {
            work: None,
            cancel: CancellationToken::new(),
            deadline: None,
            result: None,
        }
    }

    /// Deliver the outcome to the submitter.
    ///
    /// At most one value is ever sent. A submitter that dropped its
    /// receiver turns this into a silent drop.
    pub(crate) fn publish(&mut self, outcome: TaskResult) {
        if let Some(tx) = self.result.take() {
            let _ = tx.send(outcome);
        }
    }
}
