//! Worker executors: long-lived tasks that run units of work off the
//! shared handoff channel until a kill pill arrives.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::time;

use crate::errors::{BoxError, TaskError};
use crate::pool::Shared;
use crate::task::{Task, UnitOfWork};

/// Work shipped to a worker's timed runner: the future to execute plus
/// the per-task completion signal.
type TimedJob = (UnitOfWork, oneshot::Sender<Result<(), BoxError>>);

/// Run one worker until it receives a kill pill.
///
/// `idle_workers` counts workers parked on `handoff`; the dispatcher
/// relies on it to decide whether a non-blocking handoff will actually
/// reach a worker.
pub(crate) async fn run(
    first: Task,
    handoff: async_channel::Receiver<Task>,
    shared: Arc<Shared>,
) {
    // One subordinate per worker, not per task. Deadline-bearing work is
    // raced against its deadline from here while the runner sees the
    // future through to the end.
    let (runner_tx, runner_rx) = mpsc::channel::<TimedJob>(1);
    tokio::spawn(timed_runner(runner_rx));

    let mut task = first;
    loop {
        let Some(work) = task.work.take() else {
            tracing::trace!("worker received kill pill");
            break;
        };

        match task.deadline {
            None => {
                let outcome = work.await.map_err(TaskError::from);
                task.publish(outcome);
            }
            Some(deadline) => {
                let (done_tx, mut done_rx) = oneshot::channel();
                if runner_tx.send((work, done_tx)).await.is_err() {
                    task.publish(Err(TaskError::Abandoned));
                } else {
                    tokio::select! {
                        res = &mut done_rx => {
                            let outcome = match res {
                                Ok(done) => done.map_err(TaskError::from),
                                Err(_) => Err(TaskError::Abandoned),
                            };
                            task.publish(outcome);
                        }
                        _ = task.cancel.cancelled() => {
                            task.publish(Err(TaskError::Timeout));
                        }
                        _ = time::sleep_until(deadline) => {
                            task.publish(Err(TaskError::Timeout));
                        }
                    }
                }
            }
        }

        shared.idle_workers.fetch_add(1, Ordering::SeqCst);
        let next = handoff.recv().await;
        shared.idle_workers.fetch_sub(1, Ordering::SeqCst);
        match next {
            Ok(t) => task = t,
            Err(_) => break,
        }
    }
    // Dropping runner_tx lets the timed runner finish any in-flight
    // future and exit on its own.
}

/// Executes deadline-bearing work to completion, one job at a time.
///
/// A worker that already published a timeout has dropped its `done`
/// receiver, so the late outcome is discarded here.
async fn timed_runner(mut jobs: mpsc::Receiver<TimedJob>) {
    while let Some((work, done)) = jobs.recv().await {
        let outcome = work.await;
        let _ = done.send(outcome);
    }
}
