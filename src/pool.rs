//! The worker pool façade and its configuration.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::dispatch::Dispatcher;
use crate::errors::{BoxError, TaskError, TaskResult};
use crate::model::PoolMetrics;
use crate::task::{OutcomeReceiver, Task};

/// Submit a task without a deadline.
pub const NO_TIMEOUT: Duration = Duration::ZERO;

const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(2);

/// Pool construction parameters.
#[derive(Debug, Clone)]
pub struct Config {
    /// Upper bound on concurrently live workers. Values below 1 are
    /// coerced to 1.
    pub max_workers: usize,
    /// A fully idle pool retires one worker each time this much time
    /// passes without a submission.
    pub idle_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_workers: num_cpus::get(),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

/// State shared between the façade and the dispatcher.
pub(crate) struct Shared {
    pub(crate) config: Config,
    /// Intake sender. Taking it out is the shutdown broadcast: once every
    /// clone drops, the dispatcher's receive resolves to `None`.
    intake: Mutex<Option<mpsc::Sender<Task>>>,
    /// Façade-side handle on the handoff channel, kept only so the slot's
    /// occupancy can be counted as still waiting.
    handoff: async_channel::Sender<Task>,
    pub(crate) worker_count: AtomicUsize,
    pub(crate) idle_workers: AtomicUsize,
    pub(crate) waiting_len: AtomicUsize,
    /// Shutdown mode captured by the first `stop`/`stop_wait` caller:
    /// true drains the waiting queue, false abandons it.
    pub(crate) drain: AtomicBool,
    stop_once: AtomicBool,
    stopped: AtomicBool,
    /// Cancelled once when shutdown begins; releases parked pause tasks.
    pub(crate) stop_signal: CancellationToken,
    /// Cancelled once when the dispatcher has fully wound down.
    pub(crate) stopped_signal: CancellationToken,
    /// Serializes `pause` calls and lets shutdown wait out a pause in
    /// progress before it closes the intake.
    pause_lock: tokio::sync::Mutex<()>,
}

/// A bounded, elastic pool of workers executing submitted units of work.
///
/// Workers are spawned on demand up to `max_workers`, reused while work
/// keeps arriving, and retired one per `idle_timeout` when the pool sits
/// idle. Submissions beyond the fleet's capacity wait in an unbounded
/// FIFO queue, so [`submit`](WorkerPool::submit) never blocks on task
/// execution.
///
/// The pool hands out clones freely; all clones drive the same fleet.
/// Call [`stop`](WorkerPool::stop) or [`stop_wait`](WorkerPool::stop_wait)
/// when done. Dropping every clone also shuts the fleet down in abandon
/// mode, since that closes the intake channel.
#[derive(Clone)]
pub struct WorkerPool {
    shared: Arc<Shared>,
}

impl WorkerPool {
    /// Create a pool running at most `max_workers` tasks concurrently.
    ///
    /// The dispatcher starts immediately, so this must be called from
    /// within a tokio runtime. No workers exist until work arrives.
    pub fn new(max_workers: usize) -> Self {
        Self::with_config(Config {
            max_workers,
            ..Config::default()
        })
    }

    /// Create a pool from explicit configuration.
    pub fn with_config(mut config: Config) -> Self {
        if config.max_workers < 1 {
            config.max_workers = 1;
        }
        let (intake_tx, intake_rx) = mpsc::channel(1);
        let (handoff_tx, handoff_rx) = async_channel::bounded(1);

        let shared = Arc::new(Shared {
            config,
            intake: Mutex::new(Some(intake_tx)),
            handoff: handoff_tx.clone(),
            worker_count: AtomicUsize::new(0),
            idle_workers: AtomicUsize::new(0),
            waiting_len: AtomicUsize::new(0),
            drain: AtomicBool::new(false),
            stop_once: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            stop_signal: CancellationToken::new(),
            stopped_signal: CancellationToken::new(),
            pause_lock: tokio::sync::Mutex::new(()),
        });

        tokio::spawn(
            Dispatcher::new(Arc::clone(&shared), intake_rx, handoff_tx, handoff_rx).run(),
        );

        WorkerPool { shared }
    }

    /// Enqueue a unit of work and return the receiver for its outcome.
    ///
    /// The call awaits only the intake rendezvous with the dispatcher,
    /// never the availability of a worker: work beyond the fleet's
    /// capacity queues internally. A `timeout` greater than zero attaches
    /// a deadline counted from this call; if it elapses before the work
    /// returns, the outcome is [`TaskError::Timeout`] and the work is
    /// left to finish in the background. `ctx` is the submitter's
    /// cancellation scope; pass `None` for a scope that never fires.
    ///
    /// Submitting after `stop` returns a receiver that resolves closed.
    pub async fn submit<F>(
        &self,
        ctx: Option<CancellationToken>,
        work: F,
        timeout: Duration,
    ) -> OutcomeReceiver
    where
        F: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        let (task, outcome) = Task::new(ctx, work.boxed(), timeout);
        let sender = self
            .shared
            .intake
            .lock()
            .expect("intake lock poisoned")
            .clone();
        match sender {
            Some(tx) => {
                // Failure means the dispatcher is gone; dropping the task
                // closes the outcome channel, which is answer enough.
                let _ = tx.send(task).await;
            }
            None => drop(task),
        }
        outcome
    }

    /// Enqueue a unit of work and wait for its outcome.
    pub async fn submit_wait<F>(
        &self,
        ctx: Option<CancellationToken>,
        work: F,
        timeout: Duration,
    ) -> TaskResult
    where
        F: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        match self.submit(ctx, work, timeout).await.await {
            Ok(outcome) => outcome,
            Err(_) => Err(TaskError::Abandoned),
        }
    }

    /// Park the entire fleet until `ctx` is cancelled or the pool stops.
    ///
    /// One parking task per worker slot is submitted through the ordinary
    /// intake, so they interleave FIFO with already-queued work: tasks
    /// submitted before this call still run, tasks submitted after it
    /// wait for the release. Returns once all `max_workers` parking tasks
    /// hold a worker.
    ///
    /// Concurrent calls serialize: a second `pause` submits its barrier
    /// only after the first caller's, and its parking tasks occupy the
    /// workers freed when the first scope is cancelled. After shutdown
    /// has begun this is a no-op.
    pub async fn pause(&self, ctx: CancellationToken) {
        let _serial = self.shared.pause_lock.lock().await;
        if self.shared.stopped.load(Ordering::SeqCst) {
            return;
        }

        let slots = self.shared.config.max_workers;
        let ready = Arc::new(Semaphore::new(0));
        for _ in 0..slots {
            let ready = Arc::clone(&ready);
            let release = ctx.clone();
            let stop = self.shared.stop_signal.clone();
            let _ = self
                .submit(
                    None,
                    async move {
                        ready.add_permits(1);
                        tokio::select! {
                            _ = release.cancelled() => {}
                            _ = stop.cancelled() => {}
                        }
                        Ok(())
                    },
                    NO_TIMEOUT,
                )
                .await;
        }

        // All permits appear only once every parking task is running on a
        // worker, i.e. the fleet is quiescent.
        let parked = ready.acquire_many(slots as u32).await;
        if let Ok(parked) = parked {
            parked.forget();
        }
    }

    /// Stop the pool, abandoning tasks still in the waiting queue.
    ///
    /// Tasks already executing run to completion and publish their
    /// outcomes; abandoned tasks never run and their outcome channels
    /// close. Idempotent: every caller returns once the fleet has fully
    /// wound down. No task may be submitted afterwards.
    pub async fn stop(&self) {
        self.shutdown(false).await;
    }

    /// Stop the pool after draining the waiting queue.
    ///
    /// Every task submitted before this call is executed and publishes
    /// an outcome before the pool winds down.
    pub async fn stop_wait(&self) {
        self.shutdown(true).await;
    }

    async fn shutdown(&self, drain: bool) {
        if !self.shared.stop_once.swap(true, Ordering::SeqCst) {
            tracing::debug!(drain, "stopping pool");
            // Unpark any paused workers first, then wait for a pause in
            // progress to finish its barrier before refusing new ones.
            self.shared.stop_signal.cancel();
            let guard = self.shared.pause_lock.lock().await;
            self.shared.stopped.store(true, Ordering::SeqCst);
            drop(guard);

            self.shared.drain.store(drain, Ordering::SeqCst);
            // Closing the intake is the dispatcher's signal to wind down.
            self.shared
                .intake
                .lock()
                .expect("intake lock poisoned")
                .take();
        }
        self.shared.stopped_signal.cancelled().await;
    }

    /// Whether shutdown has begun.
    pub fn stopped(&self) -> bool {
        self.shared.stopped.load(Ordering::SeqCst)
    }

    /// The maximum number of concurrent workers.
    pub fn size(&self) -> usize {
        self.shared.config.max_workers
    }

    /// Workers currently alive.
    pub fn worker_count(&self) -> usize {
        self.shared.worker_count.load(Ordering::SeqCst)
    }

    /// Tasks queued behind a fully busy fleet.
    ///
    /// A task handed to the handoff slot but not yet accepted by a
    /// worker still counts as waiting.
    pub fn waiting_queue_size(&self) -> usize {
        self.shared.waiting_len.load(Ordering::Relaxed) + self.shared.handoff.len()
    }

    /// Snapshot the pool's gauges.
    pub fn metrics(&self) -> PoolMetrics {
        PoolMetrics {
            max_workers: self.shared.config.max_workers,
            live_workers: self.worker_count(),
            idle_workers: self.shared.idle_workers.load(Ordering::SeqCst),
            waiting_tasks: self.waiting_queue_size(),
            stopped: self.stopped(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn max_workers_is_coerced_to_at_least_one() {
        let pool = WorkerPool::new(0);
        assert_eq!(pool.size(), 1);
        pool.stop().await;
    }

    #[test]
    fn default_config_sizes_from_the_host() {
        let config = Config::default();
        assert!(config.max_workers >= 1);
        assert_eq!(config.idle_timeout, DEFAULT_IDLE_TIMEOUT);
    }

    #[tokio::test]
    async fn fresh_pool_has_no_workers() {
        let pool = WorkerPool::new(4);
        assert_eq!(pool.worker_count(), 0);
        assert_eq!(pool.waiting_queue_size(), 0);
        assert!(!pool.stopped());
        pool.stop().await;
    }
}
