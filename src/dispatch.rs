//! The dispatcher: sole coordinator between the intake channel, the
//! worker fleet, and the waiting queue.

use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::pool::Shared;
use crate::task::Task;
use crate::worker;

/// Owns every piece of mutable routing state: the waiting queue, the
/// worker join set, and the idle flag. Nothing else touches them, which
/// is what lets the waiting queue be a plain `VecDeque`.
pub(crate) struct Dispatcher {
    shared: Arc<Shared>,
    intake: mpsc::Receiver<Task>,
    handoff_tx: async_channel::Sender<Task>,
    handoff_rx: async_channel::Receiver<Task>,
    waiting: VecDeque<Task>,
    workers: JoinSet<()>,
    /// True when no task has arrived since the previous idle tick.
    idle: bool,
}

impl Dispatcher {
    pub(crate) fn new(
        shared: Arc<Shared>,
        intake: mpsc::Receiver<Task>,
        handoff_tx: async_channel::Sender<Task>,
        handoff_rx: async_channel::Receiver<Task>,
    ) -> Self {
        Dispatcher {
            shared,
            intake,
            handoff_tx,
            handoff_rx,
            waiting: VecDeque::new(),
            workers: JoinSet::new(),
            idle: false,
        }
    }

    pub(crate) async fn run(mut self) {
        let period = self.shared.config.idle_timeout;
        let mut ticks = interval_at(Instant::now() + period, period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            // While tasks are waiting, new arrivals go to the back of the
            // queue and workers are fed from the front. Once it drains we
            // fall back to routing arrivals directly.
            if !self.waiting.is_empty() {
                if self.process_waiting().await {
                    continue;
                }
                break;
            }

            tokio::select! {
                arrival = self.intake.recv() => match arrival {
                    Some(task) => {
                        self.idle = false;
                        self.route(task);
                    }
                    None => break,
                },
                _ = ticks.tick() => self.reap_idle(),
            }
        }

        self.finish().await;
    }

    /// Direct mode: hand the task to a parked worker, grow the fleet, or
    /// start queueing.
    fn route(&mut self, task: Task) {
        // The handoff channel is buffered, so try_send alone would park a
        // task in the slot even with zero workers alive. A parked worker
        // can only unpark by receiving, so the handoff counts as direct
        // only when one is known to be waiting.
        let task = if self.shared.idle_workers.load(Ordering::SeqCst) > 0 {
            match self.handoff_tx.try_send(task) {
                Ok(()) => return,
                Err(err) => err.into_inner(),
            }
        } else {
            task
        };

        if self.shared.worker_count.load(Ordering::SeqCst) < self.shared.config.max_workers {
            self.spawn_worker(task);
        } else {
            self.waiting.push_back(task);
            self.shared
                .waiting_len
                .store(self.waiting.len(), Ordering::Relaxed);
        }
    }

    fn spawn_worker(&mut self, task: Task) {
        let live = self.shared.worker_count.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(workers = live, "starting worker");
        self.workers.spawn(worker::run(
            task,
            self.handoff_rx.clone(),
            Arc::clone(&self.shared),
        ));
    }

    /// Retire one worker per tick-interval of full idleness.
    fn reap_idle(&mut self) {
        if self.idle
            && self.shared.worker_count.load(Ordering::SeqCst) > 0
            && self.shared.idle_workers.load(Ordering::SeqCst) > 0
            && self.handoff_tx.try_send(Task::pill()).is_ok()
        {
            let live = self.shared.worker_count.fetch_sub(1, Ordering::SeqCst) - 1;
            tracing::debug!(workers = live, "retiring idle worker");
        }
        self.idle = true;
    }

    /// Queued mode: race the handoff of the queue's front task against
    /// further intake. Returns `false` once the intake channel closes.
    async fn process_waiting(&mut self) -> bool {
        let Some(front) = self.waiting.pop_front() else {
            return true;
        };
        // The front task stays counted as waiting until a handoff slot
        // accepts it.
        self.shared
            .waiting_len
            .store(self.waiting.len() + 1, Ordering::Relaxed);

        let handoff = self.handoff_tx.clone();
        let send = handoff.send(front);
        tokio::pin!(send);

        loop {
            tokio::select! {
                _ = &mut send => {
                    self.shared
                        .waiting_len
                        .store(self.waiting.len(), Ordering::Relaxed);
                    return true;
                }
                arrival = self.intake.recv() => match arrival {
                    Some(task) => {
                        self.waiting.push_back(task);
                        self.shared
                            .waiting_len
                            .store(self.waiting.len() + 1, Ordering::Relaxed);
                    }
                    None => {
                        if self.shared.drain.load(Ordering::SeqCst) {
                            // Finish the in-flight handoff; the rest of
                            // the queue drains in `finish`.
                            let _ = send.as_mut().await;
                            self.shared
                                .waiting_len
                                .store(self.waiting.len(), Ordering::Relaxed);
                        }
                        // Abandon mode drops the in-flight task here,
                        // which closes its result channel.
                        return false;
                    }
                },
            }
        }
    }

    /// Shutdown: drain or abandon the waiting queue, retire the fleet,
    /// and signal full stop once every worker has exited.
    async fn finish(mut self) {
        if self.shared.drain.load(Ordering::SeqCst) {
            // The queue only ever grows while the fleet is at its
            // maximum, and no worker is reaped while tasks wait, so a
            // consumer for these sends is always alive.
            while let Some(task) = self.waiting.pop_front() {
                let _ = self.handoff_tx.send(task).await;
                self.shared
                    .waiting_len
                    .store(self.waiting.len(), Ordering::Relaxed);
            }
        } else if !self.waiting.is_empty() {
            tracing::debug!(abandoned = self.waiting.len(), "abandoning queued tasks");
            // Dropping a task drops its result sender, unblocking the
            // submitter with a closed channel.
            self.waiting.clear();
            self.shared.waiting_len.store(0, Ordering::Relaxed);
        }

        while self.shared.worker_count.load(Ordering::SeqCst) > 0 {
            let _ = self.handoff_tx.send(Task::pill()).await;
            self.shared.worker_count.fetch_sub(1, Ordering::SeqCst);
        }
        while self.workers.join_next().await.is_some() {}

        tracing::debug!("dispatcher stopped");
        self.shared.stopped_signal.cancel();
    }
}
