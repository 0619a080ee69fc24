//! Drain engine — claims due tasks and runs their uploads.
//!
//! `drain_once` is the entry point shared by the periodic loop, explicit
//! user action, and whatever scheduled-job platform the host wires up.
//! The queue's transactional claim keeps concurrent drains from racing;
//! uploads for distinct tasks run in parallel under a small cap so a
//! burst of imports does not saturate the device radio.

use crate::error::SyncResult;
use crate::uploader::UploadExecutor;
use chrono::Utc;
use obscura_queue::{QueueError, RetryDecision, RetryPolicy, UploadQueue};
use obscura_types::UploadTask;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Commands accepted by the running drain engine.
#[derive(Debug)]
pub enum DrainCommand {
    Stop,
    DrainNow,
}

/// Handle for controlling a running drain engine.
#[derive(Clone)]
pub struct DrainHandle {
    command_tx: mpsc::Sender<DrainCommand>,
}

impl DrainHandle {
    pub async fn stop(&self) -> bool {
        self.command_tx.send(DrainCommand::Stop).await.is_ok()
    }

    pub async fn drain_now(&self) -> bool {
        self.command_tx.send(DrainCommand::DrainNow).await.is_ok()
    }
}

/// Outcome counts for one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub claimed: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Tasks deleted externally while their upload was in flight; their
    /// outcome is dropped without touching attempt counters.
    pub dropped: usize,
}

pub struct DrainEngine {
    queue: Arc<UploadQueue>,
    executor: Arc<UploadExecutor>,
    retry: RetryPolicy,
    command_rx: mpsc::Receiver<DrainCommand>,
    interval: Duration,
    max_parallel: usize,
    batch_limit: usize,
}

/// Creates a drain engine and its command handle.
pub fn create_drain_engine(
    queue: Arc<UploadQueue>,
    executor: Arc<UploadExecutor>,
    retry: RetryPolicy,
    interval: Duration,
) -> (DrainHandle, DrainEngine) {
    let (command_tx, command_rx) = mpsc::channel(16);
    let handle = DrainHandle { command_tx };
    let engine = DrainEngine {
        queue,
        executor,
        retry,
        command_rx,
        interval,
        max_parallel: 3,
        batch_limit: 16,
    };
    (handle, engine)
}

impl DrainEngine {
    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel.max(1);
        self
    }

    pub fn with_batch_limit(mut self, batch_limit: usize) -> Self {
        self.batch_limit = batch_limit.max(1);
        self
    }

    /// Runs the periodic drain loop until stopped.
    pub async fn run(&mut self) {
        info!("drain engine started");
        let mut tick = tokio::time::interval(self.interval);
        // Skip the immediate first tick.
        tick.tick().await;

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if let Err(e) = self.drain_once().await {
                        error!("drain failed: {e}");
                    }
                }
                cmd = self.command_rx.recv() => match cmd {
                    Some(DrainCommand::DrainNow) => {
                        if let Err(e) = self.drain_once().await {
                            error!("drain failed: {e}");
                        }
                    }
                    Some(DrainCommand::Stop) => {
                        info!("drain engine stopping");
                        break;
                    }
                    None => {
                        info!("command channel closed, stopping drain engine");
                        break;
                    }
                }
            }
        }
        info!("drain engine stopped");
    }

    /// Claims every due task and attempts its upload, persisting each
    /// outcome. The executor stays pure with respect to the queue; this
    /// is the only place `record_success`/`record_failure` are called.
    pub async fn drain_once(&self) -> SyncResult<DrainReport> {
        let claimed = self.queue.claim_pending(Utc::now(), self.batch_limit)?;
        let mut report = DrainReport {
            claimed: claimed.len(),
            ..DrainReport::default()
        };
        if claimed.is_empty() {
            return Ok(report);
        }
        debug!("draining {} task(s)", claimed.len());

        let semaphore = Arc::new(Semaphore::new(self.max_parallel));
        let mut workers = JoinSet::new();
        for task in claimed {
            // Coarse progress marker: the attempt has started.
            if let Err(e) = self.queue.set_progress(&task.id, 0.1) {
                debug!("progress update for task {} failed: {e}", task.id);
            }

            let executor = self.executor.clone();
            let semaphore = semaphore.clone();
            workers.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let result = executor.upload(&task).await;
                (task, result)
            });
        }

        let mut first_store_error: Option<QueueError> = None;
        while let Some(joined) = workers.join_next().await {
            let Ok((task, result)) = joined else {
                warn!("upload worker panicked");
                continue;
            };

            match self.persist_outcome(&task, result) {
                Ok(Outcome::Succeeded) => report.succeeded += 1,
                Ok(Outcome::Failed) => report.failed += 1,
                Ok(Outcome::Dropped) => report.dropped += 1,
                Err(e) => {
                    // Keep joining the rest of the batch; a store error
                    // on one row must not strand the other uploads in
                    // IN_PROGRESS.
                    error!("recording outcome for task {} failed: {e}", task.id);
                    if first_store_error.is_none() {
                        first_store_error = Some(e);
                    }
                }
            }
        }

        debug!(
            "drain pass: {} claimed, {} ok, {} failed, {} dropped",
            report.claimed, report.succeeded, report.failed, report.dropped
        );
        match first_store_error {
            Some(e) => Err(e.into()),
            None => Ok(report),
        }
    }

    /// Persists one upload outcome. `TaskNotFound` from the record calls
    /// means the task was deleted externally while its upload ran: the
    /// outcome is dropped and the attempt does not count.
    fn persist_outcome(
        &self,
        task: &UploadTask,
        result: SyncResult<String>,
    ) -> Result<Outcome, QueueError> {
        let now = Utc::now();
        let recorded = match result {
            Ok(url) => self
                .queue
                .record_success(&task.id, &url, now)
                .map(|()| Outcome::Succeeded),
            Err(e) => {
                let attempts_after = task.attempt_count + 1;
                let next_retry_at = match self.retry.decide(
                    attempts_after,
                    task.max_attempts,
                    e.is_retryable(),
                ) {
                    RetryDecision::RetryAfter(delay) => {
                        Some(now + chrono::Duration::from_std(delay).unwrap_or_default())
                    }
                    RetryDecision::Exhausted => {
                        warn!("task {} exhausted after {attempts_after} attempt(s)", task.id);
                        None
                    }
                };
                self.queue
                    .record_failure(&task.id, &e.user_message(), now, next_retry_at)
                    .map(|()| Outcome::Failed)
            }
        };

        match recorded {
            Ok(outcome) => Ok(outcome),
            Err(QueueError::TaskNotFound(_)) => {
                debug!("task {} deleted mid-flight, dropping outcome", task.id);
                Ok(Outcome::Dropped)
            }
            Err(e) => Err(e),
        }
    }
}

enum Outcome {
    Succeeded,
    Failed,
    Dropped,
}
