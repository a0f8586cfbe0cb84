//! Detached background work with a managed lifecycle.
//!
//! Tasks outlive the request that spawned them, but not the process: shutdown
//! cancels every task and waits for it to finish unwinding.

use std::future::Future;

use common::TraceId;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::error::WorkflowError;

const OUTCOME_CHANNEL_CAPACITY: usize = 256;

/// Published once per finished background task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutcome {
    pub name: &'static str,
    pub trace_id: TraceId,
    /// `Err` carries the rendered cause of the failure.
    pub result: Result<(), String>,
    /// Number of compensators that failed while the task unwound.
    pub compensation_failures: usize,
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Tracker for fire-and-forget workflows.
#[derive(Clone)]
pub struct BackgroundTasks {
    tracker: TaskTracker,
    root: CancellationToken,
    outcomes: broadcast::Sender<TaskOutcome>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        let (outcomes, _) = broadcast::channel(OUTCOME_CHANNEL_CAPACITY);
        Self {
            tracker: TaskTracker::new(),
            root: CancellationToken::new(),
            outcomes,
        }
    }

    /// Receives the outcome of every task that finishes after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<TaskOutcome> {
        self.outcomes.subscribe()
    }

    /// Number of tasks still running.
    pub fn active(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.root.is_cancelled()
    }

    /// Spawns `task` with a child cancellation token.
    ///
    /// Returns false without running anything once shutdown has begun.
    pub fn spawn<F, Fut>(&self, name: &'static str, trace_id: TraceId, task: F) -> bool
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<(), WorkflowError>> + Send + 'static,
    {
        if self.is_shutting_down() {
            tracing::warn!(task = name, %trace_id, "Background task rejected during shutdown");
            return false;
        }

        let work = task(self.root.child_token());
        let outcomes = self.outcomes.clone();
        self.tracker.spawn(async move {
            let outcome = match work.await {
                Ok(()) => {
                    tracing::info!(task = name, %trace_id, "Background task completed");
                    TaskOutcome {
                        name,
                        trace_id,
                        result: Ok(()),
                        compensation_failures: 0,
                    }
                }
                Err(e) => {
                    tracing::error!(
                        task = name,
                        %trace_id,
                        error = %e,
                        compensation_failures = e.compensation_failures.len(),
                        "Background task failed"
                    );
                    TaskOutcome {
                        name,
                        trace_id,
                        result: Err(e.to_string()),
                        compensation_failures: e.compensation_failures.len(),
                    }
                }
            };
            // No subscribers is fine
            let _ = outcomes.send(outcome);
        });
        true
    }

    /// Cancels every running task and waits for all of them to finish.
    pub async fn shutdown(&self) {
        tracing::info!(active = self.active(), "Shutting down background tasks");
        self.tracker.close();
        self.root.cancel();
        self.tracker.wait().await;
    }
}

impl Default for BackgroundTasks {
    fn default() -> Self {
        Self::new()
    }
}
