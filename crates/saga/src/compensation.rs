//! Ordered undo actions for one workflow scope.
//!
//! Every side-effecting step registers exactly one compensator before the next
//! step runs. On failure the stack is unwound in reverse registration order.
//! A stack that is dropped without being unwound belongs to a workflow that
//! succeeded; nothing runs.

use std::future::Future;

use common::StackId;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;

use crate::error::{CompensationFailure, SagaError};
use crate::state::StackState;

/// Future returned by a compensator.
pub type CompensationFuture = BoxFuture<'static, Result<(), SagaError>>;

type Action = Box<dyn FnOnce() -> CompensationFuture + Send>;

struct Compensator {
    step: String,
    action: Action,
}

/// Outcome of an unwind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnwindReport {
    /// Number of compensators that completed successfully.
    pub compensated: usize,
    /// Compensators that returned an error, in the order they ran.
    pub failures: Vec<CompensationFailure>,
}

/// LIFO stack of compensators.
pub struct CompensationStack {
    id: StackId,
    state: StackState,
    entries: Vec<Compensator>,
}

impl CompensationStack {
    pub fn new() -> Self {
        Self {
            id: StackId::new(),
            state: StackState::Open,
            entries: Vec::new(),
        }
    }

    /// Identity of this stack, stable for its lifetime.
    pub fn id(&self) -> StackId {
        self.id
    }

    pub fn state(&self) -> StackState {
        self.state
    }

    /// Number of compensators waiting to run.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Labels of the pending compensators, in registration order.
    pub fn steps(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|c| c.step.as_str())
    }

    /// Appends a compensator. It runs at most once, and only if the stack is unwound.
    pub fn register<F, Fut>(&mut self, step: impl Into<String>, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), SagaError>> + Send + 'static,
    {
        let step = step.into();
        if self.state.is_unwound() {
            tracing::warn!(stack_id = %self.id, %step, "Registering on an already unwound stack");
        }
        tracing::trace!(stack_id = %self.id, %step, "Compensator registered");
        self.entries.push(Compensator {
            step,
            action: Box::new(move || action().boxed()),
        });
    }

    /// Runs every registered compensator in reverse registration order.
    ///
    /// Each compensator is awaited on the calling task before the next one
    /// starts. Failures are logged and collected; they never stop the unwind.
    pub async fn unwind(&mut self) -> UnwindReport {
        self.state = StackState::Unwinding;
        metrics::counter!("workflow_unwinds_total").increment(1);

        let mut report = UnwindReport::default();
        while let Some(Compensator { step, action }) = self.entries.pop() {
            metrics::counter!("compensations_run_total").increment(1);
            match action().await {
                Ok(()) => {
                    tracing::debug!(stack_id = %self.id, %step, "Compensator completed");
                    report.compensated += 1;
                }
                Err(e) => {
                    metrics::counter!("compensation_failures_total").increment(1);
                    tracing::warn!(stack_id = %self.id, %step, error = %e, "Compensator failed");
                    report.failures.push(CompensationFailure {
                        step,
                        reason: e.to_string(),
                    });
                }
            }
        }

        self.state = StackState::after_unwind(report.failures.len());
        report
    }
}

impl Default for CompensationStack {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CompensationStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompensationStack")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("steps", &self.steps().collect::<Vec<_>>())
            .finish()
    }
}
