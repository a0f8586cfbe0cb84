//! Per-request workflow execution context.
//!
//! A [`WorkflowContext`] is created once per inbound operation and passed by
//! `&mut` through every orchestrator call in that operation. It owns the single
//! [`CompensationStack`] for the scope, so nested orchestrators register onto the
//! same stack and an outer failure unwinds inner registrations too.

use std::future::Future;
use std::time::Duration;

use common::TraceId;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::compensation::CompensationStack;
use crate::error::{SagaError, WorkflowError};

#[derive(Debug)]
pub struct WorkflowContext {
    trace_id: TraceId,
    cancel: CancellationToken,
    timeout: Option<Duration>,
    deadline: Option<Instant>,
    stack: Option<CompensationStack>,
}

impl WorkflowContext {
    /// Creates a context with no deadline and its own cancellation token.
    pub fn new(trace_id: TraceId) -> Self {
        Self {
            trace_id,
            cancel: CancellationToken::new(),
            timeout: None,
            deadline: None,
            stack: None,
        }
    }

    /// Uses `token` as the cancellation signal for adapter calls.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Sets a deadline `timeout` from now for adapter calls.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    /// Creates a context for work detached from this one.
    ///
    /// Keeps the trace id and the timeout length (restarted from now), but
    /// gets its own stack and the given cancellation token.
    pub fn detached(&self, token: CancellationToken) -> Self {
        let ctx = Self::new(self.trace_id).with_cancellation(token);
        match self.timeout {
            Some(timeout) => ctx.with_timeout(timeout),
            None => ctx,
        }
    }

    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Returns the stack for this scope, creating it on first use.
    pub fn compensations(&mut self) -> &mut CompensationStack {
        let trace_id = self.trace_id;
        self.stack.get_or_insert_with(|| {
            let stack = CompensationStack::new();
            tracing::debug!(%trace_id, stack_id = %stack.id(), "Compensation stack created");
            stack
        })
    }

    /// Returns true once a stack has been created for this scope.
    pub fn has_compensations(&self) -> bool {
        self.stack.is_some()
    }

    /// Registers a compensator on this scope's stack.
    pub fn register<F, Fut>(&mut self, step: impl Into<String>, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), SagaError>> + Send + 'static,
    {
        self.compensations().register(step, action);
    }

    /// Races an adapter call against this context's cancellation and deadline.
    ///
    /// Only for calls without side effects; a dropped call may already have
    /// acted. The returned future does not borrow the context.
    pub fn guard<F, T, E>(
        &self,
        call: F,
    ) -> impl Future<Output = Result<T, SagaError>> + Send + use<F, T, E>
    where
        F: Future<Output = Result<T, E>> + Send,
        T: Send,
        E: Into<SagaError> + Send,
    {
        let cancel = self.cancel.clone();
        let deadline = self.deadline;
        async move {
            let expired = async {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(SagaError::Cancelled),
                _ = expired => Err(SagaError::Timeout),
                result = call => result.map_err(Into::into),
            }
        }
    }

    /// Runs one guarded read or inference call. On failure the scope is
    /// unwound and the original cause is returned as a [`WorkflowError`].
    pub async fn step<F, T, E>(&mut self, call: F) -> Result<T, WorkflowError>
    where
        F: Future<Output = Result<T, E>> + Send,
        T: Send,
        E: Into<SagaError> + Send,
    {
        match self.guard(call).await {
            Ok(value) => Ok(value),
            Err(cause) => Err(self.fail(cause).await),
        }
    }

    /// Runs one side-effecting adapter call to completion.
    ///
    /// The call is not raced against cancellation or the deadline: once it
    /// has started its effect may land, so it must finish for the caller to
    /// register the compensator. An interrupted scope refuses to start new
    /// effects and unwinds instead. Reads and inference calls use [`step`](Self::step).
    pub async fn commit<F, T, E>(&mut self, call: F) -> Result<T, WorkflowError>
    where
        F: Future<Output = Result<T, E>> + Send,
        T: Send,
        E: Into<SagaError> + Send,
    {
        if let Some(cause) = self.interruption() {
            return Err(self.fail(cause).await);
        }
        match call.await {
            Ok(value) => Ok(value),
            Err(cause) => Err(self.fail(cause).await),
        }
    }

    /// The reason this scope may not start new work, if any.
    pub fn interruption(&self) -> Option<SagaError> {
        if self.cancel.is_cancelled() {
            Some(SagaError::Cancelled)
        } else if self.deadline.is_some_and(|at| Instant::now() >= at) {
            Some(SagaError::Timeout)
        } else {
            None
        }
    }

    /// Unwinds the scope if `result` is an error, passing the value through otherwise.
    pub async fn check<T, E>(&mut self, result: Result<T, E>) -> Result<T, WorkflowError>
    where
        E: Into<SagaError>,
    {
        match result {
            Ok(value) => Ok(value),
            Err(cause) => Err(self.fail(cause).await),
        }
    }

    /// Unwinds every compensator registered in this scope and wraps `cause`.
    pub async fn fail(&mut self, cause: impl Into<SagaError>) -> WorkflowError {
        let cause = cause.into();
        let failures = match self.stack.as_mut() {
            Some(stack) if !stack.is_empty() => {
                let report = stack.unwind().await;
                tracing::info!(
                    trace_id = %self.trace_id,
                    stack_id = %stack.id(),
                    compensated = report.compensated,
                    failed = report.failures.len(),
                    "Workflow unwound"
                );
                report.failures
            }
            _ => Vec::new(),
        };
        WorkflowError::new(cause, failures)
    }
}
