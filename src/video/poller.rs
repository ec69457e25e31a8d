//! Drives a submitted operation to a terminal state.

use crate::error::{Result, VeoGenError};
use crate::video::client::OperationClient;
use crate::video::clock::Clock;
use crate::video::operation::{Operation, OperationHandle, OperationState};
use crate::video::retry::RetryPolicy;
use crate::video::types::GenerationRequest;
use std::time::Duration;
use tokio::sync::watch;

/// Default delay between status queries.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);
/// Default upper bound on the time spent polling.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(600);

/// Timing for the polling loop.
#[derive(Debug, Clone)]
pub struct PollPolicy {
    /// Delay between status queries.
    pub interval: Duration,
    /// Give up after this long. The remote operation is left running.
    pub max_wait: Duration,
    /// Retries for transient submission and status errors.
    pub retry: RetryPolicy,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_wait: DEFAULT_MAX_WAIT,
            retry: RetryPolicy::default(),
        }
    }
}

impl PollPolicy {
    /// Sets the poll interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets the maximum wait.
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Sets the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Submits a request and polls it until SUCCEEDED, FAILED or timeout.
///
/// Only one request is in flight at a time.
pub struct OperationPoller<'a> {
    client: &'a dyn OperationClient,
    clock: &'a dyn Clock,
    policy: &'a PollPolicy,
    in_flight: Option<&'a watch::Sender<Option<OperationHandle>>>,
}

impl<'a> OperationPoller<'a> {
    /// Creates a poller over the given client and clock.
    pub fn new(client: &'a dyn OperationClient, clock: &'a dyn Clock, policy: &'a PollPolicy) -> Self {
        Self {
            client,
            clock,
            policy,
            in_flight: None,
        }
    }

    /// Publishes the operation handle once submitted, e.g. for Ctrl-C handling.
    pub fn with_in_flight(mut self, tx: &'a watch::Sender<Option<OperationHandle>>) -> Self {
        self.in_flight = Some(tx);
        self
    }

    /// Submits the request. The returned operation is PENDING.
    pub async fn submit(&self, request: &GenerationRequest) -> Result<Operation> {
        let handle = self
            .policy
            .retry
            .run(self.clock, "submit", || self.client.submit(request))
            .await?;

        tracing::info!(
            operation = %handle,
            model = self.client.model_id(),
            mode = %request.mode(),
            "Submitted video generation"
        );
        if let Some(tx) = self.in_flight {
            tx.send_replace(Some(handle.clone()));
        }
        Ok(Operation::new(handle))
    }

    /// Polls until the operation reaches a terminal state.
    ///
    /// Returns the SUCCEEDED operation, `RemoteFailure` for FAILED, or
    /// `Timeout` once `max_wait` has elapsed, including time spent on
    /// retries. The in-flight handle is cleared on every outcome.
    pub async fn wait(&self, operation: Operation) -> Result<Operation> {
        let result = self.poll_to_completion(operation).await;
        self.clear_in_flight();
        result
    }

    async fn poll_to_completion(&self, mut operation: Operation) -> Result<Operation> {
        let started = self.clock.now();
        let deadline = started + self.policy.max_wait;
        let mut polls: u32 = 0;

        loop {
            let elapsed = self.clock.now().saturating_duration_since(started);
            if elapsed >= self.policy.max_wait {
                return Err(self.timed_out(&operation, elapsed, polls));
            }

            let remaining = self.policy.max_wait - elapsed;
            self.clock.sleep(self.policy.interval.min(remaining)).await;

            let handle = operation.handle().clone();
            let status = match self
                .policy
                .retry
                .run_until(self.clock, "poll", Some(deadline), || self.client.status(&handle))
                .await
            {
                Ok(status) => status,
                Err(e) if e.is_retryable() && self.clock.now() >= deadline => {
                    let elapsed = self.clock.now().saturating_duration_since(started);
                    return Err(self.timed_out(&operation, elapsed, polls));
                }
                Err(e) => return Err(e),
            };
            polls += 1;

            tracing::debug!(
                operation = %handle,
                poll = polls,
                reported = %status.state,
                elapsed_secs = self.clock.now().saturating_duration_since(started).as_secs(),
                "Polled operation"
            );
            operation.apply(status);

            match operation.state() {
                OperationState::Succeeded => {
                    tracing::info!(operation = %handle, polls, "Video generation completed");
                    return Ok(operation);
                }
                OperationState::Failed => {
                    return Err(VeoGenError::RemoteFailure {
                        operation: handle.to_string(),
                        message: operation.error().unwrap_or("unknown error").to_string(),
                    });
                }
                OperationState::Pending | OperationState::Running => {}
            }
        }
    }

    fn timed_out(&self, operation: &Operation, elapsed: Duration, polls: u32) -> VeoGenError {
        tracing::warn!(
            operation = %operation.handle(),
            waited_secs = elapsed.as_secs(),
            polls,
            "Gave up waiting; the operation may still complete remotely"
        );
        VeoGenError::Timeout {
            operation: operation.handle().to_string(),
            waited: elapsed,
        }
    }

    /// Submits and waits.
    pub async fn run(&self, request: &GenerationRequest) -> Result<Operation> {
        let operation = self.submit(request).await?;
        self.wait(operation).await
    }

    fn clear_in_flight(&self) {
        if let Some(tx) = self.in_flight {
            tx.send_replace(None);
        }
    }
}
