//! Run-Poller: adapts the asynchronous thread/run API to one request/response.
//!
//! Created → MessageSubmitted → RunStarted → Polling → Resolved | ResolvedError.
//! Polling is bounded by `PollPolicy::max_wait` and by the caller's cancellation
//! token; either way the remote run is cancelled best-effort before returning.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::client::ThreadApi;
use super::types::{Run, RunStatus};
use crate::error::{RelayError, Result};
use crate::session::{ConversationMessage, Role};

/// Default wait between run status polls.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;
/// Default upper bound on waiting for one run.
pub const DEFAULT_POLL_MAX_WAIT_SECS: u64 = 120;

/// Fixed-interval polling bounded by a deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_wait: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            max_wait: Duration::from_secs(DEFAULT_POLL_MAX_WAIT_SECS),
        }
    }
}

/// Protocol phase, logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Created,
    MessageSubmitted,
    RunStarted,
    Polling,
    Resolved,
    ResolvedError,
}

impl RunPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::MessageSubmitted => "message_submitted",
            Self::RunStarted => "run_started",
            Self::Polling => "polling",
            Self::Resolved => "resolved",
            Self::ResolvedError => "resolved_error",
        }
    }
}

/// What a finished run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Text of the newest thread message after `completed`.
    Message(String),
    /// The run stopped on `requires_action` for this function.
    FunctionCall(String),
}

pub struct RunPoller {
    api: Arc<dyn ThreadApi>,
    assistant_id: String,
    policy: PollPolicy,
}

impl RunPoller {
    pub fn new(api: Arc<dyn ThreadApi>, assistant_id: String, policy: PollPolicy) -> Self {
        Self {
            api,
            assistant_id,
            policy,
        }
    }

    /// Run one conversation turn on a fresh thread.
    ///
    /// User/assistant entries are posted in order; system entries become the
    /// run's additional instructions. `max_wait` bounds the whole turn,
    /// including each upstream call.
    pub async fn run(
        &self,
        messages: &[ConversationMessage],
        cancel: &CancellationToken,
    ) -> Result<RunOutcome> {
        if messages.iter().all(|m| m.role == Role::System) {
            return Err(RelayError::InvalidRequest(
                "conversation has no user or assistant message".to_string(),
            ));
        }
        let deadline = Instant::now() + self.policy.max_wait;

        let thread_id = self
            .bounded(deadline, cancel, self.api.create_thread())
            .await?;
        log_phase(RunPhase::Created, &thread_id, None);

        let mut instructions = Vec::new();
        for message in messages {
            if message.role == Role::System {
                instructions.push(message.content.as_str());
                continue;
            }
            self.bounded(
                deadline,
                cancel,
                self.api
                    .add_message(&thread_id, message.role, &message.content),
            )
            .await?;
        }
        log_phase(RunPhase::MessageSubmitted, &thread_id, None);

        let additional = (!instructions.is_empty()).then(|| instructions.join("\n\n"));
        let run = self
            .bounded(
                deadline,
                cancel,
                self.api
                    .create_run(&thread_id, &self.assistant_id, additional.as_deref()),
            )
            .await?;
        log_phase(RunPhase::RunStarted, &thread_id, Some(&run));

        let run_id = run.id.clone();
        match self.poll(&thread_id, run, deadline, cancel).await {
            Ok(outcome) => {
                log_phase(RunPhase::Resolved, &thread_id, None);
                Ok(outcome)
            }
            Err(error) => {
                if matches!(error, RelayError::Timeout(_) | RelayError::Cancelled) {
                    self.abandon(&thread_id, &run_id).await;
                }
                tracing::warn!(
                    event = "relay.run.phase",
                    phase = RunPhase::ResolvedError.as_str(),
                    thread_id = %thread_id,
                    run_id = %run_id,
                    kind = error.kind(),
                    error = %error,
                    "assistant run ended without a reply"
                );
                Err(error)
            }
        }
    }

    async fn poll(
        &self,
        thread_id: &str,
        mut run: Run,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome> {
        let mut polls = 0u32;
        loop {
            match run.status {
                RunStatus::Completed => {
                    let newest = self
                        .bounded(deadline, cancel, self.api.latest_message(thread_id))
                        .await?
                        .ok_or_else(|| {
                            RelayError::upstream("completed run left no message on the thread")
                        })?;
                    return Ok(RunOutcome::Message(newest.text()));
                }
                RunStatus::RequiresAction => {
                    let Some(name) = run.requested_function().map(str::to_string) else {
                        return Err(RelayError::RunFailed {
                            status: run.status.as_str().to_string(),
                            last_error: Some("run requires an action other than a function call".to_string()),
                        });
                    };
                    // The relay answers with a static link instead of submitting tool outputs.
                    self.abandon(thread_id, &run.id).await;
                    return Ok(RunOutcome::FunctionCall(name));
                }
                ref status if status.is_terminal() => {
                    return Err(RelayError::RunFailed {
                        status: status.as_str().to_string(),
                        last_error: run.last_error.and_then(|e| e.message.or(e.code)),
                    });
                }
                _ => {}
            }

            if polls == 0 {
                log_phase(RunPhase::Polling, thread_id, Some(&run));
            }
            self.bounded(deadline, cancel, async {
                tokio::time::sleep(self.policy.interval).await;
                Ok(())
            })
            .await?;
            run = self
                .bounded(deadline, cancel, self.api.retrieve_run(thread_id, &run.id))
                .await?;
            polls += 1;
            tracing::debug!(
                event = "relay.run.poll",
                thread_id,
                run_id = %run.id,
                status = run.status.as_str(),
                polls,
                "polled run status"
            );
        }
    }

    /// Await `fut` unless the caller cancels or the turn deadline passes first.
    async fn bounded<T>(
        &self,
        deadline: Instant,
        cancel: &CancellationToken,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(RelayError::Cancelled),
            () = tokio::time::sleep_until(deadline) => Err(RelayError::Timeout(self.policy.max_wait)),
            out = fut => out,
        }
    }

    async fn abandon(&self, thread_id: &str, run_id: &str) {
        if let Err(error) = self.api.cancel_run(thread_id, run_id).await {
            tracing::debug!(
                event = "relay.run.cancel_failed",
                thread_id,
                run_id,
                error = %error,
                "best-effort run cancel failed"
            );
        }
    }
}

fn log_phase(phase: RunPhase, thread_id: &str, run: Option<&Run>) {
    tracing::debug!(
        event = "relay.run.phase",
        phase = phase.as_str(),
        thread_id,
        run_id = run.map(|r| r.id.as_str()),
        status = run.map(|r| r.status.as_str()),
        "assistant run transition"
    );
}
