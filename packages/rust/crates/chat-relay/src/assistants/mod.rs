//! Assistant thread/run backend: HTTP client plus the bounded Run-Poller.

mod client;
mod poller;
mod types;

pub use client::{AssistantsClient, ThreadApi};
pub use poller::{
    DEFAULT_POLL_INTERVAL_MS, DEFAULT_POLL_MAX_WAIT_SECS, PollPolicy, RunOutcome, RunPhase,
    RunPoller,
};
pub use types::{Run, RunError, RunStatus, ThreadMessage};
