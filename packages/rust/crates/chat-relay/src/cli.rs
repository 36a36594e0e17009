use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use chat_relay::BackendKind;

#[derive(Parser)]
#[command(name = "chat-relay")]
#[command(about = "Chat relay: web widget → LLM completions or assistant threads, with link functions.")]
pub(crate) struct Cli {
    /// Override config directory (user settings live in `<conf>/chat-relay/settings.yaml`).
    #[arg(long, global = true)]
    pub(crate) conf: Option<PathBuf>,

    /// Debug logging for chat_relay (ignored when RUST_LOG is set).
    #[arg(long, global = true)]
    pub(crate) verbose: bool,

    /// Upstream strategy (overrides settings and RELAY_BACKEND).
    #[arg(long, global = true, value_enum)]
    pub(crate) backend: Option<BackendMode>,

    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub(crate) enum BackendMode {
    Completion,
    Assistant,
}

impl From<BackendMode> for BackendKind {
    fn from(mode: BackendMode) -> Self {
        match mode {
            BackendMode::Completion => Self::Completion,
            BackendMode::Assistant => Self::Assistant,
        }
    }
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run HTTP server (POST /chat, GET /health, POST /webhook/call-booked). Default bind: 0.0.0.0:10000
    Gateway {
        /// Listen address (e.g. 0.0.0.0:10000); overrides PORT and settings.
        #[arg(long)]
        bind: Option<String>,

        /// Max concurrent upstream turns (omit for settings value or no limit).
        #[arg(long)]
        max_concurrent: Option<usize>,

        /// Poll deadline in seconds for the assistant backend.
        #[arg(long)]
        poll_max_wait: Option<u64>,
    },
    /// Read lines from stdin, relay each as a single message, print the reply. Exit on EOF or Ctrl+C.
    Stdio,
}
