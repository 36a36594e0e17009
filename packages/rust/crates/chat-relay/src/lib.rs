//! Chat relay: web chat widget → LLM completion or assistant thread/run API.
//!
//! - **Completion backend**: one chat-completions call with link functions advertised.
//! - **Assistant backend**: thread → message → run → bounded poll → newest message.
//! - Model-signaled function calls resolve to static link replies from a registry.

#![allow(missing_docs)]

mod assistants;
mod config;
mod error;
mod functions;
mod gateway;
mod llm;
mod relay;
mod session;

pub use assistants::{
    AssistantsClient, DEFAULT_POLL_INTERVAL_MS, DEFAULT_POLL_MAX_WAIT_SECS, PollPolicy, Run,
    RunError, RunOutcome, RunPhase, RunPoller, RunStatus, ThreadApi, ThreadMessage,
};
pub use config::{
    AccessPolicy, AccessSettings, AssistantSettings, BackendKind, DEFAULT_BIND, DEFAULT_MODEL,
    GatewaySettings, OPENAI_API_BASE_URL, OPENAI_CHAT_COMPLETIONS_URL, PromptSettings,
    RelayConfig, RelaySettings, UpstreamSettings, WebhookSettings, load_relay_settings,
    load_relay_settings_from_paths, relay_settings_paths, set_config_home_override,
};
pub use error::{RelayError, Result};
pub use functions::{
    DEFAULT_PERSONA, FunctionRegistry, LinkFunction, Resolution, UNRECOGNIZED_FUNCTION_REPLY,
};
pub use gateway::{
    CAL_SIGNATURE_HEADER, ChatResponse, GatewayHealthResponse, GatewayState, authorize_request,
    router, run_http, run_stdio, verify_signature,
};
pub use llm::{CompletionClient, FunctionCallStyle, ModelTurn};
pub use relay::{
    AssistantBackend, ChatBackend, ChatRequest, CompletionBackend, RelayService, Reply,
    ReplySource,
};
pub use session::{ConversationMessage, Role, parse_conversation};
