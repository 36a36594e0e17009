//! Relay configuration: one explicit object built at startup from settings + environment.

use std::time::Duration;

use crate::assistants::{DEFAULT_POLL_INTERVAL_MS, DEFAULT_POLL_MAX_WAIT_SECS, PollPolicy};
use crate::error::{RelayError, Result};
use crate::functions::{DEFAULT_PERSONA, FunctionRegistry};
use crate::llm::FunctionCallStyle;

use super::settings::RelaySettings;

pub const OPENAI_CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const OPENAI_API_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_BIND: &str = "0.0.0.0:10000";
const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 60;

/// Which upstream strategy answers `/chat`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BackendKind {
    /// One synchronous chat-completions call.
    #[default]
    Completion,
    /// Thread/run protocol with polling.
    Assistant,
}

impl BackendKind {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "completion" | "completions" | "chat" => Ok(Self::Completion),
            "assistant" | "assistants" | "thread" => Ok(Self::Assistant),
            other => Err(RelayError::Config(format!("unknown backend `{other}`"))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completion => "completion",
            Self::Assistant => "assistant",
        }
    }
}

/// Inbound access control.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    /// Expected bearer token; `None` disables the check.
    pub auth_token: Option<String>,
    /// Allowed `Origin` values; empty disables the check.
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub bind: String,
    pub backend: BackendKind,
    pub api_key: Option<String>,
    pub completion_url: String,
    pub assistants_base_url: String,
    pub model: String,
    pub function_call_style: FunctionCallStyle,
    pub upstream_timeout: Duration,
    pub assistant_id: Option<String>,
    pub poll: PollPolicy,
    pub inject_system_prompt: bool,
    pub persona: String,
    pub functions: FunctionRegistry,
    pub access: AccessPolicy,
    pub webhook_enabled: bool,
    /// Shared secret for `X-Cal-Signature-256`; `None` skips verification.
    pub webhook_secret: Option<String>,
    /// Bounds concurrent upstream turns sharing one credential; `None` = unbounded.
    pub max_concurrent_requests: Option<usize>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            backend: BackendKind::default(),
            api_key: None,
            completion_url: OPENAI_CHAT_COMPLETIONS_URL.to_string(),
            assistants_base_url: OPENAI_API_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            function_call_style: FunctionCallStyle::default(),
            upstream_timeout: Duration::from_secs(DEFAULT_UPSTREAM_TIMEOUT_SECS),
            assistant_id: None,
            poll: PollPolicy::default(),
            inject_system_prompt: true,
            persona: DEFAULT_PERSONA.to_string(),
            functions: FunctionRegistry::default_links(),
            access: AccessPolicy::default(),
            webhook_enabled: true,
            webhook_secret: None,
            max_concurrent_requests: None,
        }
    }
}

impl RelayConfig {
    /// Build from merged settings and the process environment.
    pub fn from_settings(settings: RelaySettings) -> Result<Self> {
        Self::from_settings_with_env(settings, |key| std::env::var(key).ok())
    }

    /// Build from merged settings; `lookup` reads environment variables.
    ///
    /// Environment wins over settings for every key it names.
    pub fn from_settings_with_env(
        settings: RelaySettings,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let env = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        let backend = match env("RELAY_BACKEND").or(settings.gateway.backend) {
            Some(raw) => BackendKind::parse(&raw)?,
            None => defaults.backend,
        };
        let bind = env("PORT")
            .map(|port| format!("0.0.0.0:{port}"))
            .or(settings.gateway.bind)
            .unwrap_or(defaults.bind);
        let allowed_origins = env("ALLOWED_ORIGINS")
            .map(|raw| split_csv(&raw))
            .or(settings.access.allowed_origins)
            .unwrap_or_default();
        let functions = match settings.functions {
            Some(entries) => FunctionRegistry::new(entries)?,
            None => defaults.functions,
        };
        let poll = PollPolicy {
            interval: settings
                .assistant
                .poll_interval_ms
                .map_or(defaults.poll.interval, Duration::from_millis),
            max_wait: settings
                .assistant
                .poll_max_wait_secs
                .map_or(defaults.poll.max_wait, Duration::from_secs),
        };

        Ok(Self {
            bind,
            backend,
            api_key: env("OPENAI_API_KEY"),
            completion_url: env("OPENAI_API_URL")
                .or(settings.upstream.completion_url)
                .unwrap_or(defaults.completion_url),
            assistants_base_url: env("OPENAI_BASE_URL")
                .or(settings.upstream.assistants_base_url)
                .unwrap_or(defaults.assistants_base_url),
            model: env("OPENAI_MODEL")
                .or(settings.upstream.model)
                .unwrap_or(defaults.model),
            function_call_style: settings
                .upstream
                .function_call_style
                .unwrap_or(defaults.function_call_style),
            upstream_timeout: settings
                .upstream
                .timeout_secs
                .map_or(defaults.upstream_timeout, Duration::from_secs),
            assistant_id: env("ASSISTANT_ID").or(settings.assistant.assistant_id),
            poll,
            inject_system_prompt: settings
                .prompt
                .inject_system_prompt
                .unwrap_or(defaults.inject_system_prompt),
            persona: settings.prompt.persona.unwrap_or(defaults.persona),
            functions,
            access: AccessPolicy {
                auth_token: env("RELAY_AUTH_TOKEN"),
                allowed_origins,
            },
            webhook_enabled: settings.webhook.enabled.unwrap_or(defaults.webhook_enabled),
            webhook_secret: env("CAL_WEBHOOK_SECRET"),
            max_concurrent_requests: settings.gateway.max_concurrent_requests,
        })
    }

    /// Reject combinations that cannot serve requests. Call after CLI overrides.
    pub fn validate(&self) -> Result<()> {
        if self.backend == BackendKind::Assistant && self.assistant_id.is_none() {
            return Err(RelayError::Config(
                "assistant backend requires ASSISTANT_ID".to_string(),
            ));
        }
        if self.poll.interval.is_zero() {
            return Err(RelayError::Config(
                "poll interval must be greater than zero".to_string(),
            ));
        }
        if self.max_concurrent_requests == Some(0) {
            return Err(RelayError::Config(
                "max_concurrent_requests must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Summary safe for logs (no credentials).
    pub fn describe(&self) -> String {
        format!(
            "backend={} model={} functions={} origins={} auth={} webhook_secret={} poll={}ms/{}s",
            self.backend.as_str(),
            self.model,
            self.functions.len(),
            if self.access.allowed_origins.is_empty() {
                "any".to_string()
            } else {
                self.access.allowed_origins.join(",")
            },
            self.access.auth_token.is_some(),
            self.webhook_secret.is_some(),
            self.poll.interval.as_millis(),
            self.poll.max_wait.as_secs(),
        )
    }
}

fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_poll_matches_fixed_interval() {
        let config = RelayConfig::default();
        assert_eq!(
            config.poll.interval,
            Duration::from_millis(DEFAULT_POLL_INTERVAL_MS)
        );
        assert_eq!(
            config.poll.max_wait,
            Duration::from_secs(DEFAULT_POLL_MAX_WAIT_SECS)
        );
    }

    #[test]
    fn split_csv_drops_blanks() {
        assert_eq!(
            split_csv(" https://a.example, ,https://b.example "),
            vec!["https://a.example", "https://b.example"]
        );
    }

    #[test]
    fn backend_aliases_parse() {
        assert_eq!(
            BackendKind::parse("Assistants").expect("alias"),
            BackendKind::Assistant
        );
        assert!(BackendKind::parse("grpc").is_err());
    }
}
