//! Relay service: normalize the inbound conversation, dispatch to a backend,
//! and substitute static link replies for model-signaled function calls.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::assistants::{AssistantsClient, PollPolicy, RunOutcome, RunPoller, ThreadApi};
use crate::config::{BackendKind, RelayConfig};
use crate::error::{RelayError, Result};
use crate::functions::{FunctionRegistry, Resolution};
use crate::llm::{CompletionClient, ModelTurn};
use crate::session::{ConversationMessage, Role, parse_conversation};

/// Request body for POST /chat: single-turn `message` or multi-turn `messages`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub messages: Option<Value>,
}

impl ChatRequest {
    pub fn single(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            messages: None,
        }
    }

    /// Ordered conversation; `messages` wins when both fields are present.
    pub fn normalize(&self) -> Result<Vec<ConversationMessage>> {
        if let Some(messages) = &self.messages {
            return parse_conversation(messages);
        }
        match self.message.as_deref().map(str::trim) {
            Some(message) if !message.is_empty() => Ok(vec![ConversationMessage::user(message)]),
            Some(_) => Err(RelayError::InvalidRequest(
                "message must be non-empty".to_string(),
            )),
            None => Err(RelayError::InvalidRequest(
                "Message parameter is missing.".to_string(),
            )),
        }
    }
}

/// Where a reply came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplySource {
    Model,
    Function(String),
    UnrecognizedFunction(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub source: ReplySource,
}

/// One upstream strategy producing a model turn for a prepared conversation.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    async fn complete(
        &self,
        messages: &[ConversationMessage],
        cancel: &CancellationToken,
    ) -> Result<ModelTurn>;
}

/// Synchronous chat-completions strategy.
pub struct CompletionBackend {
    client: CompletionClient,
    functions: Vec<Value>,
}

impl CompletionBackend {
    pub fn new(client: CompletionClient, functions: &FunctionRegistry) -> Self {
        Self {
            client,
            functions: functions.descriptors(),
        }
    }
}

#[async_trait]
impl ChatBackend for CompletionBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Completion
    }

    async fn complete(
        &self,
        messages: &[ConversationMessage],
        cancel: &CancellationToken,
    ) -> Result<ModelTurn> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(RelayError::Cancelled),
            turn = self.client.chat(messages, self.functions.clone()) => turn,
        }
    }
}

/// Thread/run strategy driven by the Run-Poller.
pub struct AssistantBackend {
    poller: RunPoller,
}

impl AssistantBackend {
    pub fn new(api: Arc<dyn ThreadApi>, assistant_id: String, policy: PollPolicy) -> Self {
        Self {
            poller: RunPoller::new(api, assistant_id, policy),
        }
    }
}

#[async_trait]
impl ChatBackend for AssistantBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Assistant
    }

    async fn complete(
        &self,
        messages: &[ConversationMessage],
        cancel: &CancellationToken,
    ) -> Result<ModelTurn> {
        Ok(match self.poller.run(messages, cancel).await? {
            RunOutcome::Message(text) => ModelTurn {
                content: Some(text),
                function_call: None,
            },
            RunOutcome::FunctionCall(name) => ModelTurn {
                content: None,
                function_call: Some(name),
            },
        })
    }
}

pub struct RelayService {
    backend: Arc<dyn ChatBackend>,
    functions: FunctionRegistry,
    /// Injected when the conversation carries no system entry.
    directive: Option<String>,
}

impl RelayService {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        functions: FunctionRegistry,
        directive: Option<String>,
    ) -> Self {
        Self {
            backend,
            functions,
            directive,
        }
    }

    /// Wire the configured backend. Call `config.validate()` first.
    pub fn from_config(config: &RelayConfig) -> Result<Self> {
        let backend: Arc<dyn ChatBackend> = match config.backend {
            BackendKind::Completion => Arc::new(CompletionBackend::new(
                CompletionClient::new(
                    config.completion_url.clone(),
                    config.model.clone(),
                    config.api_key.clone(),
                    config.function_call_style,
                    config.upstream_timeout,
                )?,
                &config.functions,
            )),
            BackendKind::Assistant => {
                let assistant_id = config.assistant_id.clone().ok_or_else(|| {
                    RelayError::Config("assistant backend requires ASSISTANT_ID".to_string())
                })?;
                let api: Arc<dyn ThreadApi> = Arc::new(AssistantsClient::new(
                    &config.assistants_base_url,
                    config.api_key.clone(),
                    config.upstream_timeout,
                )?);
                Arc::new(AssistantBackend::new(api, assistant_id, config.poll))
            }
        };
        let directive = config
            .inject_system_prompt
            .then(|| config.functions.system_directive(&config.persona));
        Ok(Self::new(backend, config.functions.clone(), directive))
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    /// Prepend the system directive unless the caller already sent a system entry.
    pub fn prepare(&self, mut messages: Vec<ConversationMessage>) -> Vec<ConversationMessage> {
        if let Some(directive) = &self.directive {
            if !messages.iter().any(|m| m.role == Role::System) {
                messages.insert(0, ConversationMessage::system(directive.clone()));
            }
        }
        messages
    }

    /// Run one turn and resolve any function call through the registry.
    pub async fn reply(
        &self,
        messages: Vec<ConversationMessage>,
        cancel: &CancellationToken,
    ) -> Result<Reply> {
        let messages = self.prepare(messages);
        tracing::info!(
            event = "relay.turn.started",
            backend = self.backend.kind().as_str(),
            message_count = messages.len(),
            chars = messages.iter().map(|m| m.content.chars().count()).sum::<usize>(),
            "relaying conversation"
        );
        let turn = self.backend.complete(&messages, cancel).await?;
        let reply = match turn.function_call {
            Some(name) => match self.functions.resolve(&name) {
                Resolution::Matched(text) => Reply {
                    text,
                    source: ReplySource::Function(name),
                },
                Resolution::Unrecognized(text) => Reply {
                    text,
                    source: ReplySource::UnrecognizedFunction(name),
                },
            },
            None => Reply {
                text: turn.content.unwrap_or_default(),
                source: ReplySource::Model,
            },
        };
        tracing::info!(
            event = "relay.turn.completed",
            source = ?reply.source,
            chars = reply.text.chars().count(),
            "relay reply ready"
        );
        Ok(reply)
    }

    /// Run the turn on its own task, bound to `cancel`.
    ///
    /// Callers hold a drop guard of `cancel` for the inbound request's lifetime,
    /// so a disconnect cancels the task instead of leaving it polling.
    pub async fn spawn_reply(
        self: &Arc<Self>,
        messages: Vec<ConversationMessage>,
        cancel: CancellationToken,
    ) -> Result<Reply> {
        let relay = Arc::clone(self);
        let task = tokio::spawn(async move { relay.reply(messages, &cancel).await });
        task.await
            .map_err(|error| RelayError::Internal(format!("relay task failed: {error}")))?
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use serde_json::json;

    struct FixedBackend {
        turn: ModelTurn,
        seen: Mutex<Vec<Vec<ConversationMessage>>>,
    }

    #[async_trait]
    impl ChatBackend for FixedBackend {
        fn kind(&self) -> BackendKind {
            BackendKind::Completion
        }

        async fn complete(
            &self,
            messages: &[ConversationMessage],
            _cancel: &CancellationToken,
        ) -> Result<ModelTurn> {
            self.seen
                .lock()
                .expect("seen lock")
                .push(messages.to_vec());
            Ok(self.turn.clone())
        }
    }

    fn relay_with(turn: ModelTurn, directive: Option<&str>) -> (RelayService, Arc<FixedBackend>) {
        let backend = Arc::new(FixedBackend {
            turn,
            seen: Mutex::new(Vec::new()),
        });
        let relay = RelayService::new(
            backend.clone(),
            FunctionRegistry::default_links(),
            directive.map(str::to_string),
        );
        (relay, backend)
    }

    #[test]
    fn normalize_prefers_messages_over_message() {
        let request = ChatRequest {
            message: Some("ignored".to_string()),
            messages: Some(json!([{"role": "user", "content": "kept"}])),
        };
        assert_eq!(
            request.normalize().expect("valid"),
            vec![ConversationMessage::user("kept")]
        );
    }

    #[test]
    fn normalize_rejects_missing_and_blank() {
        assert!(matches!(
            ChatRequest::default().normalize(),
            Err(RelayError::InvalidRequest(_))
        ));
        assert!(matches!(
            ChatRequest::single("  ").normalize(),
            Err(RelayError::InvalidRequest(_))
        ));
        let not_a_sequence = ChatRequest {
            message: None,
            messages: Some(json!("hello")),
        };
        assert!(matches!(
            not_a_sequence.normalize(),
            Err(RelayError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn directive_is_prepended_only_without_system_entry() {
        let (relay, backend) = relay_with(ModelTurn::default(), Some("directive"));
        relay
            .reply(vec![ConversationMessage::user("hi")], &CancellationToken::new())
            .await
            .expect("reply");
        relay
            .reply(
                vec![
                    ConversationMessage::system("mine"),
                    ConversationMessage::user("hi"),
                ],
                &CancellationToken::new(),
            )
            .await
            .expect("reply");

        let seen = backend.seen.lock().expect("seen lock");
        assert_eq!(seen[0][0], ConversationMessage::system("directive"));
        assert_eq!(seen[0].len(), 2);
        assert_eq!(seen[1][0], ConversationMessage::system("mine"));
        assert_eq!(seen[1].len(), 2);
    }

    #[tokio::test]
    async fn function_call_replaces_model_content() {
        let (relay, _) = relay_with(
            ModelTurn {
                content: Some("let me find that".to_string()),
                function_call: Some("get_linkedin".to_string()),
            },
            None,
        );
        let reply = relay
            .reply(vec![ConversationMessage::user("linkedin?")], &CancellationToken::new())
            .await
            .expect("reply");
        assert_eq!(reply.source, ReplySource::Function("get_linkedin".to_string()));
        assert!(reply.text.contains("linkedin.com/in/bharath-kumar79"));
    }

    #[tokio::test]
    async fn missing_content_becomes_empty_reply() {
        let (relay, _) = relay_with(ModelTurn::default(), None);
        let reply = relay
            .reply(vec![ConversationMessage::user("hi")], &CancellationToken::new())
            .await
            .expect("reply");
        assert_eq!(reply.text, "");
        assert_eq!(reply.source, ReplySource::Model);
    }
}
