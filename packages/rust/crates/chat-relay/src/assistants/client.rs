//! HTTP client for the assistant thread/run API.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use super::types::{MessageList, Run, ThreadMessage, ThreadObject};
use crate::error::{RelayError, Result};
use crate::llm::http_client;
use crate::session::Role;

const ASSISTANTS_BETA_HEADER: &str = "OpenAI-Beta";
const ASSISTANTS_BETA_VALUE: &str = "assistants=v2";

/// External thread/run service. One implementation talks HTTP; tests script it.
#[async_trait]
pub trait ThreadApi: Send + Sync {
    async fn create_thread(&self) -> Result<String>;

    async fn add_message(&self, thread_id: &str, role: Role, content: &str) -> Result<()>;

    async fn create_run(
        &self,
        thread_id: &str,
        assistant_id: &str,
        additional_instructions: Option<&str>,
    ) -> Result<Run>;

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run>;

    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<()>;

    /// Newest message on the thread, if any.
    async fn latest_message(&self, thread_id: &str) -> Result<Option<ThreadMessage>>;
}

/// Assistant API client (`/threads`, `/threads/{id}/messages`, `/threads/{id}/runs`).
pub struct AssistantsClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl AssistantsClient {
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    async fn send<T: DeserializeOwned>(
        &self,
        step: &'static str,
        req: reqwest::RequestBuilder,
    ) -> Result<T> {
        let mut req = req.header(ASSISTANTS_BETA_HEADER, ASSISTANTS_BETA_VALUE);
        if let Some(ref key) = self.api_key {
            req = req.header("Authorization", format!("Bearer {key}"));
        }
        let res = req.send().await.map_err(|error| {
            tracing::error!(
                event = "relay.assistant.request_failed",
                step,
                error = %error,
                "assistant request failed"
            );
            RelayError::upstream(format!("{step} failed: {error}"))
        })?;
        let status = res.status();
        let text = res
            .text()
            .await
            .map_err(|error| RelayError::upstream(format!("{step} body read failed: {error}")))?;
        if !status.is_success() {
            tracing::error!(
                event = "relay.assistant.non_success_status",
                step,
                status = status.as_u16(),
                body = %text,
                "assistant endpoint returned non-success status"
            );
            return Err(RelayError::upstream_status(status.as_u16(), &text));
        }
        serde_json::from_str(&text).map_err(|error| {
            tracing::error!(
                event = "relay.assistant.parse_failed",
                step,
                error = %error,
                "assistant response parse error"
            );
            RelayError::upstream(format!("{step} response parse error: {error}"))
        })
    }
}

#[async_trait]
impl ThreadApi for AssistantsClient {
    async fn create_thread(&self) -> Result<String> {
        let url = format!("{}/threads", self.base_url);
        let thread: ThreadObject = self
            .send("create_thread", self.client.post(url).json(&json!({})))
            .await?;
        Ok(thread.id)
    }

    async fn add_message(&self, thread_id: &str, role: Role, content: &str) -> Result<()> {
        let url = format!("{}/threads/{thread_id}/messages", self.base_url);
        let body = json!({ "role": role.as_str(), "content": content });
        let _: Value = self
            .send("add_message", self.client.post(url).json(&body))
            .await?;
        Ok(())
    }

    async fn create_run(
        &self,
        thread_id: &str,
        assistant_id: &str,
        additional_instructions: Option<&str>,
    ) -> Result<Run> {
        let url = format!("{}/threads/{thread_id}/runs", self.base_url);
        let mut body = json!({ "assistant_id": assistant_id });
        if let Some(extra) = additional_instructions {
            body["additional_instructions"] = Value::String(extra.to_string());
        }
        self.send("create_run", self.client.post(url).json(&body))
            .await
    }

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run> {
        let url = format!("{}/threads/{thread_id}/runs/{run_id}", self.base_url);
        self.send("retrieve_run", self.client.get(url)).await
    }

    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<()> {
        let url = format!(
            "{}/threads/{thread_id}/runs/{run_id}/cancel",
            self.base_url
        );
        let _: Value = self.send("cancel_run", self.client.post(url)).await?;
        Ok(())
    }

    async fn latest_message(&self, thread_id: &str) -> Result<Option<ThreadMessage>> {
        let url = format!(
            "{}/threads/{thread_id}/messages?order=desc&limit=1",
            self.base_url
        );
        let list: MessageList = self.send("list_messages", self.client.get(url)).await?;
        Ok(list.data.into_iter().next())
    }
}
