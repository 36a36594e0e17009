//! LLM client: OpenAI-compatible chat completions with function calling.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RelayError, Result};
use crate::session::ConversationMessage;

/// How link functions are advertised to the completion endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionCallStyle {
    /// Legacy `functions` + `function_call: "auto"`.
    #[default]
    Functions,
    /// `tools` + `tool_choice: "auto"`.
    Tools,
}

/// Request body for chat completions (OpenAI format).
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ConversationMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    functions: Option<Vec<serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_call: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ToolDef>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
}

#[derive(Debug, Serialize)]
struct ToolDef {
    #[serde(rename = "type")]
    typ: &'static str,
    function: serde_json::Value,
}

/// Response: choices[0].message.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    function_call: Option<FunctionCallOut>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallOut>>,
}

#[derive(Debug, Deserialize)]
struct FunctionCallOut {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ToolCallOut {
    function: FunctionCallOut,
}

/// What the model produced for one turn.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelTurn {
    pub content: Option<String>,
    /// Name of the function the model asked for, if any.
    pub function_call: Option<String>,
}

impl AssistantMessage {
    fn into_turn(self) -> ModelTurn {
        let function_call = self.function_call.map(|call| call.name).or_else(|| {
            self.tool_calls
                .and_then(|calls| calls.into_iter().next())
                .map(|call| call.function.name)
        });
        ModelTurn {
            content: self.content,
            function_call,
        }
    }
}

/// reqwest client bounded by `timeout`.
pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|error| {
            tracing::error!(
                event = "relay.http_client.build_failed",
                error = %error,
                timeout_ms = timeout.as_millis(),
                "failed to build upstream http client"
            );
            RelayError::Config(format!("failed to build http client: {error}"))
        })
}

/// HTTP client for chat completions.
pub struct CompletionClient {
    client: reqwest::Client,
    inference_url: String,
    model: String,
    api_key: Option<String>,
    style: FunctionCallStyle,
}

impl CompletionClient {
    pub fn new(
        inference_url: String,
        model: String,
        api_key: Option<String>,
        style: FunctionCallStyle,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            inference_url,
            model,
            api_key,
            style,
        })
    }

    /// Send the conversation and function descriptors; one request, no retry.
    pub async fn chat(
        &self,
        messages: &[ConversationMessage],
        functions: Vec<serde_json::Value>,
    ) -> Result<ModelTurn> {
        let advertise = !functions.is_empty();
        let body = match self.style {
            FunctionCallStyle::Functions => ChatCompletionRequest {
                model: &self.model,
                messages,
                function_call: advertise.then_some("auto"),
                functions: advertise.then_some(functions),
                tools: None,
                tool_choice: None,
            },
            FunctionCallStyle::Tools => ChatCompletionRequest {
                model: &self.model,
                messages,
                functions: None,
                function_call: None,
                tool_choice: advertise.then_some("auto"),
                tools: advertise.then(|| {
                    functions
                        .into_iter()
                        .map(|function| ToolDef {
                            typ: "function",
                            function,
                        })
                        .collect()
                }),
            },
        };
        let mut req = self
            .client
            .post(&self.inference_url)
            .json(&body)
            .header("Content-Type", "application/json");
        if let Some(ref key) = self.api_key {
            req = req.header("Authorization", format!("Bearer {key}"));
        }
        let res = req.send().await.map_err(|error| {
            tracing::error!(
                event = "relay.completion.request_failed",
                error = %error,
                "completion request failed"
            );
            RelayError::upstream(format!("completion request failed: {error}"))
        })?;
        let status = res.status();
        let text = res
            .text()
            .await
            .map_err(|error| RelayError::upstream(format!("completion body read failed: {error}")))?;
        if !status.is_success() {
            tracing::error!(
                event = "relay.completion.non_success_status",
                status = status.as_u16(),
                body = %text,
                "completion endpoint returned non-success status"
            );
            return Err(RelayError::upstream_status(status.as_u16(), &text));
        }
        let parsed: ChatCompletionResponse = serde_json::from_str(&text).map_err(|error| {
            tracing::error!(
                event = "relay.completion.parse_failed",
                error = %error,
                "completion response parse error"
            );
            RelayError::upstream(format!("completion response parse error: {error}"))
        })?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| RelayError::upstream("completion response has no choices"))?;
        Ok(choice.message.into_turn())
    }
}
