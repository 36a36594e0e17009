//! Runtime settings loader for chat-relay.
//!
//! Loads and merges:
//! - System defaults: `<PRJ_ROOT>/packages/conf/settings.yaml`
//! - User overrides:  `<PRJ_CONFIG_HOME>/chat-relay/settings.yaml`
//!
//! Merge precedence is user over system.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use serde::Deserialize;

use crate::functions::LinkFunction;
use crate::llm::FunctionCallStyle;

const DEFAULT_SYSTEM_SETTINGS_RELATIVE_PATH: &str = "packages/conf/settings.yaml";
const DEFAULT_USER_SETTINGS_RELATIVE_PATH: &str = "chat-relay/settings.yaml";
const DEFAULT_CONFIG_HOME_RELATIVE_PATH: &str = ".config";
static CONFIG_HOME_OVERRIDE: OnceLock<PathBuf> = OnceLock::new();

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelaySettings {
    #[serde(default)]
    pub gateway: GatewaySettings,
    #[serde(default)]
    pub upstream: UpstreamSettings,
    #[serde(default)]
    pub assistant: AssistantSettings,
    #[serde(default)]
    pub prompt: PromptSettings,
    #[serde(default)]
    pub access: AccessSettings,
    #[serde(default)]
    pub webhook: WebhookSettings,
    /// Replaces the built-in link table when present.
    pub functions: Option<Vec<LinkFunction>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GatewaySettings {
    pub bind: Option<String>,
    /// `completion` or `assistant`.
    pub backend: Option<String>,
    pub max_concurrent_requests: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpstreamSettings {
    pub completion_url: Option<String>,
    pub assistants_base_url: Option<String>,
    pub model: Option<String>,
    pub function_call_style: Option<FunctionCallStyle>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssistantSettings {
    pub assistant_id: Option<String>,
    pub poll_interval_ms: Option<u64>,
    pub poll_max_wait_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PromptSettings {
    pub inject_system_prompt: Option<bool>,
    pub persona: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccessSettings {
    pub allowed_origins: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookSettings {
    pub enabled: Option<bool>,
}

impl RelaySettings {
    fn merge(self, overlay: Self) -> Self {
        Self {
            gateway: self.gateway.merge(overlay.gateway),
            upstream: self.upstream.merge(overlay.upstream),
            assistant: self.assistant.merge(overlay.assistant),
            prompt: self.prompt.merge(overlay.prompt),
            access: self.access.merge(overlay.access),
            webhook: self.webhook.merge(overlay.webhook),
            functions: overlay.functions.or(self.functions),
        }
    }
}

impl GatewaySettings {
    fn merge(self, overlay: Self) -> Self {
        Self {
            bind: overlay.bind.or(self.bind),
            backend: overlay.backend.or(self.backend),
            max_concurrent_requests: overlay
                .max_concurrent_requests
                .or(self.max_concurrent_requests),
        }
    }
}

impl UpstreamSettings {
    fn merge(self, overlay: Self) -> Self {
        Self {
            completion_url: overlay.completion_url.or(self.completion_url),
            assistants_base_url: overlay.assistants_base_url.or(self.assistants_base_url),
            model: overlay.model.or(self.model),
            function_call_style: overlay.function_call_style.or(self.function_call_style),
            timeout_secs: overlay.timeout_secs.or(self.timeout_secs),
        }
    }
}

impl AssistantSettings {
    fn merge(self, overlay: Self) -> Self {
        Self {
            assistant_id: overlay.assistant_id.or(self.assistant_id),
            poll_interval_ms: overlay.poll_interval_ms.or(self.poll_interval_ms),
            poll_max_wait_secs: overlay.poll_max_wait_secs.or(self.poll_max_wait_secs),
        }
    }
}

impl PromptSettings {
    fn merge(self, overlay: Self) -> Self {
        Self {
            inject_system_prompt: overlay.inject_system_prompt.or(self.inject_system_prompt),
            persona: overlay.persona.or(self.persona),
        }
    }
}

impl AccessSettings {
    fn merge(self, overlay: Self) -> Self {
        Self {
            allowed_origins: overlay.allowed_origins.or(self.allowed_origins),
        }
    }
}

impl WebhookSettings {
    fn merge(self, overlay: Self) -> Self {
        Self {
            enabled: overlay.enabled.or(self.enabled),
        }
    }
}

/// Load merged relay settings (user overrides system).
pub fn load_relay_settings() -> RelaySettings {
    let (system_path, user_path) = relay_settings_paths();
    load_relay_settings_from_paths(&system_path, &user_path)
}

#[doc(hidden)]
pub fn relay_settings_paths() -> (PathBuf, PathBuf) {
    let root = project_root();
    let system_path = root.join(DEFAULT_SYSTEM_SETTINGS_RELATIVE_PATH);
    let user_path = resolve_config_home(&root).join(DEFAULT_USER_SETTINGS_RELATIVE_PATH);
    (system_path, user_path)
}

#[doc(hidden)]
pub fn load_relay_settings_from_paths(system: &Path, user: &Path) -> RelaySettings {
    load_one(system).merge(load_one(user))
}

fn load_one(path: &Path) -> RelaySettings {
    if !path.exists() {
        return RelaySettings::default();
    }
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) => {
            tracing::warn!(
                path = %path.display(),
                error = %error,
                "failed to read settings file; ignoring"
            );
            return RelaySettings::default();
        }
    };
    match serde_yaml::from_str::<RelaySettings>(&raw) {
        Ok(value) => value,
        Err(error) => {
            tracing::warn!(
                path = %path.display(),
                error = %error,
                "failed to parse settings yaml; ignoring file"
            );
            RelaySettings::default()
        }
    }
}

fn project_root() -> PathBuf {
    std::env::var("PRJ_ROOT")
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

/// Set config-home override (used by CLI `--conf`).
///
/// The path can be absolute, or relative to `PRJ_ROOT`/cwd.
pub fn set_config_home_override(path: impl Into<PathBuf>) {
    let path = path.into();
    if path.as_os_str().is_empty() {
        return;
    }
    if CONFIG_HOME_OVERRIDE.set(path.clone()).is_err() {
        if let Some(current) = CONFIG_HOME_OVERRIDE.get().filter(|current| **current != path) {
            tracing::warn!(
                current = %current.display(),
                ignored = %path.display(),
                "config home override already set; ignoring subsequent value"
            );
        }
    }
}

fn resolve_config_home(project_root: &Path) -> PathBuf {
    if let Some(path) = CONFIG_HOME_OVERRIDE.get() {
        return absolutize(project_root, path.clone());
    }

    let configured = std::env::var("PRJ_CONFIG_HOME")
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_CONFIG_HOME_RELATIVE_PATH.to_string());
    absolutize(project_root, PathBuf::from(configured))
}

fn absolutize(project_root: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        project_root.join(path)
    }
}
