//! Config namespace: YAML settings loading and the resolved relay configuration.

mod relay;
mod settings;

pub use relay::{
    AccessPolicy, BackendKind, DEFAULT_BIND, DEFAULT_MODEL, OPENAI_API_BASE_URL,
    OPENAI_CHAT_COMPLETIONS_URL, RelayConfig,
};
pub use settings::{
    AccessSettings, AssistantSettings, GatewaySettings, PromptSettings, RelaySettings,
    UpstreamSettings, WebhookSettings, load_relay_settings, load_relay_settings_from_paths,
    relay_settings_paths, set_config_home_override,
};
