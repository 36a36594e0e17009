//! chat-relay CLI: gateway or stdio mode.
//!
//! Settings from `packages/conf/settings.yaml` merged with the user file; environment
//! (`OPENAI_API_KEY`, `ASSISTANT_ID`, `ALLOWED_ORIGINS`, ...) and flags override them.
//!
//! Logging: set `RUST_LOG=chat_relay=info` (or `warn`, `debug`) to see relay logs on stderr.

mod cli;

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use chat_relay::{
    RelayConfig, RelayService, load_relay_settings, run_http, run_stdio, set_config_home_override,
};

use crate::cli::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if let Some(conf_dir) = cli.conf.clone() {
        set_config_home_override(conf_dir);
    }

    // Initialize tracing: RUST_LOG overrides; --verbose => debug; else info
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if cli.verbose {
            "chat_relay=debug,tower_http=debug"
        } else {
            "chat_relay=info"
        })
    });
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let mut config = RelayConfig::from_settings(load_relay_settings())
        .context("failed to resolve relay configuration")?;
    if let Some(backend) = cli.backend {
        config.backend = backend.into();
    }

    match cli.command {
        Command::Gateway {
            bind,
            max_concurrent,
            poll_max_wait,
        } => {
            if let Some(bind) = bind {
                config.bind = bind;
            }
            if max_concurrent.is_some() {
                config.max_concurrent_requests = max_concurrent;
            }
            if let Some(secs) = poll_max_wait {
                config.poll.max_wait = Duration::from_secs(secs);
            }
            config.validate()?;
            if config.api_key.is_none() {
                tracing::warn!("OPENAI_API_KEY is not set; upstream calls will be unauthenticated");
            }
            let relay = RelayService::from_config(&config)?;
            run_http(relay, &config).await
        }
        Command::Stdio => {
            config.validate()?;
            let relay = RelayService::from_config(&config)?;
            run_stdio(relay).await
        }
    }
}
