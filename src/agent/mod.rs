//! Chat turns, personas, and the terminal front end.

pub mod cleanup;
pub mod commands;
pub mod loop_;
pub mod personas;
pub mod turn;

pub use loop_::{run, ChatArgs};
pub use personas::{builtin_persona_set, persona_set_from, SYSTEM_AGENT};
pub use turn::{TurnError, TurnOptions, TurnReport, TurnRunner};

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::config::Config;
use crate::providers::create_provider;
use crate::routing::create_router;

/// Build a turn runner from config: provider, router, personas, options.
pub fn create_turn_runner(config: &Config) -> Result<TurnRunner> {
    let provider_name = config.default_provider.as_deref().unwrap_or("openai");
    let provider = create_provider(
        provider_name,
        config.api_key.as_deref(),
        config.api_url.as_deref(),
    )
    .with_context(|| format!("Failed to create provider '{provider_name}'"))?;
    let personas = persona_set_from(&config.personas).context("Invalid persona table")?;

    tracing::debug!(
        provider = provider.name(),
        personas = personas.len(),
        "Turn runner ready"
    );

    Ok(TurnRunner::new(
        Arc::from(provider),
        create_router(),
        personas,
        TurnOptions::from_config(config),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runner_from_echo_config() {
        let config = Config {
            default_provider: Some("echo".into()),
            ..Config::default()
        };
        let runner = create_turn_runner(&config).unwrap();
        assert_eq!(runner.provider_name(), "echo");
        assert_eq!(runner.personas().len(), 4);
    }

    #[test]
    fn unknown_provider_fails() {
        let config = Config {
            default_provider: Some("nope".into()),
            ..Config::default()
        };
        let err = create_turn_runner(&config).err().unwrap();
        assert!(format!("{err:#}").contains("Unknown provider"));
    }
}
