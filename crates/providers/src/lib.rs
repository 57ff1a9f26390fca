//! LLM provider implementations for Everclaw.
//!
//! Each provider translates the runtime's block-structured conversation to
//! its wire dialect and back. The gateway contract is uniform: one
//! `complete` call per think step, application-level failures as
//! `StopReason::Error` on the message, transport failures as
//! `Err(ProviderError)` so the surrounding durable substep retries.

pub mod anthropic;
pub mod openai_compat;

pub use anthropic::AnthropicProvider;
pub use openai_compat::OpenAiCompatProvider;

use everclaw_config::Config;
use everclaw_core::error::{Error, ProviderError};
use everclaw_core::provider::Provider;
use std::sync::Arc;

/// Per-call timeout for completion requests.
pub const COMPLETE_TIMEOUT_SECS: u64 = 60;

/// Build the configured provider.
pub fn provider_from_config(config: &Config) -> Result<Arc<dyn Provider>, Error> {
    let api_key = config.llm_api_key.clone().ok_or_else(|| {
        Error::from(ProviderError::NotConfigured(
            "LLM_API_KEY is not set".into(),
        ))
    })?;

    match config.llm_provider.as_str() {
        "anthropic" => {
            let mut provider = AnthropicProvider::new(api_key);
            if let Some(base) = &config.llm_base_url {
                provider = provider.with_base_url(base);
            }
            Ok(Arc::new(provider))
        }
        "openai" => {
            let mut provider = OpenAiCompatProvider::new(api_key);
            if let Some(base) = &config.llm_base_url {
                provider = provider.with_base_url(base);
            }
            Ok(Arc::new(provider))
        }
        other => Err(ProviderError::NotConfigured(format!("Unknown provider: {other}")).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_requires_api_key() {
        let config = Config::default();
        assert!(provider_from_config(&config).is_err());
    }

    #[test]
    fn factory_builds_known_providers() {
        let mut config = Config {
            llm_api_key: Some("sk-test".into()),
            ..Config::default()
        };
        assert_eq!(provider_from_config(&config).unwrap().name(), "anthropic");

        config.llm_provider = "openai".into();
        assert_eq!(provider_from_config(&config).unwrap().name(), "openai");

        config.llm_provider = "carrier-pigeon".into();
        assert!(provider_from_config(&config).is_err());
    }
}
