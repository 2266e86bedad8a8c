//! Factory for building extraction providers.

use std::sync::Arc;

use tracing::{debug, info};

use cutlist_core::config::{ProviderChainConfig, ProviderKind, ProviderSettings};
use cutlist_core::error::CutlistResult;
use cutlist_core::traits::PartExtractor;

use crate::anthropic::AnthropicExtractor;
use crate::ollama::OllamaExtractor;
use crate::openai::OpenAiExtractor;

/// Factory for creating extraction providers.
pub struct ProviderFactory;

impl ProviderFactory {
    /// Create one provider from its settings.
    pub fn create(kind: ProviderKind, settings: &ProviderSettings) -> CutlistResult<Arc<dyn PartExtractor>> {
        let provider: Arc<dyn PartExtractor> = match kind {
            ProviderKind::Anthropic => Arc::new(AnthropicExtractor::new(settings)?),
            ProviderKind::OpenAi => Arc::new(OpenAiExtractor::new(settings)?),
            ProviderKind::Ollama => Arc::new(OllamaExtractor::new(settings)?),
        };
        Ok(provider)
    }

    /// Build the escalation chain in configured order.
    ///
    /// Unconfigured providers stay in the chain; the orchestrator skips them.
    /// A kind listed twice is only built once.
    pub fn chain(config: &ProviderChainConfig) -> CutlistResult<Vec<Arc<dyn PartExtractor>>> {
        let mut chain: Vec<Arc<dyn PartExtractor>> = Vec::with_capacity(config.order.len());
        let mut seen = Vec::with_capacity(config.order.len());
        for kind in &config.order {
            if seen.contains(kind) {
                debug!(provider = %kind, "Ignoring duplicate provider in chain order");
                continue;
            }
            seen.push(*kind);
            chain.push(Self::create(*kind, config.settings(*kind))?);
        }

        let configured: Vec<&str> = chain
            .iter()
            .filter(|p| p.is_configured())
            .map(|p| p.name())
            .collect();
        info!(
            order = ?config.order,
            configured = ?configured,
            "Built extraction provider chain"
        );
        Ok(chain)
    }

    /// Create an Anthropic provider with a specific model and key.
    pub fn anthropic(model: impl Into<String>, api_key: impl Into<String>) -> CutlistResult<Arc<dyn PartExtractor>> {
        let settings = ProviderSettings {
            model: model.into(),
            api_key: Some(api_key.into()),
            ..Default::default()
        };
        Self::create(ProviderKind::Anthropic, &settings)
    }

    /// Create an OpenAI provider with a specific model and key.
    pub fn openai(model: impl Into<String>, api_key: impl Into<String>) -> CutlistResult<Arc<dyn PartExtractor>> {
        let settings = ProviderSettings {
            model: model.into(),
            api_key: Some(api_key.into()),
            ..Default::default()
        };
        Self::create(ProviderKind::OpenAi, &settings)
    }

    /// Create an Ollama provider with a specific model and server.
    pub fn ollama(model: impl Into<String>, base_url: impl Into<String>) -> CutlistResult<Arc<dyn PartExtractor>> {
        let settings = ProviderSettings {
            model: model.into(),
            base_url: Some(base_url.into()),
            ..Default::default()
        };
        Self::create(ProviderKind::Ollama, &settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_follows_order_and_keeps_unconfigured() {
        let mut config = ProviderChainConfig::default();
        config.order = vec![ProviderKind::Ollama, ProviderKind::Anthropic, ProviderKind::Ollama];
        config.anthropic.api_key = Some("sk-ant".to_string());

        let chain = ProviderFactory::chain(&config).unwrap();
        let names: Vec<&str> = chain.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["ollama", "anthropic"]);
        assert!(!chain[0].is_configured());
        assert!(chain[1].is_configured());
    }

    #[test]
    fn test_named_constructors() {
        let provider = ProviderFactory::ollama("llava", "http://localhost:11434").unwrap();
        assert_eq!(provider.name(), "ollama");
        assert!(provider.is_configured());
        assert!(ProviderFactory::ollama("llava", "::").is_err());
    }
}
