//! Server state management.

use std::sync::Arc;

use cutlist_core::config::PipelineConfig;
use cutlist_core::error::CutlistResult;
use cutlist_core::pipeline::PartParser;
use cutlist_core::session::ProgressTracker;
use cutlist_providers::ProviderFactory;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub parser: Arc<PartParser>,
}

impl AppState {
    /// Wrap an already built parser.
    pub fn new(parser: PartParser) -> Self {
        Self {
            parser: Arc::new(parser),
        }
    }

    /// Build the provider chain and parser from configuration.
    pub fn from_config(config: PipelineConfig) -> CutlistResult<Self> {
        let providers = ProviderFactory::chain(&config.providers)?;
        let parser = PartParser::builder()
            .config(config)
            .providers(providers)
            .build()?;
        Ok(Self::new(parser))
    }

    /// Session tracker, for the background sweeper.
    pub fn tracker(&self) -> Arc<ProgressTracker> {
        self.parser.tracker()
    }
}
