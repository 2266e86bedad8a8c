//! cutlist-providers - Extraction provider implementations for cutlist.
//!
//! Each provider implements [`PartExtractor`] over a vendor HTTP API and
//! reports every failure as a [`ProviderResult`](cutlist_core::ProviderResult)
//! rather than an error, so the orchestrator can decide between retry and
//! escalation.
//!
//! # Supported Providers
//!
//! - **Anthropic** - Messages API; text, images and PDF documents
//! - **OpenAI** - Chat Completions; text, images, documents via their text layer
//! - **Ollama** - local chat API; text, images for vision models, documents via their text layer
//!
//! # Example
//!
//! ```ignore
//! use cutlist_core::PipelineConfig;
//! use cutlist_providers::ProviderFactory;
//!
//! let config = PipelineConfig::load()?;
//! let chain = ProviderFactory::chain(&config.providers)?;
//! ```

mod anthropic;
mod factory;
mod http;
mod ollama;
mod openai;
pub mod prompts;

pub use anthropic::AnthropicExtractor;
pub use factory::ProviderFactory;
pub use ollama::OllamaExtractor;
pub use openai::OpenAiExtractor;

// Re-export core types for convenience
pub use cutlist_core::config::{ProviderChainConfig, ProviderKind, ProviderSettings};
pub use cutlist_core::traits::{ExtractionRequest, PartExtractor};
