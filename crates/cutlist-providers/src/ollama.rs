//! Ollama extraction provider.

use std::time::Instant;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, instrument};

use cutlist_core::config::ProviderSettings;
use cutlist_core::error::{CutlistError, CutlistResult};
use cutlist_core::gateway::{normalize_response, OllamaChatResponse, ProviderResponse};
use cutlist_core::traits::PartExtractor;
use cutlist_core::types::{ParseOptions, ProviderResult};

use crate::http::{self, CallFailure};
use crate::prompts::{self, SYSTEM_PROMPT};

const DEFAULT_MODEL: &str = "llama3.2-vision";

/// Ollama chat API provider.
///
/// Configured when a base URL is set. Images go through the `images` field,
/// which only vision models accept.
pub struct OllamaExtractor {
    client: Client,
    base_url: Option<String>,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: ModelOptions,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ModelOptions {
    temperature: f32,
    num_predict: u32,
}

impl OllamaExtractor {
    /// Create a provider from its settings. The base URL must parse.
    pub fn new(settings: &ProviderSettings) -> CutlistResult<Self> {
        let base_url = match settings.base_url.as_deref().filter(|u| !u.trim().is_empty()) {
            Some(raw) => {
                url::Url::parse(raw)
                    .map_err(|e| CutlistError::Configuration(format!("Invalid Ollama URL: {}", e)))?;
                Some(http::trim_base_url(raw))
            }
            None => None,
        };
        let model = if settings.model.is_empty() {
            DEFAULT_MODEL.to_string()
        } else {
            settings.model.clone()
        };

        Ok(Self {
            client: http::build_client()?,
            base_url,
            model,
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(&self, prompt: String, images: Vec<String>) -> ChatRequest<'_> {
        ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                    images: Vec::new(),
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                    images,
                },
            ],
            stream: false,
            options: ModelOptions {
                temperature: self.temperature,
                num_predict: self.max_tokens,
            },
        }
    }

    async fn complete(&self, prompt: String, images: Vec<String>, options: &ParseOptions) -> ProviderResult {
        let Some(base_url) = &self.base_url else {
            return http::not_configured(self.name(), "OLLAMA_BASE_URL");
        };
        let started = Instant::now();

        let request = self
            .client
            .post(format!("{}/api/chat", base_url))
            .json(&self.request_body(prompt, images));

        match http::send::<OllamaChatResponse>(self.name(), request).await {
            Ok(chat) => {
                debug!(done = chat.done, "Ollama response received");
                normalize_response(
                    self.name(),
                    &ProviderResponse::Ollama(chat),
                    options,
                    http::elapsed_ms(started),
                )
            }
            Err(failure) => failure.into_result(self.name(), started),
        }
    }
}

#[async_trait]
impl PartExtractor for OllamaExtractor {
    #[instrument(skip(self, text, options), fields(model = %self.model, chars = text.len()))]
    async fn parse_text(&self, text: &str, options: &ParseOptions) -> ProviderResult {
        self.complete(prompts::user_prompt(options, Some(text)), Vec::new(), options)
            .await
    }

    #[instrument(skip(self, image, _mime_type, options), fields(model = %self.model, bytes = image.len()))]
    async fn parse_image(&self, image: &[u8], _mime_type: &str, options: &ParseOptions) -> ProviderResult {
        self.complete(
            prompts::user_prompt(options, None),
            vec![STANDARD.encode(image)],
            options,
        )
        .await
    }

    async fn parse_document(
        &self,
        _document: &[u8],
        text_layer: Option<&str>,
        options: &ParseOptions,
    ) -> ProviderResult {
        match text_layer.filter(|t| !t.trim().is_empty()) {
            Some(text) => self.parse_text(text, options).await,
            None => CallFailure::rejected("document has no text layer")
                .into_result(self.name(), Instant::now()),
        }
    }

    fn is_configured(&self) -> bool {
        self.base_url.is_some()
    }

    fn name(&self) -> &str {
        "ollama"
    }
}
