//! Anthropic (Claude) extraction provider.

use std::time::Instant;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::{debug, instrument};

use cutlist_core::config::ProviderSettings;
use cutlist_core::error::CutlistResult;
use cutlist_core::gateway::{normalize_response, AnthropicMessage, ProviderResponse};
use cutlist_core::traits::PartExtractor;
use cutlist_core::types::{ParseOptions, ProviderResult};

use crate::http::{self, CallFailure};
use crate::prompts::{self, SYSTEM_PROMPT};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";
const IMAGE_TYPES: &[&str] = &["image/jpeg", "image/png", "image/gif", "image/webp"];

/// Anthropic Messages API provider.
pub struct AnthropicExtractor {
    client: Client,
    api_key: Option<SecretString>,
    model: String,
    base_url: String,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: Vec<RequestMessage>,
}

#[derive(Debug, Serialize)]
struct RequestMessage {
    role: &'static str,
    content: Vec<ContentBlock>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: String },
    Image { source: Base64Source },
    Document { source: Base64Source },
}

#[derive(Debug, Serialize)]
struct Base64Source {
    #[serde(rename = "type")]
    kind: &'static str,
    media_type: String,
    data: String,
}

impl Base64Source {
    fn new(media_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            kind: "base64",
            media_type: media_type.into(),
            data: STANDARD.encode(bytes),
        }
    }
}

impl AnthropicExtractor {
    /// Create a provider from its settings. A missing API key leaves the
    /// provider unconfigured rather than failing.
    pub fn new(settings: &ProviderSettings) -> CutlistResult<Self> {
        let api_key = settings
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .map(SecretString::new);
        let model = if settings.model.is_empty() {
            DEFAULT_MODEL.to_string()
        } else {
            settings.model.clone()
        };
        let base_url = settings
            .base_url
            .as_deref()
            .map(http::trim_base_url)
            .unwrap_or_else(|| ANTHROPIC_API_URL.to_string());

        Ok(Self {
            client: http::build_client()?,
            api_key,
            model,
            base_url,
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(&self, content: Vec<ContentBlock>) -> MessagesRequest<'_> {
        MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            system: SYSTEM_PROMPT,
            messages: vec![RequestMessage {
                role: "user",
                content,
            }],
        }
    }

    async fn complete(&self, content: Vec<ContentBlock>, options: &ParseOptions) -> ProviderResult {
        let Some(api_key) = &self.api_key else {
            return http::not_configured(self.name(), "ANTHROPIC_API_KEY");
        };
        let started = Instant::now();

        let request = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&self.request_body(content));

        match http::send::<AnthropicMessage>(self.name(), request).await {
            Ok(message) => {
                debug!(
                    model = message.model.as_deref().unwrap_or(&self.model),
                    stop_reason = message.stop_reason.as_deref().unwrap_or(""),
                    "Anthropic response received"
                );
                normalize_response(
                    self.name(),
                    &ProviderResponse::Anthropic(message),
                    options,
                    http::elapsed_ms(started),
                )
            }
            Err(failure) => failure.into_result(self.name(), started),
        }
    }
}

#[async_trait]
impl PartExtractor for AnthropicExtractor {
    #[instrument(skip(self, text, options), fields(model = %self.model, chars = text.len()))]
    async fn parse_text(&self, text: &str, options: &ParseOptions) -> ProviderResult {
        let prompt = prompts::user_prompt(options, Some(text));
        self.complete(vec![ContentBlock::Text { text: prompt }], options)
            .await
    }

    #[instrument(skip(self, image, options), fields(model = %self.model, bytes = image.len()))]
    async fn parse_image(&self, image: &[u8], mime_type: &str, options: &ParseOptions) -> ProviderResult {
        if !IMAGE_TYPES.contains(&mime_type) {
            return CallFailure::rejected(format!("unsupported image type {}", mime_type))
                .into_result(self.name(), Instant::now());
        }
        let content = vec![
            ContentBlock::Image {
                source: Base64Source::new(mime_type, image),
            },
            ContentBlock::Text {
                text: prompts::user_prompt(options, None),
            },
        ];
        self.complete(content, options).await
    }

    #[instrument(skip(self, document, text_layer, options), fields(model = %self.model, bytes = document.len()))]
    async fn parse_document(
        &self,
        document: &[u8],
        text_layer: Option<&str>,
        options: &ParseOptions,
    ) -> ProviderResult {
        if !prompts::is_pdf(document) {
            return match text_layer {
                Some(text) => self.parse_text(text, options).await,
                None => CallFailure::rejected("only PDF documents can be attached")
                    .into_result(self.name(), Instant::now()),
            };
        }
        let content = vec![
            ContentBlock::Document {
                source: Base64Source::new("application/pdf", document),
            },
            ContentBlock::Text {
                text: prompts::user_prompt(options, None),
            },
        ];
        self.complete(content, options).await
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}
