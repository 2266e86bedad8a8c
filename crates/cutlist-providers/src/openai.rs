//! OpenAI extraction provider.

use std::time::Instant;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::{debug, instrument};

use cutlist_core::config::ProviderSettings;
use cutlist_core::error::CutlistResult;
use cutlist_core::gateway::{normalize_response, OpenAiChatCompletion, ProviderResponse};
use cutlist_core::traits::PartExtractor;
use cutlist_core::types::{ParseOptions, ProviderResult};

use crate::http::{self, CallFailure};
use crate::prompts::{self, SYSTEM_PROMPT};

const OPENAI_API_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// OpenAI Chat Completions provider.
///
/// Documents are sent through their text layer; scanned documents without
/// one are rejected so the chain can escalate.
pub struct OpenAiExtractor {
    client: Client,
    api_key: Option<SecretString>,
    model: String,
    base_url: String,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

fn data_url(mime_type: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime_type, STANDARD.encode(bytes))
}

impl OpenAiExtractor {
    /// Create a provider from its settings.
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
            .unwrap_or_else(|| OPENAI_API_URL.to_string());

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

    fn request_body(&self, content: Vec<ContentPart>) -> ChatRequest<'_> {
        ChatRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: vec![ContentPart::Text {
                        text: SYSTEM_PROMPT.to_string(),
                    }],
                },
                ChatMessage {
                    role: "user",
                    content,
                },
            ],
        }
    }

    async fn complete(&self, content: Vec<ContentPart>, options: &ParseOptions) -> ProviderResult {
        let Some(api_key) = &self.api_key else {
            return http::not_configured(self.name(), "OPENAI_API_KEY");
        };
        let started = Instant::now();

        let request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key.expose_secret())
            .json(&self.request_body(content));

        match http::send::<OpenAiChatCompletion>(self.name(), request).await {
            Ok(completion) => {
                debug!(
                    model = completion.model.as_deref().unwrap_or(&self.model),
                    choices = completion.choices.len(),
                    "OpenAI response received"
                );
                normalize_response(
                    self.name(),
                    &ProviderResponse::OpenAi(completion),
                    options,
                    http::elapsed_ms(started),
                )
            }
            Err(failure) => failure.into_result(self.name(), started),
        }
    }
}

#[async_trait]
impl PartExtractor for OpenAiExtractor {
    #[instrument(skip(self, text, options), fields(model = %self.model, chars = text.len()))]
    async fn parse_text(&self, text: &str, options: &ParseOptions) -> ProviderResult {
        let prompt = prompts::user_prompt(options, Some(text));
        self.complete(vec![ContentPart::Text { text: prompt }], options)
            .await
    }

    #[instrument(skip(self, image, options), fields(model = %self.model, bytes = image.len()))]
    async fn parse_image(&self, image: &[u8], mime_type: &str, options: &ParseOptions) -> ProviderResult {
        let content = vec![
            ContentPart::Text {
                text: prompts::user_prompt(options, None),
            },
            ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: data_url(mime_type, image),
                },
            },
        ];
        self.complete(content, options).await
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
        self.api_key.is_some()
    }

    fn name(&self) -> &str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cutlist_core::types::ProviderFailure;

    fn configured() -> OpenAiExtractor {
        OpenAiExtractor::new(&ProviderSettings {
            api_key: Some("sk-test".to_string()),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_image_part_is_data_url() {
        let provider = configured();
        let body = provider.request_body(vec![ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: data_url("image/png", b"abc"),
            },
        }]);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        let part = &json["messages"][1]["content"][0];
        assert_eq!(part["type"], "image_url");
        assert_eq!(part["image_url"]["url"], "data:image/png;base64,YWJj");
    }

    #[tokio::test]
    async fn test_scanned_document_is_rejected() {
        let result = configured()
            .parse_document(b"%PDF-1.4", None, &ParseOptions::default())
            .await;
        assert!(!result.success);
        assert_eq!(result.failure, Some(ProviderFailure::Rejected));
    }

    #[test]
    fn test_missing_key_is_unconfigured() {
        let provider = OpenAiExtractor::new(&ProviderSettings::default()).unwrap();
        assert!(!provider.is_configured());
        assert_eq!(provider.model(), DEFAULT_MODEL);
    }
}
