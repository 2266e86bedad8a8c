//! Raw response shapes of each provider family.

use serde::{Deserialize, Serialize};

/// Anthropic Messages API content block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnthropicContentBlock {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Anthropic Messages API response body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnthropicMessage {
    #[serde(default)]
    pub content: Vec<AnthropicContentBlock>,
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpenAiMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub refusal: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAiChoice {
    #[serde(default)]
    pub message: OpenAiMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// OpenAI Chat Completions response body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpenAiChatCompletion {
    #[serde(default)]
    pub choices: Vec<OpenAiChoice>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OllamaMessage {
    #[serde(default)]
    pub content: String,
}

/// Ollama `/api/chat` response body (non-streaming).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OllamaChatResponse {
    #[serde(default)]
    pub message: OllamaMessage,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub done_reason: Option<String>,
}

/// Response of one provider family, before normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", content = "body", rename_all = "snake_case")]
pub enum ProviderResponse {
    Anthropic(AnthropicMessage),
    OpenAi(OpenAiChatCompletion),
    Ollama(OllamaChatResponse),
}

impl ProviderResponse {
    /// Concatenated model text.
    pub fn text(&self) -> String {
        match self {
            ProviderResponse::Anthropic(msg) => msg
                .content
                .iter()
                .filter(|b| b.kind == "text")
                .filter_map(|b| b.text.as_deref())
                .collect::<Vec<_>>()
                .join(""),
            ProviderResponse::OpenAi(completion) => completion
                .choices
                .first()
                .and_then(|c| c.message.content.clone())
                .unwrap_or_default(),
            ProviderResponse::Ollama(chat) => chat.message.content.clone(),
        }
    }

    /// Explicit refusal text, if the model declined.
    pub fn refusal(&self) -> Option<&str> {
        match self {
            ProviderResponse::OpenAi(completion) => completion
                .choices
                .first()
                .and_then(|c| c.message.refusal.as_deref())
                .filter(|r| !r.is_empty()),
            ProviderResponse::Anthropic(msg) if msg.stop_reason.as_deref() == Some("refusal") => {
                Some("model refused the request")
            }
            _ => None,
        }
    }

    /// Whether the model stopped on its output limit.
    pub fn truncated(&self) -> bool {
        match self {
            ProviderResponse::Anthropic(msg) => msg.stop_reason.as_deref() == Some("max_tokens"),
            ProviderResponse::OpenAi(completion) => completion
                .choices
                .first()
                .is_some_and(|c| c.finish_reason.as_deref() == Some("length")),
            ProviderResponse::Ollama(chat) => chat.done_reason.as_deref() == Some("length"),
        }
    }

    /// Provider family name.
    pub fn family(&self) -> &'static str {
        match self {
            ProviderResponse::Anthropic(_) => "anthropic",
            ProviderResponse::OpenAi(_) => "openai",
            ProviderResponse::Ollama(_) => "ollama",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_anthropic_text_blocks() {
        let msg: AnthropicMessage = serde_json::from_value(json!({
            "content": [
                {"type": "text", "text": "[{\"l\":600,"},
                {"type": "text", "text": "\"w\":400}]"}
            ],
            "stop_reason": "max_tokens"
        }))
        .unwrap();
        let response = ProviderResponse::Anthropic(msg);
        assert_eq!(response.text(), r#"[{"l":600,"w":400}]"#);
        assert!(response.truncated());
    }

    #[test]
    fn test_openai_refusal() {
        let completion: OpenAiChatCompletion = serde_json::from_value(json!({
            "choices": [{"message": {"content": null, "refusal": "I can't help"}, "finish_reason": "stop"}]
        }))
        .unwrap();
        let response = ProviderResponse::OpenAi(completion);
        assert_eq!(response.refusal(), Some("I can't help"));
        assert_eq!(response.text(), "");
    }

    #[test]
    fn test_ollama_text() {
        let chat: OllamaChatResponse =
            serde_json::from_value(json!({"message": {"role": "assistant", "content": "[]"}, "done": true}))
                .unwrap();
        assert_eq!(ProviderResponse::Ollama(chat).text(), "[]");
    }
}
