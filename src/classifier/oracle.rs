//! Remote classification providers
//!
//! Each provider turns a prompt into one HTTPS POST and pulls a single line of
//! text back out of the JSON reply. The HTTP call itself goes through
//! [`HttpTransport`] so the service worker can use `fetch` while tests script
//! the replies.

use crate::error::OracleError;
use crate::settings::{ClassifierConfig, Provider};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const GEMINI_DEFAULT_MODEL: &str = "gemini-pro";

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const OPENAI_DEFAULT_MODEL: &str = "gpt-3.5-turbo";

const GROK_API_URL: &str = "https://api.x.ai/v1/chat/completions";
const GROK_DEFAULT_MODEL: &str = "grok-beta";

const CHAT_TEMPERATURE: f32 = 0.3;

/// Status and body of an HTTP reply
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Outbound HTTPS
#[async_trait(?Send)]
pub trait HttpTransport {
    /// POST a JSON body. Non-2xx replies are returned, not treated as errors.
    async fn post_json(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: String,
    ) -> Result<HttpResponse, OracleError>;
}

/// A remote service that answers a prompt with free text
#[async_trait(?Send)]
pub trait ClassifierOracle {
    async fn submit(&self, prompt: &str, config: &ClassifierConfig) -> Result<String, OracleError>;
}

/// The oracle configured for `provider`
pub fn oracle_for<'a>(provider: Provider, transport: &'a dyn HttpTransport) -> Box<dyn ClassifierOracle + 'a> {
    match provider {
        Provider::Gemini => Box::new(GeminiOracle { transport }),
        Provider::OpenAi => Box::new(ChatCompletionsOracle {
            endpoint: OPENAI_API_URL,
            default_model: OPENAI_DEFAULT_MODEL,
            transport,
        }),
        Provider::Grok => Box::new(ChatCompletionsOracle {
            endpoint: GROK_API_URL,
            default_model: GROK_DEFAULT_MODEL,
            transport,
        }),
    }
}

fn model_or<'c>(config: &'c ClassifierConfig, default_model: &'c str) -> &'c str {
    match config.model.trim() {
        "" => default_model,
        model => model,
    }
}

async fn post<T: Serialize>(
    transport: &dyn HttpTransport,
    url: &str,
    headers: &[(String, String)],
    body: &T,
) -> Result<String, OracleError> {
    let body = serde_json::to_string(body).map_err(|e| OracleError::Malformed(e.to_string()))?;
    let response = transport.post_json(url, headers, body).await?;
    if !response.is_success() {
        return Err(OracleError::Status(response.status));
    }
    Ok(response.body)
}

// Gemini generateContent

#[derive(Debug, Serialize)]
struct GeminiRequest<'p> {
    contents: Vec<GeminiContent<'p>>,
}

#[derive(Debug, Serialize)]
struct GeminiContent<'p> {
    parts: Vec<GeminiPart<'p>>,
}

#[derive(Debug, Serialize)]
struct GeminiPart<'p> {
    text: &'p str,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiReplyContent,
}

#[derive(Debug, Deserialize)]
struct GeminiReplyContent {
    #[serde(default)]
    parts: Vec<GeminiReplyPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiReplyPart {
    text: Option<String>,
}

pub struct GeminiOracle<'a> {
    transport: &'a dyn HttpTransport,
}

#[async_trait(?Send)]
impl<'a> ClassifierOracle for GeminiOracle<'a> {
    async fn submit(&self, prompt: &str, config: &ClassifierConfig) -> Result<String, OracleError> {
        let model = model_or(config, GEMINI_DEFAULT_MODEL);
        let url = Url::parse_with_params(
            &format!("{}/{}:generateContent", GEMINI_BASE_URL, model),
            &[("key", config.api_key.as_str())],
        )
        .map_err(|e| OracleError::Network(format!("Invalid endpoint: {}", e)))?;

        let request = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart { text: prompt }],
            }],
        };
        let headers = [("Content-Type".to_string(), "application/json".to_string())];
        let body = post(self.transport, url.as_str(), &headers, &request).await?;

        let response: GeminiResponse =
            serde_json::from_str(&body).map_err(|e| OracleError::Malformed(e.to_string()))?;
        response
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content.parts.into_iter().next())
            .and_then(|part| part.text)
            .ok_or_else(|| OracleError::Malformed("no candidate text".to_string()))
    }
}

// OpenAI-compatible chat completions (OpenAI, Grok)

#[derive(Debug, Serialize)]
struct ChatRequest<'p> {
    model: &'p str,
    messages: Vec<ChatMessage<'p>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'p> {
    role: &'p str,
    content: &'p str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ChatReplyMessage {
    content: Option<String>,
}

pub struct ChatCompletionsOracle<'a> {
    endpoint: &'static str,
    default_model: &'static str,
    transport: &'a dyn HttpTransport,
}

#[async_trait(?Send)]
impl<'a> ClassifierOracle for ChatCompletionsOracle<'a> {
    async fn submit(&self, prompt: &str, config: &ClassifierConfig) -> Result<String, OracleError> {
        let request = ChatRequest {
            model: model_or(config, self.default_model),
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: CHAT_TEMPERATURE,
        };
        let headers = [
            ("Content-Type".to_string(), "application/json".to_string()),
            ("Authorization".to_string(), format!("Bearer {}", config.api_key)),
        ];
        let body = post(self.transport, self.endpoint, &headers, &request).await?;

        let response: ChatResponse =
            serde_json::from_str(&body).map_err(|e| OracleError::Malformed(e.to_string()))?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| OracleError::Malformed("no choice content".to_string()))
    }
}
