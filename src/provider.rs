//! Completion providers.
//!
//! The session sees a provider only through [`CompletionProvider`]: one prompt
//! plus the earlier user messages in, one complete reply out.  [`OpenRouter`]
//! implements it against OpenRouter's chat-completions endpoint.

use std::env;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Response, header};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};
use crate::observability::{PROVIDER_DURATION, PROVIDER_ERRORS, PROVIDER_REQUESTS};
use crate::provider_logger::ProviderLogger;

const DEFAULT_API_URL: &str = "https://openrouter.ai/api/v1/";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "deepseek/deepseek-r1:free";

/// System prompt used when none is configured.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a bold, confident, no-nonsense financial expert who gives aggressive money advice. You push people to escape the 9-to-5, build wealth fast, and master high-income skills. No sugarcoating, only direct, action-driven advice.";

/// Reply substituted when the provider answers without any choice content.
pub const NO_CONTENT_REPLY: &str = "Sorry, I couldn't process that.";

/// Environment variable holding the OpenRouter API key.
pub const API_KEY_ENV: &str = "OPENROUTER_API_KEY";

/// Something that turns a prompt into a complete reply.
#[async_trait::async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Completes `prompt`.  `context` holds the earlier user messages, oldest
    /// first.
    async fn complete(&self, prompt: &str, context: &[String]) -> Result<String>;
}

#[async_trait::async_trait]
impl<P: CompletionProvider + ?Sized> CompletionProvider for Arc<P> {
    async fn complete(&self, prompt: &str, context: &[String]) -> Result<String> {
        (**self).complete(prompt, context).await
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, PartialEq, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl ChatResponse {
    fn into_reply(self) -> String {
        self.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .filter(|content| !content.is_empty())
            .unwrap_or_else(|| NO_CONTENT_REPLY.to_string())
    }
}

/// Client for OpenRouter's chat-completions API.
#[derive(Clone)]
pub struct OpenRouter {
    api_key: String,
    client: ReqwestClient,
    base_url: Url,
    model: String,
    system_prompt: Option<String>,
    site_url: Option<String>,
    site_name: Option<String>,
    logger: Option<Arc<dyn ProviderLogger>>,
}

impl OpenRouter {
    /// Create a new OpenRouter client.
    ///
    /// The API key can be provided directly or read from the
    /// `OPENROUTER_API_KEY` environment variable.
    pub fn new(api_key: Option<String>) -> Result<Self> {
        Self::with_options(api_key, None, None)
    }

    /// Create a new client with custom settings.
    pub fn with_options(
        api_key: Option<String>,
        base_url: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let api_key = match api_key {
            Some(key) => key,
            None => env::var(API_KEY_ENV).map_err(|_| {
                Error::authentication(format!(
                    "API key not provided and {API_KEY_ENV} environment variable not set"
                ))
            })?,
        };

        let mut base_url = base_url.unwrap_or_else(|| DEFAULT_API_URL.to_string());
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        let base_url = Url::parse(&base_url)?;

        let client = ReqwestClient::builder()
            .timeout(timeout.unwrap_or(DEFAULT_TIMEOUT))
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {}", e),
                    Some(Box::new(e)),
                )
            })?;

        Ok(Self {
            api_key,
            client,
            base_url,
            model: DEFAULT_MODEL.to_string(),
            system_prompt: Some(DEFAULT_SYSTEM_PROMPT.to_string()),
            site_url: None,
            site_name: None,
            logger: None,
        })
    }

    /// Sets the model to request.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets or clears the system prompt.
    pub fn with_system_prompt(mut self, prompt: Option<String>) -> Self {
        self.system_prompt = prompt;
        self
    }

    /// Sets the attribution headers OpenRouter shows on its rankings.
    pub fn with_site(mut self, site_url: Option<String>, site_name: Option<String>) -> Self {
        self.site_url = site_url;
        self.site_name = site_name;
        self
    }

    /// Attaches a logger that sees every request.
    pub fn with_logger(mut self, logger: Arc<dyn ProviderLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// The model requests are sent to.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Create and return default headers for API requests.
    fn default_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|_| Error::validation("API key is not a valid header value", None))?;
        headers.insert(header::AUTHORIZATION, bearer);
        if let Some(site_url) = &self.site_url {
            let value = HeaderValue::from_str(site_url).map_err(|_| {
                Error::validation("site URL is not a valid header value", None)
            })?;
            headers.insert("http-referer", value);
        }
        if let Some(site_name) = &self.site_name {
            let value = HeaderValue::from_str(site_name).map_err(|_| {
                Error::validation("site name is not a valid header value", None)
            })?;
            headers.insert("x-title", value);
        }
        Ok(headers)
    }

    fn build_messages<'a>(&'a self, prompt: &'a str, context: &'a [String]) -> Vec<ChatMessage<'a>> {
        let mut messages = Vec::with_capacity(context.len() + 2);
        if let Some(system) = &self.system_prompt {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        for earlier in context {
            messages.push(ChatMessage {
                role: "user",
                content: earlier,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });
        messages
    }

    /// Process API response errors and convert to our Error type
    async fn process_error_response(response: Response) -> Error {
        let status_code = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|val| val.to_str().ok())
            .and_then(|val| val.parse::<u64>().ok());
        match response.text().await {
            Ok(body) => error_for_status(status_code, &body, retry_after),
            Err(e) => Error::http_client(
                format!("Failed to read error response: {}", e),
                Some(Box::new(e)),
            ),
        }
    }

    /// Sends one chat-completion request and returns the first choice's text.
    pub async fn chat(&self, prompt: &str, context: &[String]) -> Result<String> {
        if let Some(logger) = &self.logger {
            logger.log_request(&self.model, prompt, context);
        }
        PROVIDER_REQUESTS.click();
        let started = Instant::now();
        let result = self.chat_inner(prompt, context).await;
        PROVIDER_DURATION.add(started.elapsed().as_secs_f64());
        match &result {
            Ok(reply) => {
                if let Some(logger) = &self.logger {
                    logger.log_reply(reply);
                }
            }
            Err(err) => {
                PROVIDER_ERRORS.click();
                if let Some(logger) = &self.logger {
                    logger.log_failure(err);
                }
            }
        }
        result
    }

    async fn chat_inner(&self, prompt: &str, context: &[String]) -> Result<String> {
        let url = self.base_url.join("chat/completions")?;
        let request = ChatRequest {
            model: &self.model,
            messages: self.build_messages(prompt, context),
        };

        let response = self
            .client
            .post(url)
            .headers(self.default_headers()?)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::timeout(format!("Request timed out: {}", e))
                } else if e.is_connect() {
                    Error::connection(format!("Connection error: {}", e), Some(Box::new(e)))
                } else {
                    Error::http_client(format!("Request failed: {}", e), Some(Box::new(e)))
                }
            })?;

        if !response.status().is_success() {
            return Err(Self::process_error_response(response).await);
        }

        let body: ChatResponse = response.json().await.map_err(|e| {
            Error::serialization(
                format!("Failed to parse response: {}", e),
                Some(Box::new(e)),
            )
        })?;
        Ok(body.into_reply())
    }
}

impl std::fmt::Debug for OpenRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenRouter")
            .field("base_url", &self.base_url.as_str())
            .field("model", &self.model)
            .field("site_url", &self.site_url)
            .field("site_name", &self.site_name)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl CompletionProvider for OpenRouter {
    async fn complete(&self, prompt: &str, context: &[String]) -> Result<String> {
        self.chat(prompt, context).await
    }
}

/// Maps a non-success status and its body onto the error taxonomy.
fn error_for_status(status_code: u16, body: &str, retry_after: Option<u64>) -> Error {
    #[derive(Deserialize)]
    struct ErrorResponse {
        error: Option<ErrorDetail>,
    }

    #[derive(Deserialize)]
    struct ErrorDetail {
        #[serde(rename = "type")]
        error_type: Option<String>,
        message: Option<String>,
    }

    let detail = serde_json::from_str::<ErrorResponse>(body)
        .ok()
        .and_then(|parsed| parsed.error);
    let error_type = detail.as_ref().and_then(|d| d.error_type.clone());
    let message = detail
        .and_then(|d| d.message)
        .unwrap_or_else(|| body.to_string());

    match status_code {
        400 => Error::bad_request(message),
        401 => Error::authentication(message),
        403 => Error::permission(message),
        404 => Error::not_found(message),
        408 => Error::timeout(message),
        429 => Error::rate_limit(message, retry_after),
        500 => Error::internal_server(message),
        502..=504 => Error::service_unavailable(message),
        _ => Error::api(status_code, error_type, message),
    }
}
