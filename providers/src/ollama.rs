//! Ollama `/api/chat` client.
//!
//! Non-streaming: one request, one JSON reply whose `message.content` holds
//! the model's text.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use perito_types::InferenceSettings;

use crate::retry::{RetryConfig, RetryOutcome, send_with_retry};
use crate::{
    InferFut, InferenceClient, InferenceError, InferenceRequest, http_client_with_timeout,
    read_capped_error_body,
};

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: Option<ReplyMessage>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: reqwest::Client,
    chat_url: Url,
    model: String,
    timeout: Duration,
    retry: RetryConfig,
}

impl OllamaClient {
    pub fn new(settings: &InferenceSettings) -> Result<Self, InferenceError> {
        let chat_url = chat_url(settings.base_url())?;
        let http = http_client_with_timeout(settings.timeout())
            .map_err(|e| InferenceError::InvalidEndpoint(format!("HTTP client: {e}")))?;

        Ok(Self {
            http,
            chat_url,
            model: settings.model().to_string(),
            timeout: settings.timeout(),
            retry: RetryConfig::with_max_retries(settings.max_retries()),
        })
    }

    #[must_use]
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn chat_url(&self) -> &Url {
        &self.chat_url
    }

    async fn chat(
        &self,
        request: &InferenceRequest,
        deadline: Duration,
    ) -> Result<String, InferenceError> {
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            stream: false,
            options: ChatOptions {
                temperature: request.temperature,
            },
        };

        let outcome = send_with_retry(
            || {
                self.http
                    .post(self.chat_url.clone())
                    .timeout(deadline)
                    .json(&body)
            },
            &self.retry,
        )
        .await;

        let response = match outcome {
            RetryOutcome::Success(response) => response,
            RetryOutcome::HttpError(response) => {
                let status = response.status();
                let detail = read_capped_error_body(response).await;
                return Err(InferenceError::Unavailable(format!("HTTP {status}: {detail}")));
            }
            RetryOutcome::ConnectionError { attempts, source } => {
                return Err(transport_error(&source, deadline, Some(attempts)));
            }
            RetryOutcome::NonRetryable(source) => {
                return Err(transport_error(&source, deadline, None));
            }
        };

        let reply: ChatResponse = response
            .json()
            .await
            .map_err(|e| transport_error(&e, deadline, None))?;

        match (reply.message, reply.error) {
            (Some(message), _) => Ok(message.content),
            (None, Some(error)) => Err(InferenceError::Unavailable(error)),
            (None, None) => Err(InferenceError::Unavailable(
                "reply carried no assistant message".to_string(),
            )),
        }
    }
}

impl InferenceClient for OllamaClient {
    fn infer<'a>(&'a self, request: &'a InferenceRequest) -> InferFut<'a> {
        Box::pin(async move {
            let deadline = request.deadline.unwrap_or(self.timeout);
            tracing::debug!(
                model = %self.model,
                prompt_chars = request.prompt.chars().count(),
                deadline_ms = deadline.as_millis(),
                "Sending inference request"
            );

            match tokio::time::timeout(deadline, self.chat(request, deadline)).await {
                Ok(result) => result,
                Err(_) => Err(InferenceError::Timeout(deadline)),
            }
        })
    }

    fn model(&self) -> &str {
        &self.model
    }
}

fn chat_url(base_url: &str) -> Result<Url, InferenceError> {
    let url = Url::parse(&format!("{}/api/chat", base_url.trim_end_matches('/')))
        .map_err(|e| InferenceError::InvalidEndpoint(format!("{base_url}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(InferenceError::InvalidEndpoint(format!(
            "{base_url}: scheme must be http or https"
        )));
    }
    Ok(url)
}

fn transport_error(
    source: &reqwest::Error,
    deadline: Duration,
    attempts: Option<u32>,
) -> InferenceError {
    if source.is_timeout() {
        return InferenceError::Timeout(deadline);
    }
    if source.is_decode() {
        return InferenceError::Unavailable(format!("malformed reply body: {source}"));
    }
    match attempts {
        Some(n) => {
            InferenceError::Unavailable(format!("request failed after {n} attempts: {source}"))
        }
        None => InferenceError::Unavailable(format!("request failed: {source}")),
    }
}
