//! Inference clients for Perito.
//!
//! The pipeline talks to a model through [`InferenceClient`]: one system
//! instruction and one user prompt in, raw reply text out. [`OllamaClient`]
//! is the production implementation; tests substitute scripted doubles.

#![allow(clippy::missing_errors_doc)]

mod ollama;
pub mod retry;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

pub use ollama::OllamaClient;
pub use perito_types::InferenceSettings;

const CONNECT_TIMEOUT_SECS: u64 = 10;
const TCP_KEEPALIVE_SECS: u64 = 60;
const POOL_IDLE_TIMEOUT_SECS: u64 = 90;
const POOL_MAX_IDLE_PER_HOST: usize = 4;
const MAX_ERROR_BODY_BYTES: usize = 32 * 1024;

/// Future returned by [`InferenceClient::infer`].
pub type InferFut<'a> = Pin<Box<dyn Future<Output = Result<String, InferenceError>> + Send + 'a>>;

/// One request to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceRequest {
    pub system: String,
    pub prompt: String,
    pub temperature: f32,
    /// Overrides the client's configured timeout for this call.
    pub deadline: Option<Duration>,
}

impl InferenceRequest {
    pub fn new(system: impl Into<String>, prompt: impl Into<String>, temperature: f32) -> Self {
        Self {
            system: system.into(),
            prompt: prompt.into(),
            temperature,
            deadline: None,
        }
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InferenceError {
    /// Endpoint unreachable, non-2xx status, or a body that is not a chat reply.
    #[error("inference endpoint unavailable: {0}")]
    Unavailable(String),
    #[error("inference timed out after {0:?}")]
    Timeout(Duration),
    #[error("invalid inference endpoint: {0}")]
    InvalidEndpoint(String),
}

/// A text-in, text-out model endpoint.
///
/// Implementations hold no per-call state and may be shared across tasks.
pub trait InferenceClient: Send + Sync {
    fn infer<'a>(&'a self, request: &'a InferenceRequest) -> InferFut<'a>;

    /// Model identifier, for logging.
    fn model(&self) -> &str;
}

impl<T: InferenceClient + ?Sized> InferenceClient for Arc<T> {
    fn infer<'a>(&'a self, request: &'a InferenceRequest) -> InferFut<'a> {
        (**self).infer(request)
    }

    fn model(&self) -> &str {
        (**self).model()
    }
}

/// Builder with pooling and keepalive tuned for a long-lived local endpoint.
///
/// Plain HTTP is allowed: the default endpoint is a loopback Ollama server.
fn base_client_builder() -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .redirect(reqwest::redirect::Policy::none())
        .tcp_keepalive(Some(Duration::from_secs(TCP_KEEPALIVE_SECS)))
        .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
        .pool_idle_timeout(Some(Duration::from_secs(POOL_IDLE_TIMEOUT_SECS)))
        .user_agent(concat!("perito/", env!("CARGO_PKG_VERSION")))
}

pub fn http_client_with_timeout(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    base_client_builder().timeout(timeout).build()
}

/// Read an error body, stopping after [`MAX_ERROR_BODY_BYTES`].
pub async fn read_capped_error_body(response: reqwest::Response) -> String {
    use futures_util::StreamExt;
    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let Ok(chunk) = chunk else { break };
        body.extend_from_slice(&chunk);
        if body.len() > MAX_ERROR_BODY_BYTES {
            body.truncate(MAX_ERROR_BODY_BYTES);
            let text = String::from_utf8_lossy(&body);
            return format!("{text}...(truncated)");
        }
    }
    String::from_utf8_lossy(&body).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn request_builder_sets_deadline() {
        let req = InferenceRequest::new("sys", "user", 0.3).with_deadline(Duration::from_secs(3));
        assert_eq!(req.deadline, Some(Duration::from_secs(3)));
        assert_eq!(req.system, "sys");
    }

    #[tokio::test]
    async fn read_capped_error_body_truncates_large_bodies() {
        let server = MockServer::start().await;
        let big = "x".repeat(MAX_ERROR_BODY_BYTES + 100);
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string(big))
            .mount(&server)
            .await;

        let response = reqwest::get(server.uri()).await.unwrap();
        let body = read_capped_error_body(response).await;
        assert!(body.ends_with("...(truncated)"));
        assert!(body.len() <= MAX_ERROR_BODY_BYTES + "...(truncated)".len());
    }
}
