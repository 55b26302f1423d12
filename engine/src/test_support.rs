//! Scripted inference client for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use perito_providers::{InferFut, InferenceClient, InferenceError, InferenceRequest};

/// Replays canned replies in order and records every request.
#[derive(Debug, Default)]
pub(crate) struct ScriptedClient {
    replies: Mutex<VecDeque<Result<String, InferenceError>>>,
    requests: Mutex<Vec<InferenceRequest>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl ScriptedClient {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn reply(self, text: impl Into<String>) -> Self {
        self.replies.lock().unwrap().push_back(Ok(text.into()));
        self
    }

    pub(crate) fn fail(self, error: InferenceError) -> Self {
        self.replies.lock().unwrap().push_back(Err(error));
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.prompt.clone())
            .collect()
    }

    pub(crate) fn requests(&self) -> Vec<InferenceRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl InferenceClient for ScriptedClient {
    fn infer<'a>(&'a self, request: &'a InferenceRequest) -> InferFut<'a> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(InferenceError::Unavailable("script exhausted".into())))
        })
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

/// A well-formed reply for `key` holding one motivation titled `titulo`.
pub(crate) fn motivation_reply(key: &str, titulo: &str) -> String {
    serde_json::json!({ key: [{ "titulo": titulo, "contenido": format!("{titulo}: detalle") }] })
        .to_string()
}

pub(crate) fn objectives_reply() -> String {
    serde_json::json!({
        "para_que": [
            { "titulo": "Garantizar acceso", "tipo": "Técnicas", "contenido": "Cumplir la norma." },
            { "titulo": "Documentar", "tipo": "preceptivas", "contenido": "Dejar constancia." }
        ]
    })
    .to_string()
}

pub(crate) fn definition_reply() -> String {
    serde_json::json!({
        "que_es": { "contenido": "Falta de accesibilidad", "contexto": "Edificio de viviendas" }
    })
    .to_string()
}

/// Scripted replies for all six stages, in order.
pub(crate) fn full_script() -> ScriptedClient {
    ScriptedClient::new()
        .reply(motivation_reply("preceptivas", "Rampa ausente"))
        .reply(format!(
            "Aquí está:\n```json\n{}\n```",
            motivation_reply("tecnicas", "Código técnico")
        ))
        .reply(motivation_reply("facultativas", "Interés del perito"))
        .reply(format!(
            "Resultado: {} Fin.",
            motivation_reply("progresistas", "Nuevo precedente")
        ))
        .reply(objectives_reply())
        .reply(definition_reply())
}
