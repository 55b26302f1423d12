//! Shared test utilities and fixtures
//!
//! A wiremock server standing in for Ollama's `/api/chat`, routed by stage.

#![allow(dead_code)]

use std::time::Duration;

use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

use perito_engine::prompt::template;
use perito_engine::{OllamaClient, StageId};
use perito_types::InferenceSettings;

pub const CONJETURA: &str = "Building X lacks an access ramp";

/// Matches chat requests whose user prompt was rendered from `stage`'s template.
pub struct StagePrompt(pub StageId);

impl Match for StagePrompt {
    fn matches(&self, request: &Request) -> bool {
        prompt_of(request).is_some_and(|prompt| prompt.starts_with(heading(self.0)))
    }
}

fn heading(stage: StageId) -> &'static str {
    template(stage).lines().next().unwrap_or_default()
}

/// The user prompt carried by a chat request.
pub fn prompt_of(request: &Request) -> Option<String> {
    let body: Value = serde_json::from_slice(&request.body).ok()?;
    body["messages"][1]["content"].as_str().map(str::to_string)
}

/// An Ollama non-streaming chat reply carrying `content`.
pub fn chat_reply(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "model": "llama3.1",
        "message": { "role": "assistant", "content": content },
        "done": true
    }))
}

pub async fn mount_stage(server: &MockServer, stage: StageId, content: &str) {
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(StagePrompt(stage))
        .respond_with(chat_reply(content))
        .mount(server)
        .await;
}

pub async fn mount_stage_status(server: &MockServer, stage: StageId, status: u16) {
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(StagePrompt(stage))
        .respond_with(ResponseTemplate::new(status).set_body_string("model not loaded"))
        .mount(server)
        .await;
}

/// Mount a plausible reply for every stage.
pub async fn mount_all_stages(server: &MockServer) {
    mount_stage(server, StageId::Preceptivas, &preceptivas_reply()).await;
    mount_stage(
        server,
        StageId::Tecnicas,
        &format!(
            "Estas son las motivaciones:\n```json\n{}\n```",
            motivation("tecnicas", "Accessibility code", "Ramps are mandatory.")
        ),
    )
    .await;
    mount_stage(
        server,
        StageId::Facultativas,
        &motivation("facultativas", "Expert interest", "Documenting the case."),
    )
    .await;
    mount_stage(
        server,
        StageId::Progresistas,
        &format!(
            "Claro. {} Espero que sirva.",
            motivation("progresistas", "Precedent", "Sets a baseline for audits.")
        ),
    )
    .await;
    mount_stage(
        server,
        StageId::Objetivos,
        &json!({
            "para_que": [
                { "titulo": "Restore access", "tipo": "Preceptiva", "contenido": "Comply with the law." }
            ]
        })
        .to_string(),
    )
    .await;
    mount_stage(
        server,
        StageId::QueEs,
        &json!({
            "que_es": { "contenido": "Lack of step-free access", "contexto": "Public building" }
        })
        .to_string(),
    )
    .await;
}

pub fn motivation(key: &str, titulo: &str, contenido: &str) -> String {
    json!({ key: [{ "titulo": titulo, "contenido": contenido }] }).to_string()
}

pub fn preceptivas_reply() -> String {
    motivation(
        "preceptivas",
        "Missing ramp",
        "The entrance has no step-free route.",
    )
}

pub fn settings_for(server: &MockServer) -> InferenceSettings {
    InferenceSettings::new("llama3.1", server.uri(), 0.3, Duration::from_secs(5), 0)
        .expect("valid settings")
}

pub fn client_for(server: &MockServer) -> OllamaClient {
    OllamaClient::new(&settings_for(server)).expect("valid endpoint")
}

/// User prompts of every request that reached `stage`, in arrival order.
pub async fn prompts_for(server: &MockServer, stage: StageId) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter_map(prompt_of)
        .filter(|prompt| prompt.starts_with(heading(stage)))
        .collect()
}
