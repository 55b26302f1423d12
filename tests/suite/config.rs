//! Configuration file driving a real pipeline.

use std::fs;
use std::sync::Arc;

use tempfile::TempDir;
use wiremock::MockServer;

use perito_config::PeritoConfig;
use perito_engine::{Conjetura, OllamaClient, Pipeline, ReportStore, StageExecutor, StageId};

use crate::common::{CONJETURA, motivation, mount_stage, prompts_for};

#[tokio::test]
async fn config_file_points_pipeline_at_endpoint() {
    let server = MockServer::start().await;
    mount_stage(
        &server,
        StageId::Tecnicas,
        &motivation("tecnicas", "Code", "Ramps required."),
    )
    .await;

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    let toml = format!(
        r#"
[inference]
model = "qwen2.5"
base_url = "{}"
temperature = 0.1
max_retries = 0

[pipeline]
require_upstream = false
"#,
        server.uri()
    );
    fs::write(&path, toml).unwrap();

    let resolved = PeritoConfig::load_from(&path)
        .unwrap()
        .unwrap()
        .resolve_with(|_| None)
        .unwrap();
    assert!(!resolved.require_upstream);

    let client = OllamaClient::new(&resolved.inference).unwrap();
    let pipeline = Pipeline::new(
        StageExecutor::new(client, resolved.inference.temperature()),
        Arc::new(ReportStore::new()),
    )
    .with_require_upstream(resolved.require_upstream);

    let id = pipeline.store().create(Conjetura::new(CONJETURA).unwrap());
    let fetch = pipeline.run_stage(id, StageId::Tecnicas).await.unwrap();
    assert!(fetch.succeeded);

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["model"], "qwen2.5");
    assert!((body["options"]["temperature"].as_f64().unwrap() - 0.1).abs() < 1e-6);
    assert!(prompts_for(&server, StageId::Tecnicas).await[0].contains("[]"));
}

#[test]
fn environment_overrides_file_values() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(
        &path,
        "[inference]\nmodel = \"${PERITO_TEST_MODEL}\"\nbase_url = \"http://127.0.0.1:11434\"\n",
    )
    .unwrap();
    let config = PeritoConfig::load_from(&path).unwrap().unwrap();

    let expanded = config
        .resolve_with(|name| (name == "PERITO_TEST_MODEL").then(|| "mistral".to_string()))
        .unwrap();
    assert_eq!(expanded.inference.model(), "mistral");

    let overridden = config
        .resolve_with(|name| match name {
            "PERITO_MODEL" => Some("qwen2.5".to_string()),
            "PERITO_BASE_URL" => Some("http://10.0.0.5:11434".to_string()),
            _ => None,
        })
        .unwrap();
    assert_eq!(overridden.inference.model(), "qwen2.5");
    assert_eq!(overridden.inference.base_url(), "http://10.0.0.5:11434");
}

#[test]
fn missing_config_file_is_not_an_error() {
    let dir = TempDir::new().unwrap();
    assert!(
        PeritoConfig::load_from(&dir.path().join("absent.toml"))
            .unwrap()
            .is_none()
    );
}
