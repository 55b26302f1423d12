//! Eager pipeline against a mock Ollama endpoint.

use std::sync::Arc;
use std::time::Duration;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer};

use perito_engine::prompt::serialize_output;
use perito_engine::{
    Conjetura, InferenceError, Motivation, MotivationCategory, OllamaClient, Pipeline,
    ReportId, ReportStore, StageError, StageExecutor, StageId, StageOutput, assemble,
};
use perito_types::InferenceSettings;

use crate::common::{
    CONJETURA, StagePrompt, chat_reply, client_for, motivation, mount_all_stages, mount_stage,
    mount_stage_status, preceptivas_reply, prompts_for,
};

fn pipeline(client: OllamaClient) -> Pipeline<OllamaClient> {
    Pipeline::new(
        StageExecutor::new(client, 0.3),
        Arc::new(ReportStore::new()),
    )
}

fn conjetura() -> Conjetura {
    Conjetura::new(CONJETURA).unwrap()
}

#[tokio::test]
async fn access_ramp_analysis_end_to_end() {
    let server = MockServer::start().await;
    mount_all_stages(&server).await;

    let run = pipeline(client_for(&server))
        .run_all(&conjetura())
        .await
        .unwrap();

    assert!(run.is_complete(), "degraded: {:?}", run.degraded);
    assert_eq!(
        run.state.preceptivas,
        vec![Motivation::new(
            "Missing ramp",
            "The entrance has no step-free route."
        )]
    );
    assert_eq!(run.state.tecnicas[0].titulo, "Accessibility code");
    assert_eq!(run.state.progresistas[0].titulo, "Precedent");
    assert_eq!(run.state.objetivos[0].tipo, MotivationCategory::Preceptivas);
    assert_eq!(
        run.state.que_es.as_ref().map(|d| d.contexto.as_str()),
        Some("Public building")
    );

    let serialized = serialize_output(&StageOutput::Motivations(run.state.preceptivas.clone()))
        .unwrap();
    let tecnicas_prompts = prompts_for(&server, StageId::Tecnicas).await;
    assert_eq!(tecnicas_prompts.len(), 1);
    assert!(tecnicas_prompts[0].contains(&serialized));
    assert!(tecnicas_prompts[0].contains(CONJETURA));

    let que_es_prompt = &prompts_for(&server, StageId::QueEs).await[0];
    assert!(que_es_prompt.contains("Restore access"));
    assert!(que_es_prompt.contains("Precedent"));
}

#[tokio::test]
async fn assembled_document_groups_findings() {
    let server = MockServer::start().await;
    mount_all_stages(&server).await;

    let run = pipeline(client_for(&server))
        .run_all(&conjetura())
        .await
        .unwrap();
    let document = assemble(ReportId::new(), CONJETURA, &run.state);
    let value = serde_json::to_value(&document).unwrap();

    assert!(document.numero_expediente.starts_with("EXP-"));
    assert_eq!(document.numero_expediente.len(), "EXP-20260101-ABCDEF".len());
    assert_eq!(value["conjetura"], CONJETURA);
    assert_eq!(
        value["analisis"]["por_que"]["preceptivas"][0]["titulo"],
        "Missing ramp"
    );
    assert_eq!(value["analisis"]["para_que"][0]["tipo"], "preceptivas");
    assert_eq!(
        value["analisis"]["que_es"]["contenido"],
        "Lack of step-free access"
    );
    assert!(value.get("degraded").is_none());
}

#[tokio::test]
async fn failing_stage_degrades_and_downstream_sees_empty_result() {
    let server = MockServer::start().await;
    mount_stage(&server, StageId::Preceptivas, &preceptivas_reply()).await;
    mount_stage_status(&server, StageId::Tecnicas, 500).await;
    mount_stage(&server, StageId::Facultativas, "No tengo nada que añadir.").await;

    let run = pipeline(client_for(&server))
        .run_all(&conjetura())
        .await
        .unwrap();

    assert_eq!(run.state.preceptivas.len(), 1);
    assert!(run.degraded.contains(&StageId::Tecnicas));
    assert!(run.degraded.contains(&StageId::Facultativas));
    assert!(!run.degraded.contains(&StageId::Preceptivas));

    let (stage, failure) = &run.failures[0];
    assert_eq!(*stage, StageId::Tecnicas);
    assert!(
        matches!(failure, StageError::Inference(InferenceError::Unavailable(msg)) if msg.contains("500")),
        "unexpected failure: {failure:?}"
    );
    assert!(matches!(run.failures[1], (StageId::Facultativas, StageError::Extraction(_))));

    let facultativas_prompt = &prompts_for(&server, StageId::Facultativas).await[0];
    assert!(facultativas_prompt.contains("Missing ramp"));
    assert!(facultativas_prompt.contains("[]"));
}

#[tokio::test]
async fn slow_endpoint_times_out_and_pipeline_continues() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(StagePrompt(StageId::Preceptivas))
        .respond_with(chat_reply(&preceptivas_reply()).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;
    mount_stage(
        &server,
        StageId::Tecnicas,
        &motivation("tecnicas", "Code", "Ramps required."),
    )
    .await;

    let settings =
        InferenceSettings::new("llama3.1", server.uri(), 0.3, Duration::from_millis(200), 0)
            .unwrap();
    let run = pipeline(OllamaClient::new(&settings).unwrap())
        .run_all(&conjetura())
        .await
        .unwrap();

    assert!(matches!(
        run.failures[0],
        (StageId::Preceptivas, StageError::Inference(InferenceError::Timeout(_)))
    ));
    assert!(run.state.preceptivas.is_empty());
    assert_eq!(run.state.tecnicas[0].titulo, "Code");
}
