//! On-demand stages, edits and finalization through the report store.

use std::sync::Arc;

use serde_json::json;
use wiremock::MockServer;

use perito_engine::{
    Conjetura, MotivationCategory, OllamaClient, Pipeline, PipelineError, ReportStore,
    StageExecutor, StageId, StoreError,
};

use crate::common::{CONJETURA, client_for, mount_all_stages, prompts_for};

async fn setup() -> (MockServer, Pipeline<OllamaClient>) {
    let server = MockServer::start().await;
    mount_all_stages(&server).await;
    let pipeline = Pipeline::new(
        StageExecutor::new(client_for(&server), 0.3),
        Arc::new(ReportStore::new()),
    );
    (server, pipeline)
}

#[tokio::test]
async fn repeated_fetch_is_served_from_cache() {
    let (server, pipeline) = setup().await;
    let id = pipeline.store().create(Conjetura::new(CONJETURA).unwrap());

    let first = pipeline.run_stage(id, StageId::Preceptivas).await.unwrap();
    let second = pipeline.run_stage(id, StageId::Preceptivas).await.unwrap();

    assert!(!first.cached);
    assert!(second.cached);
    assert_eq!(first.output, second.output);
    assert_eq!(prompts_for(&server, StageId::Preceptivas).await.len(), 1);
}

#[tokio::test]
async fn dependencies_gate_direct_requests() {
    let (server, pipeline) = setup().await;
    let id = pipeline.store().create(Conjetura::new(CONJETURA).unwrap());

    let err = pipeline.run_stage(id, StageId::Objetivos).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::DependencyUnsatisfied {
            stage: StageId::Objetivos,
            ref missing,
        } if missing.len() == 4
    ));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn review_flow_runs_edits_and_finalizes() {
    let (server, pipeline) = setup().await;
    let store = Arc::clone(pipeline.store());
    let id = store.create(Conjetura::new(CONJETURA).unwrap());

    let fetch = pipeline.run_through(id, StageId::QueEs).await.unwrap();
    assert!(fetch.succeeded);
    assert_eq!(server.received_requests().await.unwrap().len(), 6);

    store
        .edit_entry(
            id,
            "preceptivas",
            0,
            json!({ "titulo": "Missing ramp (verified)", "contenido": "Measured on site." }),
        )
        .await
        .unwrap();
    let err = store
        .edit_entry(
            id,
            "tecnicas",
            3,
            json!({ "titulo": "x", "contenido": "y" }),
        )
        .await
        .unwrap_err();
    assert_eq!(
        err,
        StoreError::IndexOutOfRange {
            category: "tecnicas",
            index: 3,
            len: 1
        }
    );

    let refetched = pipeline.run_stage(id, StageId::Preceptivas).await.unwrap();
    assert!(refetched.cached);
    assert_eq!(
        store.state(id).await.unwrap().motivations(MotivationCategory::Preceptivas)[0].titulo,
        "Missing ramp (verified)"
    );

    let document = store.finalize(id).await.unwrap();
    assert_eq!(
        document.analisis.por_que.preceptivas[0].titulo,
        "Missing ramp (verified)"
    );
    assert_eq!(document.state_version, store.state(id).await.unwrap().version());

    assert_eq!(
        pipeline.run_stage(id, StageId::Tecnicas).await.unwrap_err(),
        PipelineError::Store(StoreError::ReportFinalized(id))
    );
    assert_eq!(server.received_requests().await.unwrap().len(), 6);
}

#[tokio::test]
async fn reports_are_isolated() {
    let (_server, pipeline) = setup().await;
    let first = pipeline.store().create(Conjetura::new(CONJETURA).unwrap());
    let second = pipeline
        .store()
        .create(Conjetura::new("Building Y has a broken lift").unwrap());

    pipeline.run_stage(first, StageId::Preceptivas).await.unwrap();

    let other = pipeline.store().state(second).await.unwrap();
    assert!(other.preceptivas.is_empty());
    assert_eq!(other.version(), 0);
}
