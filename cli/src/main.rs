//! Perito CLI - binary entry point.
//!
//! ```text
//! main() -> config -> OllamaClient -> Pipeline
//!                                       |
//!            analyze: run_all -> assemble -> stdout (JSON)
//!            review:  run_through per stage -> edits -> finalize -> stdout (JSON)
//! ```
//!
//! Logs go to a file so stdout only ever carries the result document.

mod args;

use std::{
    fs::{self, File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use anyhow::{Context, Result, bail};
use clap::Parser;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use perito_config::{PeritoConfig, ResolvedConfig};
use perito_engine::{
    Conjetura, METHOD_PHASES, MotivationCategory, OllamaClient, Pipeline, ReportId, ReportStore,
    StageExecutor, StageId, assemble, cancellable,
};

use args::{Cli, Command, Input, pipeline_order};

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::try_new("warn").expect("warn filter is valid"));

    let (log_file, init_warnings) = open_log_file();

    // Stdout is reserved for the result document, so the fallback is stderr.
    let (log_path, writer) = match log_file {
        Some((path, file)) => (Some(path), BoxMakeWriter::new(Mutex::new(file))),
        None => (None, BoxMakeWriter::new(io::stderr)),
    };
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_ansi(log_path.is_none())
                .with_writer(writer),
        )
        .with(env_filter)
        .init();

    if let Some(path) = log_path {
        tracing::info!(path = %path.display(), "Logging initialized");
    }
    for warning in init_warnings {
        tracing::warn!("{warning}");
    }
}

fn open_log_file() -> (Option<(PathBuf, File)>, Vec<String>) {
    let mut warnings = Vec::new();

    for candidate in log_file_candidates() {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!(
                "Failed to create log dir {}: {e}",
                parent.display()
            ));
            continue;
        }

        match OpenOptions::new()
            .create(true)
            .append(true)
            .open(&candidate)
        {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => {
                warnings.push(format!(
                    "Failed to open log file {}: {e}",
                    candidate.display()
                ));
            }
        }
    }

    (None, warnings)
}

fn log_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    // Primary: ~/.perito/logs/perito.log
    if let Some(config_path) = PeritoConfig::path()
        && let Some(config_dir) = config_path.parent()
    {
        candidates.push(config_dir.join("logs").join("perito.log"));
    }

    candidates.push(PathBuf::from(".perito").join("logs").join("perito.log"));

    candidates
}

fn load_config() -> Result<ResolvedConfig> {
    let config = PeritoConfig::load()
        .context("failed to load configuration")?
        .unwrap_or_default();
    config.resolve().context("invalid configuration")
}

fn build_pipeline(config: &ResolvedConfig) -> Result<Pipeline<OllamaClient>> {
    let client = OllamaClient::new(&config.inference).context("cannot build inference client")?;
    tracing::info!(
        model = config.inference.model(),
        base_url = config.inference.base_url(),
        "Inference client ready"
    );
    let executor = StageExecutor::new(client, config.inference.temperature());
    Ok(Pipeline::new(executor, Arc::new(ReportStore::new()))
        .with_require_upstream(config.require_upstream))
}

fn read_conjetura(input: Input) -> Result<Conjetura> {
    let text = match input {
        Input::Text(text) => text,
        Input::Stdin => io::read_to_string(io::stdin()).context("failed to read stdin")?,
    };
    Ok(Conjetura::new(text)?)
}

fn print_json(value: &impl Serialize) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value)?;
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{rendered}")?;
    Ok(())
}

async fn analyze(pipeline: &Pipeline<OllamaClient>, conjetura: Conjetura) -> Result<()> {
    let (run, abort) = cancellable(pipeline.run_all(&conjetura));
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            abort.abort();
        }
    });

    let Some(run) = run.await else {
        bail!("analysis interrupted");
    };
    let run = run?;
    for (stage, failure) in &run.failures {
        eprintln!("aviso: {stage} sin resultado ({failure})");
    }

    // Eager runs never touch the store; the id only seeds the expediente number.
    let document = assemble(ReportId::new(), conjetura.as_str(), &run.state);
    print_json(&document)
}

/// One correction from an `--edits` file.
#[derive(Debug, Deserialize)]
struct Edit {
    category: String,
    index: usize,
    value: Value,
}

fn read_edits(path: &Path) -> Result<Vec<Edit>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read edits from {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid edits file {}", path.display()))
}

async fn review(
    pipeline: &Pipeline<OllamaClient>,
    conjetura: Conjetura,
    stages: Vec<StageId>,
    edits: Option<PathBuf>,
) -> Result<()> {
    let edits = edits.as_deref().map(read_edits).transpose()?;
    let store = pipeline.store();
    let id = store.create(conjetura);

    let stages = if stages.is_empty() {
        StageId::ALL.to_vec()
    } else {
        stages
    };
    for stage in stages {
        let fetch = pipeline.run_through(id, stage).await?;
        let origin = if fetch.cached { "cache" } else { "modelo" };
        match &fetch.failure {
            None => eprintln!("{stage}: {} entradas ({origin})", fetch.output.len()),
            Some(failure) => eprintln!("aviso: {stage} sin resultado ({failure})"),
        }
    }

    for edit in edits.unwrap_or_default() {
        store
            .edit_entry(id, &edit.category, edit.index, edit.value)
            .await
            .with_context(|| format!("cannot apply edit to {}[{}]", edit.category, edit.index))?;
    }

    let document = store.finalize(id).await?;
    print_json(&document)
}

fn print_method() {
    for phase in METHOD_PHASES {
        println!("{}  {}", phase.pregunta, phase.descripcion);
        for stage in phase.stages {
            match stage.category() {
                Some(category) => println!("  - {}", describe(category)),
                None => println!("  - {stage}"),
            }
        }
    }
}

fn describe(category: MotivationCategory) -> String {
    format!("{}: {}", category.display_name(), category.description())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Method => {
            print_method();
            Ok(())
        }
        Command::Analyze { conjetura } => {
            init_tracing();
            let conjetura = read_conjetura(Input::from_words(conjetura))?;
            let pipeline = build_pipeline(&load_config()?)?;
            analyze(&pipeline, conjetura).await
        }
        Command::Review {
            conjetura,
            stages,
            edits,
        } => {
            init_tracing();
            let conjetura = read_conjetura(Input::from_words(conjetura))?;
            let pipeline = build_pipeline(&load_config()?)?;
            review(&pipeline, conjetura, pipeline_order(stages), edits).await
        }
    }
}
