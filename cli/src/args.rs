//! Command-line interface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use perito_engine::StageId;

#[derive(Debug, Parser)]
#[command(name = "perito", version)]
#[command(about = "Análisis pericial con el Método Formal Causal sobre un modelo local")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Run every stage at once and print the assembled document
    Analyze {
        /// Problem statement, unquoted words allowed; '-' reads stdin
        #[arg(required = true, num_args = 1..)]
        conjetura: Vec<String>,
    },
    /// Run stages one by one against a stored report, apply edits, finalize
    Review {
        /// Problem statement, unquoted words allowed; '-' reads stdin
        #[arg(required = true, num_args = 1..)]
        conjetura: Vec<String>,
        /// Stage to run, with any missing upstream stages (repeatable)
        #[arg(long = "stage", value_name = "ETAPA", value_parser = StageId::parse)]
        stages: Vec<StageId>,
        /// JSON array of {category, index, value} corrections
        #[arg(long, value_name = "ARCHIVO")]
        edits: Option<PathBuf>,
    },
    /// Print the method's questions and categories
    Method,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Stdin,
    Text(String),
}

impl Input {
    pub fn from_words(words: Vec<String>) -> Self {
        match words.as_slice() {
            [dash] if dash == "-" => Self::Stdin,
            _ => Self::Text(words.join(" ")),
        }
    }
}

/// Requested stages deduplicated, in pipeline order.
pub fn pipeline_order(mut stages: Vec<StageId>) -> Vec<StageId> {
    stages.sort();
    stages.dedup();
    stages
}
