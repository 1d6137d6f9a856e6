//! devflow CLI entry point.
//!
//! This binary is the composition root for the entire system. Responsibilities:
//!
//! 1. **Parse configuration**: load `.devflow/config.toml` (or `--config`),
//!    apply environment overrides and validate the result.
//! 2. **Wire observability**: install the `tracing-subscriber` stack from
//!    [`telemetry`]. All spans and events emitted by every crate in the
//!    workspace flow through it.
//! 3. **Construct infrastructure**: create the [`llm::OpenAiGenerator`] and
//!    inject it into a [`nodes::Engine`].
//! 4. **Run**: execute one pipeline run for the requirement, print per-stage
//!    progress and the final report, and optionally save the report.
//!
//! Ctrl-C cancels the run at the next stage boundary; the partial state is
//! still reported.

mod config;
mod report;
mod telemetry;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use llm::OpenAiGenerator;
use nodes::Engine;
use pipeline::{PipelineState, RoutingTable};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::AppConfig;
use crate::report::{Progress, Report};

#[derive(Debug, Parser)]
#[command(name = "devflow", version, about = "Turn a short requirement into a reviewed, documented and packaged artifact")]
struct Cli {
    /// Configuration file (defaults to .devflow/config.toml when present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the pipeline once for a requirement.
    Run(RunArgs),
    /// Print the routing table.
    Routes,
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Requirement text. Read from stdin when neither this nor --input-file is given.
    #[arg(long, conflicts_with = "input_file")]
    input: Option<String>,

    /// File containing the requirement text.
    #[arg(long)]
    input_file: Option<PathBuf>,

    /// Save the report to this file.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Print the final state as JSON instead of the text report.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match execute(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn execute(cli: Cli) -> Result<ExitCode> {
    let mut config = AppConfig::load(cli.config.as_deref())?;
    config.apply_env(|key| std::env::var(key).ok());

    match cli.command {
        Command::Routes => {
            print_routes(&RoutingTable::standard());
            Ok(ExitCode::SUCCESS)
        }
        Command::Run(args) => {
            let _telemetry = telemetry::init(&config.observability)?;
            run(&config, args).await
        }
    }
}

fn print_routes(table: &RoutingTable) {
    println!("{:<10} {:<15} TARGET", "FROM", "DIRECTIVE");
    for (from, directive, route) in table.edges() {
        println!("{:<10} {:<15} {route}", from.as_str(), directive.as_str());
    }
}

fn read_requirement(args: &RunArgs) -> Result<String> {
    let text = if let Some(input) = &args.input {
        input.clone()
    } else if let Some(path) = &args.input_file {
        std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?
    } else {
        eprint!("Enter your requirement: ");
        io::stderr().flush().ok();
        let mut line = String::new();
        io::stdin()
            .lock()
            .read_line(&mut line)
            .context("failed to read requirement from stdin")?;
        line
    };

    let text = text.trim().to_string();
    if text.is_empty() {
        bail!("the requirement is empty");
    }
    Ok(text)
}

async fn run(config: &AppConfig, args: RunArgs) -> Result<ExitCode> {
    let requirement = read_requirement(&args)?;

    let generator = OpenAiGenerator::new(config.openai_config()?)
        .context("failed to create the content generator")?;
    let engine = Engine::builder()
        .generator(Arc::new(generator))
        .retry_ceiling(config.retry_ceiling()?)
        .step_limit(config.step_limit()?)
        .build()?;

    let cancel = CancellationToken::new();
    let watcher = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping at the next stage boundary");
            watcher.cancel();
        }
    });

    info!(model = %config.llm.model, "starting pipeline run");
    match engine.run_with_cancellation(requirement, &cancel).await {
        Ok(outcome) => {
            info!(run_id = %outcome.run_id, steps = outcome.steps(), "pipeline run completed");
            emit(&outcome.state, Report::new(&outcome.state), &args)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(failure) => {
            error!(
                run_id = %failure.run_id,
                stage = %failure.stage,
                error = %failure.cause,
                "pipeline run failed"
            );
            let report = Report::failed(&failure.partial_state, failure.cause.to_string());
            emit(&failure.partial_state, report, &args)?;
            eprintln!("error: {failure}");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn emit(state: &PipelineState, report: Report<'_>, args: &RunArgs) -> Result<()> {
    if args.json {
        println!("{}", serde_json::to_string_pretty(state)?);
    } else {
        print!("{}", Progress(state.audit_trail()));
        println!();
        print!("{report}");
    }

    if let Some(path) = &args.output {
        report
            .save(path)
            .with_context(|| format!("failed to save report to {}", path.display()))?;
        eprintln!("Report saved to {}", path.display());
    }
    Ok(())
}
