//! Flurry CLI: plans and simulates streaming-ingestion pipelines.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde_json::{Value, json};
use tracing::info;

use flurry::provider::MemoryProvider;
use flurry::{
    BuildContext, ConfigArgs, Config, PipelineBuilder, PipelineError, PipelineRegistry,
    PipelineResult, check_report, deploy, init_tracing, resolve_outputs,
};
use flurry_core::topology::{DeploymentReport, NodeStatus};

#[derive(Parser, Debug)]
#[command(name = "flurry", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    config: ConfigArgs,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print every pipeline's resources in submission order, as JSON.
    Plan,
    /// Deploy against an in-memory provider and print the outcome.
    Simulate {
        /// Make creates of the named resource fail (repeatable).
        #[arg(long = "fail-on")]
        fail_on: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();

    let paths = cli.config.config_paths();
    if paths.is_empty() {
        eprintln!("Error: no config files or directories specified");
        return ExitCode::FAILURE;
    }

    info!("Loading config from {} source(s)", paths.len());
    let config = match Config::from_paths(&paths) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            return ExitCode::FAILURE;
        }
    };

    let registry = PipelineRegistry::new();
    let mut ctx = BuildContext::new();
    let mut built = Vec::with_capacity(config.pipeline_count());
    for (key, pipeline) in config.pipelines() {
        info!("  Pipeline: {} (bucket {})", key, pipeline.bucket_name);
        let result = registry
            .acquire(pipeline.name())
            .map_err(PipelineError::from)
            .and_then(|_lease| PipelineBuilder::new(pipeline).build_into(&mut ctx));
        match result {
            Ok(result) => built.push(result),
            Err(e) => {
                eprintln!("Failed to build pipeline '{key}': {e}");
                return ExitCode::FAILURE;
            }
        }
    }

    let outcome = match cli.command {
        Command::Plan => plan(&ctx, &built),
        Command::Simulate { fail_on } => simulate(&ctx, &built, &config, fail_on).await,
    };

    match outcome {
        Ok(output) => {
            println!("{output:#}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn plan(ctx: &BuildContext, built: &[PipelineResult]) -> Result<Value, PipelineError> {
    let plan = ctx.plan()?;
    let pipelines: Vec<Value> = built
        .iter()
        .map(|result| {
            json!({
                "name": result.name,
                "bucket_name": result.outputs.bucket_name,
                "stream_id": result.outputs.stream_id().render(),
                "stream_callable": result.outputs.stream_callable().render(),
            })
        })
        .collect();

    Ok(json!({ "pipelines": pipelines, "plan": plan }))
}

async fn simulate(
    ctx: &BuildContext,
    built: &[PipelineResult],
    config: &Config,
    fail_on: Vec<String>,
) -> Result<Value, PipelineError> {
    let provider = fail_on
        .into_iter()
        .fold(MemoryProvider::default(), |provider, name| provider.fail_on(name, false));

    let report = deploy(&provider, ctx.graph(), &config.global).await?;
    println!("{:#}", render_report(&report));
    check_report(&report)?;

    let outputs: Vec<Value> = built
        .iter()
        .filter_map(|result| resolve_outputs(&result.outputs, &report))
        .map(|outputs| json!(outputs))
        .collect();
    Ok(json!({ "outputs": outputs }))
}

fn render_report(report: &DeploymentReport) -> Value {
    let resources: Vec<Value> = report
        .statuses()
        .map(|(resource, status)| match status {
            NodeStatus::Created { resolved, .. } => json!({
                "resource": resource,
                "status": "created",
                "id": resolved.id,
                "arn": resolved.arn,
            }),
            NodeStatus::Failed(err) => json!({
                "resource": resource,
                "status": "failed",
                "error": err.to_string(),
                "retryable": err.is_retryable(),
            }),
            NodeStatus::Aborted { cause } => json!({
                "resource": resource,
                "status": "aborted",
                "cause": cause,
            }),
        })
        .collect();

    json!({ "resources": resources })
}
