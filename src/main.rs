use anyhow::{anyhow, Context, Result};
use clap::Parser;
use docflow::batch::{jobs_for_inputs, output_map, BATCH_OPERATION};
use docflow::cli::{BatchArgs, CheckArgs, Command, RootArgs, RunArgs};
use docflow::config::{resolve_config, FlowConfig};
use docflow::invoker::{Invoker, OperationRegistry, Params};
use docflow::ops::default_registry;
use docflow::output::{persist, AlwaysOverwrite, PreserveExisting, WritePolicy};
use docflow::pool::run_batch;
use docflow::render::{render_report, render_summary};
use docflow::util::absolutize;
use docflow::workflow::{load_workflow, run_workflow};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let args = RootArgs::parse();
    init_logging(args.verbose);
    let config = resolve_config(args.config.as_deref())?;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling");
            trigger.cancel();
        }
    });

    let registry = default_registry();
    match args.command {
        Command::Run(run) => cmd_run(&cancel, &registry, &config, run).await,
        Command::Batch(batch) => cmd_batch(&cancel, registry, &config, batch).await,
        Command::Check(check) => cmd_check(&registry, check),
        Command::Operations => {
            for name in registry.names() {
                println!("{name}");
            }
            Ok(())
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "docflow=debug" } else { "docflow=info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn cmd_run(
    cancel: &CancellationToken,
    registry: &OperationRegistry,
    config: &FlowConfig,
    args: RunArgs,
) -> Result<()> {
    let workflow = load_workflow(&args.workflow)?;
    let format = args.format.unwrap_or(config.report_format);
    if !format.supports_report() {
        return Err(anyhow!("reports render as markdown or json, not {format}"));
    }
    let policy: &dyn WritePolicy = if args.overwrite || config.overwrite_text_outputs {
        &AlwaysOverwrite
    } else {
        &PreserveExisting
    };

    match run_workflow(cancel, &workflow, registry, policy).await {
        Ok(report) => emit(&render_report(&report, format)?, args.out.as_deref()).await,
        Err(failure) => {
            // The partial report still reaches the user before the error.
            emit(&render_report(&failure.report, format)?, args.out.as_deref()).await?;
            Err(failure.error).context(format!("run {}", args.workflow.display()))
        }
    }
}

async fn cmd_batch(
    cancel: &CancellationToken,
    registry: OperationRegistry,
    config: &FlowConfig,
    args: BatchArgs,
) -> Result<()> {
    if args.operation == BATCH_OPERATION {
        return Err(anyhow!("batch cannot fan out over itself"));
    }
    if !registry.contains(&args.operation) {
        return Err(anyhow!("unknown operation {:?}", args.operation));
    }
    let shared = parse_params(&args.params)?;
    let inputs = args
        .inputs
        .iter()
        .map(|input| absolutize(input).with_context(|| format!("resolve {}", input.display())))
        .collect::<Result<Vec<PathBuf>>>()?;
    let jobs = jobs_for_inputs(&inputs, &shared);
    let max_concurrency = args.max_concurrency.unwrap_or(config.max_concurrency);

    let invoker: Arc<dyn Invoker> = Arc::new(registry);
    let operation = args.operation.clone();
    let summary = run_batch(cancel, jobs, max_concurrency, move |token, job| {
        let invoker = invoker.clone();
        let operation = operation.clone();
        async move {
            let output = invoker.invoke(&token, &operation, &job.params).await?;
            Ok(output_map(output))
        }
    })
    .await?;

    emit(&render_summary(&summary, args.format)?, args.out.as_deref()).await?;
    if summary.failed > 0 {
        return Err(anyhow!(
            "{} of {} jobs failed",
            summary.failed,
            summary.total
        ));
    }
    Ok(())
}

fn cmd_check(registry: &OperationRegistry, args: CheckArgs) -> Result<()> {
    let workflow = load_workflow(&args.workflow)?;
    println!("{}", workflow.source_path.display());
    let mut unknown = Vec::new();
    for (idx, step) in workflow.steps.iter().enumerate() {
        let state = if step.enabled { "enabled" } else { "disabled" };
        println!("{:>3}. {} ({}) [{state}]", idx + 1, step.name, step.kind);
        if !registry.contains(&step.kind) {
            unknown.push(format!("{} ({})", step.name, step.kind));
        }
    }
    for combine in &workflow.combine {
        println!(
            "combine: {} <- {}",
            combine.output_file,
            combine.sources.join(", ")
        );
    }
    if !unknown.is_empty() {
        return Err(anyhow!("unknown operations: {}", unknown.join(", ")));
    }
    Ok(())
}

fn parse_params(raw: &[String]) -> Result<Params> {
    let mut params = Params::new();
    for pair in raw {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("--param expects KEY=VALUE (got {pair:?})"))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(anyhow!("--param key must be non-empty (got {pair:?})"));
        }
        params.insert(key.to_string(), Value::String(value.to_string()));
    }
    Ok(params)
}

async fn emit(text: &str, out: Option<&Path>) -> Result<()> {
    match out {
        Some(path) => {
            persist(path.to_path_buf(), text.as_bytes().to_vec()).await?;
            tracing::info!(path = %path.display(), "wrote output");
        }
        None => print!("{text}"),
    }
    Ok(())
}
