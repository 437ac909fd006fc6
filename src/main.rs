//! `taskweave` - execute goal plans as capability DAGs from the command line.
//!
//! Reads a plan document (the JSON a decomposer produces), validates it into
//! a task DAG, and either prints the level structure or executes it against
//! the built-in capabilities while streaming lifecycle events.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use taskweave_core::decompose::parse_plan_document;
use taskweave_core::exec::{EngineConfig, ExecutionContext, Executor};
use taskweave_core::{
    levelize, ChannelSink, ExecutionEvent, ExecutionPlan, GoalId, PlanOutcome,
};

mod capabilities;

#[derive(Parser)]
#[command(name = "taskweave", version, about = "Execute goal plans as capability DAGs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose engine logging.
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a plan document.
    Run {
        /// Path to the plan JSON document.
        #[arg(long)]
        plan: PathBuf,

        /// Plan-wide cap on concurrently running tasks.
        #[arg(long)]
        max_in_flight: Option<usize>,

        /// Retry attempts per task.
        #[arg(long)]
        attempts: Option<u32>,

        /// Per-attempt timeout in seconds.
        #[arg(long)]
        attempt_timeout: Option<u64>,
    },
    /// Validate a plan document and print its level structure.
    Validate {
        /// Path to the plan JSON document.
        #[arg(long)]
        plan: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Run {
            plan,
            max_in_flight,
            attempts,
            attempt_timeout,
        } => run(&plan, max_in_flight, attempts, attempt_timeout).await,
        Commands::Validate { plan } => validate(&plan).await,
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("taskweave=debug,taskweave_core=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn load_plan(path: &Path) -> Result<ExecutionPlan> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read plan document {}", path.display()))?;
    let draft = parse_plan_document(&content).context("failed to parse plan document")?;
    let plan = ExecutionPlan::build(GoalId::new(), draft.tasks)
        .context("plan failed validation")?
        .with_estimates(draft.estimated_cost, draft.estimated_time_secs);
    Ok(plan)
}

async fn validate(path: &Path) -> Result<()> {
    let plan = load_plan(path).await?;
    let levels = levelize(&plan).context("plan failed leveling")?;

    println!("plan ok: {} tasks in {} levels", plan.len(), levels.len());
    for (i, level) in levels.iter().enumerate() {
        let ids: Vec<&str> = level.tasks.iter().map(|t| t.as_str()).collect();
        println!("  level {i}: {}", ids.join(", "));
    }
    Ok(())
}

async fn run(
    path: &Path,
    max_in_flight: Option<usize>,
    attempts: Option<u32>,
    attempt_timeout: Option<u64>,
) -> Result<()> {
    let plan = load_plan(path).await?;
    tracing::debug!(plan = %path.display(), tasks = plan.len(), "loaded plan document");

    let mut config = EngineConfig::new();
    if max_in_flight.is_some() {
        config.max_in_flight = max_in_flight;
    }
    if let Some(attempts) = attempts {
        config.retry.max_attempts = attempts;
    }
    if let Some(secs) = attempt_timeout {
        config.attempt_timeout = std::time::Duration::from_secs(secs);
    }

    let registry = Arc::new(capabilities::builtin_registry());
    let (sink, mut events) = ChannelSink::new();
    let executor = Executor::new(registry, config, Arc::new(sink));

    let ctx = ExecutionContext::new(plan.goal_id());

    // Ctrl-C lets in-flight tasks finish and skips the rest.
    let cancel_ctx = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("cancellation requested, letting in-flight tasks finish");
            cancel_ctx.cancel();
        }
    });

    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            print_event(&event);
        }
    });

    let report = executor.execute(&plan, ctx).await?;
    // Dropping the executor drops its sink, which ends the printer's stream.
    drop(executor);
    printer.await.ok();

    println!(
        "\n{} succeeded, {} failed, {} skipped ({} attempts, {} ms busy)",
        report.succeeded(),
        report.failed(),
        report.skipped(),
        report.usage.attempts,
        report.usage.busy_ms,
    );

    if report.outcome == PlanOutcome::CompletedWithFailures {
        bail!("plan completed with failures");
    }
    Ok(())
}

fn print_event(event: &ExecutionEvent) {
    match event {
        ExecutionEvent::PlanStarted {
            total_tasks,
            levels,
            ..
        } => {
            println!("plan started: {total_tasks} tasks in {levels} levels");
        }
        ExecutionEvent::TaskStarted {
            task_id,
            capability,
            level,
            ..
        } => {
            println!("[level {level}] {task_id} started ({capability})");
        }
        ExecutionEvent::TaskSucceeded {
            task_id,
            attempts,
            elapsed_ms,
            ..
        } => {
            println!("{task_id} succeeded in {elapsed_ms} ms ({attempts} attempt(s))");
        }
        ExecutionEvent::TaskFailed {
            task_id,
            error,
            attempts,
            ..
        } => {
            println!("{task_id} FAILED after {attempts} attempt(s): {error}");
        }
        ExecutionEvent::TaskSkipped {
            task_id, reason, ..
        } => {
            println!("{task_id} skipped: {reason}");
        }
        ExecutionEvent::PlanCompleted {
            outcome,
            succeeded,
            failed,
            skipped,
            ..
        } => {
            println!("plan completed ({outcome:?}): {succeeded} ok / {failed} failed / {skipped} skipped");
        }
    }
}
