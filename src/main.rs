//! Ralph Supervisor - run a coding agent in a loop until it signals completion.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ralph_supervisor::cli::AgentCommand;
use ralph_supervisor::config::{
    load_instruction, validate_max_iterations, validate_working_dir, ConfigError, ConfigLoader,
    LoopConfig, PromptSource, ValidationError,
};
use ralph_supervisor::debug_log::{DebugLog, DebugLogError};
use ralph_supervisor::display::{self, ConsoleObserver};
use ralph_supervisor::supervisor::{
    CancellationController, CompositeObserver, IterationSupervisor, ProcessSession, RetryPolicy,
    RunContext, RunObserver, RunSummary,
};

#[derive(Parser)]
#[command(
    name = "ralph-supervisor",
    about = "Run a coding agent in a bounded loop until it signals completion",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agent until it prints the completion marker.
    Run(RunArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Instruction text. Overrides the prompt file.
    #[arg(short, long, conflicts_with = "prompt_file")]
    prompt: Option<String>,
    /// File holding the instruction, relative to the working directory.
    #[arg(short = 'f', long)]
    prompt_file: Option<PathBuf>,
    /// Maximum number of iterations.
    #[arg(short = 'n', long)]
    max_iterations: Option<u32>,
    /// Model identifier passed to the agent.
    #[arg(short, long)]
    model: Option<String>,
    /// Agent executable.
    #[arg(long)]
    agent: Option<String>,
    /// Working directory for the agent.
    #[arg(long)]
    cwd: Option<PathBuf>,
    /// Config file. Defaults to the standard search path.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Write a JSON debug log of every attempt into this directory.
    #[arg(long, value_name = "DIR")]
    debug_log: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    DebugLog(#[from] DebugLogError),

    #[error("Failed to determine current directory: {0}")]
    CurrentDir(std::io::Error),
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Merge command-line overrides into the loaded config.
fn apply_overrides(config: &mut LoopConfig, args: &RunArgs) {
    if let Some(agent) = &args.agent {
        config.agent.clone_from(agent);
    }
    if let Some(model) = &args.model {
        config.model.clone_from(model);
    }
    if let Some(n) = args.max_iterations {
        config.max_iterations = n;
    }
    if let Some(path) = &args.prompt_file {
        config.prompt_file.clone_from(path);
    }
    if let Some(dir) = &args.debug_log {
        config.debug_log_dir = Some(dir.clone());
    }
}

async fn run(args: RunArgs, verbose: bool) -> Result<RunSummary, CliError> {
    let working_dir = match &args.cwd {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().map_err(CliError::CurrentDir)?,
    };
    validate_working_dir(&working_dir)?;

    let loader = match &args.config {
        Some(path) => ConfigLoader::with_path(path.clone()),
        None => ConfigLoader::for_working_dir(&working_dir),
    };
    let mut config = loader.load()?;
    apply_overrides(&mut config, &args);

    validate_max_iterations(config.max_iterations)?;

    let source = match args.prompt {
        Some(text) => PromptSource::Inline(text),
        None => PromptSource::File(config.prompt_file.clone()),
    };
    let instruction = load_instruction(&source, &working_dir)?;

    let mut observers = CompositeObserver::new().with(Arc::new(ConsoleObserver::new(verbose)));
    if let Some(dir) = &config.debug_log_dir {
        observers.push(Arc::new(DebugLog::create(dir)?));
    }
    let observer: Arc<dyn RunObserver> = Arc::new(observers);

    let ctx = Arc::new(RunContext::new());
    let controller = CancellationController::new(Arc::clone(&ctx))
        .with_grace(config.terminate_grace())
        .with_observer(Arc::clone(&observer));
    let listener = controller.spawn_signal_listener();

    tracing::info!(
        agent = %config.agent,
        model = %config.model,
        max_iterations = config.max_iterations,
        cwd = %working_dir.display(),
        "Starting loop"
    );

    let command = AgentCommand::new(instruction)
        .program(config.agent.clone())
        .model(config.model.clone())
        .working_dir(working_dir);
    let session =
        ProcessSession::new(command, Arc::clone(&ctx)).with_terminate_grace(config.terminate_grace());

    let mut supervisor = IterationSupervisor::new(session, Arc::clone(&ctx), observer)
        .with_max_iterations(config.max_iterations)
        .with_retry_policy(RetryPolicy::new(config.retry_delay()))
        .with_iteration_delay(config.iteration_delay());

    let summary = supervisor.run().await;

    if ctx.is_cancelled() && !controller.shutdown().await {
        tracing::warn!("Exiting with the agent process possibly still running");
    }
    listener.abort();

    display::print_summary(&summary);
    Ok(summary)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run(args) => match run(args, cli.verbose > 0).await {
            Ok(summary) => ExitCode::from(summary.exit_code()),
            Err(e) => {
                tracing::error!(error = %e, "Run aborted before starting");
                display::print_error(&e.to_string());
                ExitCode::FAILURE
            }
        },
    }
}
