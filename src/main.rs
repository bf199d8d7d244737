use anyhow::{anyhow, Context, Result};
use envomatic::cli::commands::RunArgs;
use envomatic::cli::output::*;
use envomatic::cli::{Cli, Command};
use envomatic::core::{EomConfig, PipelineContext, RunOptions};
use envomatic::credentials::{CachedCredentialStore, CredentialStore, EnvCredentialStore};
use envomatic::error::PipelineError;
use envomatic::execution::{CommandExecutor, StagePipeline, StageRuntime};
use envomatic::remote::{Endpoint, SessionProfile, SshConnector};
use envomatic::stages;
use envomatic::tickets::JiraTicketSystem;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{error, info_span, Instrument};
use tracing_subscriber::EnvFilter;

/// Fallback login when neither the command line nor the profile names one
const DEFAULT_USER: &str = "relmgt";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    init_logging(cli.verbose, cli.logfile.as_deref())?;

    let result = match &cli.command {
        Command::Run(args) => run_pipeline(args, cli.verbose).await,
        Command::Plan(args) => plan_pipeline(args),
        Command::Stages => list_stages(),
    };

    if let Err(e) = result {
        println!("\n{} {}", CROSS, style(&e).red());
        error!("{}", e);
        std::process::exit(e.exit_code());
    }

    Ok(())
}

/// `-v` → debug, `-vv` → trace; `RUST_LOG` overrides both
fn init_logging(verbose: u8, logfile: Option<&Path>) -> Result<()> {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::SystemTime);

    match logfile {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Can't open log file {}", path.display()))?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None => builder.with_writer(std::io::stderr).try_init(),
    }
    .map_err(|e| anyhow!("Failed to set logging subscriber: {}", e))
}

fn resolve(args: &RunArgs) -> Result<(EomConfig, RunOptions), PipelineError> {
    let config = EomConfig::load(args.config.as_deref(), args.ignoreini)?;
    let default_user = std::env::var("USER").unwrap_or_else(|_| DEFAULT_USER.to_string());
    let options = RunOptions::resolve(
        args.option_set(),
        config.profile(&args.profile),
        &default_user,
    )?;
    Ok((config, options))
}

async fn run_pipeline(args: &RunArgs, verbose: u8) -> Result<(), PipelineError> {
    let (config, options) = resolve(args)?;
    let span = info_span!("eom", env = %options.environment);

    async move {
        let store = CachedCredentialStore::new(EnvCredentialStore::new(args.password.clone()));
        let credentials = store.get_credentials(&options.user)?;

        let connector = SshConnector::new(
            Endpoint::from(&config.server),
            SessionProfile::from_config(&config.server, options.timeouts.command),
            credentials,
        );
        let tickets = JiraTicketSystem::new(&config.tickets, store.get_credentials(&options.user)?)
            .map_err(PipelineError::TicketCreation)?;

        let mut rt = StageRuntime::new(
            config,
            Arc::new(connector),
            Arc::new(tickets),
            CommandExecutor::new(verbose >= 2),
        );
        rt.events
            .add_handler(|event| println!("{}", format_execution_event(&event)));

        let pipeline = StagePipeline::new(stages::catalog())?;
        let mut ctx = PipelineContext::new(options);

        println!();
        let result = pipeline.execute(&mut ctx, &mut rt).await;

        let records: Vec<_> = ctx.stages.values().collect();
        println!("\n{}", format_stage_report(&records));
        if result.is_ok() {
            println!(
                "\n{} {} {}",
                CHECK,
                style(ctx.environment.upper()).bold(),
                style("provisioned").green()
            );
        }
        result
    }
    .instrument(span)
    .await
}

fn plan_pipeline(args: &RunArgs) -> Result<(), PipelineError> {
    let (config, options) = resolve(args)?;

    println!("{} Run options", INFO);
    println!("{}", format_run_options(&options));

    match config.release_name(&options.release) {
        Some(name) => println!("  Release name:  {}", name),
        None => println!("  Release name:  {} unknown release", WARN),
    }

    println!("\n{} Stages", INFO);
    let pipeline = StagePipeline::new(stages::catalog())?;
    for (sequence, name) in pipeline.plan() {
        println!("  {:>5} {}", style(sequence).dim(), name);
    }
    Ok(())
}

fn list_stages() -> Result<(), PipelineError> {
    let pipeline = StagePipeline::new(stages::catalog())?;
    println!("{} Stage catalog:", INFO);
    for (sequence, name) in pipeline.plan() {
        println!("  {:>5} {}", style(sequence).dim(), style(name).bold());
    }
    Ok(())
}
