//! CLI entrypoint for Overmind
//!
//! This is the main binary that wires together all layers using
//! dependency injection.

use anyhow::{Context, Result, bail};
use clap::Parser;
use overmind_application::{
    CircuitBreakerRegistry, MissionEventSink, MissionRepository, MissionRunner, MissionService,
    NoEventSink, OvermindConfig, OvermindOrchestrator,
};
use overmind_domain::{MissionId, MissionStatus};
use overmind_infrastructure::{
    ConfigLoader, FileConfig, InMemoryMissionRepository, JsonlEventExporter,
    SqliteMissionRepository, StorageBackend, ToolRegistry, rule_based_council,
};
use overmind_presentation::{
    Cli, Command, ConsoleFormatter, OutputFormat, ProgressReporter, ProgressView, SimpleProgress,
    follow,
};
use std::io::IsTerminal;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    if cli.show_config {
        ConfigLoader::print_config_sources(cli.config.as_deref());
        return Ok(ExitCode::SUCCESS);
    }

    let (file_config, warnings) = ConfigLoader::load_validated(cli.config.as_deref())?;
    let _log_guard = init_logging(cli.verbose, file_config.logging.log_dir.as_deref());
    for issue in &warnings {
        warn!("Config: {}", issue);
    }

    let Some(command) = cli.command else {
        bail!("No command given. Try: overmind run \"echo hello\"");
    };

    info!("Starting Overmind");
    let config = file_config.to_overmind_config();
    let repository = open_repository(&file_config)?;
    let event_sink = event_sink(&file_config);

    match command {
        Command::Run {
            objective,
            initiator,
            no_follow,
        } => {
            run_mission(
                &config,
                repository,
                event_sink,
                &objective,
                initiator,
                !no_follow,
                cli.output,
            )
            .await
        }
        Command::Status { mission_id } => {
            require_shared_store(&file_config, "status")?;
            let service = MissionService::read_only(repository, config.runner().clone());
            let snapshot = service.get_mission_status(MissionId::new(mission_id)).await?;
            match cli.output {
                OutputFormat::Text => print!("{}", ConsoleFormatter::format_status(&snapshot)),
                OutputFormat::Json => println!("{}", ConsoleFormatter::format_json(&snapshot)),
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Events { mission_id } => {
            require_shared_store(&file_config, "events")?;
            let service = MissionService::read_only(repository, config.runner().clone());
            let events = service.event_log(MissionId::new(mission_id)).await?;
            match cli.output {
                OutputFormat::Text => print!("{}", ConsoleFormatter::format_events(&events)),
                OutputFormat::Json => println!("{}", ConsoleFormatter::format_json(&events)),
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Cancel { mission_id } => {
            require_shared_store(&file_config, "cancel")?;
            let service = MissionService::read_only(repository, config.runner().clone())
                .with_event_sink(event_sink);
            let snapshot = service.cancel_mission(MissionId::new(mission_id)).await?;
            match cli.output {
                OutputFormat::Text => print!("{}", ConsoleFormatter::format_status(&snapshot)),
                OutputFormat::Json => println!("{}", ConsoleFormatter::format_json(&snapshot)),
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Starts the mission on a local runner and waits for it to finish.
async fn run_mission(
    config: &OvermindConfig,
    repository: Arc<dyn MissionRepository>,
    event_sink: Arc<dyn MissionEventSink>,
    objective: &str,
    initiator: i64,
    show_progress: bool,
    output: OutputFormat,
) -> Result<ExitCode> {
    // === Dependency Injection ===
    let tools = Arc::new(ToolRegistry::with_builtin_tools());
    let council = rule_based_council(tools);
    let orchestrator = OvermindOrchestrator::new(
        Arc::clone(&repository),
        council,
        Arc::new(CircuitBreakerRegistry::new()),
    )
    .with_params(config.orchestrator().clone())
    .with_resilience(config.resilience().clone())
    .with_event_sink(Arc::clone(&event_sink));

    let runner = Arc::new(MissionRunner::start(orchestrator, config.runner())?);
    let service = MissionService::new(repository, Arc::clone(&runner), config.runner().clone())
        .with_event_sink(event_sink);

    let started = service.start_mission(objective, initiator).await?;
    if output == OutputFormat::Text {
        print!("{}", ConsoleFormatter::format_started(&started));
    }

    let mission_id = started.mission_id;
    let interrupted = tokio::select! {
        _ = watch_progress(&service, mission_id, show_progress && output == OutputFormat::Text) => false,
        _ = tokio::signal::ctrl_c() => true,
    };
    if interrupted {
        warn!("Interrupted, cancelling mission {}", mission_id);
        service.cancel_mission(mission_id).await?;
    }

    // Closing the queue lets the worker finish the mission before exit.
    let worker_runner = Arc::clone(&runner);
    tokio::task::spawn_blocking(move || worker_runner.shutdown())
        .await
        .context("mission runner did not shut down")?;

    let snapshot = service.get_mission_status(mission_id).await?;
    match output {
        OutputFormat::Text => print!("{}", ConsoleFormatter::format_status(&snapshot)),
        OutputFormat::Json => println!("{}", ConsoleFormatter::format_json(&snapshot)),
    }

    Ok(if snapshot.status == MissionStatus::Success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn watch_progress(service: &MissionService, mission_id: MissionId, show: bool) {
    if !show {
        return;
    }
    let view: Box<dyn ProgressView> = if std::io::stderr().is_terminal() {
        Box::new(ProgressReporter::new())
    } else {
        Box::new(SimpleProgress)
    };
    follow(service.stream_progress(mission_id), view.as_ref()).await;
}

fn open_repository(config: &FileConfig) -> Result<Arc<dyn MissionRepository>> {
    match config.storage.backend {
        StorageBackend::Memory => Ok(Arc::new(InMemoryMissionRepository::new())),
        StorageBackend::Sqlite => {
            let path = config
                .storage
                .resolved_path()
                .context("storage.path could not be resolved")?;
            info!("Using mission store {}", path.display());
            Ok(Arc::new(SqliteMissionRepository::open(path)?))
        }
    }
}

fn event_sink(config: &FileConfig) -> Arc<dyn MissionEventSink> {
    match &config.logging.event_log {
        Some(path) => match JsonlEventExporter::new(path) {
            Some(exporter) => Arc::new(exporter),
            None => {
                warn!("Event log {} could not be opened", path.display());
                Arc::new(NoEventSink)
            }
        },
        None => Arc::new(NoEventSink),
    }
}

/// Commands that address an existing mission need a store shared between
/// processes.
fn require_shared_store(config: &FileConfig, command: &str) -> Result<()> {
    if config.storage.backend == StorageBackend::Memory {
        bail!(
            "`overmind {}` needs a persistent store; set storage.backend = \"sqlite\"",
            command
        );
    }
    Ok(())
}

/// Console logging filtered by `-v`, plus a daily log file when `log_dir` is
/// set. The returned guard flushes the file writer on drop.
fn init_logging(verbose: u8, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = match verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"), // -vvv or more
    };

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "overmind.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(file_layer)
        .init();

    guard
}
