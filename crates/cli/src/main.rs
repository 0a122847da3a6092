use crate::{
    env::EnvManager,
    error::CliError,
    shutdown::{ExitCode, ShutdownCoordinator, ShutdownSignal},
};
use clap::Parser;
use commands::Commands;
use connectors::sql::{base::executor::DatabaseExecutor, postgres::executor::PgExecutor};
use engine_config::settings::EngineSettings;
use engine_core::{
    ledger::{LedgerStore, sled_store::SledLedgerStore},
    registry::{ClusterRegistry, file::FileClusterRegistry},
};
use engine_runtime::orchestrator::Orchestrator;
use model::{core::identifiers::ExecutionId, execution::request::SubmitRequest};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod commands;
mod conn;
mod env;
mod error;
mod output;
mod shutdown;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Parser)]
#[command(
    name = "fanout",
    version = "0.1.0",
    about = "Run read-only SQL across many database clusters"
)]
struct Cli {
    #[arg(long, global = true, help = "Load FANOUT_* variables from this .env file")]
    env_file: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        help = "Cluster inventory file; overrides FANOUT_CLUSTERS_FILE"
    )]
    clusters_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Everything a command may need, wired from settings.
struct App {
    registry: Arc<FileClusterRegistry>,
    orchestrator: Orchestrator,
}

#[tokio::main]
async fn main() {
    // Logs go to stderr so downloads can be piped from stdout
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let shutdown = ShutdownCoordinator::install();

    let code = match run(cli, &shutdown).await {
        Ok(()) => ExitCode::Success,
        Err(CliError::ShutdownRequested) => {
            ExitCode::from_signal(shutdown.requested().unwrap_or(ShutdownSignal::Interrupt))
        }
        Err(err) => {
            error!("{err}");
            ExitCode::GeneralError
        }
    };
    std::process::exit(code.as_i32());
}

async fn run(cli: Cli, shutdown: &ShutdownCoordinator) -> Result<(), CliError> {
    let mut env = EnvManager::new();
    if let Some(path) = &cli.env_file {
        env.load_from_file(path)?;
    }
    let mut settings = env.settings()?;
    if let Some(path) = cli.clusters_file {
        settings.clusters_file = path;
    }

    let app = build_app(&settings)?;
    let result = dispatch(&app, cli.command, shutdown).await;

    let report = app.orchestrator.shutdown().await?;
    if !report.drained {
        warn!(aborted = report.aborted, "Some executions were interrupted");
    }
    result
}

fn build_app(settings: &EngineSettings) -> Result<App, CliError> {
    let executor: Arc<dyn DatabaseExecutor> = Arc::new(PgExecutor::new(settings.executor_settings()));
    let registry = Arc::new(FileClusterRegistry::load(
        &settings.clusters_file,
        executor.clone(),
    )?);
    let ledger: Arc<dyn LedgerStore> = Arc::new(SledLedgerStore::open(&settings.state_path)?);

    let orchestrator = Orchestrator::new(
        settings,
        ledger,
        registry.clone() as Arc<dyn ClusterRegistry>,
        executor,
    )?;
    Ok(App {
        registry,
        orchestrator,
    })
}

async fn dispatch(
    app: &App,
    command: Commands,
    shutdown: &ShutdownCoordinator,
) -> Result<(), CliError> {
    match command {
        Commands::Submit {
            sql,
            clusters,
            databases,
            user,
            email,
            description,
            json,
        } => {
            let request = SubmitRequest {
                sql,
                cluster_ids: clusters,
                database_names: databases,
                user_id: user,
                user_email: email,
                description,
            };
            let pending = app.orchestrator.submit(request).await?;
            info!(execution_id = %pending.execution_id, "Waiting for execution to finish");

            let id = ExecutionId::from(pending.execution_id.as_str());
            let view = tokio::select! {
                view = app.orchestrator.wait_for(&id, POLL_INTERVAL) => view?,
                _ = shutdown.cancelled() => {
                    app.orchestrator.cancel(&id).await?;
                    return Err(CliError::ShutdownRequested);
                }
            };

            if json {
                output::print_json(&view)?;
            } else {
                output::print_execution(&view);
            }
        }
        Commands::Status { id, json } => {
            let view = app.orchestrator.status(&ExecutionId::from(id)).await?;
            if json {
                output::print_json(&view)?;
            } else {
                output::print_execution(&view);
            }
        }
        Commands::List {
            user,
            running,
            pending,
            json,
        } => {
            let views = match (user, running, pending) {
                (Some(user), _, _) => app.orchestrator.list_by_user(&user).await?,
                (None, true, _) => app.orchestrator.running().await?,
                (None, false, true) => app.orchestrator.pending().await?,
                (None, false, false) => {
                    return Err(CliError::Config(
                        "pass one of --user, --running or --pending".into(),
                    ));
                }
            };
            if json {
                output::print_json(&views)?;
            } else {
                output::print_executions(&views);
            }
        }
        Commands::Cancel { id } => {
            let id = ExecutionId::from(id);
            if app.orchestrator.cancel(&id).await? {
                println!("Execution '{id}' cancelled");
            } else {
                println!("Execution '{id}' is unknown or already finished");
            }
        }
        Commands::Download { id, output: path } => {
            let bytes = app.orchestrator.download(&ExecutionId::from(id)).await?;
            output::write_bytes(&bytes, path.as_deref()).await?;
        }
        Commands::Files { id, json } => {
            let files = app.orchestrator.files(&ExecutionId::from(id)).await?;
            if json {
                output::print_json(&files)?;
            } else {
                output::print_files(&files);
            }
        }
        Commands::Purge { days } => {
            let report = app.orchestrator.purge(days).await?;
            println!(
                "Purged {} result directories ({} bytes)",
                report.directories, report.bytes
            );
        }
        Commands::Clusters { json } => {
            let clusters = app.registry.list().await;
            if json {
                output::print_json(&clusters)?;
            } else {
                output::print_clusters(&clusters);
            }
        }
        Commands::Discover { cluster } => {
            let cluster = conn::rediscover(&app.registry, cluster).await?;
            output::print_clusters(std::slice::from_ref(&cluster));
        }
        Commands::TestConn { cluster, database } => {
            conn::ping_cluster(&app.registry, cluster, database).await?;
        }
    }

    if shutdown.requested().is_some() {
        return Err(CliError::ShutdownRequested);
    }
    Ok(())
}
