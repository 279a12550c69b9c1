//! fleet CLI - Main entry point

use clap::{Parser, Subcommand};
use fleet_foundation::{AppConfig, ConfigOverrides};
use fleet_task::{ContainerEngine, DockerEngine, Sinks, Workflow};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// fleet - launch, supervise and tear down a fleet of containerised web servers
#[derive(Parser, Debug)]
#[command(name = "fleet")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Config file (defaults to <config_dir>/fleet/fleet.json when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Number of containers to launch
    #[arg(short = 'n', long, global = true)]
    containers: Option<usize>,

    /// Host port of the first container
    #[arg(long, global = true)]
    starting_port: Option<u16>,

    /// Image to build and launch
    #[arg(long, global = true)]
    image: Option<String>,

    /// Port the server listens on inside each container
    #[arg(long, global = true)]
    exposed_port: Option<u16>,

    /// Dockerfile name, relative to the build context
    #[arg(long, global = true)]
    dockerfile: Option<String>,

    /// Image build context directory
    #[arg(long, global = true)]
    context: Option<PathBuf>,

    /// Report every n-th stats snapshot
    #[arg(long, global = true)]
    throttle: Option<u64>,

    /// Do not report container stats
    #[arg(long, global = true)]
    no_stats_display: bool,

    /// Do not write stats reports to the stats file
    #[arg(long, global = true)]
    no_stats_persist: bool,

    /// Launch the existing image without rebuilding it
    #[arg(long, global = true)]
    skip_build: bool,

    /// Directory for the ownership snapshot and log files
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Launch and supervise the fleet until it ends or Ctrl-C (default)
    Run,
    /// Stop containers left behind by a crashed run, then exit
    Recover,
    /// Remove stopped containers
    Prune,
    /// Print the effective configuration
    Config,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            requested_live_containers: self.containers,
            starting_host_port: self.starting_port,
            image_name: self.image.clone(),
            exposed_port: self.exposed_port,
            dockerfile: self.dockerfile.clone(),
            build_context: self.context.clone(),
            throttle_stats_input_requests: self.throttle,
            state_dir: self.state_dir.clone(),
            no_stats_display: self.no_stats_display,
            no_stats_persist: self.no_stats_persist,
            skip_build: self.skip_build,
        }
    }

    fn load_config(&self) -> anyhow::Result<AppConfig> {
        let mut config = AppConfig::load(self.config.as_deref())?;
        config.merge(self.overrides());
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = args.load_config()?;

    match args.command.unwrap_or(Command::Run) {
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Command::Prune => {
            let engine = DockerEngine::connect().await?;
            let pruned = engine.prune_containers().await?;
            tracing::info!("Containers pruned: {:?}", pruned);
            Ok(())
        }
        Command::Recover => {
            let workflow = open_workflow(config).await?;
            match workflow.recover().await? {
                Some(report) => tracing::info!(
                    "Recovered: {} stopped, {} failed",
                    report.stopped,
                    report.failed
                ),
                None => tracing::info!("Nothing to recover"),
            }
            Ok(())
        }
        Command::Run => {
            tracing::info!(
                "Requested {} containers from host port {}",
                config.requested_live_containers,
                config.starting_host_port
            );
            let workflow = open_workflow(config).await?;
            if let Err(e) = workflow.run().await {
                if e.is_fatal() {
                    tracing::error!("Fatal: {}", e);
                }
                return Err(e.into());
            }
            Ok(())
        }
    }
}

async fn open_workflow(config: AppConfig) -> anyhow::Result<Workflow> {
    let engine: Arc<dyn ContainerEngine> = Arc::new(DockerEngine::connect().await?);
    let sinks = Sinks::open(&config).await?;
    Ok(Workflow::new(config, engine, sinks)?)
}
