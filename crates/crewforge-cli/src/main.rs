use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::CrewforgeConfig;
use crewforge_core::bundle::{FileRecordSource, RecordSource};
use crewforge_core::events::{EventSink, NullSink};
use crewforge_core::providers::{HttpModelFactory, LlmProvider};
use crewforge_core::tools::ToolHandler;
use crewforge_core::vector::QdrantFactory;
use crewforge_core::{CrewBuilder, KeySet};
use crewforge_relay::{SocketClient, SocketConfig};

#[derive(Parser)]
#[command(name = "crewforge")]
#[command(version)]
#[command(about = "Assemble agent crews from stored records and stream their progress")]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a crew and run it, streaming results to the session room
    Run {
        /// Session whose room receives the results (generated if omitted)
        #[arg(short, long)]
        session: Option<String>,

        /// JSON file with the crew's records
        #[arg(short, long)]
        records: PathBuf,
    },

    /// Build a crew without running it and print what was assembled
    Check {
        /// JSON file with the crew's records
        #[arg(short, long)]
        records: PathBuf,
    },

    /// Initialize config directory and default config
    Init,

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let loaded = CrewforgeConfig::load(&cli.config);

    // Set up logging
    let filter = if cli.debug {
        "debug".to_string()
    } else {
        loaded
            .as_ref()
            .map(|c| c.logging.level.clone())
            .unwrap_or_else(|_| "info".to_string())
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Init => cmd_init().await,
        Commands::Config => cmd_config(loaded?).await,
        Commands::Run { session, records } => cmd_run(loaded?, session, &records).await,
        Commands::Check { records } => {
            let cfg = loaded.unwrap_or_else(|e| {
                warn!("Using default config: {:#}", e);
                CrewforgeConfig::default()
            });
            cmd_check(cfg, &records).await
        }
    }
}

async fn cmd_init() -> Result<()> {
    let config_dir = config::config_dir();
    tokio::fs::create_dir_all(&config_dir)
        .await
        .with_context(|| format!("Failed to create config dir: {}", config_dir.display()))?;

    let config_path = config::default_config_path();
    if config_path.exists() {
        warn!("Config already exists at {}", config_path.display());
    } else {
        let default_config = include_str!("../../../config/default.toml");
        tokio::fs::write(&config_path, default_config).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&config_path, std::fs::Permissions::from_mode(0o600))
                .await?;
        }
        info!("Created default config at {}", config_path.display());
    }

    println!("crewforge initialized at {}", config_dir.display());
    println!(
        "Edit {} or export SOCKET_URL, AGENT_BACKEND_SOCKET_TOKEN and QDRANT_HOST.",
        config_path.display()
    );
    Ok(())
}

async fn cmd_config(cfg: CrewforgeConfig) -> Result<()> {
    println!("{}", toml::to_string_pretty(&cfg.masked())?);
    Ok(())
}

fn model_factory(cfg: &CrewforgeConfig) -> Arc<HttpModelFactory> {
    Arc::new(HttpModelFactory::new().with_max_attempts(cfg.runtime.max_attempts))
}

async fn cmd_run(cfg: CrewforgeConfig, session: Option<String>, records: &Path) -> Result<()> {
    let session_id = session.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    info!("Starting crew run for session {}", session_id);

    let bundle = FileRecordSource::new(records).load(&session_id).await?;

    let socket = Arc::new(
        SocketClient::connect(&SocketConfig {
            url: cfg.socket.url.clone(),
            token: cfg.socket.token.clone(),
        })
        .await?,
    );
    socket.join_room(&session_id)?;

    let stores = Arc::new(QdrantFactory::new(&cfg.qdrant.url)?);
    let sink: Arc<dyn EventSink> = socket.clone();
    let mut builder = CrewBuilder::new(session_id.clone(), bundle, sink, stores)
        .with_model_factory(model_factory(&cfg));
    builder.build_crew();

    let output = tokio::select! {
        output = builder.run_crew() => output,
        _ = signal::ctrl_c() => {
            warn!("Interrupted, closing socket");
            None
        }
    };

    socket.close().await;

    match output {
        Some(output) => {
            info!(
                "Session {} finished: {} tasks, {} tokens",
                session_id,
                output.tasks_output.len(),
                output.usage.total_tokens()
            );
            println!("{}", output.raw);
        }
        None => warn!("Session {} produced no output", session_id),
    }
    Ok(())
}

async fn cmd_check(cfg: CrewforgeConfig, records: &Path) -> Result<()> {
    let bundle = FileRecordSource::new(records).load("check").await?;
    let stores = Arc::new(QdrantFactory::new(&cfg.qdrant.url)?);

    let mut builder = CrewBuilder::new("check", bundle, Arc::new(NullSink), stores)
        .with_model_factory(model_factory(&cfg));
    let crew = builder.build_crew();
    let (agent_count, task_count, process) = (crew.agents.len(), crew.tasks.len(), crew.process);

    println!("Crew {} ({} process)", builder.records().crew.id, process);

    println!("\nModels:");
    for (key, model) in builder.models().iter() {
        println!("  {:<10} {:<30} {}", model.kind(), model.model(), format_key(key));
    }

    println!("\nTools:");
    for (key, tool) in builder.tools().iter() {
        println!("  {:<40} {}", tool.name(), format_key(key));
    }

    println!("\nAgents ({}):", agent_count);
    for agent in builder.agents().values() {
        let model = agent
            .llm
            .as_ref()
            .map(|l| l.model().to_string())
            .unwrap_or_else(|| "(no model)".to_string());
        println!("  {} [{}] tools: {:?}", agent.role, model, agent.tools.names());
    }

    println!("\nTasks ({}):", task_count);
    for (i, task) in builder.tasks().values().enumerate() {
        let agent = task
            .agent
            .as_ref()
            .map(|a| a.role.as_str())
            .unwrap_or("(first agent)");
        println!("  {}. {} -> {}", i + 1, first_line(&task.description), agent);
    }

    Ok(())
}

fn format_key(key: &KeySet) -> String {
    let ids: Vec<&str> = key.iter().map(|id| id.as_str()).collect();
    format!("{{{}}}", ids.join(", "))
}

fn first_line(s: &str) -> &str {
    s.lines().next().unwrap_or_default()
}
