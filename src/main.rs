use clap::{Parser, Subcommand};
use dotenv::dotenv;
use stepflow_rs::stepflow::config::Config;
use stepflow_rs::stepflow::server::{self, AppState};
use stepflow_rs::stepflow::workflow::builder::Builder;
use stepflow_rs::stepflow::workflow::graph::{CompiledGraph, Engine};
use stepflow_rs::stepflow::workflow::registry::StepRegistry;
use stepflow_rs::stepflow::workflow::state::{PartialState, StateRecord};

use std::path::PathBuf;

type CliResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Checkpoint directory (overrides STEPFLOW_STORE_DIR)
    #[arg(long, global = true)]
    store_dir: Option<PathBuf>,

    /// Keep only the newest N checkpoints per session (overrides STEPFLOW_KEEP_LAST)
    #[arg(long, global = true)]
    keep_last: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run (or resume) a session of a workflow
    Run {
        /// Path to the workflow file
        #[arg(short, long)]
        file: String,

        /// Session id
        #[arg(short, long)]
        session: String,

        /// Initial state as a JSON object (used only for new sessions)
        #[arg(short, long)]
        input: Option<String>,

        /// Step ceiling for this run (overrides STEPFLOW_MAX_STEPS)
        #[arg(long)]
        max_steps: Option<usize>,
    },
    /// Show the latest checkpoint of a session
    State {
        #[arg(short, long)]
        session: String,

        /// Workflow file, to also report the next step
        #[arg(short, long)]
        file: Option<String>,
    },
    /// List a session's checkpoints, newest first
    History {
        #[arg(short, long)]
        session: String,
    },
    /// Record a manual state update attributed to a step
    Update {
        #[arg(short, long)]
        file: String,

        #[arg(short, long)]
        session: String,

        /// Step the update is recorded as
        #[arg(long)]
        as_step: String,

        /// Fields to overwrite, as a JSON object
        #[arg(long)]
        values: String,
    },
    /// List known sessions
    Sessions,
    /// Serve a workflow over HTTP
    Serve {
        #[arg(short, long)]
        file: String,

        /// Port to listen on (overrides STEPFLOW_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> CliResult<()> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();

    let mut config = Config::from_env()?;
    if let Some(dir) = args.store_dir {
        config.store_dir = Some(dir);
    }
    if let Some(n) = args.keep_last {
        config.keep_last = Some(n);
    }
    config.validate()?;
    if config.store_dir.is_none() && !matches!(args.command, Commands::Serve { .. }) {
        log::warn!("No checkpoint directory configured; checkpoints will not outlive this process");
    }

    let store = config.open_store().await?;

    match args.command {
        Commands::Run {
            file,
            session,
            input,
            max_steps,
        } => {
            if let Some(n) = max_steps {
                config.max_steps = n;
            }
            let graph = build_workflow(&file).await?;
            let initial = match input {
                Some(raw) => StateRecord::from_value(serde_json::from_str(&raw)?)?,
                None => StateRecord::new(),
            };

            let engine = Engine::new(store).with_config(config.engine_config());
            println!("Running workflow '{}' (session {})", graph.name(), session);
            let state = engine.run(&graph, initial, &session).await?;
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
        Commands::State { session, file } => {
            let engine = Engine::new(store);
            match engine.get_state(&session).await? {
                Some(checkpoint) => {
                    println!("{}", serde_json::to_string_pretty(checkpoint.as_ref())?);
                    if let Some(file) = file {
                        let graph = build_workflow(&file).await?;
                        match engine.next_step(&graph, &session).await? {
                            Some(next) => println!("Next step: {}", next),
                            None => println!("Session complete"),
                        }
                    }
                }
                None => println!("Session '{}' has no checkpoints", session),
            }
        }
        Commands::History { session } => {
            let history = Engine::new(store).get_history(&session).await?;
            println!("{} checkpoints for session '{}'", history.len(), session);
            for checkpoint in &history {
                println!(
                    "#{:<4} {:<24} {}{}",
                    checkpoint.sequence,
                    checkpoint.step_name,
                    checkpoint.timestamp.to_rfc3339(),
                    if checkpoint.manual { " (manual)" } else { "" }
                );
            }
        }
        Commands::Update {
            file,
            session,
            as_step,
            values,
        } => {
            let graph = build_workflow(&file).await?;
            let overrides = PartialState::from_value(serde_json::from_str(&values)?)?;
            let sequence = Engine::new(store)
                .update_state(&graph, &session, overrides, &as_step)
                .await?;
            println!("Recorded checkpoint {} as '{}'", sequence, as_step);
        }
        Commands::Sessions => {
            for session in store.sessions().await? {
                println!("{}", session);
            }
        }
        Commands::Serve { file, port } => {
            let graph = build_workflow(&file).await?;
            let port = port.unwrap_or(config.port);
            let state = AppState::new(store, graph, config.engine_config());
            server::serve(state, port).await?;
        }
    }

    Ok(())
}

async fn build_workflow(file: &str) -> CliResult<CompiledGraph> {
    let builder = Builder::new(StepRegistry::new());
    Ok(builder.build_workflow(file).await?)
}
