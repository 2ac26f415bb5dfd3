use clap::{Parser, Subcommand};
use env_logger::Env;
use serde_json::Value;
use std::path::PathBuf;
use taskbridge::bridges::{self, Bridge};
use taskbridge::config::{self, ExecutionMode, SupervisorConfig};
use taskbridge::{Handlers, RpcError, RpcResult, TaskSpec, TaskSupervisor, tasks};

/// Run tasks in-process or in a supervised worker process
#[derive(Parser)]
#[command(name = "taskbridge")]
#[command(version)]
#[command(about = "Run tasks in-process or in a supervised worker process")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a task, run its primary operation once and tear it down
    Run {
        /// Bridge to use (build, release, submit)
        bridge: String,

        /// Task implementation to run behind the bridge
        task: String,

        /// Options passed to the operation, as JSON
        #[arg(long, default_value = "{}")]
        options: String,

        /// Run the task in this process instead of a worker
        #[arg(long)]
        in_process: bool,

        /// Config file (default: $XDG_CONFIG_HOME/taskbridge/taskbridge.toml)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Worker program (default: taskbridge-worker next to this binary)
        #[arg(long)]
        worker: Option<PathBuf>,
    },
    /// List registered bridges and task implementations
    Tasks,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            bridge,
            task,
            options,
            in_process,
            config,
            worker,
        } => {
            let outcome = execute(&bridge, &task, &options, in_process, config, worker).await;

            match outcome {
                Ok(result) => match serde_json::to_string_pretty(&result) {
                    Ok(text) => println!("{}", text),
                    Err(e) => {
                        eprintln!("Error: {}", e);
                        std::process::exit(1);
                    }
                },
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Tasks => {
            println!("Bridges:");
            for bridge in bridges::all() {
                match bridge.progress_method() {
                    Some(progress) => println!(
                        "  {:<10} {} (progress: {})",
                        bridge.name(),
                        bridge.primary_method(),
                        progress
                    ),
                    None => println!("  {:<10} {}", bridge.name(), bridge.primary_method()),
                }
            }
            println!("Tasks:");
            for task in tasks::all() {
                println!("  {:<16} {}", task.name, task.description);
            }
        }
    }
}

async fn execute(
    bridge: &str,
    task: &str,
    options: &str,
    in_process: bool,
    config_path: Option<PathBuf>,
    worker: Option<PathBuf>,
) -> RpcResult<Value> {
    let options: Value = serde_json::from_str(options)
        .map_err(|e| RpcError::Config(format!("--options is not valid JSON: {e}")))?;

    let mut config = load_config(config_path)?;
    if in_process {
        config.mode = ExecutionMode::InProcess;
    }
    if let Some(worker) = worker {
        config.worker = Some(worker);
    }
    run(config, bridge, task, options).await
}

fn load_config(path: Option<PathBuf>) -> RpcResult<SupervisorConfig> {
    match path {
        Some(path) => config::load_config_file(&path)?.ok_or_else(|| {
            RpcError::Config(format!("config file {} does not exist", path.display()))
        }),
        None => Ok(config::load_user_config()?.unwrap_or_default()),
    }
}

async fn run(config: SupervisorConfig, bridge: &str, task: &str, options: Value) -> RpcResult<Value> {
    let supervisor = TaskSupervisor::new(config)?;
    let bridge = bridges::find(bridge)?;

    let handle = supervisor
        .create(TaskSpec::new(bridge.name(), task), logging_producer(bridge))
        .await?;
    let result = handle.call(bridge.primary_method(), vec![options]).await;
    let teardown = handle.teardown().await;

    let result = result?;
    teardown?;
    Ok(result)
}

/// Producer that logs every progress state the task reports.
fn logging_producer(bridge: &dyn Bridge) -> Handlers {
    match bridge.progress_method() {
        Some(method) => Handlers::new().on(method, move |args| async move {
            for state in args {
                log::info!(target: "taskbridge", "{}: {}", method, state);
            }
            Ok(Value::Null)
        }),
        None => Handlers::new(),
    }
}
