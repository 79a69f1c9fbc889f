//! CLI entry point for `datagen`.

use std::process::exit;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use datagen::config::Config;
use datagen::executor::TaskExecutor;
use datagen::introspect::SqlxIntrospector;
use datagen::model::Task;
use datagen::store::{InMemoryMetadataStore, MetadataStore};

#[derive(Parser, Debug)]
#[command(name = "datagen")]
#[command(about = "Rule-driven synthetic test-data generator", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Runs a task to completion, writing its output to the configured sink.
    Run {
        /// Path to a JSON-encoded task definition (see `datagen::model::Task`).
        task_file: std::path::PathBuf,
    },
    /// Generates a single preview record for a task without writing it anywhere.
    Preview {
        /// Path to a JSON-encoded task definition.
        task_file: std::path::PathBuf,
    },
}

fn main() {
    env_logger::init();
    sqlx::any::install_default_drivers();
    if let Err(err) = run() {
        eprintln!("error: {err}");
        exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        match args.command {
            Command::Run { task_file } => run_task_to_completion(&task_file).await,
            Command::Preview { task_file } => preview_task(&task_file).await,
        }
    })
}

fn load_task(task_file: &std::path::Path) -> Result<Task, Box<dyn std::error::Error>> {
    let contents = std::fs::read_to_string(task_file)?;
    Ok(serde_json::from_str(&contents)?)
}

async fn run_task_to_completion(task_file: &std::path::Path) -> Result<(), Box<dyn std::error::Error>> {
    let task = load_task(task_file)?;
    let config = Config::from_env();
    std::fs::create_dir_all(&config.generate_dir)?;

    let store: Arc<dyn MetadataStore> = Arc::new(InMemoryMetadataStore::new());
    let task_id = task.id;
    store.save_task(task).await?;

    let introspector = Arc::new(SqlxIntrospector);
    let executor = TaskExecutor::new(store.clone(), introspector, &config);
    executor.execute(task_id).await?;

    loop {
        let current = store.load_task(task_id).await?;
        match current.status {
            datagen::model::TaskStatus::Completed => {
                eprintln!("task {task_id} completed");
                return Ok(());
            }
            datagen::model::TaskStatus::Failed => {
                return Err(format!("task {task_id} failed: {}", current.error_msg).into());
            }
            _ => tokio::time::sleep(std::time::Duration::from_millis(200)).await,
        }
    }
}

async fn preview_task(task_file: &std::path::Path) -> Result<(), Box<dyn std::error::Error>> {
    let task = load_task(task_file)?;
    let config = Config::from_env();
    let store: Arc<dyn MetadataStore> = Arc::new(InMemoryMetadataStore::new());
    let introspector = Arc::new(SqlxIntrospector);
    let executor = TaskExecutor::new(store, introspector, &config);

    let preview = executor.generate_preview_data(&task).await?;
    println!("{}", serde_json::to_string_pretty(&preview)?);
    Ok(())
}
