use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio::io::AsyncReadExt;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use campusdb::engine::{Engine, EngineConfig, EngineError};
use campusdb::ingestion::parser_for_path;
use campusdb::metrics;
use campusdb::query::ExecutionConfig;
use campusdb::storage::DatasetKind;

/// campusdb - query course sections and campus rooms
#[derive(Parser, Debug)]
#[command(name = "campusdb")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Directory holding dataset files
    #[arg(long, global = true, default_value = "./data")]
    data_dir: PathBuf,

    /// Largest number of rows a query may return
    #[arg(long, global = true, default_value_t = 5000)]
    max_rows: usize,

    /// Serve Prometheus metrics on this address
    #[arg(long, global = true)]
    metrics_addr: Option<SocketAddr>,

    #[arg(long, global = true, default_value = "info")]
    log_level: Level,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Add a dataset from a JSON or CSV file of records
    Add {
        id: String,
        /// sections or rooms
        kind: DatasetKind,
        file: PathBuf,
    },
    /// Remove a dataset
    Remove { id: String },
    /// List stored datasets
    List,
    /// Run a query read from a file, or from stdin when the path is "-"
    Query { source: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // stdout is reserved for results
    FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Some(addr) = cli.metrics_addr {
        match metrics::init_metrics(addr) {
            Ok(()) => info!("Metrics server listening on {}", addr),
            Err(e) => warn!("Failed to initialize metrics: {}", e),
        }
    }

    let config = EngineConfig {
        data_dir: cli.data_dir.clone(),
        execution: ExecutionConfig {
            max_result_rows: cli.max_rows,
        },
    };

    match run(cli.command, config).await {
        Ok(result) => {
            println!("{}", json!({ "result": result }));
            ExitCode::SUCCESS
        }
        Err(e) => {
            println!("{}", json!({ "error": e.to_string(), "kind": e.category() }));
            match e {
                EngineError::NotFound(_) => ExitCode::from(2),
                _ => ExitCode::from(1),
            }
        }
    }
}

async fn run(command: Command, config: EngineConfig) -> Result<Value, EngineError> {
    let engine = Engine::open(config).await?;

    match command {
        Command::Add { id, kind, file } => {
            let bytes = read_input(&file).await?;
            let parser = parser_for_path(&file).ok_or_else(|| {
                EngineError::Validation(format!("Unsupported dataset file: {}", file.display()))
            })?;
            let records = parser
                .parse(&bytes, kind)
                .map_err(|e| EngineError::Validation(e.to_string()))?;
            let ids = engine.add_dataset(&id, kind, records).await?;
            Ok(json!(ids))
        }
        Command::Remove { id } => Ok(json!(engine.remove_dataset(&id).await?)),
        Command::List => Ok(json!(engine.list_datasets().await)),
        Command::Query { source } => {
            let bytes = if source == "-" {
                let mut buf = Vec::new();
                tokio::io::stdin()
                    .read_to_end(&mut buf)
                    .await
                    .map_err(|e| EngineError::Internal(e.to_string()))?;
                buf
            } else {
                read_input(Path::new(&source)).await?
            };
            let query: Value = serde_json::from_slice(&bytes)
                .map_err(|_| EngineError::Validation("Invalid query string".to_string()))?;
            let rows = engine.perform_query(&query).await?;
            Ok(json!(rows))
        }
    }
}

async fn read_input(path: &Path) -> Result<Vec<u8>, EngineError> {
    tokio::fs::read(path)
        .await
        .map_err(|e| EngineError::Validation(format!("Cannot read {}: {}", path.display(), e)))
}
