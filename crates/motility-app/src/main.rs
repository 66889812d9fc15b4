//! `motility` command-line driver.
//!
//! Startup order:
//! 1. Read configuration from `MOTILITY_*` variables.
//! 2. Install the tracing subscriber.
//! 3. Open the record store (file-backed when `MOTILITY_DATA_DIR` is set).
//! 4. Resume interrupted work, then run the requested command.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use motility_app::{AppConfig, LifecycleError, LifecycleManager, app_version};
use motility_client::{ExportFormat, HttpJobClient};
use motility_core::{AnalysisParameters, AnalysisRecord, InputRef, RecordId};
use motility_store::{
    JsonFileKeyValueStore, KeyValueStore, LifecycleStore, MemoryKeyValueStore, StoreEvent,
};
use serde_json::Value;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "motility", version = motility_app::APP_VERSION, about = "Sperm motility analysis client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Upload a video and follow the analysis until it ends.
    Submit {
        /// Path of the video file.
        video: PathBuf,
        /// Analysis parameter as KEY=VALUE; VALUE is read as JSON when it parses.
        #[arg(long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,
        /// MIME type of the video (default video/mp4).
        #[arg(long)]
        mime: Option<String>,
        /// Return once the upload is accepted instead of waiting for results.
        #[arg(long)]
        no_wait: bool,
    },
    /// List local analyses, newest first.
    List,
    /// Print one analysis as JSON.
    Show {
        /// Record id.
        id: String,
    },
    /// Cancel a running analysis.
    Cancel {
        /// Record id.
        id: String,
    },
    /// Delete an analysis locally and on the server.
    Delete {
        /// Record id.
        id: String,
    },
    /// Submit a failed analysis again.
    Retry {
        /// Record id.
        id: String,
    },
    /// Download the results of a completed analysis.
    Download {
        /// Record id.
        id: String,
        /// Export format: json, csv or xlsx.
        #[arg(long, default_value = "json")]
        format: String,
        /// Output file.
        #[arg(long)]
        output: PathBuf,
    },
    /// Refresh and print the server-side history.
    History,
    /// Print server statistics.
    Stats,
    /// Check that the server is reachable.
    Health,
    /// Remove every local analysis.
    Clear,
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = AppConfig::from_env();
    init_tracing(&config);
    let cli = Cli::parse();

    match run(cli.command, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::debug!(error = %error, "command failed");
            eprintln!("error: {}", error.user_message());
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(config: &AppConfig) {
    let filter = match config.log_level.parse::<EnvFilter>() {
        Ok(filter) => filter,
        Err(error) => {
            eprintln!(
                "WARN: MOTILITY_LOG='{}' is not a valid tracing filter ({error}); falling back to 'info'",
                config.log_level
            );
            EnvFilter::new("info")
        }
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if config.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

async fn run(command: Command, config: &AppConfig) -> Result<(), LifecycleError> {
    info!(version = app_version(), server = %config.server_url, "motility starting");

    let backend: Arc<dyn KeyValueStore> = match &config.data_dir {
        Some(dir) => Arc::new(JsonFileKeyValueStore::open(dir)?),
        None => Arc::new(MemoryKeyValueStore::new()),
    };
    let store = Arc::new(LifecycleStore::open(backend));
    let client = Arc::new(HttpJobClient::new(config.client_config()?)?);
    let manager = LifecycleManager::new(store, client, config.manager_config());

    let outcome = dispatch(&manager, command).await;
    manager.dispose();
    outcome
}

async fn dispatch(manager: &LifecycleManager, command: Command) -> Result<(), LifecycleError> {
    match command {
        Command::Submit {
            video,
            params,
            mime,
            no_wait,
        } => {
            manager.init();
            submit_and_follow(manager, video, &params, mime, no_wait).await
        }
        Command::List => {
            for record in manager.list() {
                println!("{}", summary_line(&record));
            }
            Ok(())
        }
        Command::Show { id } => {
            let id = parse_id(&id)?;
            let record = manager
                .get(&id)
                .ok_or_else(|| LifecycleError::NotFound(id.clone()))?;
            print_json(&record);
            Ok(())
        }
        Command::Cancel { id } => manager.cancel(&parse_id(&id)?).await,
        Command::Delete { id } => {
            manager.delete(&parse_id(&id)?).await;
            Ok(())
        }
        Command::Retry { id } => {
            let id = manager.retry(&parse_id(&id)?).await?;
            println!("resubmitted as {id}");
            follow(manager, &id).await;
            Ok(())
        }
        Command::Download { id, format, output } => {
            let format: ExportFormat = format.parse().map_err(|_| {
                LifecycleError::InvalidInput(format!("Unsupported export format: {format}"))
            })?;
            let bytes = manager.download_results(&parse_id(&id)?, format).await?;
            tokio::fs::write(&output, &bytes)
                .await
                .map_err(|source| LifecycleError::Export {
                    path: output.display().to_string(),
                    source,
                })?;
            println!("wrote {} bytes to {}", bytes.len(), output.display());
            Ok(())
        }
        Command::History => {
            manager.refresh_history().await?;
            for entry in manager.store().history() {
                println!("{}  {:<10}  {}", entry.remote_id, entry.state, entry.created_at);
            }
            Ok(())
        }
        Command::Stats => {
            print_json(&manager.load_statistics().await?);
            Ok(())
        }
        Command::Health => {
            let report = manager.check_server_status().await;
            match report.latency {
                Some(latency) => println!("{} ({} ms)", report.message, latency.as_millis()),
                None => println!("{}", report.message),
            }
            Ok(())
        }
        Command::Clear => {
            manager.clear_all();
            Ok(())
        }
    }
}

async fn submit_and_follow(
    manager: &LifecycleManager,
    video: PathBuf,
    params: &[String],
    mime: Option<String>,
    no_wait: bool,
) -> Result<(), LifecycleError> {
    let mut input = InputRef::new(video.display().to_string());
    if let Some(name) = video.file_name() {
        input = input.with_file_name(name.to_string_lossy());
    }
    if let Some(mime) = mime {
        input = input.with_mime_type(mime);
    }

    let id = manager.submit(input, parse_parameters(params)).await?;
    println!("submitted {id}");
    if !no_wait {
        follow(manager, &id).await;
    }
    Ok(())
}

async fn follow(manager: &LifecycleManager, id: &RecordId) {
    let (subscription, mut events) = manager.store().subscribe_channel();
    if let Some(record) = manager.get(id) {
        println!("{}", summary_line(&record));
        if record.is_terminal() {
            manager.store().unsubscribe(subscription);
            return;
        }
    }

    while let Some(event) = events.recv().await {
        let StoreEvent::Updated(record) = event else {
            continue;
        };
        if &record.id != id {
            continue;
        }
        println!("{}", summary_line(&record));
        if record.is_terminal() {
            if let Some(result) = &record.result {
                print_json(&result.summary);
            }
            break;
        }
    }
    manager.store().unsubscribe(subscription);
}

fn summary_line(record: &AnalysisRecord) -> String {
    let message = record
        .error
        .as_ref()
        .map(|cause| cause.message.as_str())
        .or(record.message.as_deref())
        .unwrap_or("");
    format!(
        "{}  {:<10}  upload {:>3}%  analysis {:>3}%  {}",
        record.id, record.state, record.upload_progress, record.progress, message
    )
}

fn parse_id(raw: &str) -> Result<RecordId, LifecycleError> {
    RecordId::new(raw.trim())
        .map_err(|_| LifecycleError::InvalidInput("Analysis id must not be empty".to_string()))
}

fn parse_parameters(pairs: &[String]) -> AnalysisParameters {
    pairs
        .iter()
        .filter_map(|pair| pair.split_once('='))
        .fold(AnalysisParameters::new(), |parameters, (key, raw)| {
            let value = serde_json::from_str::<Value>(raw)
                .unwrap_or_else(|_| Value::String(raw.to_string()));
            parameters.with(key.trim(), value)
        })
}

fn print_json(value: &impl serde::Serialize) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(error) => eprintln!("error: cannot render output: {error}"),
    }
}
