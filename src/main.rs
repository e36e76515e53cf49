//! Clipforge - HTTP media optimizer
//!
//! Entry point for the service and its local command-line companions.

use anyhow::Result;
use clap::Parser;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use clipforge::cli::{self, Args, Commands};
use clipforge::config::Config;
use clipforge::context::RunContext;
use clipforge::error::ForgeError;
use clipforge::logging;
use clipforge::media::RunnerFactory;
use clipforge::orchestrator::Orchestrator;
use clipforge::output;
use clipforge::pipeline::OutputFormat;
use clipforge::request::ProcessingRequest;
use clipforge::server::{self, AppState};
use clipforge::upload::Upload;

const DEFAULT_CONFIG_FILE: &str = "clipforge.toml";

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = logging::init(args.verbose, &std::env::current_dir()?)?;

    let config = match &args.config {
        Some(config_path) => Config::from_file(config_path)?,
        None => {
            if Path::new(DEFAULT_CONFIG_FILE).exists() {
                info!("Found {} in current directory, loading...", DEFAULT_CONFIG_FILE);
                Config::from_file(DEFAULT_CONFIG_FILE)?
            } else {
                Config::default()
            }
        }
    };

    let runner = RunnerFactory::create_runner(config.media.clone());
    let orchestrator = Arc::new(Orchestrator::new(runner, config.media.clone()));

    match args.command {
        Commands::Serve { bind } => {
            let mut config = config;
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            let bind = config.server.bind.clone();
            let app = server::router(AppState {
                config: Arc::new(config),
                orchestrator,
            });

            let listener = tokio::net::TcpListener::bind(&bind).await?;
            info!("Listening on http://{}", listener.local_addr()?);
            axum::serve(listener, app).await?;
        }
        Commands::Process { input, output_dir, set } => {
            info!("Processing file: {}", input.display());
            let fields = cli::parse_fields(&set)?;
            let request = ProcessingRequest::from_fields(&fields, &config.defaults);
            let summary = process_local(&orchestrator, &input, &output_dir, &request).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Probe => {
            let listing = orchestrator.runner().capabilities().await?;
            print!("{}", listing);
        }
    }

    Ok(())
}

#[derive(Serialize)]
struct ProcessSummary {
    request_id: String,
    delivered: PathBuf,
    content_type: &'static str,
    artifacts: Vec<ArtifactSummary>,
}

#[derive(Serialize)]
struct ArtifactSummary {
    format: OutputFormat,
    name: String,
    content_type: &'static str,
}

/// Run one local file through the same pipeline the HTTP endpoint uses
async fn process_local(
    orchestrator: &Orchestrator,
    input: &Path,
    output_dir: &Path,
    request: &ProcessingRequest,
) -> Result<ProcessSummary> {
    let declared = input
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| ForgeError::Validation(format!("not a file: {}", input.display())))?;

    let ctx = RunContext::new()?;
    let upload = Upload::prepare(ctx.path(), &declared);
    tokio::fs::copy(input, &upload.path).await?;

    let artifacts = orchestrator.process(&ctx, &upload, request).await?;
    let delivery = output::aggregate(&ctx, &upload.stem(), &artifacts).await?;

    tokio::fs::create_dir_all(output_dir).await?;
    let file_name = delivery
        .path()
        .file_name()
        .ok_or_else(|| ForgeError::Aggregation("delivery has no file name".to_string()))?;
    let delivered = output_dir.join(file_name);
    tokio::fs::copy(delivery.path(), &delivered).await?;
    info!("Delivered {}", delivered.display());

    let artifacts = artifacts
        .iter()
        .map(|a| ArtifactSummary {
            format: a.format,
            name: a.file_name(),
            content_type: a.content_type,
        })
        .collect();

    Ok(ProcessSummary {
        request_id: ctx.request_id().to_string(),
        delivered,
        content_type: delivery.content_type(),
        artifacts,
    })
}
