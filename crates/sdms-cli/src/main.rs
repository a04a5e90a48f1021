//! SDMS CLI: signed URLs, SAS tokens and blob I/O against a data partition.
//!
//! Reads the storage configuration from the environment (see `.env`). Naming a
//! storage account selects Azure; without one, blobs live in memory for a single
//! invocation (`STORAGE_BACKEND` overrides either way).

use anyhow::Context;
use bytes::Bytes;
use chrono::Utc;
use clap::{Parser, Subcommand};
use sdms_cli::{build_service, execution_context, expiration_after, parse_location, run_smoke};
use sdms_core::Config;
use sdms_infra::{init_telemetry, shutdown_telemetry, TelemetryConfig};
use sdms_storage::{
    create_connector, BlobReader, DownloadUrlOptions, SasTokenOptions, UploadUrlOptions,
    WriteOptions,
};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "sdms", about = "SDMS storage CLI")]
struct Cli {
    /// Data partition id (defaults to DATA_PARTITION_ID)
    #[arg(long, global = true)]
    partition: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct LocationArgs {
    /// Location type: DataLargeBlob, DataSavedTransfers, TemporaryLargeBlob, TemporaryTransferInProgress
    #[arg(long, default_value = "TemporaryLargeBlob")]
    location_type: String,
    /// File name inside the folder (empty addresses the folder)
    #[arg(long, default_value = "")]
    file_name: String,
    #[arg(long)]
    folder: Option<String>,
    /// Minutes until the nominal expiration (defaults to URL_EXPIRATION_MINUTES)
    #[arg(long)]
    expires_in: Option<i64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a SAS token for a blob
    SasToken {
        #[command(flatten)]
        location: LocationArgs,
    },
    /// Generate a signed upload URL
    UploadUrl {
        #[command(flatten)]
        location: LocationArgs,
        /// Sign for the whole container
        #[arg(long)]
        batch: bool,
    },
    /// Generate a signed download URL
    DownloadUrl {
        #[command(flatten)]
        location: LocationArgs,
        /// Sign for the whole container
        #[arg(long)]
        batch: bool,
    },
    /// Upload a local file
    Write {
        #[command(flatten)]
        location: LocationArgs,
        /// Path to the file to upload
        file: std::path::PathBuf,
        /// Overwrite an existing blob
        #[arg(long)]
        overwrite: bool,
    },
    /// Read a blob and print it
    Read {
        #[command(flatten)]
        location: LocationArgs,
    },
    /// Write, read back and sign a sample blob
    Smoke,
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize response")?;
    println!("{}", out);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::from_env().context("Failed to load configuration")?;
    if let Some(partition) = cli.partition {
        config.data_partition_id = partition;
    }

    init_telemetry(&TelemetryConfig::from_config(&config))
        .map_err(|e| anyhow::anyhow!("Failed to initialize telemetry: {}", e))?;

    let connector = create_connector(&config).context("Failed to create blob provider")?;
    let service = build_service(connector);
    let context = execution_context(&config);
    let now = Utc::now();

    let resolve = |args: &LocationArgs| -> anyhow::Result<_> {
        let location = parse_location(&args.location_type, &args.file_name, args.folder.as_deref())?;
        let expiration =
            expiration_after(now, args.expires_in.unwrap_or(config.url_expiration_minutes));
        Ok((location, expiration))
    };

    match cli.command {
        Commands::SasToken { location } => {
            let (location, expiration) = resolve(&location)?;
            let token = service
                .generate_sas_token(&context, &location, &SasTokenOptions { start: now, expiration })
                .await?;
            print_json(&serde_json::json!({ "sas_token": token }))?;
        }
        Commands::UploadUrl { location, batch } => {
            let (location, expiration) = resolve(&location)?;
            let url = service
                .generate_upload_url(
                    &context,
                    &location,
                    &UploadUrlOptions {
                        start: now,
                        expiration,
                        batch_upload: batch,
                        start_resumable: false,
                    },
                )
                .await?;
            print_json(&serde_json::json!({ "upload_url": url }))?;
        }
        Commands::DownloadUrl { location, batch } => {
            let (location, expiration) = resolve(&location)?;
            let url = service
                .generate_download_url(
                    &context,
                    &location,
                    &DownloadUrlOptions {
                        start: now,
                        expiration,
                        batch_download: batch,
                    },
                )
                .await?;
            print_json(&serde_json::json!({ "download_url": url }))?;
        }
        Commands::Write {
            location,
            file,
            overwrite,
        } => {
            let (location, _) = resolve(&location)?;
            service.create_container(&context, &location).await?;

            if overwrite {
                let handle = tokio::fs::File::open(&file)
                    .await
                    .with_context(|| format!("Open {}", file.display()))?;
                let length = handle.metadata().await?.len();
                let reader: BlobReader = Box::pin(handle);
                let result = service
                    .write(
                        &context,
                        &location,
                        reader,
                        Some(WriteOptions::with_content_length(length)),
                    )
                    .await?;
                print_json(&result)?;
            } else {
                let data = tokio::fs::read(&file)
                    .await
                    .with_context(|| format!("Read {}", file.display()))?;
                service
                    .write_buffer(&context, &location, Bytes::from(data), false)
                    .await?;
                print_json(&serde_json::json!({ "written": location.blob_path() }))?;
            }
        }
        Commands::Read { location } => {
            let (location, _) = resolve(&location)?;
            let data = service.read_buffer(&context, &location).await?;
            print_json(&serde_json::json!({
                "blob": location.blob_path(),
                "content": String::from_utf8_lossy(&data),
            }))?;
        }
        Commands::Smoke => {
            let report = run_smoke(&service, &context, now, config.url_expiration_minutes).await?;
            print_json(&report)?;
        }
    }

    shutdown_telemetry().await;
    Ok(())
}
