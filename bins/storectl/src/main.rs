//! Client Portal storage CLI
//!
//! Drives the object storage client from the command line using the same
//! configuration as the portal services.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use portal_core::storage::{
    StorageClient, StorageClientConfig, StorageObject, UploadBody, UploadOptions,
};
use portal_core::uploads::UserUploads;
use portal_shared::AppConfig;

#[derive(Debug, Parser)]
#[command(name = "storectl", about = "Client Portal object storage tool")]
struct Cli {
    /// Emit logs as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Upload a local file.
    Upload {
        /// Storage key.
        key: String,
        /// Local file to upload.
        file: PathBuf,
        /// Explicit content type.
        #[arg(long)]
        content_type: Option<String>,
        /// Metadata entry as key=value. Repeatable.
        #[arg(long = "meta", value_parser = parse_meta)]
        meta: Vec<(String, String)>,
    },
    /// Download an object to a local file.
    Download {
        /// Storage key.
        key: String,
        /// Output path.
        out: PathBuf,
        /// Stream directly instead of materializing first.
        #[arg(long)]
        stream: bool,
    },
    /// Print the URL for an object.
    Url {
        /// Storage key.
        key: String,
    },
    /// Print a signed URL that downloads as `<name>.<ext>`.
    FriendlyUrl {
        /// Storage key.
        key: String,
        /// Download file name without extension.
        name: String,
        /// Download file extension.
        ext: String,
    },
    /// Delete an object.
    Delete {
        /// Storage key.
        key: String,
    },
    /// Store a file under a fresh user upload key and print its link.
    UserUpload {
        /// Owning user ID.
        user_id: i64,
        /// Local file to upload. Its extension is kept.
        file: PathBuf,
    },
}

fn parse_meta(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "storectl=debug,portal_core=debug".into());
    if cli.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    // Load configuration
    let config = AppConfig::load().context("Failed to load configuration")?;
    let client = StorageClient::new(StorageClientConfig::from(&config.storage))
        .context("Failed to create storage client")?;
    info!(bucket = %client.bucket(), "Storage client ready");

    run(&config, &client, cli.command).await
}

async fn run(config: &AppConfig, client: &StorageClient, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Upload {
            key,
            file,
            content_type,
            meta,
        } => {
            let source = File::open(&file)
                .await
                .with_context(|| format!("Failed to open {}", file.display()))?;
            let options = UploadOptions {
                content_type,
                metadata: meta.into_iter().collect::<HashMap<_, _>>(),
            };
            client
                .upload(&key, UploadBody::from_reader(source), options)
                .await?;
            info!(key = %key, "Uploaded");
        }
        Command::Download { key, out, stream } => {
            let mut object = client.download(&key, !stream).await?;
            let written = copy_to_file(&mut object, &out).await;
            object.close().await?;
            let written = written?;
            info!(key = %key, bytes = written, path = %out.display(), "Downloaded");
        }
        Command::Url { key } => {
            println!("{}", client.url(&key).await?);
        }
        Command::FriendlyUrl { key, name, ext } => {
            if name.is_empty() {
                bail!("download name must not be empty");
            }
            println!("{}", client.friendly_url(&key, &name, &ext).await?);
        }
        Command::Delete { key } => {
            client.delete(&key).await?;
            info!(key = %key, "Deleted");
        }
        Command::UserUpload { user_id, file } => {
            let ext = file
                .extension()
                .and_then(|ext| ext.to_str())
                .with_context(|| format!("{} has no file extension", file.display()))?;
            let uploads = UserUploads::from_app_config(config)
                .context("Failed to create user upload store")?;
            let source = File::open(&file)
                .await
                .with_context(|| format!("Failed to open {}", file.display()))?;
            let key = uploads
                .store(user_id, ext, UploadBody::from_reader(source))
                .await?;
            println!("{key}");
            println!("{}", uploads.url(&key).await?);
        }
    }
    Ok(())
}

async fn copy_to_file(object: &mut StorageObject, out: &Path) -> anyhow::Result<u64> {
    let mut file = File::create(out)
        .await
        .with_context(|| format!("Failed to create {}", out.display()))?;
    let written = tokio::io::copy(object, &mut file).await?;
    file.flush().await?;
    Ok(written)
}
