use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tokio::io::AsyncReadExt;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use stratus_common::ObjectStore;
use stratus_store::{from_config, StoreConfig};

const DEFAULT_CONFIG_PATH: &str = "stratus.toml";
/// S3 rejects non-final parts smaller than 5 MiB.
const DEFAULT_PART_SIZE: usize = 5 * 1024 * 1024;

#[derive(Parser)]
#[command(name = "stratus", about = "Object storage over a local directory or S3", version)]
struct Cli {
    /// Backend configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload a file as one object
    Put { key: String, file: PathBuf },
    /// Download an object (to stdout when no output file is given)
    Get { key: String, out: Option<PathBuf> },
    /// Delete an object
    Rm { key: String },
    /// Check whether an object exists
    Exists { key: String },
    /// Print an access URL
    Url {
        key: String,
        /// Lifetime of a temporary URL in seconds
        #[arg(long, default_value_t = 3600)]
        expires: u64,
        /// Make the object public and print a permanent URL
        #[arg(long)]
        permanent: bool,
    },
    /// Upload a file through a multipart session
    MultipartPut {
        key: String,
        file: PathBuf,
        #[arg(long, default_value_t = DEFAULT_PART_SIZE)]
        part_size: usize,
    },
    /// List the parts of an upload session
    Parts {
        key: String,
        upload_id: String,
        #[arg(long, default_value_t = 0)]
        max_parts: u32,
    },
    /// Abort an upload session
    Abort { key: String, upload_id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = StoreConfig::load(&cli.config)?;
    let store = from_config(&config.backend)?;
    info!(backend = store.name(), "stratus ready");

    match cli.command {
        Command::Put { key, file } => {
            let mut src = tokio::fs::File::open(&file)
                .await
                .with_context(|| format!("Failed to open {}", file.display()))?;
            store.upload(&key, &mut src).await?;
            info!(key = %key, "Uploaded");
        }
        Command::Get { key, out } => {
            let mut reader = store.download(&key).await?;
            match out {
                Some(path) => {
                    let mut dst = tokio::fs::File::create(&path)
                        .await
                        .with_context(|| format!("Failed to create {}", path.display()))?;
                    let n = tokio::io::copy(&mut reader, &mut dst).await?;
                    info!(key = %key, bytes = n, path = %path.display(), "Downloaded");
                }
                None => {
                    tokio::io::copy(&mut reader, &mut tokio::io::stdout()).await?;
                }
            }
        }
        Command::Rm { key } => {
            store.delete(&key).await?;
            info!(key = %key, "Deleted");
        }
        Command::Exists { key } => {
            println!("{}", store.exists(&key).await?);
        }
        Command::Url { key, expires, permanent } => {
            let url = if permanent {
                store.generate_permanent_url(&key).await?
            } else {
                store.generate_temporary_url(&key, Duration::from_secs(expires)).await?
            };
            println!("{}", url);
        }
        Command::MultipartPut { key, file, part_size } => {
            let etag = multipart_put(store.as_ref(), &key, &file, part_size).await?;
            info!(key = %key, etag = %etag, "Multipart upload complete");
        }
        Command::Parts { key, upload_id, max_parts } => {
            let parts = store.list_parts(&key, &upload_id, max_parts).await?;
            println!("{}", serde_json::to_string_pretty(&parts)?);
        }
        Command::Abort { key, upload_id } => {
            store.abort_multipart_upload(&key, &upload_id).await?;
            info!(key = %key, upload_id = %upload_id, "Aborted");
        }
    }

    Ok(())
}

/// Split `file` into `part_size` chunks and upload them as one session.
/// The session is aborted if any step before completion fails.
async fn multipart_put(
    store: &dyn ObjectStore,
    key: &str,
    file: &Path,
    part_size: usize,
) -> anyhow::Result<String> {
    if part_size == 0 {
        bail!("part size must be greater than zero");
    }
    let mut src = tokio::fs::File::open(file)
        .await
        .with_context(|| format!("Failed to open {}", file.display()))?;

    let upload_id = store.create_multipart_upload(key).await?;
    info!(key = %key, upload_id = %upload_id, "Multipart upload started");

    let uploaded = upload_parts(store, key, &upload_id, &mut src, part_size).await;
    let result = match uploaded {
        Ok(count) => store
            .complete_multipart_upload(key, &upload_id, count)
            .await
            .map_err(anyhow::Error::from),
        Err(e) => Err(e),
    };

    if let Err(e) = &result {
        error!(upload_id = %upload_id, error = %e, "Multipart upload failed, aborting");
        if let Err(abort_err) = store.abort_multipart_upload(key, &upload_id).await {
            error!(upload_id = %upload_id, error = %abort_err, "Abort failed");
        }
    }
    result
}

async fn upload_parts(
    store: &dyn ObjectStore,
    key: &str,
    upload_id: &str,
    src: &mut tokio::fs::File,
    part_size: usize,
) -> anyhow::Result<u32> {
    let mut part_number = 0u32;
    loop {
        let mut chunk = Vec::with_capacity(part_size);
        let n = (&mut *src).take(part_size as u64).read_to_end(&mut chunk).await?;
        // An empty file still becomes one (empty) part.
        if n == 0 && part_number > 0 {
            break;
        }
        part_number += 1;

        let mut cursor = Cursor::new(chunk);
        let etag = store.upload_part(key, upload_id, part_number, &mut cursor).await?;
        info!(part_number, bytes = n, etag = %etag, "Part uploaded");

        if n < part_size {
            break;
        }
    }
    Ok(part_number)
}
