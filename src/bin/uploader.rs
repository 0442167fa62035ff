use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use rust_chunked_upload::client::{
    ChunkTransport, HttpTransport, ProgressCallback, ProgressEvent, Uploader, UploaderConfig,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "uploader", about = "Send files to a chunked upload receiver")]
struct Cli {
    /// Receiver base URL
    #[arg(long, env = "UPLOAD_ENDPOINT", default_value = "http://127.0.0.1:3000", global = true)]
    endpoint: String,

    /// Bearer token for the receiver
    #[arg(long, env = "UPLOAD_TOKEN", global = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload a file
    Send {
        file: PathBuf,

        /// Where the receiver should store the finished file
        #[arg(long)]
        destination: String,

        #[arg(long, default_value_t = 3)]
        concurrency: usize,

        /// Fixed chunk size in bytes; disables adaptive sizing
        #[arg(long)]
        chunk_size: Option<usize>,

        #[arg(long, default_value_t = 3)]
        attempts: u32,

        #[arg(long)]
        no_compress: bool,

        /// Resume a staged session instead of starting a new one
        #[arg(long)]
        session_id: Option<String>,
    },
    /// Show the progress of a session
    Status { session_id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "uploader=info,rust_chunked_upload=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let transport = Arc::new(HttpTransport::new(cli.endpoint.clone(), cli.token.clone()));

    match cli.command {
        Command::Status { session_id } => {
            let status = transport
                .status(&session_id)
                .await
                .map_err(|e| anyhow::anyhow!("status request failed: {}", e))?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Command::Send {
            file,
            destination,
            concurrency,
            chunk_size,
            attempts,
            no_compress,
            session_id,
        } => {
            let mut config = UploaderConfig {
                concurrency,
                max_attempts: attempts,
                compress: !no_compress,
                ..UploaderConfig::default()
            };
            if let Some(size) = chunk_size {
                config.chunk_size = size;
                config.adaptive = None;
            }

            let uploader = Uploader::new(config, transport);
            let abort = uploader.abort_handle();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("⌨️  Ctrl+C received, aborting upload...");
                    abort.abort();
                }
            });

            let progress: ProgressCallback = Arc::new(|event| match event {
                ProgressEvent::ChunkCompleted {
                    completed_count,
                    total_chunks,
                    just_completed_index,
                } => info!(
                    "📤 Chunk {} done ({}/{})",
                    just_completed_index, completed_count, total_chunks
                ),
                ProgressEvent::ChunkRetrying {
                    index,
                    attempt,
                    error,
                } => warn!("🔁 Chunk {} attempt {} failed: {}", index, attempt, error),
                ProgressEvent::Completing => info!("🔄 All chunks sent, completing..."),
            });

            info!("🚀 Uploading {}", file.display());
            let result = match session_id {
                Some(id) => {
                    uploader
                        .resume_file(&file, &id, &destination, Some(progress))
                        .await
                }
                None => uploader.upload_file(&file, &destination, Some(progress)).await,
            };

            match result {
                Ok(done) => {
                    info!(
                        "✅ Stored {} ({} bytes, {} chunks) in {} ms",
                        done.destination_path, done.file_size, done.chunk_count, done.elapsed_ms
                    );
                    println!("{}", serde_json::to_string_pretty(&done)?);
                }
                Err(e) => {
                    error!("❌ Upload failed: {}", e);
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}
