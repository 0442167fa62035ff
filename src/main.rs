use dotenvy::dotenv;
use rust_chunked_upload::config::UploadConfig;
use rust_chunked_upload::services::session_store::FsSessionStore;
use rust_chunked_upload::services::staging::StagingArea;
use rust_chunked_upload::services::storage::LocalFinalStorage;
use rust_chunked_upload::services::upload_service::UploadService;
use rust_chunked_upload::services::worker::BackgroundWorker;
use rust_chunked_upload::api::middleware::request_id::REQUEST_ID_HEADER;
use rust_chunked_upload::{AppState, create_app};
use std::sync::Arc;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rust_chunked_upload=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 Starting chunked upload receiver...");

    let config = UploadConfig::from_env();
    info!(
        "🛡️  Upload Config: Max Chunk={}MB, Extensions={:?}, Retention={:?}, Auth={}",
        config.max_chunk_size / 1024 / 1024,
        config.allowed_extensions,
        config.staging_retention,
        config.upload_token.is_some()
    );

    let staging = StagingArea::new(&config.staging_dir);
    staging.ensure_root().await?;
    tokio::fs::create_dir_all(&config.final_dir).await?;

    let store = FsSessionStore::new(staging);
    let recovered = store.recover_interrupted().await?;
    if recovered > 0 {
        info!("♻️  Recovered {} interrupted reassemblies", recovered);
    }

    let bind_addr = config.bind_addr.clone();
    let gc_interval = config.gc_interval;
    let final_storage = Arc::new(LocalFinalStorage::new(&config.final_dir));
    let uploads = UploadService::with_parts(config, Arc::new(store), final_storage);
    let state = AppState::new(uploads.clone());

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let worker = BackgroundWorker::new(uploads, gc_interval, shutdown_rx);
    let worker_handle = tokio::spawn(worker.run());

    let app = create_app(state).layer(
        TraceLayer::new_for_http()
            .make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("unknown");
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            })
            .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
                info!("📥 {} {}", request.method(), request.uri());
            })
            .on_response(
                |response: &axum::http::Response<_>,
                 latency: std::time::Duration,
                 _span: &tracing::Span| {
                    info!(
                        "📤 Finished in {:?} with status {}",
                        latency,
                        response.status()
                    );
                },
            ),
    );

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("✅ Server ready at http://{}", bind_addr);
    info!("📖 Swagger UI: http://{}/swagger-ui", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = shutdown_tx.send(true);
        })
        .await?;

    let _ = worker_handle.await;
    info!("🛑 Server shut down gracefully.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, starting graceful shutdown...");
        },
        _ = terminate => {
            info!("💤 SIGTERM received, starting graceful shutdown...");
        },
    }
}
