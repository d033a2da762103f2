//! Cuelog API Server implementation
//!
//! HTTP REST API server using Axum: cue sheet parsing and export, video
//! uploads, marker persistence, audio recognition and player control.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::handlers;
use crate::config::AppConfig;
use crate::error::{CueError, CueResult};
use crate::media::{
    AudioRecognizer, AuddRecognizer, Ffmpeg, MediaPlayer, ObjectStorage, S3Storage, VlcPlayer,
};
use crate::store::{MarkerStore, UsageStats};

const HTTP_TIMEOUT: Duration = Duration::from_secs(120);

/// Shared application state
pub struct AppState {
    pub version: String,
    pub config: AppConfig,
    pub usage_stats: UsageStats,
    pub markers: MarkerStore,
    pub ffmpeg: Ffmpeg,
    pub recognizer: Arc<dyn AudioRecognizer>,
    pub player: Arc<dyn MediaPlayer>,
    pub storage: Option<Arc<dyn ObjectStorage>>,
}

impl AppState {
    /// Build the state and the default collaborators for `config`
    pub fn from_config(config: AppConfig) -> CueResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| CueError::Config(format!("Failed to build HTTP client: {}", e)))?;

        let storage: Option<Arc<dyn ObjectStorage>> = match &config.storage {
            Some(storage) => Some(Arc::new(S3Storage::new(storage)?)),
            None => None,
        };

        Ok(Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            usage_stats: UsageStats::new(),
            markers: MarkerStore::new(config.markers_file.clone()),
            ffmpeg: Ffmpeg::new(config.ffmpeg_path.clone()),
            recognizer: Arc::new(AuddRecognizer::new(client.clone(), &config.audd)),
            player: Arc::new(VlcPlayer::new(client, &config.vlc)),
            storage,
            config,
        })
    }
}

/// Initialize the global tracing subscriber (no-op when already set)
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cuelog=info,tower_http=info".into()),
        )
        .try_init();
}

/// Build the application router
pub fn build_router(state: Arc<AppState>) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let uploads = ServeDir::new(&state.config.uploads_dir);
    let body_limit = DefaultBodyLimit::max(state.config.max_upload_bytes());

    Router::new()
        // Health and info endpoints
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/version", get(handlers::version))
        // Cue sheets
        .route("/api/parse-cue-sheet", post(handlers::parse_cue_sheet))
        .route("/api/export/:format", post(handlers::export_markers))
        // Videos
        .route("/upload", post(handlers::upload_video))
        .nest_service("/uploads", uploads)
        // Markers and usage
        .route(
            "/api/markers",
            get(handlers::get_markers).post(handlers::save_markers),
        )
        .route(
            "/api/usage-stats",
            get(handlers::get_usage_stats)
                .post(handlers::record_usage)
                .delete(handlers::reset_usage_stats),
        )
        // External collaborators
        .route("/api/recognize-audio", post(handlers::recognize_audio))
        .route("/api/vlc/status", get(handlers::vlc_status))
        .route("/api/vlc/play", post(handlers::vlc_play))
        .route("/api/vlc/pause", post(handlers::vlc_pause))
        .route("/api/vlc/stop", post(handlers::vlc_stop))
        .route("/api/vlc/seek", post(handlers::vlc_seek))
        .route("/api/vlc/open", post(handlers::vlc_open))
        .route("/api/storage/signed-url", get(handlers::signed_url))
        // State and middleware
        .with_state(state)
        .layer(body_limit)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Run the API server
pub async fn run_api_server(config: AppConfig) -> anyhow::Result<()> {
    init_tracing();

    config.validate()?;
    tokio::fs::create_dir_all(&config.uploads_dir).await?;

    let addr: SocketAddr = config.bind_address().parse()?;
    let state = Arc::new(AppState::from_config(config)?);
    let app = build_router(Arc::clone(&state));

    info!("🎬 Cuelog API Server starting on http://{}", addr);
    info!("   Endpoints: /api/parse-cue-sheet, /api/export/{{format}}, /upload, /api/markers, /api/usage-stats");
    info!("   Collaborators: /api/recognize-audio, /api/vlc/*, /api/storage/signed-url");
    info!(
        uploads = %state.config.uploads_dir.display(),
        metadata_rows = state.config.layout.metadata_rows,
        storage = state.storage.is_some(),
        "configuration loaded"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!(usage = ?state.usage_stats.snapshot(), "Cuelog API Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, stopping server...");
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== AppConfig Tests ====================

    #[test]
    fn test_config_address_format() {
        let config = AppConfig {
            host: "192.168.1.100".to_string(),
            port: 9090,
            ..Default::default()
        };
        let addr: SocketAddr = config.bind_address().parse().unwrap();
        assert_eq!(addr.port(), 9090);
    }

    // ==================== AppState Tests ====================

    #[test]
    fn test_app_state_from_default_config() {
        let state = AppState::from_config(AppConfig::default()).unwrap();
        assert_eq!(state.version, env!("CARGO_PKG_VERSION"));
        assert!(state.storage.is_none());
        assert_eq!(state.markers.path(), std::path::Path::new("markers.json"));
    }

    #[test]
    fn test_app_state_storage_needs_credentials() {
        let config = AppConfig {
            storage: Some(crate::config::StorageConfig {
                bucket: "b".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(AppState::from_config(config).is_err());
    }

    #[test]
    fn test_app_state_in_arc() {
        let state = Arc::new(AppState::from_config(AppConfig::default()).unwrap());
        let state_clone = Arc::clone(&state);
        assert_eq!(state.version, state_clone.version);
        assert_eq!(Arc::strong_count(&state), 2);
    }
}
