//! API request handlers
//!
//! Handlers for all REST API endpoints.

use std::collections::HashMap;
use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::multipart::Field;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use uuid::Uuid;

use super::error::ApiError;
use super::server::AppState;
use crate::error::CueError;
use crate::excel::{MarkerExporter, TemplateKind, TemplateParser};
use crate::media::{is_wmv, validate_key, PlayerCommand};
use crate::store::UsageCounts;
use crate::timecode::parse_timecode;
use crate::types::{ExportFormat, ExportRequest, Marker, ParsedTemplate};

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

/// Standard API response wrapper
#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            request_id: Uuid::new_v4().to_string(),
            data: Some(data),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self
    where
        T: Default,
    {
        Self {
            success: false,
            request_id: Uuid::new_v4().to_string(),
            data: None,
            error: Some(message.into()),
        }
    }
}

fn ok<T: Serialize>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse::ok(data)))
}

//==============================================================================
// Info endpoints
//==============================================================================

/// Root endpoint response
#[derive(Serialize)]
pub struct RootResponse {
    pub name: String,
    pub version: String,
    pub description: String,
    pub endpoints: Vec<EndpointInfo>,
}

#[derive(Serialize)]
pub struct EndpointInfo {
    pub path: String,
    pub method: String,
    pub description: String,
}

fn endpoint(method: &str, path: &str, description: &str) -> EndpointInfo {
    EndpointInfo {
        path: path.to_string(),
        method: method.to_string(),
        description: description.to_string(),
    }
}

/// GET / - Root info
pub async fn root(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let response = RootResponse {
        name: "Cuelog API Server".to_string(),
        version: state.version.clone(),
        description: "Cue sheet marker logging and template-preserving export".to_string(),
        endpoints: vec![
            endpoint("GET", "/health", "Health check endpoint"),
            endpoint("GET", "/version", "Get server version"),
            endpoint("POST", "/api/parse-cue-sheet", "Parse an .xlsx/.xls/.csv cue sheet template"),
            endpoint("POST", "/api/export/{format}", "Export markers as excel or csv"),
            endpoint("POST", "/upload", "Upload a video (WMV is transcoded to MP4)"),
            endpoint("GET", "/uploads/{filename}", "Serve an uploaded video"),
            endpoint("GET", "/api/markers", "Load saved markers"),
            endpoint("POST", "/api/markers", "Save markers"),
            endpoint("GET", "/api/usage-stats", "Usage code counters"),
            endpoint("POST", "/api/usage-stats", "Count a usage code"),
            endpoint("DELETE", "/api/usage-stats", "Reset usage counters"),
            endpoint("POST", "/api/recognize-audio", "Identify music in a marked segment"),
            endpoint("GET", "/api/vlc/status", "VLC player status"),
            endpoint("POST", "/api/vlc/{play,pause,stop,seek,open}", "VLC player control"),
            endpoint("GET", "/api/storage/signed-url", "Signed download URL for a stored object"),
        ],
    };
    Json(ApiResponse::ok(response))
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_message: String,
}

/// GET /health - Health check
pub async fn health() -> impl IntoResponse {
    Json(ApiResponse::ok(HealthResponse {
        status: "healthy".to_string(),
        uptime_message: "Server is running".to_string(),
    }))
}

/// Version response
#[derive(Serialize)]
pub struct VersionResponse {
    pub version: String,
    pub features: Vec<String>,
}

/// GET /version - Server version
pub async fn version(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut features = vec![
        "parse".to_string(),
        "export".to_string(),
        "upload".to_string(),
        "recognize".to_string(),
        "vlc".to_string(),
    ];
    if state.storage.is_some() {
        features.push("storage".to_string());
    }
    Json(ApiResponse::ok(VersionResponse {
        version: state.version.clone(),
        features,
    }))
}

//==============================================================================
// Cue sheet import / export
//==============================================================================

struct UploadedFile {
    file_name: String,
    bytes: Bytes,
}

#[derive(Default)]
struct FormFields {
    texts: HashMap<String, String>,
    file: Option<UploadedFile>,
}

/// Collect text fields and the single file field named `file_field`
async fn read_form(multipart: &mut Multipart, file_field: &str) -> Result<FormFields, ApiError> {
    let mut form = FormFields::default();
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        if name == file_field {
            let file_name = field.file_name().unwrap_or_default().to_string();
            let bytes = field.bytes().await?;
            form.file = Some(UploadedFile { file_name, bytes });
        } else if !name.is_empty() {
            let text = field.text().await?;
            form.texts.insert(name, text);
        }
    }
    Ok(form)
}

/// POST /api/parse-cue-sheet - Parse a cue sheet template
pub async fn parse_cue_sheet(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> ApiResult<ParsedTemplate> {
    let upload = read_form(&mut multipart, "file")
        .await?
        .file
        .filter(|f| !f.file_name.is_empty())
        .ok_or_else(|| ApiError::bad_request("No file uploaded"))?;

    TemplateKind::from_file_name(&upload.file_name)?;

    let parser = TemplateParser::new(state.config.layout);
    let file_name = upload.file_name.clone();
    let template =
        tokio::task::spawn_blocking(move || parser.parse(&upload.file_name, &upload.bytes))
            .await??;

    info!(
        file_name = %file_name,
        header = template.header.len(),
        rows = template.data.len(),
        "parsed cue sheet"
    );
    ok(template)
}

/// POST /api/export/{format} - Download markers as .xlsx or .csv
pub async fn export_markers(
    Path(format): Path<String>,
    payload: Result<Json<ExportRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let format: ExportFormat = format.parse()?;
    let Json(request) = payload?;

    let file =
        tokio::task::spawn_blocking(move || MarkerExporter::new(&request).export(format)).await??;

    info!(file_name = %file.file_name, bytes = file.bytes.len(), "exported markers");
    let disposition = format!("attachment; filename=\"{}\"", file.file_name);
    Ok((
        [
            (header::CONTENT_TYPE, file.content_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        file.bytes,
    )
        .into_response())
}

//==============================================================================
// Video upload
//==============================================================================

/// Upload response
#[derive(Serialize, Default)]
pub struct UploadResponse {
    pub filename: String,
    pub url: String,
    pub transcoded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_key: Option<String>,
}

/// Reduce a client file name to a safe single path component
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .trim()
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    cleaned.trim_start_matches(['.', '_']).to_string()
}

fn video_content_type(file_name: &str) -> &'static str {
    let ext = FsPath::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        "wmv" => "video/x-ms-wmv",
        _ => "application/octet-stream",
    }
}

async fn save_field(field: &mut Field<'_>, path: &FsPath) -> Result<u64, ApiError> {
    let mut file = tokio::fs::File::create(path).await.map_err(CueError::from)?;
    let mut written = 0u64;
    while let Some(chunk) = field.chunk().await? {
        file.write_all(&chunk).await.map_err(CueError::from)?;
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(CueError::from)?;
    Ok(written)
}

/// POST /upload - Store an uploaded video
pub async fn upload_video(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> ApiResult<UploadResponse> {
    let mut saved: Option<(String, PathBuf)> = None;

    while let Some(mut field) = multipart.next_field().await? {
        if field.name() != Some("video") {
            continue;
        }
        let safe_name = sanitize_file_name(field.file_name().unwrap_or_default());
        if safe_name.is_empty() {
            return Err(ApiError::bad_request("No selected file"));
        }

        let stored = format!("{}_{}", Local::now().format("%Y%m%d_%H%M%S"), safe_name);
        let path = state.config.uploads_dir.join(&stored);
        match save_field(&mut field, &path).await {
            Ok(size) => info!(file = %stored, size, "saved upload"),
            Err(e) => {
                let _ = tokio::fs::remove_file(&path).await;
                return Err(e);
            }
        }
        saved = Some((stored, path));
        break;
    }

    let (mut stored, mut path) =
        saved.ok_or_else(|| ApiError::bad_request("No video file provided"))?;

    let transcoded = is_wmv(&stored);
    if transcoded {
        let mp4_name = FsPath::new(&stored)
            .with_extension("mp4")
            .to_string_lossy()
            .into_owned();
        let mp4_path = state.config.uploads_dir.join(&mp4_name);
        state.ffmpeg.transcode_to_mp4(&path, &mp4_path).await?;
        if let Err(e) = tokio::fs::remove_file(&path).await {
            warn!(file = %path.display(), error = %e, "could not remove original WMV");
        }
        info!(from = %stored, to = %mp4_name, "transcoded WMV upload");
        stored = mp4_name;
        path = mp4_path;
    }

    let response = match &state.storage {
        Some(storage) => {
            let key = storage.object_key(&stored);
            storage.upload(&key, &path, video_content_type(&stored)).await?;
            UploadResponse {
                url: storage.signed_url(&key).await?,
                filename: stored,
                transcoded,
                storage_key: Some(key),
            }
        }
        None => UploadResponse {
            url: format!("/uploads/{}", stored),
            filename: stored,
            transcoded,
            storage_key: None,
        },
    };
    ok(response)
}

//==============================================================================
// Markers and usage statistics
//==============================================================================

/// Save markers response
#[derive(Serialize)]
pub struct SaveMarkersResponse {
    pub status: String,
    pub count: usize,
}

/// GET /api/markers - Load saved markers
pub async fn get_markers(State(state): State<Arc<AppState>>) -> ApiResult<Vec<Marker>> {
    ok(state.markers.load().await?)
}

/// POST /api/markers - Replace saved markers
pub async fn save_markers(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Vec<Marker>>, JsonRejection>,
) -> ApiResult<SaveMarkersResponse> {
    let Json(markers) = payload?;
    state.markers.save(&markers).await?;
    ok(SaveMarkersResponse {
        status: "success".to_string(),
        count: markers.len(),
    })
}

/// Usage counter update
#[derive(Deserialize)]
pub struct UsageUpdate {
    #[serde(default)]
    pub usage: Value,
}

/// GET /api/usage-stats - Current counters
pub async fn get_usage_stats(State(state): State<Arc<AppState>>) -> ApiResult<UsageCounts> {
    ok(state.usage_stats.snapshot())
}

/// POST /api/usage-stats - Count a usage code
pub async fn record_usage(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<UsageUpdate>, JsonRejection>,
) -> ApiResult<UsageCounts> {
    let Json(update) = payload?;
    ok(state.usage_stats.record(&update.usage))
}

/// DELETE /api/usage-stats - Reset counters
pub async fn reset_usage_stats(State(state): State<Arc<AppState>>) -> ApiResult<UsageCounts> {
    info!("usage counters reset");
    ok(state.usage_stats.reset())
}

//==============================================================================
// Audio recognition
//==============================================================================

/// Start and duration in seconds of the marked segment
fn clip_range(tcr_in: &str, tcr_out: &str) -> Result<(f64, f64), ApiError> {
    let invalid = || ApiError::bad_request("Invalid time range");
    let start = parse_timecode(tcr_in).ok_or_else(invalid)?;
    let end = parse_timecode(tcr_out).ok_or_else(invalid)?;
    let duration = end - start;
    if duration <= 0.0 {
        return Err(invalid());
    }
    Ok((start, duration))
}

/// Resolve `videoSrc` to something ffmpeg can open
///
/// Remote sources must be http(s); anything else names a file in the
/// uploads directory, optionally written as `/uploads/<name>`.
async fn resolve_video_source(uploads_dir: &FsPath, src: &str) -> Result<String, ApiError> {
    if src.starts_with("http://") || src.starts_with("https://") {
        return Ok(src.to_string());
    }

    let relative = src.trim_start_matches('/');
    let name = relative.strip_prefix("uploads/").unwrap_or(relative);
    if name.is_empty() || name.contains(['/', '\\']) || name.starts_with("..") {
        return Err(ApiError::bad_request("Invalid videoSrc"));
    }

    let path = uploads_dir.join(name);
    match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_file() => Ok(path.to_string_lossy().into_owned()),
        _ => Err(ApiError::bad_request("Video source not found")),
    }
}

/// POST /api/recognize-audio - Identify the music in a marked segment
pub async fn recognize_audio(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> ApiResult<Value> {
    let FormFields { texts, file } = read_form(&mut multipart, "file").await?;
    let text = |key: &str| {
        texts
            .get(key)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    };

    let (Some(tcr_in), Some(tcr_out)) = (text("tcrIn"), text("tcrOut")) else {
        return Err(ApiError::bad_request("Missing TCR In or Out"));
    };
    let (start, duration) = clip_range(tcr_in, tcr_out)?;

    // The uploaded copy must outlive the ffmpeg run
    let (input, _input_file): (String, Option<NamedTempFile>) =
        match (file.filter(|f| !f.bytes.is_empty()), text("videoSrc")) {
            (Some(upload), _) => {
                let temp = tempfile::Builder::new()
                    .prefix("cuelog-in-")
                    .suffix(".mp4")
                    .tempfile()
                    .map_err(CueError::from)?;
                tokio::fs::write(temp.path(), &upload.bytes)
                    .await
                    .map_err(CueError::from)?;
                (temp.path().to_string_lossy().into_owned(), Some(temp))
            }
            (None, Some(src)) => (
                resolve_video_source(&state.config.uploads_dir, src).await?,
                None,
            ),
            (None, None) => return Err(ApiError::bad_request("No file or videoSrc provided")),
        };

    let clip_file = tempfile::Builder::new()
        .prefix("cuelog-clip-")
        .suffix(".mp3")
        .tempfile()
        .map_err(CueError::from)?;
    state
        .ffmpeg
        .extract_audio_clip(&input, start, duration, clip_file.path())
        .await?;
    let clip = tokio::fs::read(clip_file.path()).await.map_err(CueError::from)?;

    info!(start, duration, clip_bytes = clip.len(), "recognizing audio segment");
    ok(state.recognizer.recognize(clip, "clip.mp3").await?)
}

//==============================================================================
// VLC control
//==============================================================================

#[derive(Deserialize)]
pub struct SeekRequest {
    pub seconds: f64,
}

#[derive(Deserialize)]
pub struct OpenRequest {
    pub path: String,
}

async fn player_command(state: &AppState, command: PlayerCommand) -> ApiResult<Value> {
    info!(?command, "VLC command");
    ok(state.player.command(command).await?)
}

/// GET /api/vlc/status
pub async fn vlc_status(State(state): State<Arc<AppState>>) -> ApiResult<Value> {
    ok(state.player.status().await?)
}

/// POST /api/vlc/play
pub async fn vlc_play(State(state): State<Arc<AppState>>) -> ApiResult<Value> {
    player_command(&state, PlayerCommand::Play).await
}

/// POST /api/vlc/pause
pub async fn vlc_pause(State(state): State<Arc<AppState>>) -> ApiResult<Value> {
    player_command(&state, PlayerCommand::Pause).await
}

/// POST /api/vlc/stop
pub async fn vlc_stop(State(state): State<Arc<AppState>>) -> ApiResult<Value> {
    player_command(&state, PlayerCommand::Stop).await
}

/// POST /api/vlc/seek
pub async fn vlc_seek(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SeekRequest>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(req) = payload?;
    player_command(&state, PlayerCommand::Seek(req.seconds)).await
}

/// POST /api/vlc/open
pub async fn vlc_open(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<OpenRequest>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(req) = payload?;
    player_command(&state, PlayerCommand::Open(req.path)).await
}

//==============================================================================
// Object storage
//==============================================================================

#[derive(Deserialize)]
pub struct SignedUrlQuery {
    pub key: String,
}

#[derive(Serialize)]
pub struct SignedUrlResponse {
    pub key: String,
    pub url: String,
    pub expires_in: u64,
}

/// GET /api/storage/signed-url?key=...
pub async fn signed_url(
    State(state): State<Arc<AppState>>,
    query: Result<Query<SignedUrlQuery>, QueryRejection>,
) -> ApiResult<SignedUrlResponse> {
    let (Some(storage), Some(config)) = (&state.storage, &state.config.storage) else {
        return Err(CueError::Config("Object storage is not configured".to_string()).into());
    };
    let Query(query) = query.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let key = validate_key(&query.key)?;

    ok(SignedUrlResponse {
        key: key.to_string(),
        url: storage.signed_url(key).await?,
        expires_in: config.url_expiry_secs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // ==================== ApiResponse Tests ====================

    #[test]
    fn test_api_response_ok_creates_success_response() {
        let response: ApiResponse<String> = ApiResponse::ok("test data".to_string());

        assert!(response.success);
        assert_eq!(response.data, Some("test data".to_string()));
        assert!(response.error.is_none());
        // Verify UUID format (8-4-4-4-12)
        assert_eq!(response.request_id.len(), 36);
    }

    #[test]
    fn test_api_response_err_creates_error_response() {
        let response: ApiResponse<String> = ApiResponse::err("Something went wrong");

        assert!(!response.success);
        assert!(response.data.is_none());
        assert_eq!(response.error, Some("Something went wrong".to_string()));
    }

    #[test]
    fn test_api_response_request_id_is_unique() {
        let response1: ApiResponse<String> = ApiResponse::ok("test1".to_string());
        let response2: ApiResponse<String> = ApiResponse::ok("test2".to_string());

        assert_ne!(response1.request_id, response2.request_id);
    }

    #[test]
    fn test_error_envelope_omits_data() {
        let json = serde_json::to_value(ApiResponse::<()>::err("nope")).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "nope");
        assert!(json.get("data").is_none());
    }

    // ==================== Upload Helper Tests ====================

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("My Clip.wmv"), "My_Clip.wmv");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\videos\\ep 1.mp4"), "ep_1.mp4");
        assert_eq!(sanitize_file_name(".hidden"), "hidden");
        assert_eq!(sanitize_file_name(""), "");
    }

    #[test]
    fn test_video_content_type() {
        assert_eq!(video_content_type("a.MP4"), "video/mp4");
        assert_eq!(video_content_type("a.bin"), "application/octet-stream");
    }

    // ==================== Recognition Helper Tests ====================

    #[test]
    fn test_clip_range() {
        assert_eq!(clip_range("00:00:10", "00:00:25").unwrap(), (10.0, 15.0));
        assert_eq!(clip_range("00:01:00:00", "00:01:05:00").unwrap(), (60.0, 5.0));
    }

    #[test]
    fn test_clip_range_rejects() {
        let err = clip_range("00:00:10", "00:00:10").unwrap_err();
        assert_eq!(err.message(), "Invalid time range");
        assert!(clip_range("later", "00:00:10").is_err());
    }

    #[tokio::test]
    async fn test_resolve_video_source() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("ep1.mp4"), b"x").unwrap();

        let url = resolve_video_source(dir.path(), "https://cdn.example.com/ep1.mp4")
            .await
            .unwrap();
        assert_eq!(url, "https://cdn.example.com/ep1.mp4");

        let local = resolve_video_source(dir.path(), "/uploads/ep1.mp4").await.unwrap();
        assert!(local.ends_with("ep1.mp4"));

        assert!(resolve_video_source(dir.path(), "../ep1.mp4").await.is_err());
        assert!(resolve_video_source(dir.path(), "missing.mp4").await.is_err());
    }
}
