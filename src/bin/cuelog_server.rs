//! Cuelog API Server binary
//!
//! HTTP REST API backing the cue sheet logging front end.

use clap::Parser;
use cuelog::api::run_api_server;
use cuelog::config::AppConfig;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "cuelog-server")]
#[command(version)]
#[command(about = "Cuelog API Server - cue sheet parsing, marker export and media helpers")]
#[command(long_about = r#"
Cuelog API Server

Cue sheets:
  - POST /api/parse-cue-sheet     - Parse .xlsx/.xls/.csv templates
  - POST /api/export/{format}     - Export markers (excel | csv)

Videos and markers:
  - POST /upload                  - Upload a video (WMV → MP4)
  - GET  /uploads/{filename}      - Serve uploaded videos
  - GET|POST /api/markers         - Load / save markers
  - GET|POST|DELETE /api/usage-stats

Collaborators:
  - POST /api/recognize-audio     - Music recognition (AudD)
  - /api/vlc/*                    - VLC HTTP interface control
  - GET  /api/storage/signed-url  - Signed object URLs

Configuration:
  --config cuelog.yaml, CUELOG_* environment variables and .env files.

Example usage:
  cuelog-server                           # Start on localhost:5000
  cuelog-server --host 0.0.0.0 --port 3000
"#)]
struct Args {
    /// YAML configuration file
    #[arg(short, long, env = "CUELOG_CONFIG")]
    config: Option<PathBuf>,

    /// Host address to bind to (use 0.0.0.0 for all interfaces)
    #[arg(short = 'H', long, env = "CUELOG_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "CUELOG_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let mut config = AppConfig::load(args.config.as_deref())?;
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }

    run_api_server(config).await
}
