//! Remote control of a VLC instance through its HTTP interface

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, error};

use crate::config::VlcConfig;
use crate::error::{CueError, CueResult};

/// Playback commands forwarded to the player
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerCommand {
    Play,
    Pause,
    Stop,
    /// Absolute position in seconds
    Seek(f64),
    /// Path or URL of the media to start
    Open(String),
}

impl PlayerCommand {
    pub fn validate(&self) -> CueResult<()> {
        match self {
            PlayerCommand::Seek(seconds) if !seconds.is_finite() || *seconds < 0.0 => Err(
                CueError::Validation("seconds must be a non-negative number".to_string()),
            ),
            PlayerCommand::Open(path) if path.trim().is_empty() => {
                Err(CueError::Validation("path is required".to_string()))
            }
            _ => Ok(()),
        }
    }

    /// Query string pairs understood by `/requests/status.json`
    fn query(&self) -> Vec<(&'static str, String)> {
        match self {
            PlayerCommand::Play => vec![("command", "pl_play".to_string())],
            PlayerCommand::Pause => vec![("command", "pl_pause".to_string())],
            PlayerCommand::Stop => vec![("command", "pl_stop".to_string())],
            PlayerCommand::Seek(seconds) => vec![
                ("command", "seek".to_string()),
                ("val", format!("{}", seconds.floor() as u64)),
            ],
            PlayerCommand::Open(path) => vec![
                ("command", "in_play".to_string()),
                ("input", path.clone()),
            ],
        }
    }
}

/// A controllable media player
#[async_trait]
pub trait MediaPlayer: Send + Sync {
    async fn status(&self) -> CueResult<Value>;

    /// Run a command and return the resulting player status
    async fn command(&self, command: PlayerCommand) -> CueResult<Value>;
}

pub struct VlcPlayer {
    client: reqwest::Client,
    status_url: String,
    password: String,
}

impl VlcPlayer {
    pub fn new(client: reqwest::Client, config: &VlcConfig) -> Self {
        Self {
            client,
            status_url: format!("{}/requests/status.json", config.url.trim_end_matches('/')),
            password: config.password.clone(),
        }
    }

    async fn request(&self, query: &[(&'static str, String)]) -> CueResult<Value> {
        debug!(url = %self.status_url, ?query, "calling VLC");

        let response = self
            .client
            .get(&self.status_url)
            .basic_auth("", Some(&self.password))
            .query(query)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "VLC unreachable");
                CueError::Player(format!("Failed to reach VLC: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CueError::Player(format!("VLC returned HTTP {}", status)));
        }

        response
            .json()
            .await
            .map_err(|e| CueError::Player(format!("Invalid VLC status reply: {}", e)))
    }
}

#[async_trait]
impl MediaPlayer for VlcPlayer {
    async fn status(&self) -> CueResult<Value> {
        self.request(&[]).await
    }

    async fn command(&self, command: PlayerCommand) -> CueResult<Value> {
        command.validate()?;
        self.request(&command.query()).await
    }
}
