//! Music recognition through the AudD HTTP API

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::config::AuddConfig;
use crate::error::{CueError, CueResult};

/// Identifies the music in an audio clip
#[async_trait]
pub trait AudioRecognizer: Send + Sync {
    /// Submit an mp3 clip; returns the service's JSON verbatim
    async fn recognize(&self, clip: Vec<u8>, file_name: &str) -> CueResult<Value>;
}

/// Reply used when the service answers with something other than JSON
pub fn invalid_response() -> Value {
    json!({"status": "error", "message": "Invalid response from audd.io"})
}

pub struct AuddRecognizer {
    client: reqwest::Client,
    endpoint: String,
    api_token: Option<String>,
}

impl AuddRecognizer {
    pub fn new(client: reqwest::Client, config: &AuddConfig) -> Self {
        Self {
            client,
            endpoint: config.endpoint.clone(),
            api_token: config.api_token.clone(),
        }
    }
}

#[async_trait]
impl AudioRecognizer for AuddRecognizer {
    async fn recognize(&self, clip: Vec<u8>, file_name: &str) -> CueResult<Value> {
        let part = Part::bytes(clip)
            .file_name(file_name.to_string())
            .mime_str("audio/mpeg")
            .map_err(|e| CueError::Recognition(format!("Invalid clip part: {}", e)))?;

        let mut form = Form::new()
            .part("file", part)
            .text("return", "apple_music,spotify");
        match &self.api_token {
            Some(token) => form = form.text("api_token", token.clone()),
            None => warn!("no AudD API token configured, request may be rejected"),
        }

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| CueError::Recognition(format!("Failed to reach audd.io: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CueError::Recognition(format!("Failed to read audd.io reply: {}", e)))?;
        info!(%status, bytes = body.len(), "audd.io replied");

        Ok(parse_reply(&body))
    }
}

fn parse_reply(body: &str) -> Value {
    serde_json::from_str(body).unwrap_or_else(|_| invalid_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_reply_passes_through() {
        let reply = parse_reply(r#"{"status":"success","result":{"title":"Song"}}"#);
        assert_eq!(reply["result"]["title"], "Song");
    }

    #[test]
    fn test_non_json_reply() {
        let reply = parse_reply("<html>502</html>");
        assert_eq!(reply, invalid_response());
        assert_eq!(reply["message"], "Invalid response from audd.io");
    }
}
