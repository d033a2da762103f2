//! Server configuration
//!
//! Layers, lowest to highest precedence: built-in defaults, an optional YAML
//! file, `CUELOG_*` environment variables (a `.env` file is honored by the
//! binaries), then command line flags.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{CueError, CueResult};
use crate::types::TemplateLayout;

/// Public AudD endpoint
pub const DEFAULT_AUDD_ENDPOINT: &str = "https://api.audd.io/";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Where uploaded videos are stored and served from
    pub uploads_dir: PathBuf,
    /// JSON file backing `/api/markers`
    pub markers_file: PathBuf,
    pub max_upload_mb: usize,
    pub layout: TemplateLayout,
    pub ffmpeg_path: String,
    pub audd: AuddConfig,
    pub vlc: VlcConfig,
    /// Object storage is disabled when absent
    pub storage: Option<StorageConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            uploads_dir: PathBuf::from("uploads"),
            markers_file: PathBuf::from("markers.json"),
            max_upload_mb: 2048,
            layout: TemplateLayout::default(),
            ffmpeg_path: "ffmpeg".to_string(),
            audd: AuddConfig::default(),
            vlc: VlcConfig::default(),
            storage: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuddConfig {
    pub api_token: Option<String>,
    pub endpoint: String,
}

impl Default for AuddConfig {
    fn default() -> Self {
        Self {
            api_token: None,
            endpoint: DEFAULT_AUDD_ENDPOINT.to_string(),
        }
    }
}

/// VLC HTTP interface (`vlc --extraintf http --http-password ...`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VlcConfig {
    pub url: String,
    pub password: String,
}

impl Default for VlcConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8080".to_string(),
            password: String::new(),
        }
    }
}

/// S3-compatible bucket (AWS, R2, GCS interoperability endpoint, MinIO)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub bucket: String,
    pub endpoint: Option<String>,
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Key prefix for uploaded videos
    pub prefix: String,
    pub url_expiry_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            endpoint: None,
            region: "auto".to_string(),
            access_key_id: None,
            secret_access_key: None,
            prefix: "videos/".to_string(),
            url_expiry_secs: 3600,
        }
    }
}

impl AppConfig {
    /// Load defaults, the optional YAML file and the process environment
    pub fn load(path: Option<&Path>) -> CueResult<Self> {
        let mut config = match path {
            Some(path) => Self::from_yaml_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: &Path) -> CueResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CueError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> CueResult<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Apply `CUELOG_*` overrides read through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> CueResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(host) = get("CUELOG_HOST") {
            self.host = host;
        }
        if let Some(port) = get("CUELOG_PORT") {
            self.port = parse_env("CUELOG_PORT", &port)?;
        }
        if let Some(dir) = get("CUELOG_UPLOADS_DIR") {
            self.uploads_dir = PathBuf::from(dir);
        }
        if let Some(file) = get("CUELOG_MARKERS_FILE") {
            self.markers_file = PathBuf::from(file);
        }
        if let Some(limit) = get("CUELOG_MAX_UPLOAD_MB") {
            self.max_upload_mb = parse_env("CUELOG_MAX_UPLOAD_MB", &limit)?;
        }
        if let Some(rows) = get("CUELOG_METADATA_ROWS") {
            self.layout.metadata_rows = parse_env("CUELOG_METADATA_ROWS", &rows)?;
        }
        if let Some(ffmpeg) = get("CUELOG_FFMPEG_PATH") {
            self.ffmpeg_path = ffmpeg;
        }

        if let Some(token) = get("CUELOG_AUDD_API_TOKEN").or_else(|| get("AUDD_API_TOKEN")) {
            self.audd.api_token = Some(token);
        }
        if let Some(endpoint) = get("CUELOG_AUDD_ENDPOINT") {
            self.audd.endpoint = endpoint;
        }

        if let Some(url) = get("CUELOG_VLC_URL") {
            self.vlc.url = url;
        }
        if let Some(password) = get("CUELOG_VLC_PASSWORD") {
            self.vlc.password = password;
        }

        // A bucket name alone is enough to enable storage
        if let Some(bucket) = get("CUELOG_STORAGE_BUCKET") {
            self.storage.get_or_insert_with(StorageConfig::default).bucket = bucket;
        }
        if let Some(storage) = self.storage.as_mut() {
            if let Some(endpoint) = get("CUELOG_STORAGE_ENDPOINT") {
                storage.endpoint = Some(endpoint);
            }
            if let Some(region) = get("CUELOG_STORAGE_REGION") {
                storage.region = region;
            }
            if let Some(key) = get("CUELOG_STORAGE_ACCESS_KEY_ID") {
                storage.access_key_id = Some(key);
            }
            if let Some(secret) = get("CUELOG_STORAGE_SECRET_ACCESS_KEY") {
                storage.secret_access_key = Some(secret);
            }
            if let Some(expiry) = get("CUELOG_STORAGE_URL_EXPIRY_SECS") {
                storage.url_expiry_secs = parse_env("CUELOG_STORAGE_URL_EXPIRY_SECS", &expiry)?;
            }
        }

        Ok(())
    }

    pub fn validate(&self) -> CueResult<()> {
        if self.port == 0 {
            return Err(CueError::Config("port must be non-zero".to_string()));
        }
        if self.max_upload_mb == 0 {
            return Err(CueError::Config("max_upload_mb must be non-zero".to_string()));
        }
        self.layout
            .validate()
            .map_err(|e| CueError::Config(e.detail()))?;

        if let Some(storage) = &self.storage {
            if storage.bucket.trim().is_empty() {
                return Err(CueError::Config("storage.bucket must be set".to_string()));
            }
            if storage.url_expiry_secs == 0 {
                return Err(CueError::Config(
                    "storage.url_expiry_secs must be non-zero".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Request body limit in bytes
    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> CueResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| CueError::Config(format!("{} has an invalid value: {}", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.layout.metadata_rows, 6);
        assert_eq!(config.audd.endpoint, DEFAULT_AUDD_ENDPOINT);
        assert!(config.storage.is_none());
    }

    #[test]
    fn test_yaml_partial_override() {
        let config = AppConfig::from_yaml_str(
            r#"
port: 9000
layout:
  metadata_rows: 4
storage:
  bucket: cue-videos
"#,
        )
        .unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.layout.metadata_rows, 4);
        let storage = config.storage.unwrap();
        assert_eq!(storage.bucket, "cue-videos");
        assert_eq!(storage.prefix, "videos/");
        assert_eq!(storage.url_expiry_secs, 3600);
    }

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(AppConfig::from_yaml_str("  \n").unwrap(), AppConfig::default());
    }

    #[test]
    fn test_invalid_yaml() {
        assert!(matches!(
            AppConfig::from_yaml_str("port: [1, 2"),
            Err(CueError::Yaml(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AppConfig::default();
        config
            .apply_env(env(&[
                ("CUELOG_PORT", "7001"),
                ("CUELOG_METADATA_ROWS", "3"),
                ("AUDD_API_TOKEN", "secret"),
                ("CUELOG_STORAGE_BUCKET", "media"),
                ("CUELOG_STORAGE_ENDPOINT", "https://storage.googleapis.com"),
                ("CUELOG_HOST", ""),
            ]))
            .unwrap();

        assert_eq!(config.port, 7001);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.layout.metadata_rows, 3);
        assert_eq!(config.audd.api_token.as_deref(), Some("secret"));
        let storage = config.storage.unwrap();
        assert_eq!(storage.bucket, "media");
        assert_eq!(storage.endpoint.as_deref(), Some("https://storage.googleapis.com"));
    }

    #[test]
    fn test_env_bad_number() {
        let mut config = AppConfig::default();
        let err = config.apply_env(env(&[("CUELOG_PORT", "eighty")])).unwrap_err();
        assert!(err.to_string().contains("CUELOG_PORT"));
    }

    #[test]
    fn test_validate_rejects() {
        let mut config = AppConfig {
            port: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        config.port = 5000;
        config.layout.metadata_rows = 0;
        assert!(config.validate().is_err());

        config.layout.metadata_rows = 6;
        config.max_upload_mb = 0;
        assert!(config.validate().is_err());

        config.max_upload_mb = 10;
        config.storage = Some(StorageConfig {
            bucket: "b".to_string(),
            url_expiry_secs: 0,
            ..Default::default()
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_max_upload_bytes() {
        let config = AppConfig {
            max_upload_mb: 2,
            ..Default::default()
        };
        assert_eq!(config.max_upload_bytes(), 2 * 1024 * 1024);
    }
}
