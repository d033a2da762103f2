//! Server-owned state: the persisted marker list and usage counters

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::CueResult;
use crate::types::{Marker, Usage};

//==============================================================================
// Marker Store
//==============================================================================

/// JSON file holding the current marker list
pub struct MarkerStore {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl MarkerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load all markers; a missing file is an empty list
    pub async fn load(&self) -> CueResult<Vec<Marker>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Vec::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Replace the stored list
    pub async fn save(&self, markers: &[Marker]) -> CueResult<()> {
        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_vec_pretty(markers)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!(path = %self.path.display(), count = markers.len(), "saved markers");
        Ok(())
    }
}

//==============================================================================
// Usage Statistics
//==============================================================================

/// Per-code usage counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct UsageCounts {
    pub bi: u64,
    pub bv: u64,
    pub vi: u64,
    pub vv: u64,
    pub src: u64,
}

impl UsageCounts {
    /// Increment a known code; unknown codes are ignored
    pub fn increment(&mut self, code: &str) -> bool {
        let counter = match code.trim().to_ascii_uppercase().as_str() {
            "BI" => &mut self.bi,
            "BV" => &mut self.bv,
            "VI" => &mut self.vi,
            "VV" => &mut self.vv,
            "SRC" => &mut self.src,
            _ => return false,
        };
        *counter += 1;
        true
    }
}

/// Usage counters shared by request handlers
#[derive(Debug, Default)]
pub struct UsageStats {
    counts: Mutex<UsageCounts>,
}

impl UsageStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> UsageCounts {
        *self.lock()
    }

    /// Count every code carried by a `usage` value
    pub fn record(&self, usage: &Value) -> UsageCounts {
        let mut counts = self.lock();
        let codes = match Usage::from_value(usage) {
            Some(Usage::Tags(tags)) => tags,
            Some(Usage::Text(text)) => text.split(',').map(str::to_string).collect(),
            None => Vec::new(),
        };
        for code in &codes {
            if !counts.increment(code) {
                warn!(code = %code, "ignoring unknown usage code");
            }
        }
        *counts
    }

    pub fn reset(&self) -> UsageCounts {
        let mut counts = self.lock();
        *counts = UsageCounts::default();
        *counts
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, UsageCounts> {
        // Counters stay consistent even if a holder panicked
        self.counts.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_usage_counts_serialize_in_code_order() {
        let counts = UsageCounts {
            bi: 1,
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_string(&counts).unwrap(),
            r#"{"BI":1,"BV":0,"VI":0,"VV":0,"SRC":0}"#
        );
    }

    #[test]
    fn test_record_known_and_unknown() {
        let stats = UsageStats::new();
        stats.record(&json!("BI"));
        stats.record(&json!("xx"));
        let counts = stats.record(&json!(["VV", "src"]));
        assert_eq!(counts.bi, 1);
        assert_eq!(counts.vv, 1);
        assert_eq!(counts.src, 1);
        assert_eq!(counts.bv, 0);
    }

    #[test]
    fn test_record_comma_joined_text() {
        let stats = UsageStats::new();
        let counts = stats.record(&json!("BI, vi"));
        assert_eq!(counts.bi, 1);
        assert_eq!(counts.vi, 1);
    }

    #[test]
    fn test_reset() {
        let stats = UsageStats::new();
        stats.record(&json!("BV"));
        assert_eq!(stats.reset(), UsageCounts::default());
        assert_eq!(stats.snapshot(), UsageCounts::default());
    }

    #[tokio::test]
    async fn test_marker_store_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = MarkerStore::new(dir.path().join("markers.json"));
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_marker_store_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = MarkerStore::new(dir.path().join("nested").join("markers.json"));
        let markers: Vec<Marker> = serde_json::from_value(json!([
            {"tcrIn": 1.5, "title": "Intro", "usage": ["BI"]},
            {"tcrIn": "00:00:10:00", "markColor": "red"}
        ]))
        .unwrap();

        store.save(&markers).await.unwrap();
        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, markers);
        assert_eq!(loaded[0].field_names().next().map(String::as_str), Some("tcrIn"));
    }

    #[tokio::test]
    async fn test_marker_store_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("markers.json");
        tokio::fs::write(&path, "{not json").await.unwrap();
        assert!(MarkerStore::new(path).load().await.is_err());
    }
}
