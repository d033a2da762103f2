//! ffmpeg invocations: audio clip extraction and WMV transcoding

use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, error};

use crate::error::{CueError, CueResult};

/// Thin wrapper around an ffmpeg executable
#[derive(Debug, Clone)]
pub struct Ffmpeg {
    program: String,
}

impl Default for Ffmpeg {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl Ffmpeg {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Cut `duration` seconds from `start` out of `input` and encode it as mp3
    ///
    /// `input` may be a local path or a URL ffmpeg can open directly.
    pub async fn extract_audio_clip(
        &self,
        input: &str,
        start: f64,
        duration: f64,
        output: &Path,
    ) -> CueResult<()> {
        self.run(audio_clip_args(input, start, duration, output))
            .await
    }

    /// Re-encode a WMV file as web-friendly H.264/AAC mp4
    pub async fn transcode_to_mp4(&self, input: &Path, output: &Path) -> CueResult<()> {
        self.run(transcode_args(input, output)).await
    }

    async fn run(&self, args: Vec<OsString>) -> CueResult<()> {
        debug!(program = %self.program, ?args, "running ffmpeg");

        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| CueError::Media(format!("Failed to execute {}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            error!(status = %output.status, "ffmpeg failed");
            return Err(CueError::Media(format!("ffmpeg error: {}", stderr)));
        }
        Ok(())
    }
}

fn audio_clip_args(input: &str, start: f64, duration: f64, output: &Path) -> Vec<OsString> {
    vec![
        "-y".into(),
        "-ss".into(),
        format!("{}", start).into(),
        "-t".into(),
        format!("{}", duration).into(),
        "-i".into(),
        input.into(),
        "-vn".into(),
        "-acodec".into(),
        "libmp3lame".into(),
        output.as_os_str().to_owned(),
    ]
}

fn transcode_args(input: &Path, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-y".into(), "-i".into(), input.as_os_str().to_owned()];
    args.extend(
        [
            "-c:v",
            "libx264",
            "-preset",
            "medium",
            "-crf",
            "23",
            "-c:a",
            "aac",
            "-b:a",
            "128k",
            "-movflags",
            "+faststart",
        ]
        .into_iter()
        .map(OsString::from),
    );
    args.push(output.as_os_str().to_owned());
    args
}

/// True for file names ending in `.wmv` (any case)
pub fn is_wmv(file_name: &str) -> bool {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("wmv"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_wmv() {
        assert!(is_wmv("clip.wmv"));
        assert!(is_wmv("CLIP.WMV"));
        assert!(!is_wmv("clip.mp4"));
        assert!(!is_wmv("wmv"));
    }

    #[test]
    fn test_audio_clip_args() {
        let args = audio_clip_args("in.mp4", 10.5, 4.0, Path::new("/tmp/out.mp3"));
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            vec!["-y", "-ss", "10.5", "-t", "4", "-i", "in.mp4", "-vn", "-acodec", "libmp3lame", "/tmp/out.mp3"]
        );
    }

    #[test]
    fn test_transcode_args() {
        let args = transcode_args(Path::new("a.wmv"), Path::new("a.mp4"));
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(args.first().map(String::as_str), Some("-y"));
        assert_eq!(args.last().map(String::as_str), Some("a.mp4"));
        assert!(args.windows(2).any(|w| w == ["-crf", "23"]));
        assert!(args.windows(2).any(|w| w == ["-movflags", "+faststart"]));
    }

    #[tokio::test]
    async fn test_missing_binary_is_media_error() {
        let ffmpeg = Ffmpeg::new("definitely-not-ffmpeg-binary");
        let err = ffmpeg
            .transcode_to_mp4(Path::new("a.wmv"), Path::new("a.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, CueError::Media(_)));
    }
}
