use thiserror::Error;

pub type CueResult<T> = Result<T, CueError>;

#[derive(Error, Debug)]
pub enum CueError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Export error: {0}")]
    Export(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Media error: {0}")]
    Media(String),

    #[error("Audio recognition error: {0}")]
    Recognition(String),

    #[error("Media player error: {0}")]
    Player(String),

    #[error("Object storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl CueError {
    /// Message without the category prefix, as shown to API clients
    pub fn detail(&self) -> String {
        match self {
            CueError::UnsupportedFileType(_) => "Unsupported file type".to_string(),
            CueError::Parse(msg)
            | CueError::Export(msg)
            | CueError::Validation(msg)
            | CueError::Media(msg)
            | CueError::Recognition(msg)
            | CueError::Player(msg)
            | CueError::Storage(msg)
            | CueError::Config(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_file_type_detail() {
        let err = CueError::UnsupportedFileType("txt".to_string());
        assert_eq!(err.detail(), "Unsupported file type");
        assert_eq!(err.to_string(), "Unsupported file type: txt");
    }

    #[test]
    fn test_detail_strips_prefix() {
        let err = CueError::Export("Failed to write header".to_string());
        assert_eq!(err.detail(), "Failed to write header");
    }

    #[test]
    fn test_io_error_from() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: CueError = io.into();
        assert!(err.to_string().starts_with("IO error"));
    }
}
