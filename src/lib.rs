//! Cuelog - video cue sheet logging backend
//!
//! This library parses cue sheet templates and regenerates them from
//! time-coded markers, keeping the template's layout and formatting.
//!
//! # Features
//!
//! - Template ingestion from .xlsx, .xls and .csv (metadata, header, data)
//! - Cell formatting capture: bold, alignment, fills, borders, merges, widths
//! - Marker export to .xlsx / .csv with SEQ# column and row highlighting
//! - Timecode normalization at 25 fps
//! - HTTP API with video upload, audio recognition and VLC control
//!
//! # Example
//!
//! ```no_run
//! use cuelog::excel::{MarkerExporter, TemplateParser};
//! use cuelog::types::{ExportFormat, ExportRequest, TemplateLayout};
//!
//! let template = TemplateParser::new(TemplateLayout::default()).parse_file("episode.xlsx")?;
//! println!("Columns: {}", template.header.join(", "));
//!
//! let request: ExportRequest = serde_json::from_str(r#"{"markers": [{"tcrIn": 125.5}]}"#)?;
//! let file = MarkerExporter::new(&request).export(ExportFormat::Excel)?;
//! std::fs::write(&file.file_name, &file.bytes)?;
//! # Ok::<(), cuelog::error::CueError>(())
//! ```

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod excel;
pub mod media;
pub mod store;
pub mod timecode;
pub mod types;

// Re-export commonly used types
pub use error::{CueError, CueResult};
pub use types::{CellFormat, ExportFormat, ExportRequest, Marker, ParsedTemplate, TemplateLayout};
