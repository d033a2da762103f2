//! Cue sheet import/export
//!
//! This module provides the template-preserving round trip:
//! - Import: .xlsx / .xls / .csv → metadata, header, data and captured formatting
//! - Export: markers + captured layout → .xlsx / .csv

pub mod cell_ref;
mod exporter;
mod importer;
mod styles;

pub use exporter::{marker_row_offset, ExportedFile, MarkerExporter, SEQ_FIELD, SEQ_LABEL};
pub use importer::{TemplateKind, TemplateParser};
pub use styles::{read_xlsx_styles, CellStyle, MergedArea, SheetStyles};
