//! Marker exporter implementation - ExportRequest → .xlsx / .csv

use crate::error::{CueError, CueResult};
use crate::excel::cell_ref::{column_index, parse_range};
use crate::excel::styles::MergedArea;
use crate::timecode::{is_timecode_field, normalize_timecode};
use crate::types::{cell_text, CellFormat, ExportFormat, ExportRequest, Marker, Usage};
use rust_xlsxwriter::{Color, Format, FormatAlign, FormatBorder, FormatPattern, Workbook, Worksheet};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Synthetic sequence column
pub const SEQ_FIELD: &str = "seq";

/// Header label of the sequence column
pub const SEQ_LABEL: &str = "SEQ#";

/// Worksheet limits of the .xlsx format
pub const MAX_SHEET_ROWS: usize = 1_048_576;
pub const MAX_SHEET_COLS: usize = 16_384;

const DEFAULT_FILE_STEM: &str = "markers_export";
const SHEET_NAME: &str = "Cue Sheet";

/// 1-based sheet row highlighted for the marker at `index`
///
/// Counts `headerRows`, not the written metadata block, so a styled block of
/// a different height shifts the highlight. The `+2` applies only when there
/// are markers.
pub fn marker_row_offset(
    header_rows: usize,
    blank_lines: usize,
    has_markers: bool,
    index: usize,
) -> usize {
    header_rows
        .saturating_add(blank_lines)
        .saturating_add(if has_markers { 2 } else { 1 })
        .saturating_add(index)
}

/// A generated export, ready to be downloaded
#[derive(Debug, Clone)]
pub struct ExportedFile {
    pub file_name: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

/// Marker table writer reproducing an imported cue sheet layout
pub struct MarkerExporter<'a> {
    request: &'a ExportRequest,
    fields: Vec<String>,
}

impl<'a> MarkerExporter<'a> {
    /// Create a new exporter, resolving the exported field list
    pub fn new(request: &'a ExportRequest) -> Self {
        let mut fields: Vec<String> = match request
            .fields_to_export
            .as_ref()
            .filter(|fields| !fields.is_empty())
        {
            Some(fields) => fields.clone(),
            None => request
                .markers
                .first()
                .map(|m| m.field_names().cloned().collect())
                .unwrap_or_default(),
        };

        if !fields.iter().any(|f| f == SEQ_FIELD) {
            fields.insert(0, SEQ_FIELD.to_string());
        }

        Self { request, fields }
    }

    /// Exported field names, in column order
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Header row labels
    pub fn header_labels(&self) -> Vec<String> {
        self.fields
            .iter()
            .map(|field| match self.request.field_labels.get(field) {
                Some(label) => label.clone(),
                None if field == SEQ_FIELD => SEQ_LABEL.to_string(),
                None => field.clone(),
            })
            .collect()
    }

    /// Normalized marker rows, one per marker
    pub fn table_rows(&self) -> Vec<Vec<String>> {
        self.request
            .markers
            .iter()
            .enumerate()
            .map(|(idx, marker)| {
                self.fields
                    .iter()
                    .map(|field| self.cell_value(idx, marker, field))
                    .collect()
            })
            .collect()
    }

    fn cell_value(&self, idx: usize, marker: &Marker, field: &str) -> String {
        match field {
            SEQ_FIELD => (idx + 1).to_string(),
            "usage" => marker.usage().map(Usage::joined).unwrap_or_default(),
            "markColor" => marker.mark_color().as_str().to_string(),
            f if is_timecode_field(f) => {
                normalize_timecode(marker.get(f).unwrap_or(&Value::Null), self.request.time_format)
            }
            f => marker.get(f).map(cell_text).unwrap_or_default(),
        }
    }

    /// Metadata rows as plain values, falling back to the styled cells' values
    fn metadata_values(&self) -> Vec<Vec<String>> {
        match &self.request.metadata_with_format {
            Some(rows) if self.request.header_rows.is_empty() => rows
                .iter()
                .map(|row| row.iter().map(|c| c.value.clone()).collect())
                .collect(),
            _ => self.request.header_rows.clone(),
        }
    }

    /// Download name derived from the imported file
    pub fn file_name(&self, format: ExportFormat) -> String {
        let stem = self
            .request
            .original_file_name
            .as_deref()
            .and_then(|name| Path::new(name).file_stem())
            .and_then(|stem| stem.to_str())
            .map(sanitize_file_stem)
            .filter(|stem| !stem.is_empty())
            .unwrap_or_else(|| DEFAULT_FILE_STEM.to_string());
        format!("{}.{}", stem, format.extension())
    }

    /// Rows taken by the metadata block
    fn metadata_height(&self) -> usize {
        match &self.request.metadata_with_format {
            Some(rows) if !rows.is_empty() => rows.len(),
            _ => self.request.header_rows.len(),
        }
    }

    /// Reject layouts that do not fit in a worksheet
    pub fn validate(&self) -> CueResult<()> {
        let rows = self
            .metadata_height()
            .max(self.request.header_rows.len())
            .checked_add(self.request.blank_lines)
            .and_then(|rows| rows.checked_add(1 + self.request.markers.len()));
        match rows {
            Some(rows) if rows <= MAX_SHEET_ROWS => {}
            _ => {
                return Err(CueError::Validation(format!(
                    "Export does not fit in a sheet: blankLines {} with {} markers exceeds {} rows",
                    self.request.blank_lines,
                    self.request.markers.len(),
                    MAX_SHEET_ROWS
                )))
            }
        }

        if self.fields.len() > MAX_SHEET_COLS {
            return Err(CueError::Validation(format!(
                "Export has {} columns, the limit is {}",
                self.fields.len(),
                MAX_SHEET_COLS
            )));
        }
        Ok(())
    }

    /// Generate the export in the requested format
    pub fn export(&self, format: ExportFormat) -> CueResult<ExportedFile> {
        self.validate()?;
        debug!(
            ?format,
            markers = self.request.markers.len(),
            fields = self.fields.len(),
            "exporting marker table"
        );

        let bytes = match format {
            ExportFormat::Excel => self.to_xlsx()?,
            ExportFormat::Csv => self.to_csv()?,
        };

        Ok(ExportedFile {
            file_name: self.file_name(format),
            content_type: format.content_type(),
            bytes,
        })
    }

    fn to_csv(&self) -> CueResult<Vec<u8>> {
        let width = self.fields.len().max(1);
        let mut writer = csv::WriterBuilder::new()
            .flexible(true)
            .from_writer(Vec::new());

        let csv_err = |e: csv::Error| CueError::Export(format!("Failed to write CSV: {}", e));

        for row in self.metadata_values() {
            if row.is_empty() {
                writer.write_record(vec![""; width]).map_err(csv_err)?;
            } else {
                writer.write_record(&row).map_err(csv_err)?;
            }
        }
        for _ in 0..self.request.blank_lines {
            writer.write_record(vec![""; width]).map_err(csv_err)?;
        }
        writer.write_record(self.header_labels()).map_err(csv_err)?;
        for row in self.table_rows() {
            writer.write_record(&row).map_err(csv_err)?;
        }

        writer
            .into_inner()
            .map_err(|e| CueError::Export(format!("Failed to finish CSV: {}", e)))
    }

    fn to_xlsx(&self) -> CueResult<Vec<u8>> {
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet
            .set_name(SHEET_NAME)
            .map_err(|e| CueError::Export(format!("Failed to set worksheet name: {}", e)))?;

        // Metadata block, then blank lines, then the marker table
        match &self.request.metadata_with_format {
            Some(rows) if !rows.is_empty() => {
                write_styled_metadata(worksheet, rows, self.fields.len())?
            }
            _ => write_plain_rows(worksheet, &self.request.header_rows)?,
        }

        // Bounded by `validate`
        let header_row = (self.metadata_height() + self.request.blank_lines) as u32;
        self.write_table(worksheet, header_row)?;

        if let Some(widths) = &self.request.column_widths {
            for (letter, width) in widths {
                let Some(col) = column_index(letter)
                    .filter(|&c| c < MAX_SHEET_COLS)
                    .and_then(|c| u16::try_from(c).ok())
                else {
                    continue;
                };
                if !width.is_finite() || *width < 0.0 {
                    continue;
                }
                worksheet
                    .set_column_width(col, *width)
                    .map_err(|e| CueError::Export(format!("Failed to set column width: {}", e)))?;
            }
        }

        workbook
            .save_to_buffer()
            .map_err(|e| CueError::Export(format!("Failed to save Excel file: {}", e)))
    }

    /// 0-based sheet rows to fill, keyed to their highlight color
    fn highlighted_rows(&self) -> HashMap<u32, u32> {
        let markers = &self.request.markers;
        markers
            .iter()
            .enumerate()
            .filter_map(|(idx, marker)| {
                let rgb = marker.mark_color().rgb()?;
                let offset = marker_row_offset(
                    self.request.header_rows.len(),
                    self.request.blank_lines,
                    !markers.is_empty(),
                    idx,
                );
                Some((offset.checked_sub(1)? as u32, rgb))
            })
            .collect()
    }

    fn write_table(&self, worksheet: &mut Worksheet, header_row: u32) -> CueResult<()> {
        let highlights = self.highlighted_rows();
        let header_formats = self.request.table_header_format.as_deref().unwrap_or(&[]);
        let row_formats = self.request.table_row_format.as_deref().unwrap_or(&[]);

        for (col, label) in self.header_labels().iter().enumerate() {
            let col = col as u16;
            let format = table_cell_format(
                header_formats.get(col as usize),
                true,
                highlights.get(&header_row).copied(),
            );
            worksheet
                .write_string_with_format(header_row, col, label, &format)
                .map_err(|e| CueError::Export(format!("Failed to write header: {}", e)))?;
        }

        for (idx, row) in self.table_rows().iter().enumerate() {
            let sheet_row = header_row + 1 + idx as u32;
            let fill = highlights.get(&sheet_row).copied();

            for (col, (field, value)) in self.fields.iter().zip(row).enumerate() {
                let col = col as u16;
                let format = table_cell_format(row_formats.get(col as usize), false, fill);
                let written = if field == SEQ_FIELD {
                    worksheet.write_number_with_format(sheet_row, col, (idx + 1) as f64, &format)
                } else if value.is_empty() {
                    worksheet.write_blank(sheet_row, col, &format)
                } else {
                    worksheet.write_string_with_format(sheet_row, col, value, &format)
                };
                written.map_err(|e| CueError::Export(format!("Failed to write marker row: {}", e)))?;
            }
        }

        Ok(())
    }
}

fn write_plain_rows(worksheet: &mut Worksheet, rows: &[Vec<String>]) -> CueResult<()> {
    for (row_idx, row) in rows.iter().enumerate() {
        for (col_idx, value) in row.iter().enumerate() {
            if value.is_empty() {
                continue;
            }
            worksheet
                .write_string(row_idx as u32, col_idx as u16, value)
                .map_err(|e| CueError::Export(format!("Failed to write metadata: {}", e)))?;
        }
    }
    Ok(())
}

/// Styled metadata block; merges stay inside the block and its column span
fn write_styled_metadata(
    worksheet: &mut Worksheet,
    rows: &[Vec<CellFormat>],
    table_width: usize,
) -> CueResult<()> {
    let height = rows.len();
    let width = rows.iter().map(Vec::len).max().unwrap_or(0).max(table_width);
    let mut merged: Vec<MergedArea> = Vec::new();

    for (row_idx, row) in rows.iter().enumerate() {
        let row_idx = row_idx as u32;
        for (col_idx, cell) in row.iter().enumerate() {
            let col_idx = col_idx as u16;
            if merged.iter().any(|area| area.contains(row_idx, col_idx)) {
                continue;
            }

            let format = styled_format(cell);
            let merge = cell
                .merge_range
                .as_deref()
                .and_then(parse_range)
                .filter(|(first, last)| *first == (row_idx, col_idx) && first != last)
                .filter(|(_, last)| (last.0 as usize) < height && (last.1 as usize) < width)
                .filter(|(first, last)| {
                    let area = MergedArea {
                        first: *first,
                        last: *last,
                    };
                    !merged.iter().any(|other| other.overlaps(&area))
                });

            let written = if let Some((first, last)) = merge {
                merged.push(MergedArea { first, last });
                worksheet
                    .merge_range(first.0, first.1, last.0, last.1, &cell.value, &format)
                    .map(|_| ())
            } else if cell.value.is_empty() {
                if cell.is_unstyled() {
                    continue;
                }
                worksheet.write_blank(row_idx, col_idx, &format).map(|_| ())
            } else {
                worksheet
                    .write_string_with_format(row_idx, col_idx, &cell.value, &format)
                    .map(|_| ())
            };
            written.map_err(|e| CueError::Export(format!("Failed to write metadata: {}", e)))?;
        }
    }
    Ok(())
}

/// Format reproducing a captured template cell
fn styled_format(cell: &CellFormat) -> Format {
    let mut format = Format::new();
    if cell.bold {
        format = format.set_bold();
    }
    if let Some(align) = cell.alignment.as_deref().and_then(format_align) {
        format = format.set_align(align);
    }
    if let Some(rgb) = cell.fill_color.as_deref().and_then(parse_rgb) {
        format = format
            .set_pattern(FormatPattern::Solid)
            .set_background_color(Color::RGB(rgb));
    }
    if let Some(border) = cell.border_style.as_deref().and_then(format_border) {
        format = format.set_border(border);
    }
    format
}

/// Table cells always carry a border; headers default to bold
fn table_cell_format(template: Option<&CellFormat>, header: bool, fill: Option<u32>) -> Format {
    let mut format = match template {
        Some(cell) => styled_format(cell),
        None if header => Format::new().set_bold(),
        None => Format::new(),
    };
    if template.and_then(|c| c.border_style.as_deref()).and_then(format_border).is_none() {
        format = format.set_border(FormatBorder::Thin);
    }
    if let Some(rgb) = fill {
        format = format
            .set_pattern(FormatPattern::Solid)
            .set_background_color(Color::RGB(rgb));
    }
    format
}

fn format_align(alignment: &str) -> Option<FormatAlign> {
    match alignment.to_ascii_lowercase().as_str() {
        "left" => Some(FormatAlign::Left),
        "center" => Some(FormatAlign::Center),
        "right" => Some(FormatAlign::Right),
        "fill" => Some(FormatAlign::Fill),
        "justify" => Some(FormatAlign::Justify),
        "centercontinuous" => Some(FormatAlign::CenterAcross),
        "distributed" => Some(FormatAlign::Distributed),
        _ => None,
    }
}

fn format_border(style: &str) -> Option<FormatBorder> {
    match style.to_ascii_lowercase().as_str() {
        "thin" => Some(FormatBorder::Thin),
        "medium" => Some(FormatBorder::Medium),
        "thick" => Some(FormatBorder::Thick),
        "dashed" => Some(FormatBorder::Dashed),
        "dotted" => Some(FormatBorder::Dotted),
        "double" => Some(FormatBorder::Double),
        "hair" => Some(FormatBorder::Hair),
        "mediumdashed" => Some(FormatBorder::MediumDashed),
        "dashdot" => Some(FormatBorder::DashDot),
        "mediumdashdot" => Some(FormatBorder::MediumDashDot),
        "dashdotdot" => Some(FormatBorder::DashDotDot),
        "mediumdashdotdot" => Some(FormatBorder::MediumDashDotDot),
        "slantdashdot" => Some(FormatBorder::SlantDashDot),
        _ => None,
    }
}

/// `FFFF00`, `#FFFF00` or ARGB `FFFFFF00` → 0xFFFF00
fn parse_rgb(hex: &str) -> Option<u32> {
    let hex = hex.trim().trim_start_matches('#');
    if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let hex = match hex.len() {
        8 => &hex[2..],
        6 => hex,
        _ => return None,
    };
    u32::from_str_radix(hex, 16).ok()
}

fn sanitize_file_stem(stem: &str) -> String {
    stem.chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | ' ' | '.' | '(' | ')') {
                c
            } else {
                '_'
            }
        })
        .collect::<String>()
        .trim()
        .to_string()
}
