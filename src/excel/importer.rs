//! Cue sheet template importer - .xlsx / .xls / .csv → ParsedTemplate

use crate::error::{CueError, CueResult};
use crate::excel::cell_ref::format_range;
use crate::excel::styles::{read_xlsx_styles, CellStyle, MergedArea, SheetStyles};
use crate::types::{format_number, CellFormat, ParsedTemplate, TemplateLayout};
use calamine::{Data, Range, Reader, Xls, Xlsx};
use serde_json::{Map, Value};
use std::io::{Cursor, Read, Seek};
use std::path::Path;
use tracing::debug;

/// File types accepted as templates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    Xlsx,
    Xls,
    Csv,
}

impl TemplateKind {
    /// Decide the template kind from a file name's extension
    pub fn from_file_name(file_name: &str) -> CueResult<Self> {
        let ext = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "xlsx" => Ok(TemplateKind::Xlsx),
            "xls" => Ok(TemplateKind::Xls),
            "csv" => Ok(TemplateKind::Csv),
            _ => Err(CueError::UnsupportedFileType(if ext.is_empty() {
                file_name.to_string()
            } else {
                ext
            })),
        }
    }
}

/// Cell grid of the first worksheet, addressed by absolute sheet position
struct SheetGrid {
    rows: Vec<Vec<String>>,
    merges: Vec<MergedArea>,
}

impl SheetGrid {
    /// Grid over `rows`, with merges clipped to the cells that hold values
    fn new(rows: Vec<Vec<String>>, merges: Vec<MergedArea>) -> Self {
        let height = rows.len() as u32;
        let width = rows.iter().map(Vec::len).max().unwrap_or(0) as u16;
        let merges = merges
            .into_iter()
            .filter(|m| m.first.0 < height && m.first.1 < width)
            .map(|m| MergedArea {
                first: m.first,
                last: (m.last.0.min(height - 1), m.last.1.min(width - 1)),
            })
            .collect();
        Self { rows, merges }
    }

    fn cell(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Copy each merge's top-left value into every cell it covers
    fn resolve_merges(&mut self) {
        for area in &self.merges {
            let value = self.cell(area.first.0 as usize, area.first.1 as usize).to_string();
            for row in area.first.0..=area.last.0 {
                let row = row as usize;
                if row >= self.rows.len() {
                    self.rows.resize(row + 1, Vec::new());
                }
                let cells = &mut self.rows[row];
                let last_col = area.last.1 as usize;
                if cells.len() <= last_col {
                    cells.resize(last_col + 1, String::new());
                }
                for col in area.first.1 as usize..=last_col {
                    cells[col] = value.clone();
                }
            }
        }
    }

    fn trim_rows(&mut self) {
        for row in &mut self.rows {
            while row.last().is_some_and(|c| c.is_empty()) {
                row.pop();
            }
        }
    }
}

/// Template importer splitting a sheet into metadata, header and data rows
pub struct TemplateParser {
    layout: TemplateLayout,
}

impl TemplateParser {
    /// Create a new template parser
    pub fn new(layout: TemplateLayout) -> Self {
        Self { layout }
    }

    /// Parse a template from disk
    pub fn parse_file<P: AsRef<Path>>(&self, path: P) -> CueResult<ParsedTemplate> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        // Reject the extension before touching the file
        TemplateKind::from_file_name(file_name)?;
        let bytes = std::fs::read(path)?;
        self.parse(file_name, &bytes)
    }

    /// Parse an uploaded template
    pub fn parse(&self, file_name: &str, bytes: &[u8]) -> CueResult<ParsedTemplate> {
        let kind = TemplateKind::from_file_name(file_name)?;
        debug!(file_name, ?kind, size = bytes.len(), "parsing cue sheet template");

        match kind {
            TemplateKind::Xlsx => self.parse_xlsx(bytes),
            TemplateKind::Xls => self.parse_xls(bytes),
            TemplateKind::Csv => self.parse_csv(bytes),
        }
    }

    fn parse_xlsx(&self, bytes: &[u8]) -> CueResult<ParsedTemplate> {
        let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes))
            .map_err(|e| CueError::Parse(format!("Failed to open Excel file: {}", e)))?;
        let (_, range) = first_sheet_range::<Cursor<&[u8]>, _>(&mut workbook)?;

        // Blank separator rows can push the table down, so styles cover the used range
        let rows = grid_rows(&range);
        let mut styles = read_xlsx_styles(bytes, rows.len() as u32)?;
        let mut grid = SheetGrid::new(rows, std::mem::take(&mut styles.merges));
        grid.resolve_merges();
        grid.trim_rows();

        let kept = non_empty_rows(&grid.rows);
        let mut template = self.split(&grid.rows, &kept);
        self.capture_formats(&mut template, &grid, &kept, Some(&styles));
        template.column_widths = Some(styles.column_widths);
        Ok(template)
    }

    fn parse_xls(&self, bytes: &[u8]) -> CueResult<ParsedTemplate> {
        let mut workbook: Xls<_> = Xls::new(Cursor::new(bytes))
            .map_err(|e| CueError::Parse(format!("Failed to open Excel file: {}", e)))?;
        let (sheet_name, range) = first_sheet_range::<Cursor<&[u8]>, _>(&mut workbook)?;

        let merges = workbook
            .worksheet_merge_cells(&sheet_name)
            .unwrap_or_default()
            .into_iter()
            .map(|d| MergedArea {
                first: (d.start.0, d.start.1 as u16),
                last: (d.end.0, d.end.1 as u16),
            })
            .collect();

        let mut grid = SheetGrid::new(grid_rows(&range), merges);
        grid.resolve_merges();
        grid.trim_rows();

        // Legacy workbooks keep values and merges; styles are not captured
        let kept = non_empty_rows(&grid.rows);
        let mut template = self.split(&grid.rows, &kept);
        self.capture_formats(&mut template, &grid, &kept, None);
        Ok(template)
    }

    fn parse_csv(&self, bytes: &[u8]) -> CueResult<ParsedTemplate> {
        let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(bytes);

        let mut rows = Vec::new();
        for record in reader.byte_records() {
            let record =
                record.map_err(|e| CueError::Parse(format!("Failed to read CSV: {}", e)))?;
            let mut row: Vec<String> = record
                .iter()
                .map(|field| String::from_utf8_lossy(field).into_owned())
                .collect();
            while row.last().is_some_and(|c| c.is_empty()) {
                row.pop();
            }
            rows.push(row);
        }

        let kept = non_empty_rows(&rows);
        Ok(self.split(&rows, &kept))
    }

    /// Slice the `kept` (non-empty) rows into metadata / header / data
    fn split(&self, rows: &[Vec<String>], kept: &[usize]) -> ParsedTemplate {
        let rows: Vec<&Vec<String>> = kept.iter().map(|&idx| &rows[idx]).collect();

        let metadata: Vec<Vec<String>> = rows
            .iter()
            .take(self.layout.metadata_rows)
            .map(|row| (*row).clone())
            .collect();

        let header: Vec<String> = rows
            .get(self.layout.header_index())
            .map(|row| (*row).clone())
            .unwrap_or_default();

        let data = rows
            .iter()
            .skip(self.layout.first_data_index())
            .map(|row| {
                let mut record = Map::new();
                for (idx, name) in header.iter().enumerate() {
                    if name.is_empty() {
                        continue;
                    }
                    let value = row.get(idx).cloned().unwrap_or_default();
                    record.insert(name.clone(), Value::String(value));
                }
                record
            })
            .collect();

        ParsedTemplate {
            metadata,
            header,
            data,
            ..Default::default()
        }
    }

    /// Formatting of the metadata, header and first data rows
    ///
    /// `kept` maps each non-empty row to its sheet row, so formats come from
    /// the same rows as the values.
    fn capture_formats(
        &self,
        template: &mut ParsedTemplate,
        grid: &SheetGrid,
        kept: &[usize],
        styles: Option<&SheetStyles>,
    ) {
        let row_formats = |row: usize| -> Vec<CellFormat> {
            let width = grid
                .merges
                .iter()
                .filter(|m| m.first.0 as usize == row)
                .map(|m| m.first.1 as usize + 1)
                .chain(std::iter::once(grid.rows.get(row).map_or(0, Vec::len)))
                .max()
                .unwrap_or(0);

            (0..width)
                .map(|col| {
                    let style = styles
                        .and_then(|s| s.cell(row as u32, col as u16))
                        .cloned()
                        .unwrap_or_default();
                    let merge_range = grid
                        .merges
                        .iter()
                        .find(|m| m.first == (row as u32, col as u16))
                        .map(|m| format_range(m.first, m.last));
                    cell_format(grid.cell(row, col), style, merge_range)
                })
                .collect()
        };

        let formats_at =
            |idx: usize| kept.get(idx).map(|&row| row_formats(row)).unwrap_or_default();

        template.metadata_with_format = Some(
            kept.iter()
                .take(self.layout.metadata_rows)
                .map(|&row| row_formats(row))
                .collect(),
        );
        template.table_header_format = Some(formats_at(self.layout.header_index()));
        template.table_row_format = Some(formats_at(self.layout.first_data_index()));
    }
}

fn cell_format(value: &str, style: CellStyle, merge_range: Option<String>) -> CellFormat {
    CellFormat {
        value: value.to_string(),
        bold: style.bold,
        alignment: style.alignment,
        merge_range,
        fill_color: style.fill_color,
        border_style: style.border_style,
    }
}

/// Indices of the rows holding at least one value
fn non_empty_rows(rows: &[Vec<String>]) -> Vec<usize> {
    rows.iter()
        .enumerate()
        .filter(|(_, row)| row.iter().any(|cell| !cell.is_empty()))
        .map(|(idx, _)| idx)
        .collect()
}

/// Values of the workbook's first worksheet
fn first_sheet_range<RS, R>(workbook: &mut R) -> CueResult<(String, Range<Data>)>
where
    RS: Read + Seek,
    R: Reader<RS>,
    R::Error: std::fmt::Display,
{
    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| CueError::Parse("Workbook has no worksheets".to_string()))?;
    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| CueError::Parse(format!("Failed to read sheet '{}': {}", sheet_name, e)))?;
    Ok((sheet_name, range))
}

/// Absolute-position rows of a calamine range
fn grid_rows(range: &Range<Data>) -> Vec<Vec<String>> {
    let (start_row, start_col) = range.start().unwrap_or((0, 0));
    let mut rows = vec![Vec::new(); start_row as usize];
    for row in range.rows() {
        let mut cells = vec![String::new(); start_col as usize];
        cells.extend(row.iter().map(data_text));
        rows.push(cells);
    }
    rows
}

/// Render a calamine cell as text
fn data_text(cell: &Data) -> String {
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) => format_number(*f),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| format_number(dt.as_f64())),
        other => other.to_string(),
    }
}
