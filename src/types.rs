use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

use crate::error::{CueError, CueResult};

//==============================================================================
// Template Layout
//==============================================================================

/// Number of metadata rows in a stock cue sheet template
pub const DEFAULT_METADATA_ROWS: usize = 6;

/// Upper bound accepted for `metadata_rows`
pub const MAX_METADATA_ROWS: usize = 64;

/// Fixed shape of an imported cue sheet: metadata rows, one header row, then data rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateLayout {
    pub metadata_rows: usize,
}

impl Default for TemplateLayout {
    fn default() -> Self {
        Self {
            metadata_rows: DEFAULT_METADATA_ROWS,
        }
    }
}

impl TemplateLayout {
    /// Create a validated layout
    pub fn new(metadata_rows: usize) -> CueResult<Self> {
        let layout = Self { metadata_rows };
        layout.validate()?;
        Ok(layout)
    }

    pub fn validate(&self) -> CueResult<()> {
        if self.metadata_rows == 0 || self.metadata_rows > MAX_METADATA_ROWS {
            return Err(CueError::Validation(format!(
                "metadata_rows must be between 1 and {}, got {}",
                MAX_METADATA_ROWS, self.metadata_rows
            )));
        }
        Ok(())
    }

    /// 0-based index of the table header row (after empty rows are dropped)
    pub fn header_index(&self) -> usize {
        self.metadata_rows
    }

    /// 0-based index of the first data row
    pub fn first_data_index(&self) -> usize {
        self.metadata_rows + 1
    }
}

//==============================================================================
// Cell Text
//==============================================================================

/// Render a JSON cell value the way it appears in an exported cell
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() => format_number(f),
            _ => n.to_string(),
        },
        Value::Array(items) => items.iter().map(cell_text).collect::<Vec<_>>().join(","),
        Value::Object(_) => value.to_string(),
    }
}

/// Format a float without a trailing `.0` when it is integral
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

fn deserialize_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(cell_text(&value))
}

fn deserialize_rows<'de, D>(deserializer: D) -> Result<Vec<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let rows = Option::<Vec<Vec<Value>>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(rows
        .iter()
        .map(|row| row.iter().map(cell_text).collect())
        .collect())
}

//==============================================================================
// Cell Formatting
//==============================================================================

/// Value and captured style of a single template cell
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CellFormat {
    #[serde(default, deserialize_with = "deserialize_text")]
    pub value: String,
    #[serde(default)]
    pub bold: bool,
    /// Horizontal alignment (`left`, `center`, `right`, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alignment: Option<String>,
    /// A1-style range of the merge this cell anchors, e.g. `A1:C1`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_range: Option<String>,
    /// RGB hex without the alpha byte, e.g. `FFFF00`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub border_style: Option<String>,
}

impl CellFormat {
    pub fn plain(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            ..Default::default()
        }
    }

    /// True when the cell carries no styling at all
    pub fn is_unstyled(&self) -> bool {
        !self.bold
            && self.alignment.is_none()
            && self.merge_range.is_none()
            && self.fill_color.is_none()
            && self.border_style.is_none()
    }
}

//==============================================================================
// Parsed Template
//==============================================================================

/// Result of ingesting a cue sheet template
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedTemplate {
    pub metadata: Vec<Vec<String>>,
    pub metadata_with_format: Option<Vec<Vec<CellFormat>>>,
    pub header: Vec<String>,
    pub data: Vec<Map<String, Value>>,
    pub table_header_format: Option<Vec<CellFormat>>,
    pub table_row_format: Option<Vec<CellFormat>>,
    pub column_widths: Option<BTreeMap<String, f64>>,
}

//==============================================================================
// Markers
//==============================================================================

/// Row highlight chosen for a marker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MarkColor {
    #[default]
    None,
    Yellow,
    Red,
}

impl MarkColor {
    pub fn from_value(value: &Value) -> Self {
        match value.as_str().map(|s| s.trim().to_ascii_lowercase()) {
            Some(s) if s == "yellow" => MarkColor::Yellow,
            Some(s) if s == "red" => MarkColor::Red,
            _ => MarkColor::None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MarkColor::None => "",
            MarkColor::Yellow => "yellow",
            MarkColor::Red => "red",
        }
    }

    /// Solid fill color for a highlighted row
    pub fn rgb(&self) -> Option<u32> {
        match self {
            MarkColor::None => None,
            MarkColor::Yellow => Some(0xFFFF00),
            MarkColor::Red => Some(0xFF0000),
        }
    }
}

/// Usage codes attached to a marker (BI, BV, VI, VV, SRC and combinations)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Usage {
    /// A list of codes, from a JSON array or its textual encoding
    Tags(Vec<String>),
    /// Free text, typically an already comma-joined list
    Text(String),
}

impl Usage {
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Array(items) => Some(Usage::Tags(items.iter().map(cell_text).collect())),
            Value::String(s) => Some(Self::from_text(s)),
            other => Some(Usage::Text(cell_text(other))),
        }
    }

    fn from_text(text: &str) -> Self {
        let trimmed = text.trim();
        if trimmed.starts_with('[') && trimmed.ends_with(']') {
            let parsed = serde_json::from_str::<Vec<Value>>(trimmed)
                .or_else(|_| serde_json::from_str::<Vec<Value>>(&trimmed.replace('\'', "\"")));
            if let Ok(items) = parsed {
                return Usage::Tags(items.iter().map(cell_text).collect());
            }
        }
        Usage::Text(text.to_string())
    }

    /// Comma-joined form written to exported cells
    pub fn joined(&self) -> String {
        match self {
            Usage::Tags(tags) => tags.join(","),
            Usage::Text(text) => text.clone(),
        }
    }
}

/// A time-coded annotation record
///
/// Fields keep their original order. `usage` and `markColor` are resolved
/// once into typed views when the marker is built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct Marker {
    fields: Map<String, Value>,
    usage: Option<Usage>,
    mark_color: MarkColor,
}

impl From<Map<String, Value>> for Marker {
    fn from(fields: Map<String, Value>) -> Self {
        let usage = fields.get("usage").and_then(Usage::from_value);
        let mark_color = fields
            .get("markColor")
            .map(MarkColor::from_value)
            .unwrap_or_default();
        Self {
            fields,
            usage,
            mark_color,
        }
    }
}

impl From<Marker> for Map<String, Value> {
    fn from(marker: Marker) -> Self {
        marker.fields
    }
}

impl Marker {
    pub fn new(fields: Map<String, Value>) -> Self {
        fields.into()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn usage(&self) -> Option<&Usage> {
        self.usage.as_ref()
    }

    pub fn mark_color(&self) -> MarkColor {
        self.mark_color
    }
}

//==============================================================================
// Export Request
//==============================================================================

/// Display format for timecode columns
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeFormat {
    #[serde(rename = "HH:MM:SS")]
    Seconds,
    #[default]
    #[serde(rename = "HH:MM:SS:FF")]
    Frames,
}

/// Target file type of an export
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Excel,
    Csv,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Excel => "xlsx",
            ExportFormat::Csv => "csv",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Excel => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
            ExportFormat::Csv => "text/csv; charset=utf-8",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = CueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "excel" | "xlsx" => Ok(ExportFormat::Excel),
            "csv" => Ok(ExportFormat::Csv),
            _ => Err(CueError::Validation("Invalid export format".to_string())),
        }
    }
}

/// Everything needed to regenerate a cue sheet from markers
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRequest {
    #[serde(default, deserialize_with = "deserialize_rows")]
    pub header_rows: Vec<Vec<String>>,
    #[serde(default)]
    pub markers: Vec<Marker>,
    #[serde(default)]
    pub blank_lines: usize,
    #[serde(default)]
    pub fields_to_export: Option<Vec<String>>,
    #[serde(default)]
    pub field_labels: HashMap<String, String>,
    #[serde(default)]
    pub time_format: TimeFormat,
    #[serde(default, rename = "metadata_with_format")]
    pub metadata_with_format: Option<Vec<Vec<CellFormat>>>,
    #[serde(default, rename = "table_header_format")]
    pub table_header_format: Option<Vec<CellFormat>>,
    #[serde(default, rename = "table_row_format")]
    pub table_row_format: Option<Vec<CellFormat>>,
    #[serde(default, rename = "column_widths")]
    pub column_widths: Option<BTreeMap<String, f64>>,
    #[serde(default)]
    pub original_file_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_layout_default_offsets() {
        let layout = TemplateLayout::default();
        assert_eq!(layout.header_index(), 6);
        assert_eq!(layout.first_data_index(), 7);
    }

    #[test]
    fn test_layout_rejects_zero_and_oversized() {
        assert!(TemplateLayout::new(0).is_err());
        assert!(TemplateLayout::new(MAX_METADATA_ROWS + 1).is_err());
        assert!(TemplateLayout::new(3).is_ok());
    }

    #[test]
    fn test_cell_text_numbers() {
        assert_eq!(cell_text(&json!(3.0)), "3");
        assert_eq!(cell_text(&json!(2.5)), "2.5");
        assert_eq!(cell_text(&json!(42)), "42");
        assert_eq!(cell_text(&Value::Null), "");
    }

    #[test]
    fn test_usage_from_list() {
        let usage = Usage::from_value(&json!(["BI", "BV"])).unwrap();
        assert_eq!(usage, Usage::Tags(vec!["BI".to_string(), "BV".to_string()]));
        assert_eq!(usage.joined(), "BI,BV");
    }

    #[test]
    fn test_usage_from_encoded_list() {
        let usage = Usage::from_value(&json!("[\"VI\",\"VV\"]")).unwrap();
        assert_eq!(usage.joined(), "VI,VV");

        let python_style = Usage::from_value(&json!("['SRC', 'BI']")).unwrap();
        assert_eq!(python_style.joined(), "SRC,BI");
    }

    #[test]
    fn test_usage_joined_is_idempotent() {
        let first = Usage::from_value(&json!(["BI", "VV"])).unwrap().joined();
        let second = Usage::from_value(&json!(first.clone())).unwrap().joined();
        assert_eq!(first, second);
    }

    #[test]
    fn test_usage_malformed_list_stays_text() {
        let usage = Usage::from_value(&json!("[BI")).unwrap();
        assert_eq!(usage, Usage::Text("[BI".to_string()));
    }

    #[test]
    fn test_marker_resolves_typed_views() {
        let marker: Marker = serde_json::from_value(json!({
            "tcrIn": "00:00:01:00",
            "usage": ["BI"],
            "markColor": "Yellow",
            "title": "Song"
        }))
        .unwrap();

        assert_eq!(marker.mark_color(), MarkColor::Yellow);
        assert_eq!(marker.usage().map(Usage::joined), Some("BI".to_string()));
        let names: Vec<&String> = marker.field_names().collect();
        assert_eq!(names, vec!["tcrIn", "usage", "markColor", "title"]);
    }

    #[test]
    fn test_marker_unknown_color_is_none() {
        let marker = Marker::new(
            json!({"markColor": "blue"})
                .as_object()
                .cloned()
                .unwrap_or_default(),
        );
        assert_eq!(marker.mark_color(), MarkColor::None);
        assert_eq!(marker.mark_color().rgb(), None);
    }

    #[test]
    fn test_export_format_from_str() {
        assert_eq!("excel".parse::<ExportFormat>().unwrap(), ExportFormat::Excel);
        assert_eq!("CSV".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert!("pdf".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn test_export_request_defaults() {
        let req: ExportRequest = serde_json::from_str(r#"{"markers": []}"#).unwrap();
        assert_eq!(req.blank_lines, 0);
        assert_eq!(req.time_format, TimeFormat::Frames);
        assert!(req.fields_to_export.is_none());
        assert!(req.header_rows.is_empty());
    }

    #[test]
    fn test_export_request_wire_names() {
        let req: ExportRequest = serde_json::from_value(json!({
            "headerRows": [["Series Title", null, 3]],
            "blankLines": 2,
            "fieldsToExport": ["tcrIn"],
            "timeFormat": "HH:MM:SS",
            "table_header_format": [{"value": "TCR In", "bold": true}],
            "column_widths": {"A": 12.5},
            "originalFileName": "episode.xlsx"
        }))
        .unwrap();

        assert_eq!(req.header_rows, vec![vec!["Series Title", "", "3"]]);
        assert_eq!(req.blank_lines, 2);
        assert_eq!(req.time_format, TimeFormat::Seconds);
        assert!(req.table_header_format.unwrap()[0].bold);
        assert_eq!(req.column_widths.unwrap()["A"], 12.5);
        assert_eq!(req.original_file_name.as_deref(), Some("episode.xlsx"));
    }
}
