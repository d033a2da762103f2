use crate::error::{CueError, CueResult};
use crate::excel::{MarkerExporter, TemplateParser};
use crate::types::{ExportFormat, ExportRequest, ParsedTemplate, TemplateLayout};
use colored::Colorize;
use std::fs;
use std::path::{Path, PathBuf};

/// Execute the parse command
///
/// Without an output path the template JSON goes to stdout and the
/// summary to stderr, so the command can be piped.
pub fn parse(
    file: PathBuf,
    output: Option<PathBuf>,
    layout: TemplateLayout,
    verbose: bool,
) -> CueResult<()> {
    let template = TemplateParser::new(layout).parse_file(&file)?;
    let json = serde_json::to_string_pretty(&template)?;

    match output {
        Some(output) => {
            println!("{}", "🎬 Cuelog - Parse cue sheet".bold().green());
            println!("   File:   {}", file.display());
            println!("   Output: {}\n", output.display());
            if verbose {
                print_template_summary(&template);
            }
            fs::write(&output, json)?;
            println!("{}", "✅ Parse Complete!".bold().green());
            println!(
                "   {} metadata rows, {} columns, {} data rows\n",
                template.metadata.len(),
                template.header.len(),
                template.data.len()
            );
        }
        None => {
            if verbose {
                eprintln!("{}", "🎬 Cuelog - Parse cue sheet".bold().green());
                eprintln!("   File: {}", file.display());
                eprintln!("   Header: {}", template.header.join(" | ").cyan());
            }
            println!("{}", json);
        }
    }

    Ok(())
}

fn print_template_summary(template: &ParsedTemplate) {
    println!("{}", "📖 Template layout:".cyan());
    for (idx, row) in template.metadata.iter().enumerate() {
        let cells: Vec<&str> = row
            .iter()
            .map(String::as_str)
            .filter(|c| !c.is_empty())
            .collect();
        println!("   {:>2}. {}", idx + 1, cells.join(" | "));
    }
    println!("   Header: {}", template.header.join(" | ").bright_blue().bold());
    if let Some(widths) = &template.column_widths {
        println!("   Column widths: {}", widths.len());
    }
    println!();
}

/// Execute the export command
pub fn export(
    request_file: PathBuf,
    format: ExportFormat,
    output: Option<PathBuf>,
    verbose: bool,
) -> CueResult<()> {
    println!("{}", "🎬 Cuelog - Marker Export".bold().green());
    println!("   Request: {}", request_file.display());

    let content = fs::read_to_string(&request_file)?;
    let request: ExportRequest = serde_json::from_str(&content)?;

    if verbose {
        println!(
            "   {} markers, {} metadata rows, {} blank lines",
            request.markers.len(),
            request.header_rows.len(),
            request.blank_lines
        );
    }

    let exporter = MarkerExporter::new(&request);
    if verbose {
        println!("   Columns: {}", exporter.header_labels().join(" | ").cyan());
    }

    let file = exporter.export(format)?;
    let output = output.unwrap_or_else(|| default_output(&request_file, &file.file_name));
    fs::write(&output, &file.bytes)
        .map_err(|e| CueError::Export(format!("Failed to write {}: {}", output.display(), e)))?;

    println!("\n{}", "✅ Export Complete!".bold().green());
    println!("   {} file: {}\n", format.extension(), output.display());
    Ok(())
}

/// Next to the request file, named after the export
fn default_output(request_file: &Path, file_name: &str) -> PathBuf {
    request_file
        .parent()
        .map(|dir| dir.join(file_name))
        .unwrap_or_else(|| PathBuf::from(file_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const TEMPLATE_CSV: &str = "Series,Night Shift\nEpisode,7\nA\nB\nC\nD\nTCR In,Title\n00:00:01,Intro\n";

    #[test]
    fn test_parse_writes_json() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("sheet.csv");
        let output = dir.path().join("sheet.json");
        fs::write(&input, TEMPLATE_CSV).unwrap();

        parse(input, Some(output.clone()), TemplateLayout::default(), true).unwrap();

        let template: ParsedTemplate =
            serde_json::from_str(&fs::read_to_string(output).unwrap()).unwrap();
        assert_eq!(template.header, vec!["TCR In", "Title"]);
        assert_eq!(template.data.len(), 1);
    }

    #[test]
    fn test_parse_rejects_unsupported() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("notes.txt");
        fs::write(&input, "hello").unwrap();

        let err = parse(input, None, TemplateLayout::default(), false).unwrap_err();
        assert!(matches!(err, CueError::UnsupportedFileType(_)));
    }

    #[test]
    fn test_export_default_output_next_to_request() {
        let dir = TempDir::new().unwrap();
        let request = dir.path().join("request.json");
        fs::write(
            &request,
            r#"{"markers": [{"tcrIn": 1.0, "title": "A"}], "originalFileName": "ep7.xlsx"}"#,
        )
        .unwrap();

        export(request, ExportFormat::Csv, None, true).unwrap();

        let csv = fs::read_to_string(dir.path().join("ep7.csv")).unwrap();
        assert!(csv.starts_with("SEQ#,tcrIn,title"));
    }

    #[test]
    fn test_export_invalid_request() {
        let dir = TempDir::new().unwrap();
        let request = dir.path().join("request.json");
        fs::write(&request, "[1, 2").unwrap();

        let err = export(request, ExportFormat::Excel, None, false).unwrap_err();
        assert!(matches!(err, CueError::Json(_)));
    }
}
