//! Cell style capture for .xlsx templates
//!
//! calamine only exposes cell values, so fonts, fills, borders, alignment,
//! column widths and merges are read straight from the package parts.

use std::collections::{BTreeMap, HashMap};
use std::io::{Cursor, Read, Seek};

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use zip::result::ZipError;
use zip::ZipArchive;

use super::cell_ref::{column_letter, parse_cell, parse_range};
use crate::error::{CueError, CueResult};

const DEFAULT_SHEET_PATH: &str = "xl/worksheets/sheet1.xml";

/// Resolved style of one cell
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CellStyle {
    pub bold: bool,
    pub alignment: Option<String>,
    pub fill_color: Option<String>,
    pub border_style: Option<String>,
}

/// A merged area, 0-based inclusive corners
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergedArea {
    pub first: (u32, u16),
    pub last: (u32, u16),
}

impl MergedArea {
    pub fn contains(&self, row: u32, col: u16) -> bool {
        row >= self.first.0 && row <= self.last.0 && col >= self.first.1 && col <= self.last.1
    }

    pub fn overlaps(&self, other: &MergedArea) -> bool {
        self.first.0 <= other.last.0
            && other.first.0 <= self.last.0
            && self.first.1 <= other.last.1
            && other.first.1 <= self.last.1
    }
}

/// Styles of the first worksheet
#[derive(Debug, Clone, Default)]
pub struct SheetStyles {
    cells: HashMap<(u32, u16), CellStyle>,
    pub merges: Vec<MergedArea>,
    pub column_widths: BTreeMap<String, f64>,
}

impl SheetStyles {
    pub fn cell(&self, row: u32, col: u16) -> Option<&CellStyle> {
        self.cells.get(&(row, col))
    }
}

#[derive(Debug, Clone, Default)]
struct CellXf {
    font_id: usize,
    fill_id: usize,
    border_id: usize,
    horizontal: Option<String>,
}

#[derive(Debug, Default)]
struct StyleTable {
    bold_fonts: Vec<bool>,
    fills: Vec<Option<String>>,
    borders: Vec<Option<String>>,
    cell_xfs: Vec<CellXf>,
}

impl StyleTable {
    fn resolve(&self, xf_index: usize) -> Option<CellStyle> {
        let xf = self.cell_xfs.get(xf_index)?;
        Some(CellStyle {
            bold: self.bold_fonts.get(xf.font_id).copied().unwrap_or(false),
            alignment: xf.horizontal.clone(),
            fill_color: self.fills.get(xf.fill_id).cloned().flatten(),
            border_style: self.borders.get(xf.border_id).cloned().flatten(),
        })
    }
}

/// Read styles for the first `max_rows` rows of the workbook's first sheet
pub fn read_xlsx_styles(bytes: &[u8], max_rows: u32) -> CueResult<SheetStyles> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| CueError::Parse(format!("Failed to open xlsx package: {}", e)))?;

    let table = match read_part(&mut archive, "xl/styles.xml")? {
        Some(xml) => parse_style_table(&xml)?,
        None => StyleTable::default(),
    };

    let sheet_path = first_sheet_path(&mut archive)?;
    let sheet_xml = read_part(&mut archive, &sheet_path)?
        .ok_or_else(|| CueError::Parse(format!("Worksheet part '{}' is missing", sheet_path)))?;

    parse_sheet(&sheet_xml, &table, max_rows)
}

fn read_part<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> CueResult<Option<Vec<u8>>> {
    match archive.by_name(name) {
        Ok(mut file) => {
            let mut buf = Vec::new();
            file.read_to_end(&mut buf)?;
            Ok(Some(buf))
        }
        Err(ZipError::FileNotFound) => Ok(None),
        Err(e) => Err(CueError::Parse(format!("Failed to read '{}': {}", name, e))),
    }
}

fn xml_reader(xml: &[u8]) -> Reader<&[u8]> {
    let mut reader = Reader::from_reader(xml);
    let config = reader.config_mut();
    config.expand_empty_elements = true;
    config.check_end_names = false;
    config.trim_text(true);
    reader
}

fn xml_error(e: quick_xml::Error) -> CueError {
    CueError::Parse(format!("Malformed xlsx XML: {}", e))
}

fn attr(event: &BytesStart, key: &[u8]) -> Option<String> {
    event
        .attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == key)
        .map(|a| String::from_utf8_lossy(&a.value).into_owned())
}

fn attr_usize(event: &BytesStart, key: &[u8]) -> usize {
    attr(event, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

/// Locate the first sheet through workbook.xml and its relationships
fn first_sheet_path<R: Read + Seek>(archive: &mut ZipArchive<R>) -> CueResult<String> {
    let Some(workbook) = read_part(archive, "xl/workbook.xml")? else {
        return Ok(DEFAULT_SHEET_PATH.to_string());
    };

    let mut first_id = None;
    let mut reader = xml_reader(&workbook);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf).map_err(xml_error)? {
            Event::Start(e) if e.local_name().as_ref() == b"sheet" => {
                first_id = attr(&e, b"id");
                break;
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    let (Some(id), Some(rels)) = (first_id, read_part(archive, "xl/_rels/workbook.xml.rels")?)
    else {
        return Ok(DEFAULT_SHEET_PATH.to_string());
    };

    let mut reader = xml_reader(&rels);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf).map_err(xml_error)? {
            Event::Start(e) if e.local_name().as_ref() == b"Relationship" => {
                if attr(&e, b"Id").as_deref() == Some(id.as_str()) {
                    if let Some(target) = attr(&e, b"Target") {
                        return Ok(match target.strip_prefix('/') {
                            Some(absolute) => absolute.to_string(),
                            None => format!("xl/{}", target),
                        });
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(DEFAULT_SHEET_PATH.to_string())
}

#[derive(Clone, Copy, PartialEq)]
enum StyleSection {
    Other,
    Fonts,
    Fills,
    Borders,
    CellXfs,
}

fn parse_style_table(xml: &[u8]) -> CueResult<StyleTable> {
    let mut table = StyleTable::default();
    let mut section = StyleSection::Other;
    let mut solid_pattern = false;
    let mut reader = xml_reader(xml);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf).map_err(xml_error)? {
            Event::Start(e) => match (section, e.local_name().as_ref()) {
                (StyleSection::Other, b"fonts") => section = StyleSection::Fonts,
                (StyleSection::Other, b"fills") => section = StyleSection::Fills,
                (StyleSection::Other, b"borders") => section = StyleSection::Borders,
                (StyleSection::Other, b"cellXfs") => section = StyleSection::CellXfs,

                (StyleSection::Fonts, b"font") => table.bold_fonts.push(false),
                (StyleSection::Fonts, b"b") => {
                    let on = attr(&e, b"val").map_or(true, |v| v != "0" && v != "false");
                    if let Some(last) = table.bold_fonts.last_mut() {
                        *last = on;
                    }
                }

                (StyleSection::Fills, b"fill") => {
                    table.fills.push(None);
                    solid_pattern = false;
                }
                // Only solid fills are reproduced
                (StyleSection::Fills, b"patternFill") => {
                    solid_pattern = attr(&e, b"patternType").as_deref() == Some("solid");
                }
                (StyleSection::Fills, b"fgColor") if solid_pattern => {
                    if let (Some(rgb), Some(last)) = (attr(&e, b"rgb"), table.fills.last_mut()) {
                        *last = rgb_hex(&rgb);
                    }
                }

                (StyleSection::Borders, b"border") => table.borders.push(None),
                (StyleSection::Borders, b"left" | b"right" | b"top" | b"bottom") => {
                    if let (Some(style), Some(last)) = (attr(&e, b"style"), table.borders.last_mut())
                    {
                        if last.is_none() {
                            *last = Some(style);
                        }
                    }
                }

                (StyleSection::CellXfs, b"xf") => table.cell_xfs.push(CellXf {
                    font_id: attr_usize(&e, b"fontId"),
                    fill_id: attr_usize(&e, b"fillId"),
                    border_id: attr_usize(&e, b"borderId"),
                    horizontal: None,
                }),
                (StyleSection::CellXfs, b"alignment") => {
                    if let Some(last) = table.cell_xfs.last_mut() {
                        last.horizontal = attr(&e, b"horizontal");
                    }
                }
                _ => {}
            },
            Event::End(e) => {
                if matches!(
                    e.local_name().as_ref(),
                    b"fonts" | b"fills" | b"borders" | b"cellXfs"
                ) {
                    section = StyleSection::Other;
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(table)
}

/// `FFFFFF00` (ARGB) → `FFFF00`; anything but 6 or 8 hex digits is dropped
fn rgb_hex(argb: &str) -> Option<String> {
    let hex = argb.trim();
    if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let rgb = match hex.len() {
        8 => &hex[2..],
        6 => hex,
        _ => return None,
    };
    Some(rgb.to_ascii_uppercase())
}

fn parse_sheet(xml: &[u8], table: &StyleTable, max_rows: u32) -> CueResult<SheetStyles> {
    let mut styles = SheetStyles::default();
    let mut reader = xml_reader(xml);
    let mut buf = Vec::new();
    let mut current_row: u32 = 0;
    let mut next_col: u16 = 0;

    loop {
        match reader.read_event_into(&mut buf).map_err(xml_error)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"col" => {
                    let first = attr_usize(&e, b"min");
                    let last = attr_usize(&e, b"max");
                    let width = attr(&e, b"width").and_then(|w| w.parse::<f64>().ok());
                    if let Some(width) = width {
                        // Whole-sheet column ranges are capped to keep the map small
                        for col in first.max(1)..=last.min(first.max(1) + 255) {
                            styles.column_widths.insert(column_letter(col - 1), width);
                        }
                    }
                }
                b"row" => {
                    current_row = attr(&e, b"r")
                        .and_then(|r| r.parse::<u32>().ok())
                        .map(|r| r.saturating_sub(1))
                        .unwrap_or(current_row);
                    next_col = 0;
                }
                b"c" => {
                    let (row, col) = attr(&e, b"r")
                        .and_then(|r| parse_cell(&r))
                        .unwrap_or((current_row, next_col));
                    next_col = col.saturating_add(1);
                    if row < max_rows {
                        let xf = attr_usize(&e, b"s");
                        if let Some(style) = table.resolve(xf) {
                            styles.cells.insert((row, col), style);
                        }
                    }
                }
                b"mergeCell" => {
                    if let Some((first, last)) = attr(&e, b"ref").and_then(|r| parse_range(&r)) {
                        styles.merges.push(MergedArea { first, last });
                    }
                }
                _ => {}
            },
            Event::End(e) if e.local_name().as_ref() == b"row" => {
                current_row = current_row.saturating_add(1);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(styles)
}
