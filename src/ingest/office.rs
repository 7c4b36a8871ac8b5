//! Text extraction for OOXML packages (word-processor documents and workbooks).
//!
//! Both formats are zip archives of XML parts. Documents contribute the text of their `w:t`
//! runs; workbooks are rendered sheet by sheet as comma-separated blocks, which keeps the
//! token count low for downstream model consumption.

use super::types::ExtractionError;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::Cursor;
use zip::ZipArchive;

type Package<'a> = ZipArchive<Cursor<&'a [u8]>>;

/// Extract the visible text of a `.docx` document, prefixed with a header naming the file.
pub(crate) fn extract_docx(bytes: &[u8], filename: &str) -> Result<String, ExtractionError> {
    let mut package = open_package(bytes, filename)?;
    let xml = read_part(&mut package, "word/document.xml", filename)?;
    let body = document_text(&xml).map_err(|err| ExtractionError::parse(filename, err))?;
    Ok(format!("Conteúdo do arquivo DOCX: {filename}\n\n{body}"))
}

/// Render every sheet of an `.xlsx` workbook as CSV, in workbook order.
pub(crate) fn extract_workbook(bytes: &[u8], filename: &str) -> Result<String, ExtractionError> {
    let mut package = open_package(bytes, filename)?;
    let workbook = read_part(&mut package, "xl/workbook.xml", filename)?;
    let sheets = sheet_entries(&workbook).map_err(|err| ExtractionError::parse(filename, err))?;

    let relationships = match read_optional_part(&mut package, "xl/_rels/workbook.xml.rels", filename)? {
        Some(xml) => {
            relationship_targets(&xml).map_err(|err| ExtractionError::parse(filename, err))?
        }
        None => HashMap::new(),
    };

    let shared_strings = match read_optional_part(&mut package, "xl/sharedStrings.xml", filename)? {
        Some(xml) => shared_strings(&xml).map_err(|err| ExtractionError::parse(filename, err))?,
        None => Vec::new(),
    };

    let mut output = format!("Conteúdo do arquivo Excel: {filename}\n");
    for (position, sheet) in sheets.iter().enumerate() {
        let part = relationships
            .get(&sheet.relationship_id)
            .map(|target| resolve_target(target))
            .unwrap_or_else(|| format!("xl/worksheets/sheet{}.xml", position + 1));
        let xml = read_part(&mut package, &part, filename)?;
        let cells =
            sheet_cells(&xml, &shared_strings).map_err(|err| ExtractionError::parse(filename, err))?;
        output.push_str(&format!("\n--- Planilha: {} ---\n{}", sheet.name, cells_to_csv(&cells)));
    }

    tracing::debug!(file = filename, sheets = sheets.len(), "Workbook rendered");
    Ok(output)
}

fn open_package<'a>(bytes: &'a [u8], filename: &str) -> Result<Package<'a>, ExtractionError> {
    ZipArchive::new(Cursor::new(bytes))
        .map_err(|err| ExtractionError::parse(filename, format!("not an OOXML package: {err}")))
}

fn read_part(package: &mut Package<'_>, path: &str, filename: &str) -> Result<String, ExtractionError> {
    read_optional_part(package, path, filename)?
        .ok_or_else(|| ExtractionError::parse(filename, format!("missing package part {path}")))
}

fn read_optional_part(
    package: &mut Package<'_>,
    path: &str,
    filename: &str,
) -> Result<Option<String>, ExtractionError> {
    let part = match package.by_name(path) {
        Ok(part) => part,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(err) => return Err(ExtractionError::parse(filename, err)),
    };
    std::io::read_to_string(part)
        .map(Some)
        .map_err(|err| ExtractionError::parse(filename, format!("failed to read {path}: {err}")))
}

fn document_text(xml: &str) -> Result<String, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut text = String::new();
    let mut in_run_text = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) if e.local_name().as_ref() == b"t" => in_run_text = true,
            Event::End(ref e) => match e.local_name().as_ref() {
                b"t" => in_run_text = false,
                b"p" => text.push_str("\n\n"),
                _ => {}
            },
            Event::Empty(ref e) => match e.local_name().as_ref() {
                b"tab" => text.push('\t'),
                b"br" | b"cr" => text.push('\n'),
                _ => {}
            },
            Event::Text(e) if in_run_text => text.push_str(&e.unescape()?),
            Event::CData(e) if in_run_text => {
                text.push_str(&String::from_utf8_lossy(&e.into_inner()))
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(text.trim_end().to_string())
}

struct SheetEntry {
    name: String,
    relationship_id: String,
}

fn sheet_entries(xml: &str) -> Result<Vec<SheetEntry>, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut sheets = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) | Event::Empty(ref e) if e.local_name().as_ref() == b"sheet" => {
                sheets.push(SheetEntry {
                    name: attribute(e, b"name")?.unwrap_or_default(),
                    relationship_id: attribute(e, b"id")?.unwrap_or_default(),
                });
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(sheets)
}

fn relationship_targets(xml: &str) -> Result<HashMap<String, String>, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut targets = HashMap::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) | Event::Empty(ref e)
                if e.local_name().as_ref() == b"Relationship" =>
            {
                if let (Some(id), Some(target)) = (attribute(e, b"Id")?, attribute(e, b"Target")?) {
                    targets.insert(id, target);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(targets)
}

fn resolve_target(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("xl/{target}"),
    }
}

fn shared_strings(xml: &str) -> Result<Vec<String>, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_text = false;
    let mut in_phonetic = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) => match e.local_name().as_ref() {
                b"si" => current.clear(),
                b"rPh" => in_phonetic = true,
                b"t" if !in_phonetic => in_text = true,
                _ => {}
            },
            Event::End(ref e) => match e.local_name().as_ref() {
                b"si" => strings.push(std::mem::take(&mut current)),
                b"rPh" => in_phonetic = false,
                b"t" => in_text = false,
                _ => {}
            },
            Event::Empty(ref e) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Event::Text(e) if in_text => current.push_str(&e.unescape()?),
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(strings)
}

type CellGrid = BTreeMap<usize, BTreeMap<usize, String>>;

#[derive(Default)]
struct PendingCell {
    row: usize,
    column: usize,
    cell_type: Option<String>,
    raw: String,
    inline: String,
}

fn sheet_cells(xml: &str, shared: &[String]) -> Result<CellGrid, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut grid = CellGrid::new();
    let mut row = 0usize;
    let mut next_column = 0usize;
    let mut cell: Option<PendingCell> = None;
    let mut in_value = false;
    let mut in_inline = false;
    let mut in_inline_text = false;
    let mut in_phonetic = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) => match e.local_name().as_ref() {
                b"row" => {
                    row = start_row(e, row)?;
                    next_column = 0;
                }
                b"c" => {
                    let (cell_row, column) = cell_position(e, row, next_column)?;
                    next_column = column + 1;
                    cell = Some(PendingCell {
                        row: cell_row,
                        column,
                        cell_type: attribute(e, b"t")?,
                        ..PendingCell::default()
                    });
                }
                b"v" => in_value = true,
                b"is" => in_inline = true,
                b"rPh" => in_phonetic = true,
                b"t" if in_inline && !in_phonetic => in_inline_text = true,
                _ => {}
            },
            Event::Empty(ref e) => match e.local_name().as_ref() {
                b"row" => {
                    row = start_row(e, row)?;
                    next_column = 0;
                }
                b"c" => {
                    let (_, column) = cell_position(e, row, next_column)?;
                    next_column = column + 1;
                }
                _ => {}
            },
            Event::End(ref e) => match e.local_name().as_ref() {
                b"c" => {
                    if let Some(done) = cell.take() {
                        let value = resolve_cell(&done, shared);
                        if !value.is_empty() {
                            grid.entry(done.row).or_default().insert(done.column, value);
                        }
                    }
                }
                b"v" => in_value = false,
                b"is" => in_inline = false,
                b"rPh" => in_phonetic = false,
                b"t" => in_inline_text = false,
                _ => {}
            },
            Event::Text(e) => {
                if let Some(current) = cell.as_mut() {
                    if in_value {
                        current.raw.push_str(&e.unescape()?);
                    } else if in_inline_text {
                        current.inline.push_str(&e.unescape()?);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(grid)
}

fn start_row(e: &BytesStart<'_>, previous: usize) -> Result<usize, quick_xml::Error> {
    Ok(attribute(e, b"r")?
        .and_then(|value| value.parse().ok())
        .unwrap_or(previous + 1))
}

fn cell_position(
    e: &BytesStart<'_>,
    row: usize,
    next_column: usize,
) -> Result<(usize, usize), quick_xml::Error> {
    Ok(attribute(e, b"r")?
        .and_then(|reference| parse_cell_reference(&reference))
        .unwrap_or((row.max(1), next_column)))
}

fn resolve_cell(cell: &PendingCell, shared: &[String]) -> String {
    match cell.cell_type.as_deref() {
        Some("s") => cell
            .raw
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|index| shared.get(index).cloned())
            .unwrap_or_default(),
        Some("b") => match cell.raw.trim() {
            "1" => "TRUE".to_string(),
            "0" => "FALSE".to_string(),
            other => other.to_string(),
        },
        Some("inlineStr") => cell.inline.clone(),
        _ => cell.raw.clone(),
    }
}

const MAX_SHEET_ROWS: usize = 1_048_576;
const MAX_SHEET_COLUMNS: usize = 16_384;

/// Split an `A1`-style reference into a 1-based row and a 0-based column.
///
/// References outside the sheet limits (`XFD1048576`) are rejected.
fn parse_cell_reference(reference: &str) -> Option<(usize, usize)> {
    let split = reference.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = reference.split_at(split);
    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    if letters.len() > 3 {
        return None;
    }
    let column = letters
        .chars()
        .fold(0usize, |acc, c| acc * 26 + (c.to_ascii_uppercase() as usize - 'A' as usize + 1));
    let row: usize = digits.parse().ok()?;
    if row == 0 || row > MAX_SHEET_ROWS || column > MAX_SHEET_COLUMNS {
        return None;
    }
    Some((row, column - 1))
}

/// Largest dense rectangle rendered cell by cell. Sheets whose occupied cells span more than
/// this keep only the rows and columns that hold a value.
const MAX_GRID_CELLS: usize = 1 << 20;

fn cells_to_csv(grid: &CellGrid) -> String {
    let (Some(&first_row), Some(&last_row)) = (grid.keys().next(), grid.keys().next_back()) else {
        return String::new();
    };
    let occupied: BTreeSet<usize> = grid.values().flat_map(|row| row.keys().copied()).collect();
    let (Some(&first_column), Some(&last_column)) = (occupied.first(), occupied.last()) else {
        return String::new();
    };

    let area = (last_row - first_row + 1).saturating_mul(last_column - first_column + 1);
    let (rows, columns): (Vec<usize>, Vec<usize>) = if area <= MAX_GRID_CELLS {
        ((first_row..=last_row).collect(), (first_column..=last_column).collect())
    } else {
        tracing::debug!(area, cells = occupied.len(), "Sparse sheet; skipping empty rows and columns");
        (grid.keys().copied().collect(), occupied.into_iter().collect())
    };

    rows.iter()
        .map(|row| {
            let cells = grid.get(row);
            columns
                .iter()
                .map(|column| {
                    cells
                        .and_then(|cells| cells.get(column))
                        .map(|value| escape_csv_field(value))
                        .unwrap_or_default()
                })
                .collect::<Vec<_>>()
                .join(",")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn escape_csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn attribute(e: &BytesStart<'_>, local_name: &[u8]) -> Result<Option<String>, quick_xml::Error> {
    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        if attr.key.local_name().as_ref() == local_name {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}
