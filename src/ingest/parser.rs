//! Spreadsheet decoding: raw upload bytes → headers plus data rows.
//!
//! Delimited text goes through `csv` with a sniffed delimiter; workbook
//! formats (xlsx, xls, ods) go through `calamine`. Row numbers are 1-based
//! positions among the data rows, header excluded, and survive blank-row
//! skipping so they can be traced back to the file.

use std::collections::HashMap;
use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use tracing::debug;

use crate::error::PipelineError;

/// One physical data row: raw header → cell text.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    pub row_number: i64,
    pub cells: HashMap<String, String>,
}

/// Decoded sheet: headers in file order plus data rows.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSheet {
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
}

const WORKBOOK_EXTENSIONS: [&str; 4] = [".xlsx", ".xls", ".xlsb", ".ods"];

pub fn parse_spreadsheet(file_name: &str, bytes: &[u8]) -> Result<ParsedSheet, PipelineError> {
    let lower = file_name.to_lowercase();
    let sheet = if WORKBOOK_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
        parse_workbook(bytes)?
    } else {
        parse_delimited(bytes)?
    };
    if sheet.rows.is_empty() {
        return Err(PipelineError::Parse("no data rows found".into()));
    }
    debug!(
        "Parsed '{}': {} columns, {} rows",
        file_name,
        sheet.headers.len(),
        sheet.rows.len()
    );
    Ok(sheet)
}

fn parse_delimited(bytes: &[u8]) -> Result<ParsedSheet, PipelineError> {
    let text = String::from_utf8_lossy(bytes);
    let delimiter = sniff_delimiter(&text);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| PipelineError::Parse(format!("unreadable header row: {e}")))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    if headers.iter().all(|h| h.is_empty()) {
        return Err(PipelineError::Parse("missing header row".into()));
    }

    let mut rows = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record.map_err(|e| PipelineError::Parse(format!("row {}: {e}", idx + 1)))?;
        if let Some(row) = build_row(&headers, idx as i64 + 1, record.iter()) {
            rows.push(row);
        }
    }
    Ok(ParsedSheet { headers, rows })
}

fn parse_workbook(bytes: &[u8]) -> Result<ParsedSheet, PipelineError> {
    let cursor = Cursor::new(bytes.to_vec());
    let mut workbook = open_workbook_auto_from_rs(cursor)
        .map_err(|e| PipelineError::Parse(format!("unreadable workbook: {e}")))?;
    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| PipelineError::Parse("workbook has no sheets".into()))?;
    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| PipelineError::Parse(format!("unreadable sheet '{sheet_name}': {e}")))?;

    let mut cell_rows = range.rows();
    let headers: Vec<String> = match cell_rows.next() {
        Some(cells) => cells.iter().map(|c| cell_text(c).trim().to_string()).collect(),
        None => return Err(PipelineError::Parse("workbook sheet is empty".into())),
    };
    if headers.iter().all(|h| h.is_empty()) {
        return Err(PipelineError::Parse("missing header row".into()));
    }

    let mut rows = Vec::new();
    for (idx, cells) in cell_rows.enumerate() {
        let values = cells.iter().map(cell_text);
        if let Some(row) = build_row(&headers, idx as i64 + 1, values) {
            rows.push(row);
        }
    }
    Ok(ParsedSheet { headers, rows })
}

/// Pair cell values with headers; fully blank rows are dropped but their
/// position still counts toward later row numbers.
fn build_row<I, S>(headers: &[String], row_number: i64, values: I) -> Option<RawRow>
where
    I: Iterator<Item = S>,
    S: AsRef<str>,
{
    let mut cells = HashMap::new();
    for (col, value) in values.enumerate() {
        let Some(header) = headers.get(col) else {
            break;
        };
        if !header.is_empty() {
            cells.insert(header.clone(), value.as_ref().trim().to_string());
        }
    }
    if cells.values().all(|v| v.is_empty()) {
        return None;
    }
    Some(RawRow { row_number, cells })
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) => {
            // Excel stores integers as floats; render 25.0 as "25"
            if f.fract() == 0.0 && f.abs() < 1e15 {
                format!("{}", *f as i64)
            } else {
                f.to_string()
            }
        }
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => if *b { "true" } else { "false" }.to_string(),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(naive) => naive.date().to_string(),
            None => dt.as_f64().to_string(),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Error(e) => format!("#{e:?}"),
    }
}

/// Pick the delimiter that splits the sample lines into the most
/// consistent multi-field records.
fn sniff_delimiter(content: &str) -> u8 {
    let sample: Vec<&str> = content.lines().take(10).collect();
    let mut best = b',';
    let mut best_score = 0usize;
    for &candidate in &[b',', b'\t', b';', b'|'] {
        let counts: Vec<usize> = sample
            .iter()
            .map(|line| {
                let mut reader = csv::ReaderBuilder::new()
                    .delimiter(candidate)
                    .has_headers(false)
                    .from_reader(line.as_bytes());
                reader
                    .records()
                    .next()
                    .and_then(|r| r.ok())
                    .map(|r| r.len())
                    .unwrap_or(0)
            })
            .collect();
        let Some(&first) = counts.first() else {
            continue;
        };
        if first <= 1 {
            continue;
        }
        let consistent = counts.iter().filter(|&&c| c == first).count();
        let score = consistent * first;
        if score > best_score {
            best_score = score;
            best = candidate;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_csv() {
        let csv = "Date,Team,Opp,Result,Stake\n2025-01-15,Lakers,Celtics,Win,$25.00\n2025-01-16,Heat,Bulls,Loss,$50.00\n";
        let sheet = parse_spreadsheet("bets.csv", csv.as_bytes()).unwrap();
        assert_eq!(sheet.headers, vec!["Date", "Team", "Opp", "Result", "Stake"]);
        assert_eq!(sheet.rows.len(), 2);
        assert_eq!(sheet.rows[0].row_number, 1);
        assert_eq!(
            sheet.rows[0].cells.get("Stake").map(String::as_str),
            Some("$25.00")
        );
    }

    #[test]
    fn test_sniffs_semicolon_delimiter() {
        let csv = "Date;Team;Stake\n2025-01-15;Lakers;25\n2025-01-16;Heat;50\n";
        let sheet = parse_spreadsheet("bets.csv", csv.as_bytes()).unwrap();
        assert_eq!(sheet.headers, vec!["Date", "Team", "Stake"]);
        assert_eq!(
            sheet.rows[1].cells.get("Team").map(String::as_str),
            Some("Heat")
        );
    }

    #[test]
    fn test_sniffs_tab_delimiter() {
        let tsv = "Date\tTeam\tStake\n2025-01-15\tLakers\t25\n";
        let sheet = parse_spreadsheet("bets.tsv", tsv.as_bytes()).unwrap();
        assert_eq!(sheet.headers.len(), 3);
    }

    #[test]
    fn test_blank_rows_skipped_but_numbering_preserved() {
        let csv = "Date,Team\n2025-01-15,Lakers\n,\n2025-01-17,Heat\n";
        let sheet = parse_spreadsheet("bets.csv", csv.as_bytes()).unwrap();
        assert_eq!(sheet.rows.len(), 2);
        assert_eq!(sheet.rows[0].row_number, 1);
        assert_eq!(sheet.rows[1].row_number, 3);
    }

    #[test]
    fn test_short_record_leaves_missing_cells_absent() {
        let csv = "Date,Team,Stake\n2025-01-15,Lakers\n";
        let sheet = parse_spreadsheet("bets.csv", csv.as_bytes()).unwrap();
        assert_eq!(sheet.rows.len(), 1);
        assert!(sheet.rows[0].cells.get("Stake").is_none());
    }

    #[test]
    fn test_headers_only_is_a_parse_error() {
        let err = parse_spreadsheet("bets.csv", b"Date,Team,Stake\n").unwrap_err();
        assert!(matches!(err, PipelineError::Parse(_)));
    }

    #[test]
    fn test_empty_file_is_a_parse_error() {
        let err = parse_spreadsheet("bets.csv", b"").unwrap_err();
        assert!(matches!(err, PipelineError::Parse(_)));
    }

    #[test]
    fn test_garbage_workbook_is_a_parse_error() {
        let err = parse_spreadsheet("bets.xlsx", b"definitely not a zip archive").unwrap_err();
        assert!(matches!(err, PipelineError::Parse(_)));
    }
}
