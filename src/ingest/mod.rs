//! Upload ingestion pipeline: raw bytes through parsing, column
//! detection, and normalization. Everything here is pure; persistence
//! happens in the API layer once ingestion succeeds.

pub mod columns;
pub mod normalize;
pub mod parser;

use std::collections::HashMap;

use serde::Serialize;

use crate::db::models::{CanonicalField, ColumnMap, NormalizationSummary, NormalizedRow, RowWarning};
use crate::error::PipelineError;

/// One spreadsheet row after normalization, still carrying its raw cells.
#[derive(Debug, Clone, Serialize)]
pub struct IngestedRow {
    pub row_number: i64,
    pub raw_fields: HashMap<String, String>,
    pub normalized: NormalizedRow,
    pub warnings: Vec<RowWarning>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub mapping: ColumnMap,
    pub rows: Vec<IngestedRow>,
    pub summary: NormalizationSummary,
}

/// Runs the full ingestion pipeline over an uploaded file.
///
/// The byte limit is checked before any parsing work and the row limit
/// right after parsing, so oversized uploads fail fast with a
/// `LimitExceeded` rather than a partial result.
pub fn ingest_bytes(
    file_name: &str,
    bytes: &[u8],
    max_bytes: usize,
    max_rows: usize,
) -> Result<IngestOutcome, PipelineError> {
    if bytes.len() > max_bytes {
        return Err(PipelineError::LimitExceeded(format!(
            "upload is {} bytes, over the {} byte limit",
            bytes.len(),
            max_bytes
        )));
    }

    let sheet = parser::parse_spreadsheet(file_name, bytes)?;
    if sheet.rows.len() > max_rows {
        return Err(PipelineError::LimitExceeded(format!(
            "upload has {} data rows, over the {} row limit",
            sheet.rows.len(),
            max_rows
        )));
    }

    let mapping = columns::detect_columns(&sheet.headers, &sheet.rows);

    let mut rows = Vec::with_capacity(sheet.rows.len());
    for raw in &sheet.rows {
        let (normalized, warnings) = normalize::normalize_row(raw, &mapping);
        rows.push(IngestedRow {
            row_number: raw.row_number,
            raw_fields: raw.cells.clone(),
            normalized,
            warnings,
        });
    }

    let summary = summarize(&rows);
    Ok(IngestOutcome {
        mapping,
        rows,
        summary,
    })
}

fn summarize(rows: &[IngestedRow]) -> NormalizationSummary {
    let mut summary = NormalizationSummary {
        rows_total: rows.len() as i64,
        ..Default::default()
    };
    for row in rows {
        if !row.warnings.is_empty() {
            summary.rows_with_warnings += 1;
        }
        summary.warnings_total += row.warnings.len() as i64;
        for field in CanonicalField::ALL {
            if field_present(&row.normalized, field) {
                *summary.field_coverage.entry(field.name().to_string()).or_insert(0) += 1;
            }
        }
    }
    summary
}

fn field_present(normalized: &NormalizedRow, field: CanonicalField) -> bool {
    match field {
        CanonicalField::Date => normalized.game_date.is_some(),
        CanonicalField::HomeTeam => normalized.home_team.is_some(),
        CanonicalField::AwayTeam => normalized.away_team.is_some(),
        CanonicalField::Outcome => normalized.outcome.is_some(),
        CanonicalField::WagerAmount => normalized.wager_amount.is_some(),
        CanonicalField::Sport => normalized.sport.is_some(),
        CanonicalField::BetType => normalized.bet_type.is_some(),
        CanonicalField::Selection => normalized.selection.is_some(),
        CanonicalField::Line => normalized.line.is_some(),
        CanonicalField::Odds => normalized.odds.is_some(),
        CanonicalField::Payout => normalized.payout.is_some(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHEET: &str = "Game Date,Team,Opp,Result,Stake\n\
                         2025-01-15,Lakers,Celtics,Won,50\n\
                         2025-01-16,Warriors,Suns,Lost,$25.00\n";

    #[test]
    fn test_ingest_end_to_end() {
        let out = ingest_bytes("bets.csv", SHEET.as_bytes(), 1024 * 1024, 100).unwrap();
        assert!(out.mapping.missing_required.is_empty());
        assert_eq!(out.rows.len(), 2);
        assert_eq!(out.rows[0].row_number, 1);
        assert_eq!(out.rows[0].normalized.home_team.as_deref(), Some("Lakers"));
        assert_eq!(out.rows[1].normalized.wager_amount, Some(25.0));
        assert_eq!(out.summary.rows_total, 2);
        assert_eq!(out.summary.field_coverage.get("wagerAmount"), Some(&2));
    }

    #[test]
    fn test_rejects_oversized_upload_before_parsing() {
        let err = ingest_bytes("bets.csv", SHEET.as_bytes(), 10, 100).unwrap_err();
        assert!(matches!(err, PipelineError::LimitExceeded(_)));
    }

    #[test]
    fn test_rejects_row_count_over_limit() {
        let err = ingest_bytes("bets.csv", SHEET.as_bytes(), 1024 * 1024, 1).unwrap_err();
        assert!(matches!(err, PipelineError::LimitExceeded(_)));
    }

    #[test]
    fn test_summary_counts_warning_rows() {
        let sheet = "Game Date,Team,Opp,Result,Stake\n\
                     not a date,Lakers,Celtics,Won,50\n\
                     2025-01-16,Warriors,Suns,Lost,25\n";
        let out = ingest_bytes("bets.csv", sheet.as_bytes(), 1024 * 1024, 100).unwrap();
        assert_eq!(out.summary.rows_with_warnings, 1);
        assert!(out.summary.warnings_total >= 1);
        assert_eq!(out.summary.field_coverage.get("date"), Some(&1));
    }
}
