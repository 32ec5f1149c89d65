//! Field normalization: raw cell text → typed wager records.
//!
//! Pure and deterministic; identical input always yields an identical
//! record and warning list. Unparseable values become `None` plus a
//! warning instead of an error, so one bad cell never sinks a row.

use chrono::NaiveDate;

use super::parser::RawRow;
use crate::db::models::{
    BetType, CanonicalField, ColumnMap, LegOutcome, NormalizedRow, RowWarning, WarningSeverity,
};

/// American odds outside this absolute range are flagged as atypical.
pub const ODDS_TYPICAL_MIN: i32 = 100;
pub const ODDS_TYPICAL_MAX: i32 = 10_000;

const EXACT_DATE_FORMAT: &str = "%Y-%m-%d";
const INFERRED_DATE_FORMATS: [&str; 7] = [
    "%m/%d/%Y",
    "%m/%d/%y",
    "%Y/%m/%d",
    "%d %b %Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%d-%b-%Y",
];

pub fn normalize_row(raw: &RawRow, mapping: &ColumnMap) -> (NormalizedRow, Vec<RowWarning>) {
    let mut out = NormalizedRow::default();
    let mut warnings = Vec::new();
    // Fixed field order keeps the warning list deterministic.
    for field in CanonicalField::ALL {
        let value = mapping
            .source_for(field)
            .and_then(|col| raw.cells.get(col))
            .map(|s| s.trim())
            .filter(|s| !s.is_empty());
        match value {
            Some(text) => apply_field(field, text, &mut out, &mut warnings),
            None => {
                if field.is_required() {
                    warnings.push(missing(field));
                }
            }
        }
    }
    (out, warnings)
}

fn apply_field(field: CanonicalField, text: &str, out: &mut NormalizedRow, warnings: &mut Vec<RowWarning>) {
    match field {
        CanonicalField::Date => match parse_date(text) {
            Some((date, inferred)) => {
                out.game_date = Some(date);
                if inferred {
                    warnings.push(warn(field, format!("date format inferred from '{text}'")));
                }
            }
            None => {
                warnings.push(unusable(field, format!("unparseable date '{text}'")));
            }
        },
        CanonicalField::Sport => out.sport = Some(clean_text(text)),
        CanonicalField::HomeTeam => apply_team(field, text, &mut out.home_team, warnings),
        CanonicalField::AwayTeam => apply_team(field, text, &mut out.away_team, warnings),
        CanonicalField::Outcome => match parse_outcome(text) {
            Some(outcome) => out.outcome = Some(outcome),
            None => warnings.push(unusable(field, format!("unrecognized outcome '{text}'"))),
        },
        CanonicalField::WagerAmount => apply_money(field, text, &mut out.wager_amount, warnings),
        CanonicalField::BetType => match parse_bet_type(text) {
            Some(bet_type) => out.bet_type = Some(bet_type),
            None => warnings.push(warn(field, format!("unrecognized bet type '{text}'"))),
        },
        CanonicalField::Selection => {
            let cleaned = clean_text(text);
            if is_placeholder(&cleaned) {
                warnings.push(warn(field, format!("placeholder selection '{text}'")));
            } else {
                out.selection = Some(cleaned);
            }
        }
        CanonicalField::Line => match parse_line(text) {
            Some(line) => out.line = Some(line),
            None => warnings.push(warn(field, format!("unparseable line '{text}'"))),
        },
        CanonicalField::Odds => match parse_american_odds(text) {
            Some(odds) => {
                out.odds = Some(odds);
                if !odds_in_typical_range(odds) {
                    warnings.push(warn(field, format!("odds {odds} outside the typical American range")));
                }
            }
            None => warnings.push(warn(field, format!("unparseable odds '{text}'"))),
        },
        CanonicalField::Payout => apply_money(field, text, &mut out.payout, warnings),
    }
}

fn apply_team(
    field: CanonicalField,
    text: &str,
    slot: &mut Option<String>,
    warnings: &mut Vec<RowWarning>,
) {
    let cleaned = clean_text(text);
    if is_placeholder(&cleaned) {
        warnings.push(unusable(field, format!("placeholder team value '{text}'")));
    } else {
        *slot = Some(cleaned);
    }
}

fn apply_money(
    field: CanonicalField,
    text: &str,
    slot: &mut Option<f64>,
    warnings: &mut Vec<RowWarning>,
) {
    match parse_money(text) {
        Some(amount) if amount >= 0.0 => *slot = Some(amount),
        Some(_) => warnings.push(unusable(field, format!("negative amount '{text}'"))),
        None => warnings.push(unusable(field, format!("unparseable amount '{text}'"))),
    }
}

fn missing(field: CanonicalField) -> RowWarning {
    RowWarning {
        field,
        message: "required field missing".into(),
        severity: WarningSeverity::Error,
    }
}

fn warn(field: CanonicalField, message: String) -> RowWarning {
    RowWarning {
        field,
        message,
        severity: WarningSeverity::Warning,
    }
}

/// Unusable value: a warning-severity entry for optional fields, error for
/// required ones since the row cannot fully validate without them.
fn unusable(field: CanonicalField, message: String) -> RowWarning {
    RowWarning {
        field,
        message,
        severity: if field.is_required() {
            WarningSeverity::Error
        } else {
            WarningSeverity::Warning
        },
    }
}

// ── Field parsers (shared with the column detector) ───────────────────────────

/// Returns the date and whether the format had to be inferred (anything
/// but ISO `YYYY-MM-DD`).
pub fn parse_date(text: &str) -> Option<(NaiveDate, bool)> {
    if let Ok(date) = NaiveDate::parse_from_str(text, EXACT_DATE_FORMAT) {
        return Some((date, false));
    }
    for format in INFERRED_DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some((date, true));
        }
    }
    None
}

/// Strip currency symbols and thousands separators; tolerates accounting
/// negatives like `(25.00)`. Sign is preserved for the caller to judge.
pub fn parse_money(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| !matches!(c, '$' | '€' | '£' | ',') && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    let (negate, core) = if cleaned.starts_with('(') && cleaned.ends_with(')') && cleaned.len() > 2
    {
        (true, &cleaned[1..cleaned.len() - 1])
    } else {
        (false, cleaned.as_str())
    };
    core.parse::<f64>().ok().map(|v| if negate { -v } else { v })
}

pub fn parse_american_odds(text: &str) -> Option<i32> {
    let trimmed = text.trim();
    let trimmed = trimmed.strip_prefix('+').unwrap_or(trimmed);
    trimmed.parse::<i32>().ok()
}

pub fn odds_in_typical_range(odds: i32) -> bool {
    (ODDS_TYPICAL_MIN..=ODDS_TYPICAL_MAX).contains(&odds.abs())
}

pub fn parse_outcome(text: &str) -> Option<LegOutcome> {
    match text.trim().to_lowercase().as_str() {
        "win" | "w" | "won" | "winner" => Some(LegOutcome::Won),
        "loss" | "l" | "lost" | "lose" | "loser" => Some(LegOutcome::Lost),
        "push" | "p" | "tie" | "draw" | "void" => Some(LegOutcome::Push),
        _ => None,
    }
}

pub fn parse_bet_type(text: &str) -> Option<BetType> {
    let key: String = text
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    match key.as_str() {
        "moneyline" | "ml" | "money" => Some(BetType::MoneyLine),
        "spread" | "pointspread" | "ps" | "ats" | "handicap" => Some(BetType::PointSpread),
        "parlay" | "accumulator" | "acca" | "combo" => Some(BetType::Parlay),
        _ => None,
    }
}

pub fn parse_line(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    let trimmed = trimmed.strip_prefix('+').unwrap_or(trimmed);
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Trim and collapse interior whitespace.
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn is_placeholder(text: &str) -> bool {
    matches!(
        text.to_lowercase().as_str(),
        "-" | "--" | "n/a" | "na" | "tbd" | "tba" | "unknown" | "?" | "none" | "null"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use crate::db::models::{ColumnChoice, ColumnMap};

    fn mapping() -> ColumnMap {
        let mut map = ColumnMap::default();
        let mut assign = |field: CanonicalField, column: &str| {
            map.assignments.insert(
                field,
                ColumnChoice {
                    source_column: column.to_string(),
                    confidence: 1.0,
                },
            );
        };
        assign(CanonicalField::Date, "Date");
        assign(CanonicalField::HomeTeam, "Team");
        assign(CanonicalField::AwayTeam, "Opp");
        assign(CanonicalField::Outcome, "Result");
        assign(CanonicalField::WagerAmount, "Stake");
        assign(CanonicalField::Odds, "Odds");
        assign(CanonicalField::Payout, "Payout");
        map
    }

    fn raw(cells: &[(&str, &str)]) -> RawRow {
        RawRow {
            row_number: 1,
            cells: cells
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
        }
    }

    #[test]
    fn test_iso_date_accepted_without_warning() {
        let row = raw(&[
            ("Date", "2025-01-15"),
            ("Team", "Lakers"),
            ("Opp", "Celtics"),
            ("Result", "Win"),
            ("Stake", "25"),
        ]);
        let (normalized, warnings) = normalize_row(&row, &mapping());
        assert_eq!(
            normalized.game_date,
            NaiveDate::from_ymd_opt(2025, 1, 15)
        );
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_inferred_date_format_warns() {
        let row = raw(&[
            ("Date", "01/15/2025"),
            ("Team", "Lakers"),
            ("Opp", "Celtics"),
            ("Result", "Win"),
            ("Stake", "25"),
        ]);
        let (normalized, warnings) = normalize_row(&row, &mapping());
        assert_eq!(normalized.game_date, NaiveDate::from_ymd_opt(2025, 1, 15));
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field, CanonicalField::Date);
        assert_eq!(warnings[0].severity, WarningSeverity::Warning);
    }

    #[test]
    fn test_currency_symbols_stripped() {
        assert_eq!(parse_money("$1,250.50"), Some(1250.5));
        assert_eq!(parse_money("€ 40"), Some(40.0));
        assert_eq!(parse_money("(25.00)"), Some(-25.0));
        assert_eq!(parse_money("abc"), None);
    }

    #[test]
    fn test_negative_wager_nulled_with_error_warning() {
        let row = raw(&[
            ("Date", "2025-01-15"),
            ("Team", "Lakers"),
            ("Opp", "Celtics"),
            ("Result", "Win"),
            ("Stake", "-25"),
        ]);
        let (normalized, warnings) = normalize_row(&row, &mapping());
        assert_eq!(normalized.wager_amount, None);
        let stake_warning = warnings
            .iter()
            .find(|w| w.field == CanonicalField::WagerAmount)
            .unwrap();
        assert_eq!(stake_warning.severity, WarningSeverity::Error);
    }

    #[test]
    fn test_atypical_odds_warn_but_keep_value() {
        let row = raw(&[
            ("Date", "2025-01-15"),
            ("Team", "Lakers"),
            ("Opp", "Celtics"),
            ("Result", "Win"),
            ("Stake", "25"),
            ("Odds", "+25000"),
        ]);
        let (normalized, warnings) = normalize_row(&row, &mapping());
        assert_eq!(normalized.odds, Some(25000));
        assert!(warnings
            .iter()
            .any(|w| w.field == CanonicalField::Odds
                && w.severity == WarningSeverity::Warning));
    }

    #[test]
    fn test_team_names_trimmed_and_collapsed() {
        let row = raw(&[
            ("Date", "2025-01-15"),
            ("Team", "  Los   Angeles  Lakers "),
            ("Opp", "Celtics"),
            ("Result", "Win"),
            ("Stake", "25"),
        ]);
        let (normalized, _) = normalize_row(&row, &mapping());
        assert_eq!(normalized.home_team.as_deref(), Some("Los Angeles Lakers"));
    }

    #[test]
    fn test_placeholder_team_is_error() {
        let row = raw(&[
            ("Date", "2025-01-15"),
            ("Team", "TBD"),
            ("Opp", "Celtics"),
            ("Result", "Win"),
            ("Stake", "25"),
        ]);
        let (normalized, warnings) = normalize_row(&row, &mapping());
        assert_eq!(normalized.home_team, None);
        assert!(warnings
            .iter()
            .any(|w| w.field == CanonicalField::HomeTeam
                && w.severity == WarningSeverity::Error));
    }

    #[test]
    fn test_missing_required_field_is_error() {
        let row = raw(&[("Date", "2025-01-15"), ("Team", "Lakers"), ("Opp", "Celtics")]);
        let (_, warnings) = normalize_row(&row, &mapping());
        let missing: Vec<_> = warnings
            .iter()
            .filter(|w| w.message == "required field missing")
            .collect();
        assert_eq!(missing.len(), 2); // Result and Stake
        assert!(missing.iter().all(|w| w.severity == WarningSeverity::Error));
    }

    #[test]
    fn test_outcome_token_variants() {
        assert_eq!(parse_outcome("W"), Some(LegOutcome::Won));
        assert_eq!(parse_outcome("  lost "), Some(LegOutcome::Lost));
        assert_eq!(parse_outcome("PUSH"), Some(LegOutcome::Push));
        assert_eq!(parse_outcome("maybe"), None);
    }

    #[test]
    fn test_bet_type_tokens() {
        assert_eq!(parse_bet_type("Money Line"), Some(BetType::MoneyLine));
        assert_eq!(parse_bet_type("ATS"), Some(BetType::PointSpread));
        assert_eq!(parse_bet_type("parlay"), Some(BetType::Parlay));
        assert_eq!(parse_bet_type("teaser"), None);
    }

    #[test]
    fn test_normalization_is_deterministic() {
        let row = raw(&[
            ("Date", "1/15/25"),
            ("Team", " Lakers"),
            ("Opp", "Celtics"),
            ("Result", "w"),
            ("Stake", "$25.00"),
            ("Odds", "-110"),
            ("Payout", "$47.73"),
        ]);
        let map = mapping();
        let first = normalize_row(&row, &map);
        let second = normalize_row(&row, &map);
        assert_eq!(first, second);
    }
}
