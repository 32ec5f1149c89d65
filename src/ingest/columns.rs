//! Column detection: raw spreadsheet headers → canonical wager fields.
//!
//! Headers are scored against per-field synonym lists with Jaro-Winkler
//! similarity, adjusted by the shape of sampled cell values for typed
//! fields. Detection never fails; unmappable or contested headers are
//! reported so an operator can see why a field stayed empty.

use std::collections::{BTreeMap, HashMap};

use strsim::jaro_winkler;

use super::normalize;
use super::parser::RawRow;
use crate::db::models::{CanonicalField, ColumnChoice, ColumnMap};

/// Similarity below this never maps a header. Jaro-Winkler inflates
/// scores on short strings, so unrelated header pairs still land
/// near 0.7.
const CONFIDENCE_FLOOR: f64 = 0.72;
/// An unclaimed runner-up within this margin of the winner is ambiguous.
const TIE_MARGIN: f64 = 0.05;
/// A claimed header counts as contested only above this score.
const CONTEST_BAR: f64 = 0.80;
/// Shape agreement can add at most this much.
const SHAPE_BONUS: f64 = 0.15;
/// Typed fields whose samples all fail the shape check lose this much.
const SHAPE_PENALTY: f64 = 0.20;

const SAMPLE_ROWS: usize = 8;

pub fn detect_columns(headers: &[String], sample: &[RawRow]) -> ColumnMap {
    let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();
    let samples_by_header = collect_samples(headers, sample);

    let mut claimed: HashMap<usize, CanonicalField> = HashMap::new();
    let mut assignments: BTreeMap<CanonicalField, ColumnChoice> = BTreeMap::new();
    let mut ambiguous: Vec<String> = Vec::new();
    let mut missing_required: Vec<CanonicalField> = Vec::new();

    for field in CanonicalField::ALL {
        let mut scored: Vec<(usize, f64)> = normalized
            .iter()
            .enumerate()
            .filter(|(_, h)| !h.is_empty())
            .filter_map(|(idx, header)| {
                let score = score_header(field, header, samples_by_header.get(&headers[idx]));
                (score >= CONFIDENCE_FLOOR).then_some((idx, score))
            })
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

        let unclaimed: Vec<(usize, f64)> = scored
            .iter()
            .copied()
            .filter(|(idx, _)| !claimed.contains_key(idx))
            .collect();

        match unclaimed.first() {
            None => {
                // every usable header is already claimed by an earlier field
                if let Some(&(idx, score)) = scored.first() {
                    if score >= CONTEST_BAR && !ambiguous.contains(&headers[idx]) {
                        ambiguous.push(headers[idx].clone());
                    }
                }
                if field.is_required() {
                    missing_required.push(field);
                }
            }
            Some(&(best_idx, best_score)) => {
                if let Some(&(runner_idx, runner_score)) = unclaimed.get(1) {
                    if best_score - runner_score < TIE_MARGIN
                        && !ambiguous.contains(&headers[runner_idx])
                    {
                        ambiguous.push(headers[runner_idx].clone());
                    }
                }
                claimed.insert(best_idx, field);
                assignments.insert(
                    field,
                    ColumnChoice {
                        source_column: headers[best_idx].clone(),
                        confidence: best_score,
                    },
                );
            }
        }
    }

    let unmapped: Vec<String> = headers
        .iter()
        .enumerate()
        .filter(|(idx, h)| !h.is_empty() && !claimed.contains_key(idx))
        .map(|(_, h)| h.clone())
        .collect();

    let overall = if assignments.is_empty() {
        0.0
    } else {
        assignments.values().map(|c| c.confidence).sum::<f64>() / assignments.len() as f64
    };

    ColumnMap {
        assignments,
        unmapped_columns: unmapped,
        ambiguous_columns: ambiguous,
        missing_required,
        overall_confidence: overall,
    }
}

fn score_header(field: CanonicalField, header_norm: &str, samples: Option<&Vec<String>>) -> f64 {
    let similarity = synonyms(field)
        .iter()
        .map(|synonym| jaro_winkler(header_norm, synonym))
        .fold(0.0, f64::max);
    // A single cell is not evidence; shape only counts with two samples.
    let adjustment = match samples {
        Some(values) if has_value_shape(field) && values.len() >= 2 => {
            let hits = values
                .iter()
                .filter(|v| shape_matches(field, v))
                .count();
            let ratio = hits as f64 / values.len() as f64;
            if hits == 0 {
                -SHAPE_PENALTY
            } else if ratio >= 0.5 {
                SHAPE_BONUS * ratio
            } else {
                0.0
            }
        }
        _ => 0.0,
    };
    (similarity + adjustment).clamp(0.0, 1.0)
}

/// Fields where cell shape is informative. Team-like fields are free text,
/// so samples tell us nothing there.
fn has_value_shape(field: CanonicalField) -> bool {
    matches!(
        field,
        CanonicalField::Date
            | CanonicalField::WagerAmount
            | CanonicalField::Payout
            | CanonicalField::Odds
            | CanonicalField::Line
            | CanonicalField::Outcome
            | CanonicalField::BetType
    )
}

fn shape_matches(field: CanonicalField, value: &str) -> bool {
    match field {
        CanonicalField::Date => normalize::parse_date(value).is_some(),
        CanonicalField::WagerAmount | CanonicalField::Payout => {
            normalize::parse_money(value).is_some_and(|v| v >= 0.0)
        }
        CanonicalField::Odds => {
            normalize::parse_american_odds(value).is_some_and(normalize::odds_in_typical_range)
        }
        CanonicalField::Line => normalize::parse_line(value).is_some(),
        CanonicalField::Outcome => normalize::parse_outcome(value).is_some(),
        CanonicalField::BetType => normalize::parse_bet_type(value).is_some(),
        _ => true,
    }
}

fn collect_samples(headers: &[String], sample: &[RawRow]) -> HashMap<String, Vec<String>> {
    let mut by_header: HashMap<String, Vec<String>> = HashMap::new();
    for row in sample.iter().take(SAMPLE_ROWS) {
        for header in headers {
            if let Some(value) = row.cells.get(header) {
                if !value.is_empty() {
                    by_header.entry(header.clone()).or_default().push(value.clone());
                }
            }
        }
    }
    by_header
}

fn normalize_header(header: &str) -> String {
    let lowered: String = header
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { ' ' })
        .collect();
    lowered.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn synonyms(field: CanonicalField) -> &'static [&'static str] {
    match field {
        CanonicalField::Date => &["date", "game date", "event date", "match date", "played", "day"],
        CanonicalField::HomeTeam => &["home team", "team", "home", "team 1", "my team"],
        CanonicalField::AwayTeam => &[
            "away team",
            "opponent",
            "opp",
            "away",
            "team 2",
            "vs",
            "versus",
        ],
        CanonicalField::Outcome => &["result", "outcome", "w l", "win loss", "won", "status"],
        CanonicalField::WagerAmount => &[
            "stake",
            "wager",
            "amount",
            "risk",
            "bet amount",
            "wagered",
        ],
        CanonicalField::Sport => &["sport", "league", "competition"],
        CanonicalField::BetType => &["bet type", "type", "market", "wager type"],
        CanonicalField::Selection => &["selection", "pick", "bet on", "selected team", "chosen"],
        CanonicalField::Line => &["line", "spread", "handicap"],
        CanonicalField::Odds => &["odds", "price", "juice", "american odds", "moneyline"],
        CanonicalField::Payout => &[
            "payout",
            "return",
            "winnings",
            "to win",
            "profit",
            "collected",
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(headers: &[&str], data: &[&[&str]]) -> Vec<RawRow> {
        data.iter()
            .enumerate()
            .map(|(i, values)| RawRow {
                row_number: i as i64 + 1,
                cells: headers
                    .iter()
                    .zip(values.iter())
                    .map(|(h, v)| (h.to_string(), v.to_string()))
                    .collect(),
            })
            .collect()
    }

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_detects_terse_betting_headers() {
        let names = ["Game Date", "Team", "Opp", "Result", "Stake"];
        let sample = rows(
            &names,
            &[
                &["2025-01-15", "Lakers", "Celtics", "Win", "$25.00"],
                &["2025-01-16", "Heat", "Bulls", "Loss", "$50.00"],
                &["2025-01-17", "Suns", "Nuggets", "Win", "$10.00"],
            ],
        );
        let map = detect_columns(&headers(&names), &sample);

        assert_eq!(map.source_for(CanonicalField::Date), Some("Game Date"));
        assert_eq!(map.source_for(CanonicalField::HomeTeam), Some("Team"));
        assert_eq!(map.source_for(CanonicalField::AwayTeam), Some("Opp"));
        assert_eq!(map.source_for(CanonicalField::Outcome), Some("Result"));
        assert_eq!(map.source_for(CanonicalField::WagerAmount), Some("Stake"));

        let stake = &map.assignments[&CanonicalField::WagerAmount];
        assert!(stake.confidence >= CONFIDENCE_FLOOR);
        assert!(map.missing_required.is_empty());
        assert!(map.ambiguous_columns.is_empty());
    }

    #[test]
    fn test_unclaimed_extra_column_reported_unmapped() {
        let names = ["Date", "Team", "Opp", "Result", "Stake", "Notes"];
        let map = detect_columns(&headers(&names), &[]);
        assert!(map.unmapped_columns.contains(&"Notes".to_string()));
    }

    #[test]
    fn test_missing_away_team_reported() {
        let names = ["Date", "Team", "Result", "Stake"];
        let map = detect_columns(&headers(&names), &[]);
        assert!(map.missing_required.contains(&CanonicalField::AwayTeam));
        // "Team" was wanted by both team fields; the loser reports it
        assert!(map.ambiguous_columns.contains(&"Team".to_string()));
    }

    #[test]
    fn test_near_tie_reported_ambiguous() {
        let names = ["Result", "Outcome", "Stake"];
        let map = detect_columns(&headers(&names), &[]);
        assert_eq!(map.source_for(CanonicalField::Outcome), Some("Result"));
        assert!(map.ambiguous_columns.contains(&"Outcome".to_string()));
    }

    #[test]
    fn test_numeric_samples_boost_amount_column() {
        let names = ["Date", "Team", "Opp", "Result", "Amt"];
        let without = detect_columns(&headers(&names), &[]);
        let sample = rows(
            &names,
            &[
                &["2025-01-15", "Lakers", "Celtics", "Win", "$25.00"],
                &["2025-01-16", "Heat", "Bulls", "Loss", "$50.00"],
            ],
        );
        let with = detect_columns(&headers(&names), &sample);

        let before = without.assignments[&CanonicalField::WagerAmount].confidence;
        let after = with.assignments[&CanonicalField::WagerAmount].confidence;
        assert!(after > before);
    }

    #[test]
    fn test_never_fails_on_alien_headers() {
        let names = ["Foo", "Bar", "Baz"];
        let sample = rows(&names, &[&["1", "2", "3"]]);
        let map = detect_columns(&headers(&names), &sample);
        assert!(map.assignments.is_empty());
        assert_eq!(map.missing_required.len(), 5);
        assert_eq!(map.overall_confidence, 0.0);
        assert_eq!(map.unmapped_columns.len(), 3);
    }
}
