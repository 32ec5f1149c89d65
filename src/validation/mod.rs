//! The validation engine. Every row gets the same four passes in a
//! fixed order: game matching, outcome, financials, cross-row. Each
//! pass records pass/fail/warning with a detail, and the receipt as a
//! whole derives the row status. Rerunning validation rebuilds all of
//! this from scratch.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{info, warn};

use crate::db::models::{
    ActualValue, BetType, CanonicalField, Game, GameStatus, LegOutcome, NormalizedRow, PassResult,
    UploadRow, ValidationReceipt, ValidationStatus, Verdict, WarningSeverity,
};
use crate::db::Database;
use crate::error::PipelineError;
use crate::settlement;
use crate::teams::{Resolution, TeamResolver};

#[derive(Debug, Clone, Copy)]
pub struct ValidationSettings {
    /// Team resolution confidence below this fails game matching.
    pub team_fail_below: f64,
    /// Confidence below this (but at or above the fail bar) only warns.
    pub team_warn_below: f64,
    /// Absolute payout difference accepted without comment.
    pub payout_tolerance: f64,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        ValidationSettings {
            team_fail_below: 0.75,
            team_warn_below: 0.90,
            payout_tolerance: 0.01,
        }
    }
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct BatchReport {
    pub batch_id: i64,
    pub rows_validated: i64,
    pub correct: i64,
    pub flagged: i64,
    pub uncertain: i64,
    /// Pass name → rows that failed it.
    pub pass_failures: BTreeMap<String, i64>,
    /// Pass name → rows it warned on.
    pub pass_warnings: BTreeMap<String, i64>,
}

/// Validates every row of a batch and persists the results.
///
/// Rows are independent: one row erroring is logged and skipped, the
/// rest still validate. Batch counters are recomputed at the end so
/// they always reflect what was written.
pub async fn validate_batch(
    db: &Database,
    resolver: &TeamResolver,
    settings: ValidationSettings,
    batch_id: i64,
) -> Result<BatchReport, PipelineError> {
    db.get_batch(batch_id)?
        .ok_or_else(|| PipelineError::ValidationInput(format!("batch {batch_id} not found")))?;
    let rows = db.list_rows(batch_id)?;

    let duplicates = find_duplicates(&rows);
    let parlay_issues = find_parlay_issues(&rows);

    let mut report = BatchReport {
        batch_id,
        ..Default::default()
    };
    for row in &rows {
        let Some(row_id) = row.id else { continue };
        let outcome = validate_row(
            db,
            resolver,
            settings,
            row,
            duplicates.get(&row.row_number).copied(),
            parlay_issues.get(&row.row_number).map(String::as_str),
        )
        .await;
        let validated = match outcome {
            Ok(validated) => validated,
            Err(err) => {
                warn!("Validation of row {row_id} failed: {err}");
                continue;
            }
        };
        if let Err(err) = db.update_row_validation(
            row_id,
            validated.status,
            &validated.receipt,
            &validated.field_confidence,
            &validated.uncertain_reasons,
            validated.actual_value.as_ref(),
        ) {
            warn!("Persisting validation of row {row_id} failed: {err}");
            continue;
        }

        report.rows_validated += 1;
        match validated.status {
            ValidationStatus::Correct => report.correct += 1,
            ValidationStatus::Flagged => report.flagged += 1,
            ValidationStatus::Uncertain => report.uncertain += 1,
            _ => {}
        }
        for (name, pass) in validated.receipt.passes() {
            match pass.verdict {
                Verdict::Fail => *report.pass_failures.entry(name.to_string()).or_insert(0) += 1,
                Verdict::Warning => *report.pass_warnings.entry(name.to_string()).or_insert(0) += 1,
                Verdict::Pass => {}
            }
        }
    }

    db.recompute_batch_counters(batch_id)?;
    info!(
        "Validated batch {batch_id}: {} correct, {} flagged, {} uncertain",
        report.correct, report.flagged, report.uncertain
    );
    Ok(report)
}

struct RowValidation {
    status: ValidationStatus,
    receipt: ValidationReceipt,
    field_confidence: BTreeMap<String, f64>,
    uncertain_reasons: Vec<String>,
    actual_value: Option<ActualValue>,
}

async fn validate_row(
    db: &Database,
    resolver: &TeamResolver,
    settings: ValidationSettings,
    row: &UploadRow,
    duplicate_of: Option<i64>,
    parlay_issue: Option<&str>,
) -> Result<RowValidation, PipelineError> {
    let n = &row.normalized;

    let home = resolve_opt(resolver, n.home_team.as_deref()).await;
    let away = resolve_opt(resolver, n.away_team.as_deref()).await;
    let selection = resolve_opt(resolver, n.selection.as_deref()).await;

    // Pass 1: find the game the row talks about.
    let mut game: Option<Game> = None;
    let game_matching = match (&home, &away, n.game_date) {
        (Some(home), Some(away), Some(date)) => {
            let weakest = home.confidence.min(away.confidence);
            if weakest < settings.team_fail_below {
                let side = if home.confidence <= away.confidence { home } else { away };
                PassResult::fail(format!("unmatched team name '{}'", side.canonical))
            } else if let Some(found) = db.find_game(&home.canonical, &away.canonical, date)? {
                game = Some(found);
                if weakest < settings.team_warn_below {
                    PassResult::warning("team names matched loosely")
                } else {
                    PassResult::pass()
                }
            } else if let Some(found) = db.find_game(&away.canonical, &home.canonical, date)? {
                game = Some(found);
                PassResult::warning("teams matched with home and away swapped")
            } else {
                PassResult::fail(format!(
                    "no game found for {} vs {} on {}",
                    home.canonical, away.canonical, date
                ))
            }
        }
        _ => PassResult::fail("missing team or date fields"),
    };

    // The side the row wagered on, oriented against the matched game.
    // Sheets without a selection column bet the home-side team column.
    let selected_name = selection
        .as_ref()
        .or(home.as_ref())
        .map(|r| r.canonical.clone());
    let oriented = match (&game, &selected_name) {
        (Some(game), Some(name)) => orient(name, game),
        _ => None,
    };

    // Pass 2: does the claimed outcome agree with the final score?
    let mut implied: Option<LegOutcome> = None;
    let outcome_validation = check_outcome(n, game.as_ref(), oriented, &mut implied);

    // Pass 3: payout arithmetic.
    let financial_validation = check_financial(n, settings.payout_tolerance);

    // Pass 4: cross-row consistency, precomputed over the whole batch.
    let cross_row_validation = if let Some(first) = duplicate_of {
        PassResult::warning(format!("possible duplicate of row {first}"))
    } else if let Some(issue) = parlay_issue {
        PassResult::warning(issue)
    } else {
        PassResult::pass()
    };

    let receipt = ValidationReceipt {
        game_matching,
        outcome_validation,
        financial_validation,
        cross_row_validation,
    };
    let status = receipt.derive_status();

    let uncertain_reasons = if status == ValidationStatus::Uncertain {
        receipt
            .passes()
            .iter()
            .filter(|(_, p)| p.verdict == Verdict::Warning)
            .filter_map(|(_, p)| p.detail.clone())
            .collect()
    } else {
        Vec::new()
    };

    let actual_value = game.as_ref().map(|g| ActualValue {
        game_id: g.id.unwrap_or(0),
        home_team: g.home_team.clone(),
        away_team: g.away_team.clone(),
        home_score: g.home_score,
        away_score: g.away_score,
        game_status: g.status,
        selected_team: oriented.map(|is_home| {
            if is_home {
                g.home_team.clone()
            } else {
                g.away_team.clone()
            }
        }),
        implied_outcome: implied,
    });

    Ok(RowValidation {
        status,
        receipt,
        field_confidence: field_confidences(row, home.as_ref(), away.as_ref(), selection.as_ref()),
        uncertain_reasons,
        actual_value,
    })
}

async fn resolve_opt(resolver: &TeamResolver, text: Option<&str>) -> Option<Resolution> {
    match text {
        Some(text) => Some(resolver.resolve(text).await),
        None => None,
    }
}

/// True when the name is the game's home side, false for away, None for
/// neither.
fn orient(selected: &str, game: &Game) -> Option<bool> {
    if selected.eq_ignore_ascii_case(&game.home_team) {
        Some(true)
    } else if selected.eq_ignore_ascii_case(&game.away_team) {
        Some(false)
    } else {
        None
    }
}

fn check_outcome(
    n: &NormalizedRow,
    game: Option<&Game>,
    oriented: Option<bool>,
    implied_out: &mut Option<LegOutcome>,
) -> PassResult {
    let Some(claimed) = n.outcome else {
        return PassResult::warning("row claims no outcome");
    };
    let Some(game) = game else {
        return PassResult::warning("outcome unverifiable without a matched game");
    };
    if game.status != GameStatus::Final {
        return PassResult::warning(format!("game has not gone final ({})", game.status.as_str()));
    }
    let (Some(home_score), Some(away_score)) = (game.home_score, game.away_score) else {
        return PassResult::warning("matched game has no final score");
    };
    let Some(is_home) = oriented else {
        return PassResult::warning("selection matches neither side of the game");
    };
    let (selected, opponent) = if is_home {
        (home_score, away_score)
    } else {
        (away_score, home_score)
    };
    let spread_line = if n.bet_type == Some(BetType::PointSpread) {
        n.line
    } else {
        None
    };
    let implied = settlement::leg_outcome(selected, opponent, spread_line);
    *implied_out = Some(implied);
    if implied == claimed {
        PassResult::pass()
    } else {
        PassResult::fail(format!(
            "claimed {} but the final score implies {}",
            claimed.as_str(),
            implied.as_str()
        ))
    }
}

fn check_financial(n: &NormalizedRow, tolerance: f64) -> PassResult {
    let (Some(wager), Some(odds), Some(payout), Some(outcome)) =
        (n.wager_amount, n.odds, n.payout, n.outcome)
    else {
        return PassResult {
            verdict: Verdict::Pass,
            detail: Some("payout not verifiable (missing wager, odds, payout, or outcome)".to_string()),
        };
    };
    let expected = expected_payout(wager, odds, outcome);
    let diff = (payout - expected).abs();
    if diff <= tolerance {
        PassResult::pass()
    } else if diff <= (expected.abs() * 0.01).max(0.05) {
        PassResult::warning(format!("payout off by {diff:.2}"))
    } else {
        PassResult::fail(format!(
            "claimed payout {payout:.2}, expected {expected:.2}"
        ))
    }
}

/// Profit (excluding stake) on a winning wager at American odds.
pub fn american_profit(wager: f64, odds: i32) -> f64 {
    if odds > 0 {
        wager * f64::from(odds) / 100.0
    } else if odds < 0 {
        wager * 100.0 / f64::from(-odds)
    } else {
        0.0
    }
}

/// Total collected for a wager with the given outcome: stake plus
/// profit on a win, stake back on a push, nothing on a loss.
pub fn expected_payout(wager: f64, odds: i32, outcome: LegOutcome) -> f64 {
    match outcome {
        LegOutcome::Lost => 0.0,
        LegOutcome::Push => wager,
        LegOutcome::Won => wager + american_profit(wager, odds),
    }
}

fn field_confidences(
    row: &UploadRow,
    home: Option<&Resolution>,
    away: Option<&Resolution>,
    selection: Option<&Resolution>,
) -> BTreeMap<String, f64> {
    let mut confidence: BTreeMap<String, f64> = CanonicalField::ALL
        .iter()
        .map(|f| (f.name().to_string(), 1.0))
        .collect();
    for warning in &row.warnings {
        let entry = confidence.entry(warning.field.name().to_string()).or_insert(1.0);
        let penalty = match warning.severity {
            WarningSeverity::Error => 1.0,
            WarningSeverity::Warning => 0.25,
        };
        *entry = (*entry - penalty).max(0.0);
    }
    let mut cap = |field: CanonicalField, res: Option<&Resolution>| {
        if let Some(res) = res {
            let entry = confidence.entry(field.name().to_string()).or_insert(1.0);
            *entry = entry.min(res.confidence);
        }
    };
    cap(CanonicalField::HomeTeam, home);
    cap(CanonicalField::AwayTeam, away);
    cap(CanonicalField::Selection, selection);
    confidence
}

/// Later rows repeating an earlier row's game, market, and selection
/// map to the first occurrence's row number.
fn find_duplicates(rows: &[UploadRow]) -> HashMap<i64, i64> {
    let mut seen: HashMap<(NaiveDate, String, String, String, String), i64> = HashMap::new();
    let mut duplicates = HashMap::new();
    for row in rows {
        let n = &row.normalized;
        let (Some(date), Some(home), Some(away)) = (n.game_date, &n.home_team, &n.away_team)
        else {
            continue;
        };
        let key = (
            date,
            home.to_lowercase(),
            away.to_lowercase(),
            n.bet_type.map(|b| b.as_str()).unwrap_or("").to_string(),
            n.selection.as_deref().unwrap_or("").to_lowercase(),
        );
        match seen.get(&key) {
            Some(first) => {
                duplicates.insert(row.row_number, *first);
            }
            None => {
                seen.insert(key, row.row_number);
            }
        }
    }
    duplicates
}

/// Parlay legs are expected to arrive as sibling rows sharing a date
/// and stake. A leg with no siblings, or siblings that disagree on the
/// combined payout, gets a cross-row warning.
fn find_parlay_issues(rows: &[UploadRow]) -> HashMap<i64, String> {
    let mut groups: HashMap<(Option<NaiveDate>, i64), Vec<&UploadRow>> = HashMap::new();
    for row in rows {
        if row.normalized.bet_type == Some(BetType::Parlay) {
            let cents = row
                .normalized
                .wager_amount
                .map(|w| (w * 100.0).round() as i64)
                .unwrap_or(-1);
            groups
                .entry((row.normalized.game_date, cents))
                .or_default()
                .push(row);
        }
    }

    let mut issues = HashMap::new();
    for members in groups.into_values() {
        if members.len() == 1 {
            issues.insert(
                members[0].row_number,
                "parlay leg has no sibling legs in the batch".to_string(),
            );
            continue;
        }
        let payouts: Vec<f64> = members.iter().filter_map(|r| r.normalized.payout).collect();
        let min = payouts.iter().copied().reduce(f64::min);
        let max = payouts.iter().copied().reduce(f64::max);
        if let (Some(min), Some(max)) = (min, max) {
            if max - min > 0.01 {
                for row in &members {
                    issues.insert(
                        row.row_number,
                        "parlay legs disagree on the combined payout".to_string(),
                    );
                }
            }
        }
    }
    issues
}
