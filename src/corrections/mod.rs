//! The correction workflow. Reviewers resolve flagged and uncertain
//! rows one decision at a time: accept the game-derived value, supply
//! a manual value, or skip the row. Every applied decision writes one
//! audit entry with before and after snapshots. A malformed or
//! inapplicable item skips that item only, never the whole request.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::db::models::{AuditAction, AuditLogEntry, LegOutcome, NormalizedRow, ValidationStatus};
use crate::db::Database;
use crate::error::PipelineError;
use crate::ingest::normalize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionAction {
    UseActual,
    Manual,
    Skip,
}

impl CorrectionAction {
    pub fn as_str(self) -> &'static str {
        match self {
            CorrectionAction::UseActual => "use_actual",
            CorrectionAction::Manual => "manual",
            CorrectionAction::Skip => "skip",
        }
    }
}

/// A manually supplied replacement, tagged by the field it fixes so an
/// unknown field or mistyped value fails to parse instead of landing
/// in the wrong place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "camelCase")]
pub enum ManualValue {
    HomeTeam(String),
    AwayTeam(String),
    Selection(String),
    Outcome(LegOutcome),
    GameDate(NaiveDate),
    WagerAmount(f64),
    Odds(i32),
    Payout(f64),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Correction {
    pub row_id: i64,
    pub action: CorrectionAction,
    #[serde(default)]
    pub manual_value: Option<ManualValue>,
}

#[derive(Debug, Default, Serialize)]
pub struct CorrectionReport {
    pub batch_id: i64,
    pub applied: i64,
    pub skipped: i64,
    pub outcomes: Vec<CorrectionOutcome>,
}

#[derive(Debug, Serialize)]
pub struct CorrectionOutcome {
    pub row_id: Option<i64>,
    pub disposition: &'static str,
    pub reason: Option<String>,
}

/// Applies a list of correction decisions to a batch.
///
/// Items are decoded one at a time so a single malformed entry is
/// reported and skipped while the rest still apply. Batch counters are
/// recomputed once at the end.
pub fn apply_corrections(
    db: &Database,
    batch_id: i64,
    actor: &str,
    items: &[serde_json::Value],
) -> Result<CorrectionReport, PipelineError> {
    db.get_batch(batch_id)?
        .ok_or_else(|| PipelineError::ValidationInput(format!("batch {batch_id} not found")))?;

    let mut report = CorrectionReport {
        batch_id,
        ..Default::default()
    };
    for item in items {
        let row_id = item.get("row_id").and_then(serde_json::Value::as_i64);
        let correction: Correction = match serde_json::from_value(item.clone()) {
            Ok(correction) => correction,
            Err(err) => {
                report.skipped += 1;
                report.outcomes.push(CorrectionOutcome {
                    row_id,
                    disposition: "skipped",
                    reason: Some(format!("malformed correction: {err}")),
                });
                continue;
            }
        };
        match apply_one(db, batch_id, actor, &correction)? {
            None => {
                report.applied += 1;
                report.outcomes.push(CorrectionOutcome {
                    row_id: Some(correction.row_id),
                    disposition: "applied",
                    reason: None,
                });
            }
            Some(reason) => {
                report.skipped += 1;
                report.outcomes.push(CorrectionOutcome {
                    row_id: Some(correction.row_id),
                    disposition: "skipped",
                    reason: Some(reason),
                });
            }
        }
    }

    db.recompute_batch_counters(batch_id)?;
    info!(
        "Corrections on batch {batch_id} by {actor}: {} applied, {} skipped",
        report.applied, report.skipped
    );
    Ok(report)
}

/// Applies one decision. `Ok(None)` means applied, `Ok(Some(reason))`
/// means the item was skipped; only infrastructure failures error.
fn apply_one(
    db: &Database,
    batch_id: i64,
    actor: &str,
    correction: &Correction,
) -> Result<Option<String>, PipelineError> {
    let Some(row) = db.get_row(correction.row_id)? else {
        return Ok(Some("row not found".to_string()));
    };
    if row.batch_id != batch_id {
        return Ok(Some("row belongs to a different batch".to_string()));
    }
    if row.imported_bet_id.is_some() {
        return Ok(Some("row is already imported".to_string()));
    }

    let old_snapshot = json!({
        "normalized": row.normalized,
        "validation_status": row.validation_status,
    });

    let mut updated = row.clone();
    match correction.action {
        CorrectionAction::Skip => {
            updated.validation_status = ValidationStatus::Uncertain;
            updated.uncertain_reasons = vec!["skipped by reviewer".to_string()];
        }
        CorrectionAction::UseActual => {
            let Some(actual) = row.actual_value.as_ref() else {
                return Ok(Some("row has no game-derived value to accept".to_string()));
            };
            updated.normalized.home_team = Some(actual.home_team.clone());
            updated.normalized.away_team = Some(actual.away_team.clone());
            if let Some(selected) = &actual.selected_team {
                updated.normalized.selection = Some(selected.clone());
            }
            if let Some(implied) = actual.implied_outcome {
                updated.normalized.outcome = Some(implied);
            }
            updated.validation_status = ValidationStatus::Corrected;
            updated.uncertain_reasons.clear();
        }
        CorrectionAction::Manual => {
            let Some(value) = &correction.manual_value else {
                return Ok(Some("manual correction carries no value".to_string()));
            };
            if let Err(reason) = apply_manual(&mut updated.normalized, value) {
                return Ok(Some(reason));
            }
            updated.validation_status = ValidationStatus::Corrected;
            updated.uncertain_reasons.clear();
        }
    }

    let now = Utc::now();
    updated.corrected_by = Some(actor.to_string());
    updated.corrected_at = Some(now);
    updated.correction_action = Some(correction.action.as_str().to_string());

    let audit = AuditLogEntry {
        id: None,
        actor: actor.to_string(),
        action: AuditAction::RowCorrected,
        entity_type: "upload_row".to_string(),
        entity_id: correction.row_id,
        batch_id: Some(batch_id),
        old_value: Some(old_snapshot),
        new_value: Some(json!({
            "normalized": updated.normalized,
            "validation_status": updated.validation_status,
            "action": correction.action.as_str(),
        })),
        created_at: now,
    };
    db.persist_correction(correction.row_id, &updated, &audit)?;
    Ok(None)
}

fn apply_manual(n: &mut NormalizedRow, value: &ManualValue) -> Result<(), String> {
    match value {
        ManualValue::HomeTeam(text) | ManualValue::AwayTeam(text) | ManualValue::Selection(text) => {
            let cleaned = normalize::clean_text(text);
            if cleaned.is_empty() {
                return Err("team name cannot be empty".to_string());
            }
            match value {
                ManualValue::HomeTeam(_) => n.home_team = Some(cleaned),
                ManualValue::AwayTeam(_) => n.away_team = Some(cleaned),
                _ => n.selection = Some(cleaned),
            }
        }
        ManualValue::Outcome(outcome) => n.outcome = Some(*outcome),
        ManualValue::GameDate(date) => n.game_date = Some(*date),
        ManualValue::WagerAmount(amount) => {
            if !amount.is_finite() || *amount < 0.0 {
                return Err("wager amount cannot be negative".to_string());
            }
            n.wager_amount = Some(*amount);
        }
        ManualValue::Odds(odds) => {
            if *odds == 0 {
                return Err("odds cannot be zero".to_string());
            }
            n.odds = Some(*odds);
        }
        ManualValue::Payout(payout) => {
            if !payout.is_finite() || *payout < 0.0 {
                return Err("payout cannot be negative".to_string());
            }
            n.payout = Some(*payout);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{
        ActualValue, ColumnMap, GameStatus, NormalizationSummary, PassResult, UploadBatch,
        UploadRow, ValidationReceipt,
    };
    use std::collections::BTreeMap;

    fn batch(total_rows: i64) -> UploadBatch {
        UploadBatch {
            id: None,
            uploaded_by: "tester".to_string(),
            file_name: "bets.csv".to_string(),
            total_rows,
            column_mapping: ColumnMap::default(),
            normalization: NormalizationSummary::default(),
            correct_count: 0,
            flagged_count: 0,
            uncertain_count: 0,
            created_at: Utc::now(),
        }
    }

    fn upload_row(row_number: i64) -> UploadRow {
        UploadRow {
            id: None,
            batch_id: 0,
            row_number,
            raw_fields: Default::default(),
            normalized: NormalizedRow {
                home_team: Some("Lakerz".to_string()),
                away_team: Some("Celtics".to_string()),
                wager_amount: Some(50.0),
                ..Default::default()
            },
            warnings: Vec::new(),
            original_value: None,
            actual_value: None,
            validation_status: ValidationStatus::Pending,
            receipt: None,
            field_confidence: BTreeMap::new(),
            uncertain_reasons: Vec::new(),
            corrected_by: None,
            corrected_at: None,
            correction_action: None,
            imported_bet_id: None,
            imported_at: None,
        }
    }

    fn flagged_receipt() -> ValidationReceipt {
        ValidationReceipt {
            game_matching: PassResult::fail("unmatched team name 'Lakerz'"),
            outcome_validation: PassResult::pass(),
            financial_validation: PassResult::pass(),
            cross_row_validation: PassResult::pass(),
        }
    }

    fn actual() -> ActualValue {
        ActualValue {
            game_id: 1,
            home_team: "Los Angeles Lakers".to_string(),
            away_team: "Boston Celtics".to_string(),
            home_score: Some(110),
            away_score: Some(98),
            game_status: GameStatus::Final,
            selected_team: Some("Los Angeles Lakers".to_string()),
            implied_outcome: Some(LegOutcome::Won),
        }
    }

    /// One flagged row with a game-derived actual value attached.
    fn seed_flagged_row(db: &Database) -> (i64, i64) {
        let batch_id = db
            .insert_batch_with_rows(&batch(1), &[upload_row(1)])
            .unwrap();
        let row_id = db.list_rows(batch_id).unwrap()[0].id.unwrap();
        db.update_row_validation(
            row_id,
            ValidationStatus::Flagged,
            &flagged_receipt(),
            &BTreeMap::new(),
            &[],
            Some(&actual()),
        )
        .unwrap();
        db.recompute_batch_counters(batch_id).unwrap();
        (batch_id, row_id)
    }

    #[test]
    fn test_use_actual_copies_game_values_and_audits() {
        let db = Database::open(":memory:").unwrap();
        let (batch_id, row_id) = seed_flagged_row(&db);

        let items = vec![json!({"row_id": row_id, "action": "use_actual"})];
        let report = apply_corrections(&db, batch_id, "reviewer", &items).unwrap();
        assert_eq!(report.applied, 1);
        assert_eq!(report.skipped, 0);

        let row = db.get_row(row_id).unwrap().unwrap();
        assert_eq!(row.validation_status, ValidationStatus::Corrected);
        assert_eq!(row.normalized.home_team.as_deref(), Some("Los Angeles Lakers"));
        assert_eq!(row.normalized.outcome, Some(LegOutcome::Won));
        assert_eq!(row.correction_action.as_deref(), Some("use_actual"));
        assert_eq!(row.corrected_by.as_deref(), Some("reviewer"));

        let audit = db.list_audit(batch_id, AuditAction::RowCorrected).unwrap();
        assert_eq!(audit.len(), 1);
        let old = audit[0].old_value.as_ref().unwrap();
        assert_eq!(old["validation_status"], json!("FLAGGED"));
        assert_eq!(old["normalized"]["home_team"], json!("Lakerz"));

        let batch = db.get_batch(batch_id).unwrap().unwrap();
        assert_eq!(batch.correct_count, 1);
        assert_eq!(batch.flagged_count, 0);
    }

    #[test]
    fn test_manual_negative_wager_is_skipped() {
        let db = Database::open(":memory:").unwrap();
        let (batch_id, row_id) = seed_flagged_row(&db);

        let items = vec![json!({
            "row_id": row_id,
            "action": "manual",
            "manual_value": {"field": "wagerAmount", "value": -5.0},
        })];
        let report = apply_corrections(&db, batch_id, "reviewer", &items).unwrap();
        assert_eq!(report.applied, 0);
        assert_eq!(report.skipped, 1);
        assert!(report.outcomes[0].reason.as_ref().unwrap().contains("negative"));

        let row = db.get_row(row_id).unwrap().unwrap();
        assert_eq!(row.validation_status, ValidationStatus::Flagged);
        assert_eq!(row.normalized.wager_amount, Some(50.0));
        assert!(db.list_audit(batch_id, AuditAction::RowCorrected).unwrap().is_empty());
    }

    #[test]
    fn test_cross_batch_correction_silently_skipped() {
        let db = Database::open(":memory:").unwrap();
        let (_, foreign_row) = seed_flagged_row(&db);
        let other_batch = db
            .insert_batch_with_rows(&batch(1), &[upload_row(1)])
            .unwrap();

        let items = vec![json!({"row_id": foreign_row, "action": "skip"})];
        let report = apply_corrections(&db, other_batch, "reviewer", &items).unwrap();
        assert_eq!(report.applied, 0);
        assert_eq!(report.skipped, 1);
        assert!(report.outcomes[0]
            .reason
            .as_ref()
            .unwrap()
            .contains("different batch"));

        let row = db.get_row(foreign_row).unwrap().unwrap();
        assert_eq!(row.validation_status, ValidationStatus::Flagged);
    }

    #[test]
    fn test_skip_demotes_to_uncertain_without_touching_data() {
        let db = Database::open(":memory:").unwrap();
        let (batch_id, row_id) = seed_flagged_row(&db);

        let items = vec![json!({"row_id": row_id, "action": "skip"})];
        apply_corrections(&db, batch_id, "reviewer", &items).unwrap();

        let row = db.get_row(row_id).unwrap().unwrap();
        assert_eq!(row.validation_status, ValidationStatus::Uncertain);
        assert_eq!(row.normalized.home_team.as_deref(), Some("Lakerz"));
        assert_eq!(row.correction_action.as_deref(), Some("skip"));

        let batch = db.get_batch(batch_id).unwrap().unwrap();
        assert_eq!(batch.uncertain_count, 1);
        assert_eq!(batch.flagged_count, 0);
    }

    #[test]
    fn test_malformed_item_skips_only_that_item() {
        let db = Database::open(":memory:").unwrap();
        let (batch_id, row_id) = seed_flagged_row(&db);

        let items = vec![
            json!({"row_id": "not a number", "action": "skip"}),
            json!({"row_id": row_id, "action": "skip"}),
        ];
        let report = apply_corrections(&db, batch_id, "reviewer", &items).unwrap();
        assert_eq!(report.applied, 1);
        assert_eq!(report.skipped, 1);
        assert!(report.outcomes[0]
            .reason
            .as_ref()
            .unwrap()
            .contains("malformed"));
    }

    #[test]
    fn test_imported_row_cannot_be_corrected() {
        use crate::db::models::{Bet, BetStatus, BetType};

        let db = Database::open(":memory:").unwrap();
        let (batch_id, row_id) = seed_flagged_row(&db);
        let bet = Bet {
            id: None,
            source_row_id: Some(row_id),
            bet_type: BetType::MoneyLine,
            wager_amount: 50.0,
            potential_payout: None,
            status: BetStatus::Pending,
            placed_date: None,
            created_at: Utc::now(),
            settled_at: None,
        };
        let mark = AuditLogEntry {
            id: None,
            actor: "importer".to_string(),
            action: AuditAction::RowImported,
            entity_type: "upload_row".to_string(),
            entity_id: row_id,
            batch_id: Some(batch_id),
            old_value: None,
            new_value: Some(json!({})),
            created_at: Utc::now(),
        };
        db.import_bet(&bet, &[], &[(row_id, mark)], Utc::now()).unwrap();

        let items = vec![json!({"row_id": row_id, "action": "skip"})];
        let report = apply_corrections(&db, batch_id, "reviewer", &items).unwrap();
        assert_eq!(report.skipped, 1);
        assert!(report.outcomes[0]
            .reason
            .as_ref()
            .unwrap()
            .contains("already imported"));
    }
}
