//! Importing validated rows into the bet ledger, and rolling an
//! import back. Import is idempotent per row: a row becomes at most
//! one bet, re-running skips what is already in. Rollback replays the
//! import's audit trail newest-first and refuses to run at all if any
//! bet from it has settled.

use std::collections::{BTreeMap, HashSet};

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::info;

use crate::db::models::{
    AuditAction, AuditLogEntry, Bet, BetLeg, BetStatus, BetType, UploadRow, ValidationStatus,
};
use crate::db::{Database, RowRestore};
use crate::error::PipelineError;
use crate::validation;

/// Only verified or human-corrected rows enter the ledger.
fn is_eligible(status: ValidationStatus) -> bool {
    matches!(
        status,
        ValidationStatus::Correct | ValidationStatus::Corrected
    )
}

#[derive(Debug, Default, Serialize)]
pub struct ImportSummary {
    pub batch_id: i64,
    pub eligible: i64,
    pub blocked: i64,
    pub already_imported: i64,
    /// Validation status → blocked row count.
    pub blocked_by_status: BTreeMap<String, i64>,
}

/// Read-only dry run: what an import of this batch would do.
pub fn pre_import_summary(db: &Database, batch_id: i64) -> Result<ImportSummary, PipelineError> {
    db.get_batch(batch_id)?
        .ok_or_else(|| PipelineError::ValidationInput(format!("batch {batch_id} not found")))?;

    let mut summary = ImportSummary {
        batch_id,
        ..Default::default()
    };
    for row in db.list_rows(batch_id)? {
        if row.imported_bet_id.is_some() {
            summary.already_imported += 1;
        } else if is_eligible(row.validation_status) {
            summary.eligible += 1;
        } else {
            summary.blocked += 1;
            *summary
                .blocked_by_status
                .entry(row.validation_status.as_str().to_string())
                .or_insert(0) += 1;
        }
    }
    Ok(summary)
}

#[derive(Debug, Default, Serialize)]
pub struct ImportReport {
    pub batch_id: i64,
    pub imported: i64,
    pub skipped: i64,
    pub rejected: i64,
    pub outcomes: Vec<RowImportOutcome>,
}

#[derive(Debug, Serialize)]
pub struct RowImportOutcome {
    pub row_id: i64,
    pub row_number: i64,
    pub disposition: &'static str,
    pub bet_id: Option<i64>,
    pub reason: Option<String>,
}

/// Imports a batch's eligible rows into the ledger.
///
/// `row_ids` restricts the import to specific rows; `None` takes the
/// whole batch. Moneyline and spread rows each become a single-leg
/// bet. Parlay rows sharing a date and stake are treated as legs of
/// one slip and become a single multi-leg bet; a request naming only
/// some of a slip's rows is rejected. Each imported row is stamped
/// with its bet and one audit entry, all in one transaction per bet.
pub fn import_rows(
    db: &Database,
    batch_id: i64,
    actor: &str,
    row_ids: Option<&[i64]>,
) -> Result<ImportReport, PipelineError> {
    db.get_batch(batch_id)?
        .ok_or_else(|| PipelineError::ValidationInput(format!("batch {batch_id} not found")))?;
    let all_rows = db.list_rows(batch_id)?;

    // Slip membership is decided over the whole batch, not the request.
    let mut batch_parlays: BTreeMap<(Option<NaiveDate>, i64), Vec<UploadRow>> = BTreeMap::new();
    for row in &all_rows {
        if row.normalized.bet_type == Some(BetType::Parlay) {
            batch_parlays.entry(parlay_key(row)).or_default().push(row.clone());
        }
    }

    let mut report = ImportReport {
        batch_id,
        ..Default::default()
    };
    let mut targets: Vec<UploadRow> = Vec::new();
    match row_ids {
        None => targets = all_rows,
        Some(ids) => {
            // A repeated id is taken once.
            let mut seen = HashSet::new();
            for id in ids {
                if !seen.insert(*id) {
                    continue;
                }
                match all_rows.iter().find(|r| r.id == Some(*id)) {
                    Some(row) => targets.push(row.clone()),
                    None => reject(&mut report, *id, 0, "row not found in batch".to_string()),
                }
            }
        }
    }

    let now = Utc::now();
    let mut requested_parlays: BTreeMap<(Option<NaiveDate>, i64), HashSet<i64>> = BTreeMap::new();
    for row in targets {
        if row.normalized.bet_type == Some(BetType::Parlay) {
            let row_id = row.id.context("upload row loaded without id")?;
            requested_parlays
                .entry(parlay_key(&row))
                .or_default()
                .insert(row_id);
            continue;
        }

        let row_id = row.id.context("upload row loaded without id")?;
        if let Some(bet_id) = row.imported_bet_id {
            skip(&mut report, row_id, row.row_number, bet_id);
            continue;
        }
        if !is_eligible(row.validation_status) {
            reject(
                &mut report,
                row_id,
                row.row_number,
                format!("status {} is not importable", row.validation_status.as_str()),
            );
            continue;
        }
        match prepare_leg(&row) {
            Err(reason) => reject(&mut report, row_id, row.row_number, reason),
            Ok((leg, wager)) => {
                let bet = Bet {
                    id: None,
                    source_row_id: Some(row_id),
                    bet_type: row.normalized.bet_type.unwrap_or(BetType::MoneyLine),
                    wager_amount: wager,
                    potential_payout: potential_payout(&row, wager),
                    status: BetStatus::Pending,
                    placed_date: row.normalized.game_date,
                    created_at: now,
                    settled_at: None,
                };
                let mark = import_mark(actor, batch_id, &row, now);
                let bet_id = db.import_bet(&bet, &[leg], &[(row_id, mark)], now)?;
                imported(&mut report, row_id, row.row_number, bet_id);
            }
        }
    }

    for (key, requested) in requested_parlays {
        let members = batch_parlays.remove(&key).unwrap_or_default();
        import_parlay_group(db, batch_id, actor, members, &requested, now, &mut report)?;
    }

    info!(
        "Import of batch {batch_id} by {actor}: {} imported, {} skipped, {} rejected",
        report.imported, report.skipped, report.rejected
    );
    Ok(report)
}

fn import_parlay_group(
    db: &Database,
    batch_id: i64,
    actor: &str,
    members: Vec<UploadRow>,
    requested: &HashSet<i64>,
    now: chrono::DateTime<Utc>,
    report: &mut ImportReport,
) -> Result<(), PipelineError> {
    if members.iter().all(|r| r.imported_bet_id.is_some()) {
        for row in members.iter().filter(|r| is_requested(r, requested)) {
            let row_id = row.id.context("upload row loaded without id")?;
            skip(report, row_id, row.row_number, row.imported_bet_id.unwrap_or(0));
        }
        return Ok(());
    }
    if members.iter().any(|r| r.imported_bet_id.is_some()) {
        for row in members.iter().filter(|r| is_requested(r, requested)) {
            let row_id = row.id.context("upload row loaded without id")?;
            match row.imported_bet_id {
                Some(bet_id) => skip(report, row_id, row.row_number, bet_id),
                None => reject(
                    report,
                    row_id,
                    row.row_number,
                    "parlay is partially imported; roll the batch back first".to_string(),
                ),
            }
        }
        return Ok(());
    }
    // A slip imports whole: the request must name every leg of it.
    if !members.iter().all(|r| is_requested(r, requested)) {
        for row in members.iter().filter(|r| is_requested(r, requested)) {
            let row_id = row.id.context("upload row loaded without id")?;
            reject(
                report,
                row_id,
                row.row_number,
                format!(
                    "parlay is partially selected; import all {} legs together",
                    members.len()
                ),
            );
        }
        return Ok(());
    }
    if !members.iter().all(|r| is_eligible(r.validation_status)) {
        for row in &members {
            let row_id = row.id.context("upload row loaded without id")?;
            let reason = if is_eligible(row.validation_status) {
                "sibling parlay legs are not importable".to_string()
            } else {
                format!("status {} is not importable", row.validation_status.as_str())
            };
            reject(report, row_id, row.row_number, reason);
        }
        return Ok(());
    }

    let mut legs = Vec::with_capacity(members.len());
    let mut marks = Vec::with_capacity(members.len());
    for row in &members {
        match prepare_leg(row) {
            Ok((leg, _)) => legs.push(leg),
            Err(reason) => {
                // One bad leg sinks the whole slip.
                for row in &members {
                    let row_id = row.id.context("upload row loaded without id")?;
                    reject(
                        report,
                        row_id,
                        row.row_number,
                        format!("parlay leg row {}: {reason}", row.row_number),
                    );
                }
                return Ok(());
            }
        }
        let row_id = row.id.context("upload row loaded without id")?;
        marks.push((row_id, import_mark(actor, batch_id, row, now)));
    }

    let first = &members[0];
    let wager = first.normalized.wager_amount.unwrap_or(0.0);
    let bet = Bet {
        id: None,
        source_row_id: first.id,
        bet_type: BetType::Parlay,
        wager_amount: wager,
        potential_payout: members.iter().find_map(|r| r.normalized.payout),
        status: BetStatus::Pending,
        placed_date: first.normalized.game_date,
        created_at: now,
        settled_at: None,
    };
    let bet_id = db.import_bet(&bet, &legs, &marks, now)?;
    for row in &members {
        let row_id = row.id.context("upload row loaded without id")?;
        imported(report, row_id, row.row_number, bet_id);
    }
    Ok(())
}

/// Rows of one slip share a game date and a stake, compared in cents.
fn parlay_key(row: &UploadRow) -> (Option<NaiveDate>, i64) {
    let cents = row
        .normalized
        .wager_amount
        .map(|w| (w * 100.0).round() as i64)
        .unwrap_or(-1);
    (row.normalized.game_date, cents)
}

fn is_requested(row: &UploadRow, requested: &HashSet<i64>) -> bool {
    row.id.map_or(false, |id| requested.contains(&id))
}

/// Builds the ledger leg for one row, or names what is missing.
fn prepare_leg(row: &UploadRow) -> Result<(BetLeg, f64), String> {
    let n = &row.normalized;
    let actual = row
        .actual_value
        .as_ref()
        .ok_or("no matched game recorded for the row")?;
    let wager = n.wager_amount.ok_or("row has no wager amount")?;
    let selected = actual
        .selected_team
        .clone()
        .ok_or("selection could not be oriented to the matched game")?;
    let line = if n.bet_type == Some(BetType::PointSpread) {
        n.line
    } else {
        None
    };
    let leg = BetLeg {
        id: None,
        bet_id: 0,
        game_id: actual.game_id,
        selected_team: selected,
        line,
        odds: n.odds,
        outcome: None,
    };
    Ok((leg, wager))
}

fn potential_payout(row: &UploadRow, wager: f64) -> Option<f64> {
    match row.normalized.odds {
        Some(odds) => Some(wager + validation::american_profit(wager, odds)),
        None => row.normalized.payout,
    }
}

fn import_mark(actor: &str, batch_id: i64, row: &UploadRow, now: chrono::DateTime<Utc>) -> AuditLogEntry {
    AuditLogEntry {
        id: None,
        actor: actor.to_string(),
        action: AuditAction::RowImported,
        entity_type: "upload_row".to_string(),
        entity_id: row.id.unwrap_or(0),
        batch_id: Some(batch_id),
        old_value: Some(json!({
            "validation_status": row.validation_status,
            "imported_bet_id": null,
        })),
        // The bet id is stamped in when the bet row exists.
        new_value: Some(json!({
            "validation_status": row.validation_status,
        })),
        created_at: now,
    }
}

fn imported(report: &mut ImportReport, row_id: i64, row_number: i64, bet_id: i64) {
    report.imported += 1;
    report.outcomes.push(RowImportOutcome {
        row_id,
        row_number,
        disposition: "imported",
        bet_id: Some(bet_id),
        reason: None,
    });
}

fn skip(report: &mut ImportReport, row_id: i64, row_number: i64, bet_id: i64) {
    report.skipped += 1;
    report.outcomes.push(RowImportOutcome {
        row_id,
        row_number,
        disposition: "skipped",
        bet_id: Some(bet_id),
        reason: Some("row is already imported".to_string()),
    });
}

fn reject(report: &mut ImportReport, row_id: i64, row_number: i64, reason: String) {
    report.rejected += 1;
    report.outcomes.push(RowImportOutcome {
        row_id,
        row_number,
        disposition: "rejected",
        bet_id: None,
        reason: Some(reason),
    });
}

#[derive(Debug, Serialize)]
pub struct RollbackReport {
    pub batch_id: i64,
    pub bets_deleted: i64,
    pub rows_restored: i64,
}

/// Reverses everything imported for the batch since its last rollback.
///
/// The import audit entries are replayed newest-first. Every affected
/// bet must still be PENDING; one settled bet blocks the whole
/// rollback before anything is touched. The rollback itself is
/// audited, which is also what fences repeated rollbacks off.
pub fn rollback_import(
    db: &Database,
    batch_id: i64,
    actor: &str,
) -> Result<RollbackReport, PipelineError> {
    db.get_batch(batch_id)?
        .ok_or_else(|| PipelineError::ValidationInput(format!("batch {batch_id} not found")))?;

    let cutoff = db
        .latest_audit_id(batch_id, AuditAction::ImportRolledBack)?
        .unwrap_or(0);
    let entries: Vec<AuditLogEntry> = db
        .list_audit(batch_id, AuditAction::RowImported)?
        .into_iter()
        .filter(|entry| entry.id.unwrap_or(0) > cutoff)
        .collect();
    if entries.is_empty() {
        return Err(PipelineError::ValidationInput(format!(
            "batch {batch_id} has no import to roll back"
        )));
    }

    // Verify every bet first so a settled one blocks the whole thing.
    let mut bet_ids: Vec<i64> = Vec::new();
    let mut seen = HashSet::new();
    let mut restores = Vec::with_capacity(entries.len());
    for entry in &entries {
        let bet_id = entry
            .new_value
            .as_ref()
            .and_then(|v| v["imported_bet_id"].as_i64())
            .context("import audit entry is missing its bet id")?;
        let bet = db
            .get_bet(bet_id)?
            .ok_or_else(|| PipelineError::Rollback(format!("bet {bet_id} no longer exists")))?;
        if bet.status != BetStatus::Pending {
            return Err(PipelineError::Rollback(format!(
                "bet {bet_id} has already settled ({})",
                bet.status.as_str()
            )));
        }
        if seen.insert(bet_id) {
            bet_ids.push(bet_id);
        }
        let restored_status = entry
            .old_value
            .as_ref()
            .and_then(|v| v["validation_status"].as_str())
            .map(ValidationStatus::from_db)
            .unwrap_or(ValidationStatus::Correct);
        restores.push(RowRestore {
            row_id: entry.entity_id,
            validation_status: restored_status,
        });
    }

    let audit = AuditLogEntry {
        id: None,
        actor: actor.to_string(),
        action: AuditAction::ImportRolledBack,
        entity_type: "upload_batch".to_string(),
        entity_id: batch_id,
        batch_id: Some(batch_id),
        old_value: None,
        new_value: Some(json!({
            "bets_deleted": bet_ids.len(),
            "rows_restored": restores.len(),
        })),
        created_at: Utc::now(),
    };
    db.rollback_import(&bet_ids, &restores, &audit)?;

    info!(
        "Rolled back import of batch {batch_id} by {actor}: {} bets deleted, {} rows restored",
        bet_ids.len(),
        restores.len()
    );
    Ok(RollbackReport {
        batch_id,
        bets_deleted: bet_ids.len() as i64,
        rows_restored: restores.len() as i64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{
        ActualValue, ColumnMap, Game, GameStatus, LegOutcome, NormalizationSummary, NormalizedRow,
        PassResult, UploadBatch, ValidationReceipt,
    };

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

    fn ok_receipt() -> ValidationReceipt {
        ValidationReceipt {
            game_matching: PassResult::pass(),
            outcome_validation: PassResult::pass(),
            financial_validation: PassResult::pass(),
            cross_row_validation: PassResult::pass(),
        }
    }

    fn game_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 15).unwrap()
    }

    fn seed_game(db: &Database, external_ref: &str, home: &str, away: &str) -> i64 {
        db.upsert_game(&Game {
            id: None,
            external_ref: Some(external_ref.to_string()),
            sport: Some("Basketball".to_string()),
            league: None,
            home_team: home.to_string(),
            away_team: away.to_string(),
            game_date: game_date(),
            home_score: None,
            away_score: None,
            status: GameStatus::Scheduled,
            updated_at: Utc::now(),
        })
        .unwrap()
    }

    fn row(row_number: i64, bet_type: Option<BetType>) -> UploadRow {
        UploadRow {
            id: None,
            batch_id: 0,
            row_number,
            raw_fields: Default::default(),
            normalized: NormalizedRow {
                game_date: Some(game_date()),
                home_team: Some("Lakers".to_string()),
                away_team: Some("Celtics".to_string()),
                bet_type,
                odds: Some(-110),
                outcome: Some(LegOutcome::Won),
                wager_amount: Some(50.0),
                payout: Some(95.45),
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

    fn mark_validated(db: &Database, row_id: i64, status: ValidationStatus, game_id: i64) {
        let actual = ActualValue {
            game_id,
            home_team: "Los Angeles Lakers".to_string(),
            away_team: "Boston Celtics".to_string(),
            home_score: None,
            away_score: None,
            game_status: GameStatus::Scheduled,
            selected_team: Some("Los Angeles Lakers".to_string()),
            implied_outcome: None,
        };
        db.update_row_validation(
            row_id,
            status,
            &ok_receipt(),
            &BTreeMap::new(),
            &[],
            Some(&actual),
        )
        .unwrap();
    }

    /// Batch of two validated single-leg rows ready to import.
    fn seed_ready_batch(db: &Database) -> i64 {
        let game_id = seed_game(db, "g1", "Los Angeles Lakers", "Boston Celtics");
        let batch_id = db
            .insert_batch_with_rows(&batch(2), &[row(1, None), row(2, None)])
            .unwrap();
        for r in db.list_rows(batch_id).unwrap() {
            mark_validated(db, r.id.unwrap(), ValidationStatus::Correct, game_id);
        }
        db.recompute_batch_counters(batch_id).unwrap();
        batch_id
    }

    #[test]
    fn test_import_is_idempotent_per_row() {
        let db = Database::open(":memory:").unwrap();
        let batch_id = seed_ready_batch(&db);

        let first = import_rows(&db, batch_id, "importer", None).unwrap();
        assert_eq!(first.imported, 2);
        assert_eq!(db.list_pending_bets().unwrap().len(), 2);

        let second = import_rows(&db, batch_id, "importer", None).unwrap();
        assert_eq!(second.imported, 0);
        assert_eq!(second.skipped, 2);
        assert_eq!(db.list_pending_bets().unwrap().len(), 2);

        let rows = db.list_rows(batch_id).unwrap();
        assert!(rows.iter().all(|r| r.imported_bet_id.is_some()));
        assert_eq!(
            db.list_audit(batch_id, AuditAction::RowImported).unwrap().len(),
            2
        );
    }

    #[test]
    fn test_uneligible_rows_are_rejected() {
        let db = Database::open(":memory:").unwrap();
        let game_id = seed_game(&db, "g1", "Los Angeles Lakers", "Boston Celtics");
        let batch_id = db
            .insert_batch_with_rows(&batch(2), &[row(1, None), row(2, None)])
            .unwrap();
        let rows = db.list_rows(batch_id).unwrap();
        mark_validated(&db, rows[0].id.unwrap(), ValidationStatus::Correct, game_id);
        mark_validated(&db, rows[1].id.unwrap(), ValidationStatus::Flagged, game_id);

        let summary = pre_import_summary(&db, batch_id).unwrap();
        assert_eq!(summary.eligible, 1);
        assert_eq!(summary.blocked, 1);
        assert_eq!(summary.blocked_by_status.get("FLAGGED"), Some(&1));

        let report = import_rows(&db, batch_id, "importer", None).unwrap();
        assert_eq!(report.imported, 1);
        assert_eq!(report.rejected, 1);
        assert_eq!(db.list_pending_bets().unwrap().len(), 1);
    }

    #[test]
    fn test_parlay_rows_become_one_multi_leg_bet() {
        let db = Database::open(":memory:").unwrap();
        let g1 = seed_game(&db, "g1", "Los Angeles Lakers", "Boston Celtics");
        let g2 = seed_game(&db, "g2", "Golden State Warriors", "Phoenix Suns");
        let batch_id = db
            .insert_batch_with_rows(
                &batch(2),
                &[row(1, Some(BetType::Parlay)), row(2, Some(BetType::Parlay))],
            )
            .unwrap();
        let rows = db.list_rows(batch_id).unwrap();
        mark_validated(&db, rows[0].id.unwrap(), ValidationStatus::Correct, g1);
        mark_validated(&db, rows[1].id.unwrap(), ValidationStatus::Correct, g2);

        let report = import_rows(&db, batch_id, "importer", None).unwrap();
        assert_eq!(report.imported, 2);

        let bets = db.list_pending_bets().unwrap();
        assert_eq!(bets.len(), 1);
        assert_eq!(bets[0].bet_type, BetType::Parlay);
        let legs = db.list_legs(bets[0].id.unwrap()).unwrap();
        assert_eq!(legs.len(), 2);
    }

    #[test]
    fn test_rollback_restores_rows_and_deletes_bets() {
        let db = Database::open(":memory:").unwrap();
        let batch_id = seed_ready_batch(&db);
        import_rows(&db, batch_id, "importer", None).unwrap();

        let report = rollback_import(&db, batch_id, "importer").unwrap();
        assert_eq!(report.bets_deleted, 2);
        assert_eq!(report.rows_restored, 2);

        let rows = db.list_rows(batch_id).unwrap();
        assert!(rows.iter().all(|r| r.imported_bet_id.is_none()));
        assert!(rows
            .iter()
            .all(|r| r.validation_status == ValidationStatus::Correct));
        assert!(db.list_pending_bets().unwrap().is_empty());
        assert_eq!(
            db.list_audit(batch_id, AuditAction::ImportRolledBack)
                .unwrap()
                .len(),
            1
        );

        // Nothing left to roll back a second time.
        let err = rollback_import(&db, batch_id, "importer").unwrap_err();
        assert!(matches!(err, PipelineError::ValidationInput(_)));

        // The batch can be imported again from scratch.
        let again = import_rows(&db, batch_id, "importer", None).unwrap();
        assert_eq!(again.imported, 2);
    }

    #[test]
    fn test_settled_bet_blocks_rollback() {
        let db = Database::open(":memory:").unwrap();
        let batch_id = seed_ready_batch(&db);
        let report = import_rows(&db, batch_id, "importer", None).unwrap();
        let bet_id = report.outcomes[0].bet_id.unwrap();
        db.record_settlement(bet_id, &[], BetStatus::Won, Utc::now())
            .unwrap();

        let err = rollback_import(&db, batch_id, "importer").unwrap_err();
        assert!(matches!(err, PipelineError::Rollback(_)));

        // Nothing was touched.
        let rows = db.list_rows(batch_id).unwrap();
        assert!(rows.iter().all(|r| r.imported_bet_id.is_some()));
        assert!(db.get_bet(bet_id).unwrap().is_some());
    }

    #[test]
    fn test_requested_unknown_row_is_rejected() {
        let db = Database::open(":memory:").unwrap();
        let batch_id = seed_ready_batch(&db);

        let report = import_rows(&db, batch_id, "importer", Some(&[9999])).unwrap();
        assert_eq!(report.imported, 0);
        assert_eq!(report.rejected, 1);
        assert!(report.outcomes[0]
            .reason
            .as_ref()
            .unwrap()
            .contains("not found"));
    }

    #[test]
    fn test_repeated_row_id_imports_once() {
        let db = Database::open(":memory:").unwrap();
        let batch_id = seed_ready_batch(&db);
        let row_id = db.list_rows(batch_id).unwrap()[0].id.unwrap();

        let report = import_rows(&db, batch_id, "importer", Some(&[row_id, row_id])).unwrap();
        assert_eq!(report.imported, 1);
        assert_eq!(report.skipped, 0);
        assert_eq!(db.list_pending_bets().unwrap().len(), 1);
        assert_eq!(
            db.list_audit(batch_id, AuditAction::RowImported).unwrap().len(),
            1
        );
    }

    #[test]
    fn test_parlay_slip_cannot_be_split_across_requests() {
        let db = Database::open(":memory:").unwrap();
        let g1 = seed_game(&db, "g1", "Los Angeles Lakers", "Boston Celtics");
        let g2 = seed_game(&db, "g2", "Golden State Warriors", "Phoenix Suns");
        let batch_id = db
            .insert_batch_with_rows(
                &batch(2),
                &[row(1, Some(BetType::Parlay)), row(2, Some(BetType::Parlay))],
            )
            .unwrap();
        let rows = db.list_rows(batch_id).unwrap();
        mark_validated(&db, rows[0].id.unwrap(), ValidationStatus::Correct, g1);
        mark_validated(&db, rows[1].id.unwrap(), ValidationStatus::Correct, g2);

        // One leg at a time never books the slip.
        let one = import_rows(&db, batch_id, "importer", Some(&[rows[0].id.unwrap()])).unwrap();
        assert_eq!(one.imported, 0);
        assert_eq!(one.rejected, 1);
        assert!(one.outcomes[0]
            .reason
            .as_ref()
            .unwrap()
            .contains("partially selected"));
        assert!(db.list_pending_bets().unwrap().is_empty());

        // Naming every leg books exactly one bet at the slip's stake.
        let both = import_rows(
            &db,
            batch_id,
            "importer",
            Some(&[rows[0].id.unwrap(), rows[1].id.unwrap()]),
        )
        .unwrap();
        assert_eq!(both.imported, 2);
        let bets = db.list_pending_bets().unwrap();
        assert_eq!(bets.len(), 1);
        assert_eq!(bets[0].wager_amount, 50.0);
        assert_eq!(db.list_legs(bets[0].id.unwrap()).unwrap().len(), 2);
    }
}
