use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

pub mod models;
use models::*;

/// Thread-safe SQLite handle (single connection with mutex)
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the SQLite database at the given path
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Run schema migrations (idempotent)
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    // ── Upload batches ───────────────────────────────────────────────────────

    /// Insert a batch together with all of its rows in one transaction.
    pub fn insert_batch_with_rows(&self, batch: &UploadBatch, rows: &[UploadRow]) -> Result<i64> {
        let mapping_json = serde_json::to_string(&batch.column_mapping)?;
        let summary_json = serde_json::to_string(&batch.normalization)?;
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO upload_batches (
                uploaded_by, file_name, total_rows, column_mapping, normalization,
                correct_count, flagged_count, uncertain_count, created_at
             ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
            params![
                batch.uploaded_by,
                batch.file_name,
                batch.total_rows,
                mapping_json,
                summary_json,
                batch.correct_count,
                batch.flagged_count,
                batch.uncertain_count,
                batch.created_at,
            ],
        )?;
        let batch_id = tx.last_insert_rowid();
        for row in rows {
            tx.execute(
                "INSERT INTO upload_rows (
                    batch_id, row_number, raw_fields, normalized, warnings,
                    original_value, validation_status, field_confidence, uncertain_reasons
                 ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
                params![
                    batch_id,
                    row.row_number,
                    serde_json::to_string(&row.raw_fields)?,
                    serde_json::to_string(&row.normalized)?,
                    serde_json::to_string(&row.warnings)?,
                    row.original_value.as_ref().map(|v| v.to_string()),
                    row.validation_status.as_str(),
                    serde_json::to_string(&row.field_confidence)?,
                    serde_json::to_string(&row.uncertain_reasons)?,
                ],
            )?;
        }
        tx.commit()?;
        Ok(batch_id)
    }

    pub fn get_batch(&self, batch_id: i64) -> Result<Option<UploadBatch>> {
        let conn = self.conn.lock().unwrap();
        let batch = conn
            .query_row(
                "SELECT id, uploaded_by, file_name, total_rows, column_mapping, normalization,
                        correct_count, flagged_count, uncertain_count, created_at
                 FROM upload_batches WHERE id=?1",
                params![batch_id],
                map_batch,
            )
            .optional()?;
        Ok(batch)
    }

    pub fn list_batches(&self, limit: i64) -> Result<Vec<UploadBatch>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, uploaded_by, file_name, total_rows, column_mapping, normalization,
                    correct_count, flagged_count, uncertain_count, created_at
             FROM upload_batches ORDER BY created_at DESC, id DESC LIMIT ?1",
        )?;
        let batches = stmt
            .query_map(params![limit], map_batch)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(batches)
    }

    /// Recount row statuses and store the counters on the batch.
    /// CORRECTED rows count as correct.
    pub fn recompute_batch_counters(&self, batch_id: i64) -> Result<(i64, i64, i64)> {
        let conn = self.conn.lock().unwrap();
        let correct: i64 = conn.query_row(
            "SELECT COUNT(*) FROM upload_rows
             WHERE batch_id=?1 AND validation_status IN ('CORRECT','CORRECTED')",
            params![batch_id],
            |r| r.get(0),
        )?;
        let flagged: i64 = conn.query_row(
            "SELECT COUNT(*) FROM upload_rows WHERE batch_id=?1 AND validation_status='FLAGGED'",
            params![batch_id],
            |r| r.get(0),
        )?;
        let uncertain: i64 = conn.query_row(
            "SELECT COUNT(*) FROM upload_rows WHERE batch_id=?1 AND validation_status='UNCERTAIN'",
            params![batch_id],
            |r| r.get(0),
        )?;
        conn.execute(
            "UPDATE upload_batches SET correct_count=?1, flagged_count=?2, uncertain_count=?3
             WHERE id=?4",
            params![correct, flagged, uncertain, batch_id],
        )?;
        Ok((correct, flagged, uncertain))
    }

    // ── Upload rows ──────────────────────────────────────────────────────────

    pub fn get_row(&self, row_id: i64) -> Result<Option<UploadRow>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                &format!("SELECT {ROW_COLUMNS} FROM upload_rows WHERE id=?1"),
                params![row_id],
                map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// All rows of a batch in spreadsheet order.
    pub fn list_rows(&self, batch_id: i64) -> Result<Vec<UploadRow>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {ROW_COLUMNS} FROM upload_rows WHERE batch_id=?1 ORDER BY row_number"
        ))?;
        let rows = stmt
            .query_map(params![batch_id], map_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn list_rows_page(
        &self,
        batch_id: i64,
        status: Option<ValidationStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<UploadRow>> {
        let conn = self.conn.lock().unwrap();
        let rows = match status {
            Some(status) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {ROW_COLUMNS} FROM upload_rows
                     WHERE batch_id=?1 AND validation_status=?2
                     ORDER BY row_number LIMIT ?3 OFFSET ?4"
                ))?;
                let rows = stmt
                    .query_map(params![batch_id, status.as_str(), limit, offset], map_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {ROW_COLUMNS} FROM upload_rows
                     WHERE batch_id=?1 ORDER BY row_number LIMIT ?2 OFFSET ?3"
                ))?;
                let rows = stmt
                    .query_map(params![batch_id, limit, offset], map_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
        };
        Ok(rows)
    }

    pub fn count_rows(&self, batch_id: i64, status: Option<ValidationStatus>) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let count = match status {
            Some(status) => conn.query_row(
                "SELECT COUNT(*) FROM upload_rows WHERE batch_id=?1 AND validation_status=?2",
                params![batch_id, status.as_str()],
                |r| r.get(0),
            )?,
            None => conn.query_row(
                "SELECT COUNT(*) FROM upload_rows WHERE batch_id=?1",
                params![batch_id],
                |r| r.get(0),
            )?,
        };
        Ok(count)
    }

    /// Overwrite a row's validation outcome. Engine-originated, so no audit
    /// entry is written here.
    pub fn update_row_validation(
        &self,
        row_id: i64,
        status: ValidationStatus,
        receipt: &ValidationReceipt,
        field_confidence: &BTreeMap<String, f64>,
        uncertain_reasons: &[String],
        actual_value: Option<&ActualValue>,
    ) -> Result<()> {
        let receipt_json = serde_json::to_string(receipt)?;
        let confidence_json = serde_json::to_string(field_confidence)?;
        let reasons_json = serde_json::to_string(uncertain_reasons)?;
        let actual_json = actual_value.map(serde_json::to_string).transpose()?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE upload_rows
             SET validation_status=?1, receipt=?2, field_confidence=?3,
                 uncertain_reasons=?4, actual_value=?5
             WHERE id=?6",
            params![
                status.as_str(),
                receipt_json,
                confidence_json,
                reasons_json,
                actual_json,
                row_id
            ],
        )?;
        Ok(())
    }

    /// Apply one correction decision: row update plus its audit entry commit
    /// together or not at all.
    pub fn persist_correction(
        &self,
        row_id: i64,
        row: &UploadRow,
        audit: &AuditLogEntry,
    ) -> Result<()> {
        let normalized_json = serde_json::to_string(&row.normalized)?;
        let reasons_json = serde_json::to_string(&row.uncertain_reasons)?;
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE upload_rows
             SET normalized=?1, validation_status=?2, uncertain_reasons=?3,
                 corrected_by=?4, corrected_at=?5, correction_action=?6
             WHERE id=?7",
            params![
                normalized_json,
                row.validation_status.as_str(),
                reasons_json,
                row.corrected_by,
                row.corrected_at,
                row.correction_action,
                row_id
            ],
        )?;
        insert_audit_entry(&tx, audit)?;
        tx.commit()?;
        Ok(())
    }

    // ── Aliases ──────────────────────────────────────────────────────────────

    pub fn list_aliases(&self) -> Result<Vec<AliasEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT id, alias, canonical FROM alias_entries ORDER BY alias")?;
        let aliases = stmt
            .query_map([], map_alias)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(aliases)
    }

    pub fn upsert_alias(&self, alias: &str, canonical: &str) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO alias_entries (alias, canonical) VALUES (?1, ?2)
             ON CONFLICT(alias) DO UPDATE SET canonical=excluded.canonical",
            params![alias, canonical],
        )?;
        let id: i64 = conn.query_row(
            "SELECT id FROM alias_entries WHERE alias=?1",
            params![alias],
            |r| r.get(0),
        )?;
        Ok(id)
    }

    pub fn count_aliases(&self) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM alias_entries", [], |r| r.get(0))
            .unwrap_or(0);
        Ok(count)
    }

    // ── Audit log ────────────────────────────────────────────────────────────

    /// Entries for a batch with the given action, newest first (LIFO order
    /// for rollback replay).
    pub fn list_audit(&self, batch_id: i64, action: AuditAction) -> Result<Vec<AuditLogEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, actor, action, entity_type, entity_id, batch_id,
                    old_value, new_value, created_at
             FROM audit_log WHERE batch_id=?1 AND action=?2 ORDER BY id DESC",
        )?;
        let entries = stmt
            .query_map(params![batch_id, action.as_str()], map_audit)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    pub fn latest_audit_id(&self, batch_id: i64, action: AuditAction) -> Result<Option<i64>> {
        let conn = self.conn.lock().unwrap();
        let id: Option<i64> = conn.query_row(
            "SELECT MAX(id) FROM audit_log WHERE batch_id=?1 AND action=?2",
            params![batch_id, action.as_str()],
            |r| r.get(0),
        )?;
        Ok(id)
    }

    // ── Games ────────────────────────────────────────────────────────────────

    /// Insert or refresh a game keyed by its score-feed reference.
    pub fn upsert_game(&self, game: &Game) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        match &game.external_ref {
            Some(external_ref) => {
                conn.execute(
                    "INSERT INTO games (
                        external_ref, sport, league, home_team, away_team,
                        game_date, home_score, away_score, status, updated_at
                     ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)
                     ON CONFLICT(external_ref) DO UPDATE SET
                        sport=excluded.sport,
                        league=excluded.league,
                        home_team=excluded.home_team,
                        away_team=excluded.away_team,
                        game_date=excluded.game_date,
                        home_score=excluded.home_score,
                        away_score=excluded.away_score,
                        status=excluded.status,
                        updated_at=excluded.updated_at",
                    params![
                        external_ref,
                        game.sport,
                        game.league,
                        game.home_team,
                        game.away_team,
                        game.game_date,
                        game.home_score,
                        game.away_score,
                        game.status.as_str(),
                        game.updated_at,
                    ],
                )?;
                let id: i64 = conn.query_row(
                    "SELECT id FROM games WHERE external_ref=?1",
                    params![external_ref],
                    |r| r.get(0),
                )?;
                Ok(id)
            }
            None => {
                conn.execute(
                    "INSERT INTO games (
                        sport, league, home_team, away_team, game_date,
                        home_score, away_score, status, updated_at
                     ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
                    params![
                        game.sport,
                        game.league,
                        game.home_team,
                        game.away_team,
                        game.game_date,
                        game.home_score,
                        game.away_score,
                        game.status.as_str(),
                        game.updated_at,
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            }
        }
    }

    pub fn get_game(&self, game_id: i64) -> Result<Option<Game>> {
        let conn = self.conn.lock().unwrap();
        let game = conn
            .query_row(
                "SELECT id, external_ref, sport, league, home_team, away_team,
                        game_date, home_score, away_score, status, updated_at
                 FROM games WHERE id=?1",
                params![game_id],
                map_game,
            )
            .optional()?;
        Ok(game)
    }

    /// Case-insensitive exact lookup on canonical team names and date.
    pub fn find_game(
        &self,
        home_team: &str,
        away_team: &str,
        date: NaiveDate,
    ) -> Result<Option<Game>> {
        let conn = self.conn.lock().unwrap();
        let game = conn
            .query_row(
                "SELECT id, external_ref, sport, league, home_team, away_team,
                        game_date, home_score, away_score, status, updated_at
                 FROM games
                 WHERE LOWER(home_team)=LOWER(?1) AND LOWER(away_team)=LOWER(?2)
                   AND game_date=?3
                 LIMIT 1",
                params![home_team, away_team, date],
                map_game,
            )
            .optional()?;
        Ok(game)
    }

    // ── Bets ─────────────────────────────────────────────────────────────────

    pub fn get_bet(&self, bet_id: i64) -> Result<Option<Bet>> {
        let conn = self.conn.lock().unwrap();
        let bet = conn
            .query_row(
                "SELECT id, source_row_id, bet_type, wager_amount, potential_payout,
                        status, placed_date, created_at, settled_at
                 FROM bets WHERE id=?1",
                params![bet_id],
                map_bet,
            )
            .optional()?;
        Ok(bet)
    }

    pub fn list_pending_bets(&self) -> Result<Vec<Bet>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, source_row_id, bet_type, wager_amount, potential_payout,
                    status, placed_date, created_at, settled_at
             FROM bets WHERE status='PENDING' ORDER BY id",
        )?;
        let bets = stmt
            .query_map([], map_bet)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(bets)
    }

    pub fn list_legs(&self, bet_id: i64) -> Result<Vec<BetLeg>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, bet_id, game_id, selected_team, line, odds, outcome
             FROM bet_legs WHERE bet_id=?1 ORDER BY id",
        )?;
        let legs = stmt
            .query_map(params![bet_id], map_leg)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(legs)
    }

    /// Create one bet with its legs, mark the source rows imported, and
    /// write one audit entry per row, all in a single transaction. The
    /// created bet id is stamped into each audit entry's new_value so a
    /// later rollback can find the record.
    pub fn import_bet(
        &self,
        bet: &Bet,
        legs: &[BetLeg],
        row_marks: &[(i64, AuditLogEntry)],
        imported_at: DateTime<Utc>,
    ) -> Result<i64> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO bets (
                source_row_id, bet_type, wager_amount, potential_payout,
                status, placed_date, created_at
             ) VALUES (?1,?2,?3,?4,?5,?6,?7)",
            params![
                bet.source_row_id,
                bet.bet_type.as_str(),
                bet.wager_amount,
                bet.potential_payout,
                bet.status.as_str(),
                bet.placed_date,
                bet.created_at,
            ],
        )?;
        let bet_id = tx.last_insert_rowid();
        for leg in legs {
            tx.execute(
                "INSERT INTO bet_legs (bet_id, game_id, selected_team, line, odds, outcome)
                 VALUES (?1,?2,?3,?4,?5,?6)",
                params![
                    bet_id,
                    leg.game_id,
                    leg.selected_team,
                    leg.line,
                    leg.odds,
                    leg.outcome.map(LegOutcome::as_str),
                ],
            )?;
        }
        for (row_id, audit) in row_marks {
            tx.execute(
                "UPDATE upload_rows SET imported_bet_id=?1, imported_at=?2 WHERE id=?3",
                params![bet_id, imported_at, row_id],
            )?;
            let mut entry = audit.clone();
            if let Some(obj) = entry.new_value.as_mut().and_then(|v| v.as_object_mut()) {
                obj.insert("imported_bet_id".to_string(), serde_json::json!(bet_id));
            }
            insert_audit_entry(&tx, &entry)?;
        }
        tx.commit()?;
        Ok(bet_id)
    }

    /// Write leg outcomes and the final bet status in one transaction.
    pub fn record_settlement(
        &self,
        bet_id: i64,
        leg_outcomes: &[(i64, LegOutcome)],
        status: BetStatus,
        settled_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        for (leg_id, outcome) in leg_outcomes {
            tx.execute(
                "UPDATE bet_legs SET outcome=?1 WHERE id=?2",
                params![outcome.as_str(), leg_id],
            )?;
        }
        tx.execute(
            "UPDATE bets SET status=?1, settled_at=?2 WHERE id=?3",
            params![status.as_str(), settled_at, bet_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Reverse an import in a single transaction: restore the rows first so
    /// their bet references clear, then delete the ledger records, then log
    /// the rollback itself.
    pub fn rollback_import(
        &self,
        bet_ids: &[i64],
        restores: &[RowRestore],
        audit: &AuditLogEntry,
    ) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        for restore in restores {
            tx.execute(
                "UPDATE upload_rows
                 SET imported_bet_id=NULL, imported_at=NULL, validation_status=?1
                 WHERE id=?2",
                params![restore.validation_status.as_str(), restore.row_id],
            )?;
        }
        for bet_id in bet_ids {
            tx.execute("DELETE FROM bet_legs WHERE bet_id=?1", params![bet_id])?;
            tx.execute("DELETE FROM bets WHERE id=?1", params![bet_id])?;
        }
        insert_audit_entry(&tx, audit)?;
        tx.commit()?;
        Ok(())
    }

    // ── Stats ────────────────────────────────────────────────────────────────

    pub fn get_stats(&self) -> Result<Stats> {
        let conn = self.conn.lock().unwrap();
        let batches: i64 = conn
            .query_row("SELECT COUNT(*) FROM upload_batches", [], |r| r.get(0))
            .unwrap_or(0);
        let rows_total: i64 = conn
            .query_row("SELECT COUNT(*) FROM upload_rows", [], |r| r.get(0))
            .unwrap_or(0);
        let rows_flagged: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM upload_rows WHERE validation_status='FLAGGED'",
                [],
                |r| r.get(0),
            )
            .unwrap_or(0);
        let rows_imported: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM upload_rows WHERE imported_bet_id IS NOT NULL",
                [],
                |r| r.get(0),
            )
            .unwrap_or(0);
        let games: i64 = conn
            .query_row("SELECT COUNT(*) FROM games", [], |r| r.get(0))
            .unwrap_or(0);
        let games_final: i64 = conn
            .query_row("SELECT COUNT(*) FROM games WHERE status='FINAL'", [], |r| {
                r.get(0)
            })
            .unwrap_or(0);
        let bets_pending: i64 = conn
            .query_row("SELECT COUNT(*) FROM bets WHERE status='PENDING'", [], |r| {
                r.get(0)
            })
            .unwrap_or(0);
        let bets_settled: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM bets WHERE status != 'PENDING'",
                [],
                |r| r.get(0),
            )
            .unwrap_or(0);
        let aliases: i64 = conn
            .query_row("SELECT COUNT(*) FROM alias_entries", [], |r| r.get(0))
            .unwrap_or(0);
        Ok(Stats {
            batches,
            rows_total,
            rows_flagged,
            rows_imported,
            games,
            games_final,
            bets_pending,
            bets_settled,
            aliases,
        })
    }
}

// ── SQL helpers ────────────────────────────────────────────────────────────────

const ROW_COLUMNS: &str = "id, batch_id, row_number, raw_fields, normalized, warnings, \
     original_value, actual_value, validation_status, receipt, field_confidence, \
     uncertain_reasons, corrected_by, corrected_at, correction_action, imported_bet_id, \
     imported_at";

fn insert_audit_entry(conn: &Connection, entry: &AuditLogEntry) -> Result<i64> {
    conn.execute(
        "INSERT INTO audit_log (
            actor, action, entity_type, entity_id, batch_id,
            old_value, new_value, created_at
         ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8)",
        params![
            entry.actor,
            entry.action.as_str(),
            entry.entity_type,
            entry.entity_id,
            entry.batch_id,
            entry.old_value.as_ref().map(|v| v.to_string()),
            entry.new_value.as_ref().map(|v| v.to_string()),
            entry.created_at,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn json_col<T: DeserializeOwned>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn json_col_opt<T: DeserializeOwned>(
    row: &rusqlite::Row,
    idx: usize,
) -> rusqlite::Result<Option<T>> {
    let text: Option<String> = row.get(idx)?;
    match text {
        None => Ok(None),
        Some(text) => serde_json::from_str(&text).map(Some).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        }),
    }
}

fn map_batch(row: &rusqlite::Row) -> rusqlite::Result<UploadBatch> {
    Ok(UploadBatch {
        id: row.get(0)?,
        uploaded_by: row.get(1)?,
        file_name: row.get(2)?,
        total_rows: row.get(3)?,
        column_mapping: json_col(row, 4)?,
        normalization: json_col(row, 5)?,
        correct_count: row.get(6)?,
        flagged_count: row.get(7)?,
        uncertain_count: row.get(8)?,
        created_at: row.get(9)?,
    })
}

fn map_row(row: &rusqlite::Row) -> rusqlite::Result<UploadRow> {
    let status: String = row.get(8)?;
    Ok(UploadRow {
        id: row.get(0)?,
        batch_id: row.get(1)?,
        row_number: row.get(2)?,
        raw_fields: json_col(row, 3)?,
        normalized: json_col(row, 4)?,
        warnings: json_col(row, 5)?,
        original_value: json_col_opt(row, 6)?,
        actual_value: json_col_opt(row, 7)?,
        validation_status: ValidationStatus::from_db(&status),
        receipt: json_col_opt(row, 9)?,
        field_confidence: json_col(row, 10)?,
        uncertain_reasons: json_col(row, 11)?,
        corrected_by: row.get(12)?,
        corrected_at: row.get(13)?,
        correction_action: row.get(14)?,
        imported_bet_id: row.get(15)?,
        imported_at: row.get(16)?,
    })
}

fn map_alias(row: &rusqlite::Row) -> rusqlite::Result<AliasEntry> {
    Ok(AliasEntry {
        id: row.get(0)?,
        alias: row.get(1)?,
        canonical: row.get(2)?,
    })
}

fn map_audit(row: &rusqlite::Row) -> rusqlite::Result<AuditLogEntry> {
    let action: String = row.get(2)?;
    let action = AuditAction::from_db(&action).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            format!("unknown audit action '{action}'").into(),
        )
    })?;
    Ok(AuditLogEntry {
        id: row.get(0)?,
        actor: row.get(1)?,
        action,
        entity_type: row.get(3)?,
        entity_id: row.get(4)?,
        batch_id: row.get(5)?,
        old_value: json_col_opt(row, 6)?,
        new_value: json_col_opt(row, 7)?,
        created_at: row.get(8)?,
    })
}

fn map_game(row: &rusqlite::Row) -> rusqlite::Result<Game> {
    let status: String = row.get(9)?;
    Ok(Game {
        id: row.get(0)?,
        external_ref: row.get(1)?,
        sport: row.get(2)?,
        league: row.get(3)?,
        home_team: row.get(4)?,
        away_team: row.get(5)?,
        game_date: row.get(6)?,
        home_score: row.get(7)?,
        away_score: row.get(8)?,
        status: GameStatus::from_db(&status),
        updated_at: row.get(10)?,
    })
}

fn map_bet(row: &rusqlite::Row) -> rusqlite::Result<Bet> {
    let bet_type: String = row.get(2)?;
    let status: String = row.get(5)?;
    Ok(Bet {
        id: row.get(0)?,
        source_row_id: row.get(1)?,
        bet_type: BetType::from_db(&bet_type),
        wager_amount: row.get(3)?,
        potential_payout: row.get(4)?,
        status: BetStatus::from_db(&status),
        placed_date: row.get(6)?,
        created_at: row.get(7)?,
        settled_at: row.get(8)?,
    })
}

fn map_leg(row: &rusqlite::Row) -> rusqlite::Result<BetLeg> {
    let outcome: Option<String> = row.get(6)?;
    Ok(BetLeg {
        id: row.get(0)?,
        bet_id: row.get(1)?,
        game_id: row.get(2)?,
        selected_team: row.get(3)?,
        line: row.get(4)?,
        odds: row.get(5)?,
        outcome: outcome.as_deref().and_then(LegOutcome::from_db),
    })
}

/// SQLite schema (idempotent CREATE IF NOT EXISTS)
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS upload_batches (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    uploaded_by     TEXT    NOT NULL,
    file_name       TEXT    NOT NULL,
    total_rows      INTEGER NOT NULL,
    column_mapping  TEXT    NOT NULL,
    normalization   TEXT    NOT NULL,
    correct_count   INTEGER NOT NULL DEFAULT 0,
    flagged_count   INTEGER NOT NULL DEFAULT 0,
    uncertain_count INTEGER NOT NULL DEFAULT 0,
    created_at      TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS upload_rows (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    batch_id          INTEGER NOT NULL,
    row_number        INTEGER NOT NULL,
    raw_fields        TEXT    NOT NULL,
    normalized        TEXT    NOT NULL,
    warnings          TEXT    NOT NULL DEFAULT '[]',
    original_value    TEXT,
    actual_value      TEXT,
    validation_status TEXT    NOT NULL DEFAULT 'PENDING',
    receipt           TEXT,
    field_confidence  TEXT    NOT NULL DEFAULT '{}',
    uncertain_reasons TEXT    NOT NULL DEFAULT '[]',
    corrected_by      TEXT,
    corrected_at      TEXT,
    correction_action TEXT,
    imported_bet_id   INTEGER,
    imported_at       TEXT,
    UNIQUE (batch_id, row_number),
    FOREIGN KEY (batch_id) REFERENCES upload_batches(id)
);

CREATE TABLE IF NOT EXISTS alias_entries (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    alias     TEXT NOT NULL UNIQUE,
    canonical TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS audit_log (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    actor       TEXT    NOT NULL,
    action      TEXT    NOT NULL,
    entity_type TEXT    NOT NULL,
    entity_id   INTEGER NOT NULL,
    batch_id    INTEGER,
    old_value   TEXT,
    new_value   TEXT,
    created_at  TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS games (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    external_ref TEXT UNIQUE,
    sport        TEXT,
    league       TEXT,
    home_team    TEXT NOT NULL,
    away_team    TEXT NOT NULL,
    game_date    TEXT NOT NULL,
    home_score   INTEGER,
    away_score   INTEGER,
    status       TEXT NOT NULL DEFAULT 'SCHEDULED',
    updated_at   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS bets (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    source_row_id    INTEGER,
    bet_type         TEXT    NOT NULL,
    wager_amount     REAL    NOT NULL,
    potential_payout REAL,
    status           TEXT    NOT NULL DEFAULT 'PENDING',
    placed_date      TEXT,
    created_at       TEXT    NOT NULL,
    settled_at       TEXT,
    FOREIGN KEY (source_row_id) REFERENCES upload_rows(id)
);

CREATE TABLE IF NOT EXISTS bet_legs (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    bet_id        INTEGER NOT NULL,
    game_id       INTEGER NOT NULL,
    selected_team TEXT    NOT NULL,
    line          REAL,
    odds          INTEGER,
    outcome       TEXT,
    FOREIGN KEY (bet_id) REFERENCES bets(id),
    FOREIGN KEY (game_id) REFERENCES games(id)
);

CREATE INDEX IF NOT EXISTS idx_rows_batch ON upload_rows(batch_id);
CREATE INDEX IF NOT EXISTS idx_rows_status ON upload_rows(batch_id, validation_status);
CREATE INDEX IF NOT EXISTS idx_audit_batch ON audit_log(batch_id, action);
CREATE INDEX IF NOT EXISTS idx_games_date ON games(game_date);
CREATE INDEX IF NOT EXISTS idx_bets_status ON bets(status);
CREATE INDEX IF NOT EXISTS idx_legs_bet ON bet_legs(bet_id);
"#;

/// Row restore instruction for rollback.
#[derive(Debug, Clone)]
pub struct RowRestore {
    pub row_id: i64,
    pub validation_status: ValidationStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stats {
    pub batches: i64,
    pub rows_total: i64,
    pub rows_flagged: i64,
    pub rows_imported: i64,
    pub games: i64,
    pub games_final: i64,
    pub bets_pending: i64,
    pub bets_settled: i64,
    pub aliases: i64,
}
