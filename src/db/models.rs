use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Canonical wager-record fields the column detector maps spreadsheet
/// headers onto. Order doubles as detector priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CanonicalField {
    Date,
    HomeTeam,
    AwayTeam,
    Outcome,
    WagerAmount,
    Sport,
    BetType,
    Selection,
    Line,
    Odds,
    Payout,
}

impl CanonicalField {
    pub const ALL: [CanonicalField; 11] = [
        CanonicalField::Date,
        CanonicalField::HomeTeam,
        CanonicalField::AwayTeam,
        CanonicalField::Outcome,
        CanonicalField::WagerAmount,
        CanonicalField::Sport,
        CanonicalField::BetType,
        CanonicalField::Selection,
        CanonicalField::Line,
        CanonicalField::Odds,
        CanonicalField::Payout,
    ];

    /// Fields a row cannot be validated without.
    pub fn is_required(self) -> bool {
        matches!(
            self,
            CanonicalField::Date
                | CanonicalField::HomeTeam
                | CanonicalField::AwayTeam
                | CanonicalField::Outcome
                | CanonicalField::WagerAmount
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            CanonicalField::Date => "date",
            CanonicalField::HomeTeam => "homeTeam",
            CanonicalField::AwayTeam => "awayTeam",
            CanonicalField::Outcome => "outcome",
            CanonicalField::WagerAmount => "wagerAmount",
            CanonicalField::Sport => "sport",
            CanonicalField::BetType => "betType",
            CanonicalField::Selection => "selection",
            CanonicalField::Line => "line",
            CanonicalField::Odds => "odds",
            CanonicalField::Payout => "payout",
        }
    }
}

/// One detected header assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnChoice {
    pub source_column: String,
    pub confidence: f64,
}

/// Column detector output, stored immutably with the batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnMap {
    pub assignments: BTreeMap<CanonicalField, ColumnChoice>,
    /// Headers no field claimed.
    pub unmapped_columns: Vec<String>,
    /// Headers that were contested or near-tied between fields.
    pub ambiguous_columns: Vec<String>,
    /// Required fields with no usable header.
    pub missing_required: Vec<CanonicalField>,
    pub overall_confidence: f64,
}

impl ColumnMap {
    pub fn source_for(&self, field: CanonicalField) -> Option<&str> {
        self.assignments
            .get(&field)
            .map(|choice| choice.source_column.as_str())
    }
}

/// Typed wager record produced by the normalizer. Unparseable or absent
/// fields stay `None` and surface as warnings instead.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRow {
    pub game_date: Option<NaiveDate>,
    pub sport: Option<String>,
    pub home_team: Option<String>,
    pub away_team: Option<String>,
    pub bet_type: Option<BetType>,
    pub selection: Option<String>,
    pub line: Option<f64>,
    pub odds: Option<i32>,
    /// Outcome as claimed by the spreadsheet.
    pub outcome: Option<LegOutcome>,
    pub wager_amount: Option<f64>,
    pub payout: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarningSeverity {
    /// Suspicious but usable.
    Warning,
    /// Field unusable; the row cannot fully validate.
    Error,
}

/// One normalization finding attached to a row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowWarning {
    pub field: CanonicalField,
    pub message: String,
    pub severity: WarningSeverity,
}

/// Aggregate normalization stats stored with the batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizationSummary {
    pub rows_total: i64,
    pub rows_with_warnings: i64,
    pub warnings_total: i64,
    /// Canonical field name → rows where the field normalized to a value.
    pub field_coverage: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Fail,
    Warning,
}

/// Result of one validation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassResult {
    pub verdict: Verdict,
    pub detail: Option<String>,
}

impl PassResult {
    pub fn pass() -> Self {
        PassResult {
            verdict: Verdict::Pass,
            detail: None,
        }
    }

    pub fn fail(detail: impl Into<String>) -> Self {
        PassResult {
            verdict: Verdict::Fail,
            detail: Some(detail.into()),
        }
    }

    pub fn warning(detail: impl Into<String>) -> Self {
        PassResult {
            verdict: Verdict::Warning,
            detail: Some(detail.into()),
        }
    }
}

/// Fixed-shape receipt: one slot per validation pass, so a skipped pass is
/// unrepresentable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReceipt {
    pub game_matching: PassResult,
    pub outcome_validation: PassResult,
    pub financial_validation: PassResult,
    pub cross_row_validation: PassResult,
}

impl ValidationReceipt {
    pub fn passes(&self) -> [(&'static str, &PassResult); 4] {
        [
            ("game_matching", &self.game_matching),
            ("outcome_validation", &self.outcome_validation),
            ("financial_validation", &self.financial_validation),
            ("cross_row_validation", &self.cross_row_validation),
        ]
    }

    /// FLAGGED if any pass failed, UNCERTAIN if any warned, CORRECT
    /// otherwise. CORRECTED is never derived here; only the correction
    /// workflow assigns it.
    pub fn derive_status(&self) -> ValidationStatus {
        let passes = self.passes();
        if passes.iter().any(|(_, p)| p.verdict == Verdict::Fail) {
            ValidationStatus::Flagged
        } else if passes.iter().any(|(_, p)| p.verdict == Verdict::Warning) {
            ValidationStatus::Uncertain
        } else {
            ValidationStatus::Correct
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationStatus {
    /// Uploaded but not yet validated.
    Pending,
    Correct,
    Flagged,
    Uncertain,
    /// Human-reviewed; eligible for import alongside CORRECT.
    Corrected,
}

impl ValidationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ValidationStatus::Pending => "PENDING",
            ValidationStatus::Correct => "CORRECT",
            ValidationStatus::Flagged => "FLAGGED",
            ValidationStatus::Uncertain => "UNCERTAIN",
            ValidationStatus::Corrected => "CORRECTED",
        }
    }

    pub fn parse(s: &str) -> Option<ValidationStatus> {
        match s.to_uppercase().as_str() {
            "PENDING" => Some(ValidationStatus::Pending),
            "CORRECT" => Some(ValidationStatus::Correct),
            "FLAGGED" => Some(ValidationStatus::Flagged),
            "UNCERTAIN" => Some(ValidationStatus::Uncertain),
            "CORRECTED" => Some(ValidationStatus::Corrected),
            _ => None,
        }
    }

    pub fn from_db(s: &str) -> ValidationStatus {
        Self::parse(s).unwrap_or(ValidationStatus::Pending)
    }
}

/// Game-derived truth for a row, filled in by validation when a game
/// matches. `selected_team` is the canonical name of the side the row
/// wagered on, oriented against the matched game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActualValue {
    pub game_id: i64,
    pub home_team: String,
    pub away_team: String,
    pub home_score: Option<i32>,
    pub away_score: Option<i32>,
    pub game_status: GameStatus,
    pub selected_team: Option<String>,
    /// What the final score implies for the selected side, when final.
    pub implied_outcome: Option<LegOutcome>,
}

/// One data row of an uploaded spreadsheet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadRow {
    pub id: Option<i64>,
    pub batch_id: i64,
    /// 1-based position among the file's data rows.
    pub row_number: i64,
    /// Raw header → cell text, exactly as uploaded.
    pub raw_fields: HashMap<String, String>,
    /// Working record; corrections mutate this.
    pub normalized: NormalizedRow,
    pub warnings: Vec<RowWarning>,
    /// Snapshot of `normalized` taken at upload, before any correction.
    pub original_value: Option<serde_json::Value>,
    pub actual_value: Option<ActualValue>,
    pub validation_status: ValidationStatus,
    pub receipt: Option<ValidationReceipt>,
    /// Canonical field name → confidence in [0, 1].
    pub field_confidence: BTreeMap<String, f64>,
    pub uncertain_reasons: Vec<String>,
    pub corrected_by: Option<String>,
    pub corrected_at: Option<DateTime<Utc>>,
    pub correction_action: Option<String>,
    pub imported_bet_id: Option<i64>,
    pub imported_at: Option<DateTime<Utc>>,
}

/// One uploaded spreadsheet submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadBatch {
    pub id: Option<i64>,
    pub uploaded_by: String,
    pub file_name: String,
    pub total_rows: i64,
    pub column_mapping: ColumnMap,
    pub normalization: NormalizationSummary,
    /// CORRECT plus CORRECTED rows.
    pub correct_count: i64,
    pub flagged_count: i64,
    pub uncertain_count: i64,
    pub created_at: DateTime<Utc>,
}

/// Team alias → canonical name mapping row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AliasEntry {
    pub id: Option<i64>,
    pub alias: String,
    pub canonical: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    RowCorrected,
    RowImported,
    ImportRolledBack,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::RowCorrected => "row_corrected",
            AuditAction::RowImported => "row_imported",
            AuditAction::ImportRolledBack => "import_rolled_back",
        }
    }

    pub fn from_db(s: &str) -> Option<AuditAction> {
        match s {
            "row_corrected" => Some(AuditAction::RowCorrected),
            "row_imported" => Some(AuditAction::RowImported),
            "import_rolled_back" => Some(AuditAction::ImportRolledBack),
            _ => None,
        }
    }
}

/// Append-only record of one administrator decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Option<i64>,
    pub actor: String,
    pub action: AuditAction,
    pub entity_type: String,
    pub entity_id: i64,
    pub batch_id: Option<i64>,
    pub old_value: Option<serde_json::Value>,
    pub new_value: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameStatus {
    Scheduled,
    InProgress,
    Final,
}

impl GameStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            GameStatus::Scheduled => "SCHEDULED",
            GameStatus::InProgress => "IN_PROGRESS",
            GameStatus::Final => "FINAL",
        }
    }

    pub fn from_db(s: &str) -> GameStatus {
        match s {
            "FINAL" => GameStatus::Final,
            "IN_PROGRESS" => GameStatus::InProgress,
            _ => GameStatus::Scheduled,
        }
    }
}

/// A game in the catalog, keyed by the score feed's external reference
/// when it came from sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Game {
    pub id: Option<i64>,
    pub external_ref: Option<String>,
    pub sport: Option<String>,
    pub league: Option<String>,
    pub home_team: String,
    pub away_team: String,
    pub game_date: NaiveDate,
    pub home_score: Option<i32>,
    pub away_score: Option<i32>,
    pub status: GameStatus,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BetType {
    MoneyLine,
    PointSpread,
    Parlay,
}

impl BetType {
    pub fn as_str(self) -> &'static str {
        match self {
            BetType::MoneyLine => "MONEY_LINE",
            BetType::PointSpread => "POINT_SPREAD",
            BetType::Parlay => "PARLAY",
        }
    }

    pub fn from_db(s: &str) -> BetType {
        match s {
            "POINT_SPREAD" => BetType::PointSpread,
            "PARLAY" => BetType::Parlay,
            _ => BetType::MoneyLine,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BetStatus {
    Pending,
    Won,
    Lost,
    Push,
}

impl BetStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BetStatus::Pending => "PENDING",
            BetStatus::Won => "WON",
            BetStatus::Lost => "LOST",
            BetStatus::Push => "PUSH",
        }
    }

    pub fn from_db(s: &str) -> BetStatus {
        match s {
            "WON" => BetStatus::Won,
            "LOST" => BetStatus::Lost,
            "PUSH" => BetStatus::Push,
            _ => BetStatus::Pending,
        }
    }
}

/// Outcome of a single wager or leg, claimed or settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LegOutcome {
    Won,
    Lost,
    Push,
}

impl LegOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            LegOutcome::Won => "WON",
            LegOutcome::Lost => "LOST",
            LegOutcome::Push => "PUSH",
        }
    }

    pub fn from_db(s: &str) -> Option<LegOutcome> {
        match s {
            "WON" => Some(LegOutcome::Won),
            "LOST" => Some(LegOutcome::Lost),
            "PUSH" => Some(LegOutcome::Push),
            _ => None,
        }
    }
}

/// Canonical ledger record created by import.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bet {
    pub id: Option<i64>,
    /// Upload row this bet was imported from.
    pub source_row_id: Option<i64>,
    pub bet_type: BetType,
    pub wager_amount: f64,
    pub potential_payout: Option<f64>,
    pub status: BetStatus,
    pub placed_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

/// One leg of a bet, linked to the game it rides on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetLeg {
    pub id: Option<i64>,
    pub bet_id: i64,
    pub game_id: i64,
    pub selected_team: String,
    pub line: Option<f64>,
    pub odds: Option<i32>,
    pub outcome: Option<LegOutcome>,
}

/// Game snapshot as fetched from the score feed, before canonicalization.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreUpdate {
    pub external_ref: String,
    pub sport: Option<String>,
    pub league: Option<String>,
    pub home_team: String,
    pub away_team: String,
    pub game_date: NaiveDate,
    pub home_score: Option<i32>,
    pub away_score: Option<i32>,
    pub status: GameStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn receipt(
        game: Verdict,
        outcome: Verdict,
        financial: Verdict,
        cross: Verdict,
    ) -> ValidationReceipt {
        let slot = |v: Verdict| PassResult {
            verdict: v,
            detail: None,
        };
        ValidationReceipt {
            game_matching: slot(game),
            outcome_validation: slot(outcome),
            financial_validation: slot(financial),
            cross_row_validation: slot(cross),
        }
    }

    #[test]
    fn test_all_passes_derive_correct() {
        let r = receipt(Verdict::Pass, Verdict::Pass, Verdict::Pass, Verdict::Pass);
        assert_eq!(r.derive_status(), ValidationStatus::Correct);
    }

    #[test]
    fn test_single_fail_derives_flagged() {
        let r = receipt(Verdict::Pass, Verdict::Fail, Verdict::Pass, Verdict::Pass);
        assert_eq!(r.derive_status(), ValidationStatus::Flagged);
    }

    #[test]
    fn test_single_warning_derives_uncertain() {
        let r = receipt(Verdict::Pass, Verdict::Warning, Verdict::Pass, Verdict::Pass);
        assert_eq!(r.derive_status(), ValidationStatus::Uncertain);
    }

    #[test]
    fn test_fail_outranks_warning() {
        let r = receipt(Verdict::Warning, Verdict::Fail, Verdict::Pass, Verdict::Pass);
        assert_eq!(r.derive_status(), ValidationStatus::Flagged);
    }

    #[test]
    fn test_status_round_trips_through_db_strings() {
        for status in [
            ValidationStatus::Pending,
            ValidationStatus::Correct,
            ValidationStatus::Flagged,
            ValidationStatus::Uncertain,
            ValidationStatus::Corrected,
        ] {
            assert_eq!(ValidationStatus::from_db(status.as_str()), status);
        }
    }

    #[test]
    fn test_canonical_field_serializes_camel_case() {
        let json = serde_json::to_string(&CanonicalField::WagerAmount).unwrap();
        assert_eq!(json, "\"wagerAmount\"");
        assert_eq!(CanonicalField::WagerAmount.name(), "wagerAmount");
    }

    #[test]
    fn test_column_map_source_lookup() {
        let mut map = ColumnMap::default();
        map.assignments.insert(
            CanonicalField::WagerAmount,
            ColumnChoice {
                source_column: "Stake".into(),
                confidence: 0.92,
            },
        );
        assert_eq!(map.source_for(CanonicalField::WagerAmount), Some("Stake"));
        assert_eq!(map.source_for(CanonicalField::Payout), None);
    }
}
