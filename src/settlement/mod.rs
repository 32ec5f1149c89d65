//! Bet settlement: grading legs against final scores and sweeping
//! pending bets once their games finish.

use anyhow::Context;
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::db::models::{BetStatus, BetType, GameStatus, LegOutcome};
use crate::db::Database;
use crate::error::PipelineError;

/// Grades one leg from the selected side's perspective.
///
/// With a line the selected score is adjusted before comparing, so a
/// +7 underdog covers a 17-20 loss. Without one it is a straight
/// moneyline comparison where a tie is a push.
pub fn leg_outcome(selected_score: i32, opponent_score: i32, line: Option<f64>) -> LegOutcome {
    match line {
        Some(line) => {
            let adjusted = f64::from(selected_score) + line;
            let opponent = f64::from(opponent_score);
            if adjusted > opponent {
                LegOutcome::Won
            } else if adjusted < opponent {
                LegOutcome::Lost
            } else {
                LegOutcome::Push
            }
        }
        None => match selected_score.cmp(&opponent_score) {
            std::cmp::Ordering::Greater => LegOutcome::Won,
            std::cmp::Ordering::Less => LegOutcome::Lost,
            std::cmp::Ordering::Equal => LegOutcome::Push,
        },
    }
}

/// Collapses leg outcomes into the bet's final status. A parlay loses
/// on any lost leg, wins only when every leg wins, and pushes
/// otherwise. A single-leg bet takes its leg's outcome directly.
pub fn aggregate_outcome(bet_type: BetType, outcomes: &[LegOutcome]) -> BetStatus {
    if bet_type == BetType::Parlay {
        if outcomes.contains(&LegOutcome::Lost) {
            return BetStatus::Lost;
        }
        if outcomes.iter().all(|o| *o == LegOutcome::Won) {
            return BetStatus::Won;
        }
        return BetStatus::Push;
    }
    match outcomes.first() {
        Some(LegOutcome::Won) => BetStatus::Won,
        Some(LegOutcome::Lost) => BetStatus::Lost,
        _ => BetStatus::Push,
    }
}

/// Settles one bet by grading every leg against its game's final
/// score, writing all leg outcomes and the bet status in one
/// transaction. A bet settles exactly once: calling this on an
/// already settled bet returns its status unchanged. Any leg whose
/// game is not FINAL with both scores makes the whole bet `NotReady`.
pub fn settle_bet(db: &Database, bet_id: i64) -> Result<BetStatus, PipelineError> {
    let bet = db
        .get_bet(bet_id)?
        .ok_or_else(|| PipelineError::ValidationInput(format!("bet {bet_id} not found")))?;
    if bet.status != BetStatus::Pending {
        return Ok(bet.status);
    }

    let legs = db.list_legs(bet_id)?;
    if legs.is_empty() {
        return Err(PipelineError::Internal(anyhow::anyhow!(
            "bet {bet_id} has no legs"
        )));
    }

    let mut graded = Vec::with_capacity(legs.len());
    let mut outcomes = Vec::with_capacity(legs.len());
    for leg in &legs {
        let game = db
            .get_game(leg.game_id)?
            .with_context(|| format!("bet {bet_id} references missing game {}", leg.game_id))?;
        if game.status != GameStatus::Final {
            return Err(PipelineError::NotReady {
                bet_id,
                reason: format!("game {} is {}", leg.game_id, game.status.as_str()),
            });
        }
        let (home_score, away_score) = match (game.home_score, game.away_score) {
            (Some(home), Some(away)) => (home, away),
            _ => {
                return Err(PipelineError::NotReady {
                    bet_id,
                    reason: format!("game {} has no final score", leg.game_id),
                })
            }
        };
        let (selected, opponent) = if leg.selected_team.eq_ignore_ascii_case(&game.home_team) {
            (home_score, away_score)
        } else if leg.selected_team.eq_ignore_ascii_case(&game.away_team) {
            (away_score, home_score)
        } else {
            return Err(PipelineError::Internal(anyhow::anyhow!(
                "leg selection '{}' matches neither side of game {}",
                leg.selected_team,
                leg.game_id
            )));
        };
        let outcome = leg_outcome(selected, opponent, leg.line);
        let leg_id = leg.id.context("bet leg loaded without id")?;
        graded.push((leg_id, outcome));
        outcomes.push(outcome);
    }

    let status = aggregate_outcome(bet.bet_type, &outcomes);
    db.record_settlement(bet_id, &graded, status, Utc::now())?;
    info!("Settled bet {bet_id}: {}", status.as_str());
    Ok(status)
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct SweepReport {
    pub examined: i64,
    pub settled: i64,
    pub not_ready: i64,
    pub failed: i64,
}

/// Sweeps all pending bets and settles the ones whose games have gone
/// final. A failure on one bet is counted and logged, never fatal to
/// the rest of the sweep.
pub fn settle_ready_bets(db: &Database) -> Result<SweepReport, PipelineError> {
    let mut report = SweepReport::default();
    for bet in db.list_pending_bets()? {
        report.examined += 1;
        let Some(bet_id) = bet.id else { continue };
        match settle_bet(db, bet_id) {
            Ok(_) => report.settled += 1,
            Err(PipelineError::NotReady { .. }) => report.not_ready += 1,
            Err(err) => {
                report.failed += 1;
                warn!("Failed to settle bet {bet_id}: {err}");
            }
        }
    }
    if report.settled > 0 {
        info!(
            "Settlement sweep: {} of {} pending bets settled",
            report.settled, report.examined
        );
    }
    Ok(report)
}
