//! Local checks that block a transaction before anything is signed.

use crate::{
    reconciler::MarketView,
    types::Match,
};
use ethers::types::U256;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PreflightError {
    #[error("Enter both scores.")]
    MissingScores,
    #[error("Score {0:?} is not a number between 0 and 255.")]
    InvalidScore(String),
    #[error("You have already predicted this match.")]
    AlreadyPredicted(U256),
    #[error("Match {0} has already kicked off.")]
    KickoffPassed(U256),
    #[error("Match {0} is not in the current market view.")]
    UnknownMatch(U256),
    #[error("Enter both team names.")]
    MissingTeams,
    #[error("Kickoff must be in the future.")]
    KickoffInPast,
    #[error("Results for match {0} were already submitted.")]
    AlreadySettled(U256),
    #[error("Match {match_id} can be settled from {ready_at}.")]
    SettlementNotReady { match_id: U256, ready_at: u64 },
    #[error("No winnings to claim.")]
    NothingToClaim,
}

pub fn parse_score(raw: &str) -> Result<u8, PreflightError> {
    raw.trim()
        .parse::<u8>()
        .map_err(|_| PreflightError::InvalidScore(raw.trim().to_string()))
}

fn parse_scores(home: &str, away: &str) -> Result<(u8, u8), PreflightError> {
    if home.trim().is_empty() || away.trim().is_empty() {
        return Err(PreflightError::MissingScores);
    }
    Ok((parse_score(home)?, parse_score(away)?))
}

/// Validates a prediction against the cached view.
pub fn check_prediction(
    view: &MarketView,
    match_id: U256,
    home: &str,
    away: &str,
    now: u64,
) -> Result<(u8, u8), PreflightError> {
    let scores = parse_scores(home, away)?;
    if view.has_prediction(&match_id) {
        return Err(PreflightError::AlreadyPredicted(match_id));
    }
    let m = view
        .find_match(&match_id)
        .ok_or(PreflightError::UnknownMatch(match_id))?;
    if m.has_kicked_off(now) {
        return Err(PreflightError::KickoffPassed(match_id));
    }
    Ok(scores)
}

pub fn check_claim(view: &MarketView) -> Result<(), PreflightError> {
    if view.winnings.is_zero() {
        return Err(PreflightError::NothingToClaim);
    }
    Ok(())
}

pub fn check_new_match(
    home_team: &str,
    away_team: &str,
    kickoff_time: u64,
    now: u64,
) -> Result<(), PreflightError> {
    if home_team.trim().is_empty() || away_team.trim().is_empty() {
        return Err(PreflightError::MissingTeams);
    }
    if kickoff_time <= now {
        return Err(PreflightError::KickoffInPast);
    }
    Ok(())
}

pub fn check_settlement(
    m: &Match,
    home: &str,
    away: &str,
    now: u64,
) -> Result<(u8, u8), PreflightError> {
    let scores = parse_scores(home, away)?;
    if m.results_submitted {
        return Err(PreflightError::AlreadySettled(m.id));
    }
    if !m.is_ready_for_settlement(now) {
        return Err(PreflightError::SettlementNotReady {
            match_id: m.id,
            ready_at: m.settlement_ready_at() + 1,
        });
    }
    Ok(scores)
}
