//! Off-chain ranking rebuilt from every settled match.
//!
//! Recomputed in full on each call with no cache. Fine at current match
//! volume; larger markets would need pagination.

use crate::{
    chain::MarketReader,
    config::PLATFORM_FEE_PERCENT,
    types::{
        LeaderboardEntry,
        Match,
        Prediction,
        saturating_u64,
    },
};
use ethers::types::{
    Address,
    U256,
};
use futures::future::join_all;
use itertools::Itertools;
use std::collections::BTreeMap;
use tracing::{
    debug,
    warn,
};

/// Disclaimer shown next to any ranking computed with `fee_percent`.
pub fn estimate_caveat(fee_percent: u64) -> String {
    format!(
        "Earnings are estimates: each settled pool is replayed with a fixed {fee_percent}% platform fee split evenly among exact-score winners. The contract's actual payouts may differ."
    )
}

/// Pool left for winners once the platform fee is taken.
pub fn distributable_pool(prize_pool: U256, fee_percent: u64) -> U256 {
    let keep = 100u64.saturating_sub(fee_percent);
    prize_pool.saturating_mul(U256::from(keep)) / U256::from(100u64)
}

pub async fn compute_leaderboard<R: MarketReader>(reader: &R) -> Vec<LeaderboardEntry> {
    compute_leaderboard_with_fee(reader, PLATFORM_FEE_PERCENT).await
}

pub async fn compute_leaderboard_with_fee<R: MarketReader>(
    reader: &R,
    fee_percent: u64,
) -> Vec<LeaderboardEntry> {
    let total = match reader.match_counter().await {
        Ok(total) => saturating_u64(total),
        Err(err) => {
            warn!(%err, "match counter unavailable; leaderboard left empty");
            return Vec::new();
        }
    };

    let fetched = join_all((1..=total).map(|id| reader.get_match(U256::from(id)))).await;
    let settled: Vec<Match> = fetched
        .into_iter()
        .zip(1..=total)
        .filter_map(|(result, id)| match result {
            Ok(m) => Some(m),
            Err(err) => {
                debug!(%err, id, "dropping unreadable match from leaderboard");
                None
            }
        })
        .filter(|m| m.results_submitted)
        .collect();

    let with_predictions = join_all(settled.into_iter().map(|m| async move {
        match reader.match_predictions(m.id).await {
            Ok(predictions) => Some((m, predictions)),
            Err(err) => {
                warn!(%err, match_id = %m.id, "dropping match with unreadable predictions");
                None
            }
        }
    }))
    .await;

    tally(with_predictions.into_iter().flatten(), fee_percent)
}

/// Aggregates settled matches into ranked entries.
pub fn tally(
    settled: impl IntoIterator<Item = (Match, Vec<Prediction>)>,
    fee_percent: u64,
) -> Vec<LeaderboardEntry> {
    let mut stats: BTreeMap<Address, LeaderboardEntry> = BTreeMap::new();

    for (m, predictions) in settled {
        let Some((home, away)) = m.final_score() else {
            continue;
        };
        let winners = predictions
            .iter()
            .filter(|p| p.guesses(home, away))
            .count();
        let share = if winners == 0 {
            U256::zero()
        } else {
            distributable_pool(m.prize_pool, fee_percent) / U256::from(winners)
        };

        for prediction in &predictions {
            let entry = stats
                .entry(prediction.predictor)
                .or_insert_with(|| LeaderboardEntry::new(prediction.predictor));
            entry.predictions += 1;
            if prediction.guesses(home, away) {
                entry.wins += 1;
                entry.estimated_winnings = entry.estimated_winnings.saturating_add(share);
            }
        }
    }

    // Stable sort over address order keeps full ties deterministic.
    stats
        .into_values()
        .sorted_by(LeaderboardEntry::rank_cmp)
        .collect()
}

pub fn position_of(entries: &[LeaderboardEntry], address: &Address) -> Option<usize> {
    entries
        .iter()
        .position(|entry| entry.address == *address)
        .map(|idx| idx + 1)
}
