use chrono::{
    DateTime,
    Utc,
};
use ethers::types::{
    Address,
    U256,
};
use std::cmp::Ordering;

/// Decimal places shown for currency amounts.
pub const DISPLAY_PRECISION: u32 = 2;

/// Seconds after kickoff before a result may be submitted.
pub const SETTLEMENT_BUFFER_SECS: u64 = 15;

const RELATIVE_LABEL_WINDOW_SECS: u64 = 24 * 60 * 60;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum View {
    #[default]
    Home,
    MyBets,
    Wallet,
    Leaderboard,
}

impl View {
    pub const ALL: [View; 4] = [View::Home, View::MyBets, View::Wallet, View::Leaderboard];

    pub fn title(self) -> &'static str {
        match self {
            View::Home => "Matches",
            View::MyBets => "My Bets",
            View::Wallet => "Wallet",
            View::Leaderboard => "Leaderboard",
        }
    }

    pub fn next(self) -> View {
        let idx = View::ALL.iter().position(|v| *v == self).unwrap_or(0);
        View::ALL[(idx + 1) % View::ALL.len()]
    }

    pub fn previous(self) -> View {
        let idx = View::ALL.iter().position(|v| *v == self).unwrap_or(0);
        View::ALL[(idx + View::ALL.len() - 1) % View::ALL.len()]
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Match {
    pub id: U256,
    pub home_team: String,
    pub away_team: String,
    pub kickoff_time: u64,
    pub prize_pool: U256,
    pub results_submitted: bool,
    pub final_home_score: u8,
    pub final_away_score: u8,
    pub prizes_distributed: bool,
}

impl Match {
    /// Final score, only once results have been submitted.
    pub fn final_score(&self) -> Option<(u8, u8)> {
        self.results_submitted
            .then_some((self.final_home_score, self.final_away_score))
    }

    pub fn has_kicked_off(&self, now: u64) -> bool {
        now >= self.kickoff_time
    }

    pub fn settlement_ready_at(&self) -> u64 {
        self.kickoff_time.saturating_add(SETTLEMENT_BUFFER_SECS)
    }

    pub fn is_ready_for_settlement(&self, now: u64) -> bool {
        !self.results_submitted && now > self.settlement_ready_at()
    }

    pub fn status(&self, predicted: bool, now: u64) -> MatchStatus {
        if self.results_submitted {
            MatchStatus::Settled
        } else if predicted {
            MatchStatus::Predicted
        } else if self.has_kicked_off(now) {
            MatchStatus::Missed
        } else {
            MatchStatus::Open
        }
    }

    pub fn fixture(&self) -> String {
        format!("{} vs {}", self.home_team, self.away_team)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MatchStatus {
    Open,
    Predicted,
    Missed,
    Settled,
}

impl MatchStatus {
    pub fn label(self) -> &'static str {
        match self {
            MatchStatus::Open => "OPEN",
            MatchStatus::Predicted => "PREDICTED",
            MatchStatus::Missed => "CLOSED",
            MatchStatus::Settled => "SETTLED",
        }
    }
}

/// Orders matches for the list view: open soonest first, then predicted
/// soonest first, then missed most recent first, then settled.
pub fn sort_for_display(
    matches: &[Match],
    is_predicted: impl Fn(&U256) -> bool,
    now: u64,
) -> Vec<(MatchStatus, Match)> {
    let mut classified: Vec<(MatchStatus, Match)> = matches
        .iter()
        .map(|m| (m.status(is_predicted(&m.id), now), m.clone()))
        .collect();
    classified.sort_by(|(sa, a), (sb, b)| {
        sa.cmp(sb).then_with(|| match sa {
            MatchStatus::Missed | MatchStatus::Settled => {
                b.kickoff_time.cmp(&a.kickoff_time)
            }
            _ => a.kickoff_time.cmp(&b.kickoff_time),
        })
    });
    classified
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Prediction {
    pub predictor: Address,
    pub home_score: u8,
    pub away_score: u8,
    pub amount: U256,
    pub timestamp: u64,
}

impl Prediction {
    pub fn guesses(&self, home: u8, away: u8) -> bool {
        self.home_score == home && self.away_score == away
    }
}

/// A caller's prediction joined with the match it was placed on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PredictionEntry {
    pub match_id: U256,
    pub prediction: Prediction,
    pub match_data: Match,
}

impl PredictionEntry {
    pub fn is_perfect(&self) -> bool {
        self.match_data
            .final_score()
            .is_some_and(|(home, away)| self.prediction.guesses(home, away))
    }

    pub fn outcome_label(&self) -> &'static str {
        match self.match_data.final_score() {
            None => "PENDING",
            Some(_) if self.is_perfect() => "WON",
            Some(_) => "LOST",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeaderboardEntry {
    pub address: Address,
    pub wins: u32,
    pub predictions: u32,
    pub estimated_winnings: U256,
}

impl LeaderboardEntry {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            wins: 0,
            predictions: 0,
            estimated_winnings: U256::zero(),
        }
    }

    /// Ranking order: wins desc, then estimated earnings desc.
    pub fn rank_cmp(&self, other: &Self) -> Ordering {
        other
            .wins
            .cmp(&self.wins)
            .then_with(|| other.estimated_winnings.cmp(&self.estimated_winnings))
    }
}

/// Clamps a contract integer to `u64`.
pub fn saturating_u64(value: U256) -> u64 {
    if value.bits() > 64 {
        u64::MAX
    } else {
        value.low_u64()
    }
}

/// Formats a base-unit amount as a decimal with two places, rounding half up.
pub fn format_currency(amount: U256, decimals: u8) -> String {
    let unit = U256::exp10(decimals as usize);
    let scale = U256::exp10(DISPLAY_PRECISION as usize);
    let scaled = amount
        .saturating_mul(scale)
        .saturating_add(unit / 2)
        / unit;
    let whole = scaled / scale;
    let fraction = (scaled % scale).low_u64();
    format!("{whole}.{fraction:0width$}", width = DISPLAY_PRECISION as usize)
}

pub fn short_address(address: &Address) -> String {
    let full = format!("{address:?}");
    if full.len() <= 12 {
        return full;
    }
    format!("{}...{}", &full[..6], &full[full.len() - 4..])
}

/// "Starts in 3h 20m" within a day of kickoff, else an absolute UTC label.
pub fn kickoff_label(kickoff: u64, now: u64) -> String {
    if kickoff > now && kickoff - now < RELATIVE_LABEL_WINDOW_SECS {
        let remaining = kickoff - now;
        let hours = remaining / 3600;
        let minutes = (remaining % 3600) / 60;
        return if hours > 0 {
            format!("Starts in {hours}h {minutes}m")
        } else {
            format!("Starts in {minutes}m")
        };
    }
    match i64::try_from(kickoff)
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
    {
        Some(time) => time.format("%b %d, %H:%M").to_string(),
        None => format!("@{kickoff}"),
    }
}

pub fn unix_now() -> u64 {
    u64::try_from(Utc::now().timestamp()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;
    use ethers::utils::parse_ether;
    use proptest::prelude::*;

    fn fixture(id: u64, kickoff: u64) -> Match {
        Match {
            id: U256::from(id),
            home_team: format!("Home {id}"),
            away_team: format!("Away {id}"),
            kickoff_time: kickoff,
            ..Match::default()
        }
    }

    #[test]
    fn format_currency__half_unit_entry_fee__shows_two_decimals() {
        // given
        let fee = parse_ether("0.5").unwrap();

        // when
        let shown = format_currency(fee, 18);

        // then
        assert_eq!(shown, "0.50");
    }

    #[test]
    fn format_currency__third_decimal_five__rounds_up() {
        assert_eq!(format_currency(parse_ether("1.005").unwrap(), 18), "1.01");
        assert_eq!(format_currency(parse_ether("1.004").unwrap(), 18), "1.00");
        assert_eq!(format_currency(U256::zero(), 18), "0.00");
        assert_eq!(format_currency(parse_ether("1234.95").unwrap(), 18), "1234.95");
    }

    #[test]
    fn kickoff_label__within_a_day__is_relative() {
        // given
        let now = 1_700_000_000;

        // then
        assert_eq!(kickoff_label(now + 3 * 3600 + 20 * 60, now), "Starts in 3h 20m");
        assert_eq!(kickoff_label(now + 45 * 60, now), "Starts in 45m");
    }

    #[test]
    fn kickoff_label__past_or_far_future__is_absolute() {
        // 2023-11-14 22:13:20 UTC
        let kickoff = 1_700_000_000;

        assert_eq!(kickoff_label(kickoff, kickoff + 10), "Nov 14, 22:13");
        assert_eq!(kickoff_label(kickoff, kickoff - 2 * 86_400), "Nov 14, 22:13");
    }

    #[test]
    fn status__at_kickoff__is_never_open() {
        // given
        let m = fixture(1, 100);

        // then
        assert_eq!(m.status(false, 99), MatchStatus::Open);
        assert_eq!(m.status(false, 100), MatchStatus::Missed);
        assert_eq!(m.status(true, 100), MatchStatus::Predicted);
    }

    #[test]
    fn sort_for_display__mixed_statuses__open_then_predicted_then_missed() {
        // given
        let matches = vec![
            fixture(1, 50),
            fixture(2, 300),
            fixture(3, 200),
            fixture(4, 400),
            fixture(5, 80),
        ];
        let predicted = U256::from(4);

        // when
        let sorted = sort_for_display(&matches, |id| *id == predicted, 100);

        // then
        let ids: Vec<u64> = sorted.iter().map(|(_, m)| m.id.low_u64()).collect();
        assert_eq!(ids, vec![3, 2, 4, 5, 1]);
        assert_eq!(sorted[2].0, MatchStatus::Predicted);
        assert_eq!(sorted[3].0, MatchStatus::Missed);
    }

    #[test]
    fn is_ready_for_settlement__inside_buffer__is_false() {
        let m = fixture(1, 1_000);

        assert!(!m.is_ready_for_settlement(1_000 + SETTLEMENT_BUFFER_SECS));
        assert!(m.is_ready_for_settlement(1_000 + SETTLEMENT_BUFFER_SECS + 1));
    }

    #[test]
    fn is_perfect__exact_score_on_settled_match__is_true() {
        // given
        let mut m = fixture(1, 10);
        m.results_submitted = true;
        m.final_home_score = 2;
        m.final_away_score = 1;
        let entry = |home, away| PredictionEntry {
            match_id: m.id,
            prediction: Prediction {
                home_score: home,
                away_score: away,
                ..Prediction::default()
            },
            match_data: m.clone(),
        };

        // then
        assert!(entry(2, 1).is_perfect());
        assert!(!entry(1, 2).is_perfect());
        assert_eq!(entry(1, 2).outcome_label(), "LOST");
    }

    #[test]
    fn short_address__full_address__keeps_prefix_and_suffix() {
        let address: Address = "0x3B4e4108d4e1099d334cE8800aab1a58be249319".parse().unwrap();

        assert_eq!(short_address(&address), "0x3b4e...9319");
    }

    proptest! {
        #[test]
        fn format_currency__any_amount__has_exactly_two_decimals(wei in any::<u128>()) {
            let shown = format_currency(U256::from(wei), 18);
            let (_, fraction) = shown.split_once('.').unwrap();
            prop_assert_eq!(fraction.len(), 2);
        }
    }
}
