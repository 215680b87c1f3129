#![allow(non_snake_case)]

use super::*;
use crate::{
    test_helpers::{
        FakeMarket,
        FakeRead,
        address,
    },
    types::Prediction,
};

fn fixture(id: u64, kickoff: u64) -> Match {
    Match {
        id: U256::from(id),
        home_team: format!("Home {id}"),
        away_team: format!("Away {id}"),
        kickoff_time: kickoff,
        ..Match::default()
    }
}

fn prediction(predictor: Address, home: u8, away: u8, timestamp: u64) -> Prediction {
    Prediction {
        predictor,
        home_score: home,
        away_score: away,
        amount: U256::from(50),
        timestamp,
    }
}

/// Matches 1 and 3 active, match 2 settled; the caller predicted all three.
fn seeded_market(caller: Address) -> FakeMarket {
    let market = FakeMarket::default();
    market.add_match(fixture(1, 500));
    market.add_match(fixture(2, 100));
    market.add_match(fixture(3, 300));
    market.update_match(2, |m| {
        m.results_submitted = true;
        m.final_home_score = 1;
        m.final_away_score = 0;
    });
    market.add_prediction(1, prediction(caller, 1, 1, 10));
    market.add_prediction(2, prediction(caller, 1, 0, 30));
    market.add_prediction(3, prediction(caller, 3, 3, 20));
    market.add_prediction(3, prediction(address(99), 0, 0, 25));
    market.set_winnings(caller, U256::from(95));
    market.set_balance(market.contract_address(), U256::from(1_000));
    market.set_balance(caller, U256::from(7));
    market
}

fn ids(matches: impl IntoIterator<Item = U256>) -> Vec<u64> {
    matches.into_iter().map(|id| id.low_u64()).collect()
}

#[tokio::test]
async fn refresh__active_matches__sorted_by_ascending_kickoff() {
    // given
    let market = seeded_market(address(5));
    let reconciler = DataReconciler::new(market);

    // when
    let view = reconciler.refresh(None).await;

    // then
    assert_eq!(ids(view.matches.iter().map(|m| m.id)), vec![3, 1]);
    assert_eq!(view.contract_balance, U256::from(1_000));
    assert!(view.predictions.is_empty());
}

#[tokio::test]
async fn refresh__known_caller__joins_predictions_by_index_newest_first() {
    // given
    let caller = address(5);
    let reconciler = DataReconciler::new(seeded_market(caller));

    // when
    let view = reconciler.refresh(Some(caller)).await;

    // then
    assert_eq!(ids(view.predictions.iter().map(|e| e.match_id)), vec![2, 3, 1]);
    for entry in &view.predictions {
        assert_eq!(entry.match_data.id, entry.match_id);
    }
    assert_eq!(view.predictions[1].prediction.home_score, 3);
    assert!(view.predictions[0].match_data.results_submitted);
    assert_eq!(view.perfect_wins(), 1);
    assert_eq!(view.winnings, U256::from(95));
    assert_eq!(view.account_balance, U256::from(7));
    assert!(view.has_prediction(&U256::from(3)));
}

#[tokio::test]
async fn refresh__historical_match_unreadable__skips_only_that_entry() {
    // given
    let caller = address(5);
    let market = seeded_market(caller);
    market.fail(FakeRead::Match(2));
    let reconciler = DataReconciler::new(market);

    // when
    let view = reconciler.refresh(Some(caller)).await;

    // then
    assert_eq!(ids(view.predictions.iter().map(|e| e.match_id)), vec![3, 1]);
    assert_eq!(view.winnings, U256::from(95));
}

#[tokio::test]
async fn refresh__one_step_fails__other_steps_still_update() {
    // given
    let caller = address(5);
    let market = seeded_market(caller);
    let reconciler = DataReconciler::new(market.clone());
    let before = reconciler.refresh(Some(caller)).await;
    market.fail(FakeRead::Active);
    market.set_winnings(caller, U256::from(190));

    // when
    let after = reconciler.refresh(Some(caller)).await;

    // then
    assert_eq!(after.matches, before.matches);
    assert_eq!(after.winnings, U256::from(190));
    assert_eq!(after.predictions.len(), 3);
}

#[tokio::test]
async fn refresh__twice_without_chain_changes__yields_identical_view() {
    // given
    let caller = address(5);
    let reconciler = DataReconciler::new(seeded_market(caller));

    // when
    let first = reconciler.refresh(Some(caller)).await;
    let second = reconciler.refresh(Some(caller)).await;

    // then
    assert_eq!(first, second);
    assert_eq!(reconciler.view(), second);
}

#[tokio::test]
async fn refresh__account_switch_with_failing_reads__drops_previous_account_data() {
    // given
    let caller = address(5);
    let market = seeded_market(caller);
    let reconciler = DataReconciler::new(market.clone());
    reconciler.refresh(Some(caller)).await;
    market.fail(FakeRead::UserPredictions);
    market.fail(FakeRead::Winnings);

    // when
    let view = reconciler.refresh(Some(address(6))).await;

    // then
    assert_eq!(view.account, Some(address(6)));
    assert!(view.predictions.is_empty());
    assert_eq!(view.winnings, U256::zero());
}

#[tokio::test(start_paused = true)]
async fn spawn_polling__identity_lost__stops_polling_and_ends_with_sender() {
    // given
    let caller = address(5);
    let market = seeded_market(caller);
    let reconciler = DataReconciler::new(market.clone());
    let mut view = reconciler.subscribe();
    let (identity_tx, identity_rx) = watch::channel(Some(caller));
    let (_refresh, commands) = RefreshHandle::channel();
    let guard = spawn_polling(reconciler.clone(), identity_rx, commands, POLL_INTERVAL);
    view.changed().await.unwrap();
    let after_mount = market.reads();

    // when
    time::sleep(POLL_INTERVAL + Duration::from_millis(1)).await;
    let after_tick = market.reads();
    identity_tx.send_replace(None);
    time::sleep(Duration::from_millis(1)).await;
    let after_logout = market.reads();
    time::sleep(POLL_INTERVAL * 6).await;
    let idle = market.reads();
    drop(identity_tx);
    time::sleep(Duration::from_millis(1)).await;

    // then
    assert!(after_tick > after_mount);
    assert!(after_logout > after_tick);
    assert_eq!(idle, after_logout);
    assert!(guard.is_finished());
}

#[tokio::test(start_paused = true)]
async fn spawn_polling__refresh_and_shutdown_commands__are_honoured() {
    // given
    let market = seeded_market(address(5));
    let reconciler = DataReconciler::new(market.clone());
    let (_identity_tx, identity_rx) = watch::channel::<Option<Address>>(None);
    let (refresh, commands) = RefreshHandle::channel();
    let guard = spawn_polling(reconciler.clone(), identity_rx, commands, POLL_INTERVAL);
    time::sleep(Duration::from_millis(1)).await;
    let after_mount = market.reads();

    // when
    refresh.request_refresh();
    time::sleep(Duration::from_millis(1)).await;
    let after_request = market.reads();
    refresh.shutdown();
    time::sleep(Duration::from_millis(1)).await;

    // then
    assert!(after_request > after_mount);
    assert!(guard.is_finished());
}
