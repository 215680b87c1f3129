//! Local cache of market state, rebuilt from the chain on demand and on a timer.

use crate::{
    chain::{
        ChainError,
        MarketReader,
    },
    types::{
        Match,
        PredictionEntry,
    },
};
use ethers::types::{
    Address,
    U256,
};
use futures::future::join_all;
use std::{
    collections::HashMap,
    sync::Arc,
    time::Duration,
};
use tokio::{
    sync::{
        mpsc,
        watch,
    },
    task::JoinHandle,
    time::{
        self,
        MissedTickBehavior,
    },
};
use tracing::{
    debug,
    info,
    warn,
};

pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MarketView {
    /// Active matches, soonest kickoff first.
    pub matches: Vec<Match>,
    /// The caller's predictions, newest first.
    pub predictions: Vec<PredictionEntry>,
    pub winnings: U256,
    pub contract_balance: U256,
    pub account: Option<Address>,
    pub account_balance: U256,
}

impl MarketView {
    pub fn has_prediction(&self, match_id: &U256) -> bool {
        self.predictions.iter().any(|entry| entry.match_id == *match_id)
    }

    pub fn find_match(&self, match_id: &U256) -> Option<&Match> {
        self.matches
            .iter()
            .find(|m| m.id == *match_id)
            .or_else(|| {
                self.predictions
                    .iter()
                    .map(|entry| &entry.match_data)
                    .find(|m| m.id == *match_id)
            })
    }

    pub fn perfect_wins(&self) -> usize {
        self.predictions
            .iter()
            .filter(|entry| entry.is_perfect())
            .count()
    }
}

#[derive(Clone)]
pub struct DataReconciler<R> {
    reader: R,
    state: Arc<watch::Sender<MarketView>>,
}

impl<R: MarketReader> DataReconciler<R> {
    pub fn new(reader: R) -> Self {
        let (state, _) = watch::channel(MarketView::default());
        Self {
            reader,
            state: Arc::new(state),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<MarketView> {
        self.state.subscribe()
    }

    pub fn view(&self) -> MarketView {
        self.state.borrow().clone()
    }

    /// Rebuilds the view for `account`. Each step fails on its own and keeps
    /// the last known value for its part of the view.
    pub async fn refresh(&self, account: Option<Address>) -> MarketView {
        let mut next = self.view();
        if next.account != account {
            next.predictions.clear();
            next.winnings = U256::zero();
            next.account_balance = U256::zero();
            next.account = account;
        }

        match self.reader.active_matches().await {
            Ok(mut matches) => {
                matches.sort_by_key(|m| m.kickoff_time);
                next.matches = matches;
            }
            Err(err) => warn!(%err, "failed to refresh active matches"),
        }

        match self.reader.balance_of(self.reader.contract_address()).await {
            Ok(balance) => next.contract_balance = balance,
            Err(err) => warn!(%err, "failed to refresh contract balance"),
        }

        if let Some(account) = account {
            match self.load_predictions(account, &next.matches).await {
                Ok(entries) => next.predictions = entries,
                Err(err) => warn!(%err, ?account, "failed to refresh predictions"),
            }
            match self.reader.user_winnings(account).await {
                Ok(winnings) => next.winnings = winnings,
                Err(err) => warn!(%err, ?account, "failed to refresh winnings"),
            }
            match self.reader.balance_of(account).await {
                Ok(balance) => next.account_balance = balance,
                Err(err) => warn!(%err, ?account, "failed to refresh account balance"),
            }
        }

        self.state.send_replace(next.clone());
        next
    }

    async fn load_predictions(
        &self,
        account: Address,
        active: &[Match],
    ) -> Result<Vec<PredictionEntry>, ChainError> {
        let (ids, predictions) = self.reader.user_predictions(account).await?;
        if ids.len() != predictions.len() {
            warn!(
                ids = ids.len(),
                predictions = predictions.len(),
                "prediction arrays differ in length"
            );
        }
        let active: HashMap<U256, &Match> = active.iter().map(|m| (m.id, m)).collect();

        let lookups = ids.into_iter().zip(predictions).map(|(match_id, prediction)| {
            let known = active.get(&match_id).map(|m| (*m).clone());
            async move {
                let match_data = match known {
                    Some(m) => m,
                    None => match self.reader.get_match(match_id).await {
                        Ok(m) => m,
                        Err(err) => {
                            warn!(%err, %match_id, "skipping prediction on unreadable match");
                            return None;
                        }
                    },
                };
                Some(PredictionEntry {
                    match_id,
                    prediction,
                    match_data,
                })
            }
        });

        let mut entries: Vec<PredictionEntry> =
            join_all(lookups).await.into_iter().flatten().collect();
        entries.sort_by(|a, b| b.prediction.timestamp.cmp(&a.prediction.timestamp));
        Ok(entries)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconcilerCommand {
    RefreshNow,
    Shutdown,
}

/// Asks the polling worker for an out-of-cycle refresh.
#[derive(Clone, Debug)]
pub struct RefreshHandle {
    tx: mpsc::UnboundedSender<ReconcilerCommand>,
}

impl RefreshHandle {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ReconcilerCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn request_refresh(&self) {
        if self.tx.send(ReconcilerCommand::RefreshNow).is_err() {
            debug!("refresh requested with no polling worker running");
        }
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(ReconcilerCommand::Shutdown);
    }
}

/// Aborts the polling worker when dropped.
pub struct PollingGuard {
    handle: JoinHandle<()>,
}

impl PollingGuard {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for PollingGuard {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Refreshes once up front, on every command, on every identity change, and
/// on `interval` while an identity is known.
pub fn spawn_polling<R: MarketReader>(
    reconciler: DataReconciler<R>,
    identity: watch::Receiver<Option<Address>>,
    commands: mpsc::UnboundedReceiver<ReconcilerCommand>,
    interval: Duration,
) -> PollingGuard {
    let handle = tokio::spawn(polling_worker(reconciler, identity, commands, interval));
    PollingGuard { handle }
}

async fn polling_worker<R: MarketReader>(
    reconciler: DataReconciler<R>,
    mut identity: watch::Receiver<Option<Address>>,
    mut commands: mpsc::UnboundedReceiver<ReconcilerCommand>,
    interval: Duration,
) {
    let mut account = *identity.borrow_and_update();
    reconciler.refresh(account).await;

    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.reset();

    loop {
        tokio::select! {
            _ = ticker.tick(), if account.is_some() => {
                reconciler.refresh(account).await;
            }
            command = commands.recv() => match command {
                Some(ReconcilerCommand::RefreshNow) => {
                    reconciler.refresh(account).await;
                }
                Some(ReconcilerCommand::Shutdown) | None => break,
            },
            changed = identity.changed() => {
                if changed.is_err() {
                    break;
                }
                account = *identity.borrow_and_update();
                info!(?account, "identity changed");
                if account.is_some() {
                    ticker.reset();
                }
                reconciler.refresh(account).await;
            }
        }
    }

    info!("reconciler polling stopped");
}

#[cfg(test)]
mod tests;
