use crate::ui;
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use ethers::types::{
    Address,
    U256,
};
use predict_client::{
    config::ClientSettings,
    controller::Connection,
    orchestrator::{
        Outcome,
        TxLifecycle,
        TxOrchestrator,
    },
    reconciler::{
        MarketView,
        POLL_INTERVAL,
        RefreshHandle,
        spawn_polling,
    },
    rpc::{
        LiveController,
        live_controller,
    },
    types::{
        LeaderboardEntry,
        View,
        unix_now,
    },
    wallets::PlatformCredential,
};
use std::{
    path::Path,
    sync::Arc,
};
use tokio::sync::mpsc;
use tracing::{
    error,
    info,
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const LOG_FILE_PREFIX: &str = "predict.log";

pub struct AppConfig {
    pub settings: ClientSettings,
    pub credential: PlatformCredential,
    pub interactive: bool,
}

/// Everything the terminal needs for one frame.
#[derive(Clone, Debug, Default)]
pub struct AppSnapshot {
    pub market: MarketView,
    pub lifecycle: TxLifecycle,
    pub leaderboard: Option<Vec<LeaderboardEntry>>,
    pub connection: Option<Connection>,
    pub wallet_available: bool,
    pub interactive_forced: bool,
    pub network_name: String,
    pub currency_symbol: String,
    pub decimals: u8,
    pub entry_fee: U256,
    pub admin_address: Option<Address>,
    pub platform_fee_percent: u64,
    pub last_tx_url: Option<String>,
    pub now: u64,
}

impl AppSnapshot {
    fn new(controller: &LiveController) -> Self {
        let network = controller.network();
        AppSnapshot {
            wallet_available: controller.wallet_available(),
            interactive_forced: controller.interactive_forced(),
            network_name: network.chain_name.clone(),
            currency_symbol: network.currency.symbol.clone(),
            decimals: network.currency.decimals,
            entry_fee: controller.market().entry_fee,
            admin_address: controller.market().admin_address,
            platform_fee_percent: controller.market().platform_fee_percent,
            now: unix_now(),
            ..AppSnapshot::default()
        }
    }
}

enum WorkerEvent {
    Connected(Connection),
    Finished(Outcome),
    Leaderboard(Vec<LeaderboardEntry>),
}

/// Logs go to a daily rolling file so they never draw over the terminal UI.
pub fn init_tracing(log_dir: &Path) -> WorkerGuard {
    let appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(writer)
        .try_init();
    guard
}

pub async fn run_app(config: AppConfig) -> Result<()> {
    let AppConfig {
        settings,
        credential,
        interactive,
    } = config;
    let platform_wallet = credential
        .unlock(settings.network.chain_id)
        .wrap_err("platform credential could not be unlocked")?;

    let (refresh, commands) = RefreshHandle::channel();
    let orchestrator = TxOrchestrator::new(refresh.clone());
    let controller = live_controller(&settings, platform_wallet, interactive, orchestrator)
        .map_err(|e| eyre!(e))?;
    let controller = Arc::new(controller);

    let connection = controller.connect().await;
    let _polling = spawn_polling(
        controller.reconciler().clone(),
        controller.subscribe_identity(),
        commands,
        POLL_INTERVAL,
    );

    let mut ui_state = ui::UiState::default();
    let mut input_events = ui::input_event_stream();

    info!("starting UI");
    ui::terminal_enter(&mut ui_state)?;
    let res = run_loop(controller, connection, refresh, &mut ui_state, &mut input_events).await;
    ui::terminal_exit()?;
    res
}

fn spawn_leaderboard(controller: &Arc<LiveController>, events: &mpsc::UnboundedSender<WorkerEvent>) {
    let controller = controller.clone();
    let events = events.clone();
    tokio::spawn(async move {
        let entries = controller.leaderboard().await;
        let _ = events.send(WorkerEvent::Leaderboard(entries));
    });
}

async fn run_loop(
    controller: Arc<LiveController>,
    connection: Connection,
    refresh: RefreshHandle,
    ui_state: &mut ui::UiState,
    input_events: &mut ui::InputEventReceiver,
) -> Result<()> {
    let mut market_rx = controller.reconciler().subscribe();
    let mut lifecycle_rx = controller.orchestrator().subscribe();
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();

    let mut snapshot = AppSnapshot::new(&controller);
    snapshot.connection = Some(connection);
    snapshot.market = market_rx.borrow_and_update().clone();
    ui::draw(ui_state, &snapshot).wrap_err("initial draw failed")?;

    loop {
        tokio::select! {
            changed = market_rx.changed() => {
                if changed.is_err() {
                    error!("market view channel closed");
                    break;
                }
                snapshot.market = market_rx.borrow_and_update().clone();
                snapshot.now = unix_now();
                ui::draw(ui_state, &snapshot).wrap_err("draw after market refresh failed")?;
            }
            changed = lifecycle_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                snapshot.lifecycle = lifecycle_rx.borrow_and_update().clone();
                if let TxLifecycle::Success { tx_hash, .. } = &snapshot.lifecycle {
                    snapshot.last_tx_url = Some(controller.network().tx_url(tx_hash));
                }
                ui::draw(ui_state, &snapshot).wrap_err("draw after status change failed")?;
            }
            Some(event) = events_rx.recv() => {
                match event {
                    WorkerEvent::Connected(connection) => {
                        snapshot.connection = Some(connection);
                    }
                    WorkerEvent::Finished(outcome) => {
                        if let Outcome::Confirmed { navigate: Some(view), .. } = outcome {
                            ui_state.show(view);
                        }
                        if ui_state.view() == View::Leaderboard {
                            spawn_leaderboard(&controller, &events_tx);
                        }
                    }
                    WorkerEvent::Leaderboard(entries) => {
                        snapshot.leaderboard = Some(entries);
                    }
                }
                ui::draw(ui_state, &snapshot).wrap_err("draw after worker event failed")?;
            }
            _ = tokio::signal::ctrl_c() => {
                break;
            }
            raw_ev = ui::next_raw_event(input_events) => {
                let event = raw_ev?;
                let Some(ev) = ui::interpret_event(ui_state, event) else {
                    continue;
                };
                match ev {
                    ui::UserEvent::Quit => break,
                    ui::UserEvent::Redraw => {}
                    ui::UserEvent::SwitchView(view) => {
                        if view == View::Leaderboard {
                            spawn_leaderboard(&controller, &events_tx);
                        }
                    }
                    ui::UserEvent::Refresh => {
                        refresh.request_refresh();
                        if ui_state.view() == View::Leaderboard {
                            snapshot.leaderboard = None;
                            spawn_leaderboard(&controller, &events_tx);
                        }
                    }
                    ui::UserEvent::Dismiss => {
                        controller.orchestrator().dismiss();
                    }
                    ui::UserEvent::ToggleWallet => {
                        let controller = controller.clone();
                        let events = events_tx.clone();
                        tokio::spawn(async move {
                            let connection = controller.toggle_wallet_mode().await;
                            let _ = events.send(WorkerEvent::Connected(connection));
                        });
                    }
                    ui::UserEvent::SubmitPrediction { match_id, home, away } => {
                        let controller = controller.clone();
                        let events = events_tx.clone();
                        tokio::spawn(async move {
                            let outcome = controller.place_prediction(match_id, &home, &away).await;
                            let _ = events.send(WorkerEvent::Finished(outcome));
                        });
                    }
                    ui::UserEvent::Claim => {
                        let controller = controller.clone();
                        let events = events_tx.clone();
                        tokio::spawn(async move {
                            let outcome = controller.claim_winnings().await;
                            let _ = events.send(WorkerEvent::Finished(outcome));
                        });
                    }
                }
                snapshot.now = unix_now();
                ui::draw(ui_state, &snapshot).wrap_err("draw after input failed")?;
            }
        }
    }

    refresh.shutdown();
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;
    use tempdir::TempDir;

    #[test]
    fn init_tracing__log_dir__creates_rolling_file() {
        // given
        let dir = TempDir::new("predict-logs").unwrap();

        // when
        let guard = init_tracing(dir.path());
        info!("hello");
        drop(guard);

        // then
        let written = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .any(|entry| entry.file_name().to_string_lossy().starts_with(LOG_FILE_PREFIX));
        assert!(written);
    }
}
