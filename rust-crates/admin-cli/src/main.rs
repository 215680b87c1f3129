use anyhow::{
    Context,
    Result,
    anyhow,
    bail,
};
use chrono::DateTime;
use clap::{
    ArgGroup,
    Parser,
    Subcommand,
};
use deployments::{
    DeploymentEnv,
    DeploymentStore,
};
use ethers::types::U256;
use predict_client::{
    config::{
        ClientSettings,
        Overrides,
        parse_address,
    },
    leaderboard::estimate_caveat,
    orchestrator::{
        Outcome,
        TxOrchestrator,
    },
    reconciler::RefreshHandle,
    rpc::{
        LiveController,
        live_controller,
    },
    types::{
        format_currency,
        kickoff_label,
        short_address,
        unix_now,
    },
    wallets::PlatformCredential,
};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    name = "predict-admin",
    about = "Owner utilities for the prediction market (create, settle, withdraw)",
    version,
    group(
        ArgGroup::new("network")
            .args(["mainnet", "alfajores", "local"])
            .required(true)
    )
)]
struct Args {
    #[arg(long)]
    mainnet: bool,

    #[arg(long)]
    alfajores: bool,

    #[arg(long)]
    local: bool,

    /// Override RPC URL
    #[arg(long)]
    rpc_url: Option<String>,

    /// Override the market contract address
    #[arg(long)]
    contract: Option<String>,

    /// Keystore holding the platform key, when no private key is in the environment
    #[arg(long)]
    platform_keystore: Option<String>,

    /// Override keystore directory (defaults to ~/.celo/wallets)
    #[arg(long)]
    wallet_dir: Option<String>,

    #[arg(short, long, default_value = "false")]
    tracing: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Open a new match for predictions
    #[command(group(ArgGroup::new("when").args(["kickoff", "in_minutes"]).required(true)))]
    CreateMatch {
        #[arg(long)]
        home: String,
        #[arg(long)]
        away: String,
        /// Kickoff as RFC 3339, e.g. 2026-06-11T19:00:00Z
        #[arg(long)]
        kickoff: Option<String>,
        /// Kickoff this many minutes from now
        #[arg(long)]
        in_minutes: Option<u64>,
    },
    /// Record the final score of a match
    SubmitResult {
        #[arg(long)]
        match_id: u64,
        #[arg(long)]
        home: String,
        #[arg(long)]
        away: String,
    },
    /// Withdraw accumulated platform fees to the owner
    WithdrawFees,
    /// Check that the platform key owns the contract
    Owner,
    /// Platform and contract balances
    Balance,
    /// Matches waiting for a result
    Pending,
    /// Global ranking over settled matches
    Leaderboard {
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
    /// Record an already-deployed market contract for this network
    Register {
        #[arg(long)]
        address: String,
        #[arg(long)]
        block: Option<u64>,
        #[arg(long)]
        owner: Option<String>,
    },
}

impl Args {
    fn env(&self) -> DeploymentEnv {
        if self.mainnet {
            DeploymentEnv::Mainnet
        } else if self.alfajores {
            DeploymentEnv::Alfajores
        } else {
            DeploymentEnv::Local
        }
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

/// Unix kickoff from either an absolute timestamp or an offset from `now`.
fn resolve_kickoff(kickoff: Option<&str>, in_minutes: Option<u64>, now: u64) -> Result<u64> {
    match (kickoff, in_minutes) {
        (Some(raw), _) => {
            let parsed = DateTime::parse_from_rfc3339(raw.trim())
                .with_context(|| format!("parsing kickoff {raw:?} as RFC 3339"))?;
            u64::try_from(parsed.timestamp())
                .map_err(|_| anyhow!("kickoff {raw:?} is before 1970"))
        }
        (None, Some(minutes)) => Ok(now.saturating_add(minutes.saturating_mul(60))),
        (None, None) => bail!("either --kickoff or --in-minutes is required"),
    }
}

fn report(controller: &LiveController, outcome: Outcome) -> Result<()> {
    match outcome {
        Outcome::Confirmed { receipt, .. } => {
            let block = receipt
                .block_number
                .map(|block| block.to_string())
                .unwrap_or_else(|| "?".to_string());
            println!("Confirmed in block {block}");
            println!("  {}", controller.network().tx_url(&receipt.tx_hash));
            Ok(())
        }
        Outcome::Failed { message } | Outcome::Rejected { message } => bail!(message),
        Outcome::Busy => bail!("another transaction is still pending"),
    }
}

fn register(env: DeploymentEnv, rpc_url: &str, address: &str, block: Option<u64>, owner: Option<&str>) -> Result<()> {
    parse_address("contract address", address)?;
    if let Some(owner) = owner {
        parse_address("owner address", owner)?;
    }
    let store = DeploymentStore::new(env).context("opening deployment store")?;
    let record = deployments::record_deployment(&store, env, address, rpc_url, block, owner)
        .context("recording deployment")?;
    println!(
        "Registered {} on chain {} in {}",
        record.contract_address,
        record.chain_id,
        store.path().display()
    );
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    if args.tracing {
        init_tracing();
    }
    deployments::ensure_structure().context("initializing deployment directories")?;

    let env = args.env();
    let store = DeploymentStore::new(env).context("opening deployment store")?;
    let record = store.load().context("reading deployment record")?;
    let overrides = Overrides {
        rpc_url: args.rpc_url.clone(),
        contract_address: args.contract.clone(),
        ..Overrides::default()
    };

    if let Command::Register {
        address,
        block,
        owner,
    } = &args.command
    {
        let rpc_url = overrides
            .rpc_url
            .clone()
            .unwrap_or_else(|| env.preset().rpc_url.to_string());
        return register(env, &rpc_url, address, *block, owner.as_deref());
    }

    let mut settings = ClientSettings::from_process_env(env, &overrides, record.as_ref())
        .context("resolving network settings")?;
    // Admin actions never go through an interactive wallet.
    settings.wallet_url = None;
    settings.embedded_wallet = false;

    let wallet = PlatformCredential::locate(
        args.platform_keystore.as_deref(),
        args.wallet_dir.as_deref(),
    )
    .context("platform signing key is required for admin actions")?
    .unlock(settings.network.chain_id)
    .context("unlocking platform key")?;

    let (refresh, _commands) = RefreshHandle::channel();
    let orchestrator = TxOrchestrator::new(refresh).with_display_delay(Duration::ZERO);
    let controller = live_controller(&settings, wallet, false, orchestrator)
        .context("connecting to the market contract")?;
    let platform = controller.connect().await;
    println!(
        "{} | contract {} | signer {}",
        settings.network.chain_name,
        short_address(&settings.market.contract_address),
        short_address(&platform.address)
    );

    let decimals = settings.network.currency.decimals;
    let symbol = &settings.network.currency.symbol;
    let amount = |value: U256| format!("{} {symbol}", format_currency(value, decimals));

    match args.command {
        Command::Register { .. } => Ok(()),
        Command::CreateMatch {
            home,
            away,
            kickoff,
            in_minutes,
        } => {
            let kickoff = resolve_kickoff(kickoff.as_deref(), in_minutes, unix_now())?;
            warn_if_not_owner(&controller).await;
            let outcome = controller.create_match(&home, &away, kickoff).await;
            report(&controller, outcome)
        }
        Command::SubmitResult {
            match_id,
            home,
            away,
        } => {
            warn_if_not_owner(&controller).await;
            let outcome = controller
                .submit_result(U256::from(match_id), &home, &away)
                .await;
            report(&controller, outcome)
        }
        Command::WithdrawFees => {
            warn_if_not_owner(&controller).await;
            let outcome = controller.withdraw_platform_fees().await;
            report(&controller, outcome)
        }
        Command::Owner => {
            let status = controller
                .owner_status()
                .await
                .context("reading contract owner")?;
            println!("Contract owner: {:?}", status.owner);
            if status.platform_is_owner {
                println!("Platform key owns the contract");
            } else {
                println!("WARNING: platform key is not the contract owner");
            }
            match status.admin_is_owner {
                Some(true) => println!("Configured admin address matches the owner"),
                Some(false) => println!("WARNING: configured admin address is not the contract owner"),
                None => {}
            }
            println!(
                "  {}",
                controller
                    .network()
                    .address_url(&settings.market.contract_address)
            );
            Ok(())
        }
        Command::Balance => {
            let view = controller.reconciler().refresh(Some(platform.address)).await;
            println!("  Signer balance:   {}", amount(view.account_balance));
            println!("  Contract balance: {}", amount(view.contract_balance));
            println!("  Signer winnings:  {}", amount(view.winnings));
            Ok(())
        }
        Command::Pending => {
            let view = controller.reconciler().refresh(None).await;
            let now = unix_now();
            let pending: Vec<_> = view
                .matches
                .iter()
                .filter(|m| m.has_kicked_off(now))
                .collect();
            if pending.is_empty() {
                println!("No matches waiting for a result");
            }
            for m in pending {
                let state = if m.is_ready_for_settlement(now) {
                    "ready"
                } else {
                    "settling soon"
                };
                println!(
                    "  #{} {} ({}) pool {} [{state}]",
                    m.id,
                    m.fixture(),
                    kickoff_label(m.kickoff_time, now),
                    amount(m.prize_pool)
                );
            }
            Ok(())
        }
        Command::Leaderboard { top } => {
            let entries = controller.leaderboard().await;
            if entries.is_empty() {
                println!("No settled matches yet");
            }
            for (rank, entry) in entries.iter().take(top).enumerate() {
                println!(
                    "  {:>3}. {} wins {:>3} / {:>3}  est. {}",
                    rank + 1,
                    short_address(&entry.address),
                    entry.wins,
                    entry.predictions,
                    amount(entry.estimated_winnings)
                );
            }
            println!("{}", estimate_caveat(settings.market.platform_fee_percent));
            Ok(())
        }
    }
}

async fn warn_if_not_owner(controller: &LiveController) {
    match controller.check_owner().await {
        Ok(true) => {}
        Ok(false) => eprintln!("WARNING: platform key is not the contract owner; the call will likely revert"),
        Err(err) => tracing::warn!(%err, "could not read contract owner"),
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;

    #[test]
    fn resolve_kickoff__rfc3339__parses_to_unix_seconds() {
        assert_eq!(
            resolve_kickoff(Some("2026-06-11T19:00:00Z"), None, 0).unwrap(),
            1_781_204_400
        );
    }

    #[test]
    fn resolve_kickoff__offset__counts_from_now() {
        assert_eq!(resolve_kickoff(None, Some(90), 1_000).unwrap(), 6_400);
    }

    #[test]
    fn resolve_kickoff__garbage__is_an_error() {
        assert!(resolve_kickoff(Some("tomorrow"), None, 0).is_err());
        assert!(resolve_kickoff(None, None, 0).is_err());
    }

    #[test]
    fn args__create_match_without_kickoff__is_rejected() {
        let parsed = Args::try_parse_from([
            "predict-admin",
            "--alfajores",
            "create-match",
            "--home",
            "Ghana",
            "--away",
            "Togo",
        ]);

        assert!(parsed.is_err());
    }

    #[test]
    fn args__submit_result__parses_scores_as_text() {
        let args = Args::try_parse_from([
            "predict-admin",
            "--local",
            "submit-result",
            "--match-id",
            "3",
            "--home",
            "2",
            "--away",
            "0",
        ])
        .unwrap();

        assert_eq!(args.env(), DeploymentEnv::Local);
        assert!(matches!(
            args.command,
            Command::SubmitResult { match_id: 3, .. }
        ));
    }
}
