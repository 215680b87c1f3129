use clap::{
    ArgGroup,
    Parser,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use predict_client::{
    config::{
        ClientSettings,
        Overrides,
    },
    deployments::{
        self,
        DeploymentEnv,
        DeploymentStore,
    },
    wallets::PlatformCredential,
};
use std::path::PathBuf;

mod client;
mod ui;

#[derive(Debug, Parser)]
#[command(name = "predict", about = "Terminal client for the score prediction market")]
#[command(group(
    ArgGroup::new("network")
        .required(true)
        .args(["mainnet", "alfajores", "local"])
))]
struct Args {
    /// Celo mainnet
    #[arg(long)]
    mainnet: bool,
    /// Alfajores testnet
    #[arg(long)]
    alfajores: bool,
    /// Local node on port 8545
    #[arg(long)]
    local: bool,
    /// Override the RPC URL for the selected network
    #[arg(long)]
    rpc_url: Option<String>,
    /// Override the market contract address
    #[arg(long)]
    contract: Option<String>,
    /// EIP-1193 wallet endpoint used for interactive signing
    #[arg(long)]
    wallet_url: Option<String>,
    /// The wallet is embedded: always interactive, never switches chain
    #[arg(long)]
    embedded_wallet: bool,
    /// Start in wallet mode instead of platform signing
    #[arg(long)]
    interactive: bool,
    /// Keystore holding the platform key, when no private key is in the environment
    #[arg(long)]
    platform_keystore: Option<String>,
    /// Keystore directory (defaults to ~/.celo/wallets)
    #[arg(long)]
    wallet_dir: Option<String>,
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,
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

fn app_config(args: Args) -> Result<client::AppConfig> {
    let env = args.env();
    let record = DeploymentStore::new(env)
        .and_then(|store| store.load())
        .map_err(|e| eyre!(e))
        .wrap_err_with(|| format!("reading {env} deployment record"))?;
    let overrides = Overrides {
        rpc_url: args.rpc_url,
        contract_address: args.contract,
        wallet_url: args.wallet_url,
        embedded_wallet: args.embedded_wallet,
    };
    let settings = ClientSettings::from_process_env(env, &overrides, record.as_ref())?;
    let credential = PlatformCredential::locate(
        args.platform_keystore.as_deref(),
        args.wallet_dir.as_deref(),
    )
    .wrap_err("platform signing key is required")?;

    Ok(client::AppConfig {
        settings,
        credential,
        interactive: args.interactive,
    })
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();
    let _log_guard = client::init_tracing(&args.log_dir);
    tracing::info!("starting predict client");
    deployments::ensure_structure().map_err(|e| eyre!(e))?;
    let app_config = app_config(args)?;
    client::run_app(app_config).await
}
