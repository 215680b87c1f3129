use deployments::{
    DeploymentEnv,
    DeploymentRecord,
};
use ethers::{
    types::{
        Address,
        TxHash,
        U256,
    },
    utils::{
        ParseUnits,
        parse_units,
    },
};
use serde::Serialize;

pub const ENV_CHAIN_ID: &str = "PREDICT_CHAIN_ID";
pub const ENV_RPC_URL: &str = "PREDICT_RPC_URL";
pub const ENV_BLOCK_EXPLORER: &str = "PREDICT_BLOCK_EXPLORER";
pub const ENV_CONTRACT_ADDRESS: &str = "PREDICT_CONTRACT_ADDRESS";
pub const ENV_ENTRY_FEE: &str = "PREDICT_ENTRY_FEE";
pub const ENV_WALLET_URL: &str = "PREDICT_WALLET_URL";
pub const ENV_EMBEDDED_WALLET: &str = "PREDICT_EMBEDDED_WALLET";
pub const ENV_ADMIN_ADDRESS: &str = "PREDICT_ADMIN_ADDRESS";

pub const DEFAULT_ENTRY_FEE: &str = "0.5";

/// Share of each pool the contract keeps as a platform fee.
pub const PLATFORM_FEE_PERCENT: u64 = 5;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid chain id {0:?}")]
    InvalidChainId(String),
    #[error("invalid address {value:?} for {field}")]
    InvalidAddress { field: &'static str, value: String },
    #[error("invalid entry fee {0:?}")]
    InvalidEntryFee(String),
    #[error("no contract address configured for {0}")]
    MissingContract(DeploymentEnv),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// Payload for `wallet_addEthereumChain`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddChainParams {
    pub chain_id: String,
    pub chain_name: String,
    pub native_currency: NativeCurrency,
    pub rpc_urls: Vec<String>,
    pub block_explorer_urls: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkConfig {
    pub env: DeploymentEnv,
    pub chain_id: u64,
    pub chain_name: String,
    pub rpc_url: String,
    pub explorer_url: String,
    pub currency: NativeCurrency,
}

impl NetworkConfig {
    pub fn from_preset(env: DeploymentEnv) -> Self {
        let preset = env.preset();
        Self {
            env,
            chain_id: preset.chain_id,
            chain_name: preset.chain_name.to_string(),
            rpc_url: preset.rpc_url.to_string(),
            explorer_url: preset.explorer_url.to_string(),
            currency: NativeCurrency {
                name: preset.currency_name.to_string(),
                symbol: preset.currency_symbol.to_string(),
                decimals: preset.decimals,
            },
        }
    }

    pub fn chain_id_hex(&self) -> String {
        format!("{:#x}", self.chain_id)
    }

    pub fn add_chain_params(&self) -> AddChainParams {
        AddChainParams {
            chain_id: self.chain_id_hex(),
            chain_name: self.chain_name.clone(),
            native_currency: self.currency.clone(),
            rpc_urls: vec![self.rpc_url.clone()],
            block_explorer_urls: vec![self.explorer_url.clone()],
        }
    }

    pub fn tx_url(&self, tx_hash: &TxHash) -> String {
        format!("{}/tx/{tx_hash:?}", self.explorer_url.trim_end_matches('/'))
    }

    pub fn address_url(&self, address: &Address) -> String {
        format!(
            "{}/address/{address:?}",
            self.explorer_url.trim_end_matches('/')
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MarketConfig {
    pub contract_address: Address,
    pub entry_fee: U256,
    pub platform_fee_percent: u64,
    pub admin_address: Option<Address>,
}

/// Settings resolved from flags, environment, deployment record and presets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientSettings {
    pub network: NetworkConfig,
    pub market: MarketConfig,
    pub wallet_url: Option<String>,
    pub embedded_wallet: bool,
}

/// Values given explicitly on the command line. They win over everything.
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    pub rpc_url: Option<String>,
    pub contract_address: Option<String>,
    pub wallet_url: Option<String>,
    pub embedded_wallet: bool,
}

impl ClientSettings {
    pub fn from_process_env(
        env: DeploymentEnv,
        overrides: &Overrides,
        record: Option<&DeploymentRecord>,
    ) -> Result<Self, ConfigError> {
        Self::resolve(env, overrides, record, |key| std::env::var(key).ok())
    }

    pub fn resolve(
        env: DeploymentEnv,
        overrides: &Overrides,
        record: Option<&DeploymentRecord>,
        vars: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let var = |key: &str| vars(key).filter(|value| !value.trim().is_empty());
        let mut network = NetworkConfig::from_preset(env);

        if let Some(raw) = var(ENV_CHAIN_ID) {
            network.chain_id = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidChainId(raw.clone()))?;
        }
        let record = record.filter(|record| record.is_for_chain(network.chain_id));
        if let Some(url) = overrides
            .rpc_url
            .clone()
            .or_else(|| var(ENV_RPC_URL))
            .or_else(|| record.map(|record| record.network_url.clone()))
        {
            network.rpc_url = url;
        }
        if let Some(url) = var(ENV_BLOCK_EXPLORER)
            .or_else(|| record.and_then(|record| record.explorer_url.clone()))
        {
            network.explorer_url = url;
        }

        let contract_raw = overrides
            .contract_address
            .clone()
            .or_else(|| var(ENV_CONTRACT_ADDRESS))
            .or_else(|| record.map(|record| record.contract_address.clone()))
            .or_else(|| env.preset().contract_address.map(str::to_string))
            .ok_or(ConfigError::MissingContract(env))?;
        let contract_address = parse_address("contract address", &contract_raw)?;

        let fee_raw = var(ENV_ENTRY_FEE).unwrap_or_else(|| DEFAULT_ENTRY_FEE.to_string());
        let entry_fee = parse_amount(&fee_raw, network.currency.decimals)?;

        let admin_address = var(ENV_ADMIN_ADDRESS)
            .map(|raw| parse_address("admin address", &raw))
            .transpose()?;

        let embedded_wallet = overrides.embedded_wallet
            || var(ENV_EMBEDDED_WALLET).is_some_and(|raw| is_truthy(&raw));

        Ok(Self {
            network,
            market: MarketConfig {
                contract_address,
                entry_fee,
                platform_fee_percent: PLATFORM_FEE_PERCENT,
                admin_address,
            },
            wallet_url: overrides.wallet_url.clone().or_else(|| var(ENV_WALLET_URL)),
            embedded_wallet,
        })
    }
}

pub fn parse_address(field: &'static str, raw: &str) -> Result<Address, ConfigError> {
    raw.trim()
        .parse::<Address>()
        .map_err(|_| ConfigError::InvalidAddress {
            field,
            value: raw.to_string(),
        })
}

/// Parses a decimal amount such as "0.5" into base units.
pub fn parse_amount(raw: &str, decimals: u8) -> Result<U256, ConfigError> {
    match parse_units(raw.trim(), u32::from(decimals)) {
        Ok(ParseUnits::U256(amount)) => Ok(amount),
        _ => Err(ConfigError::InvalidEntryFee(raw.to_string())),
    }
}

fn is_truthy(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
