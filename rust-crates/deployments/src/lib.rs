use anyhow::{
    Context,
    Result,
    anyhow,
};
use chrono::Utc;
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    fmt,
    fs,
    io::Write,
    path::{
        Path,
        PathBuf,
    },
};

pub const DEPLOYMENTS_ROOT: &str = ".deployments";
const DEPLOYMENTS_FILE: &str = "deployments.json";

/// Address of the market contract shipped with the public mainnet build.
pub const MAINNET_CONTRACT_ADDRESS: &str = "0x3B4e4108d4e1099d334cE8800aab1a58be249319";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DeploymentEnv {
    Mainnet,
    Alfajores,
    Local,
}

impl DeploymentEnv {
    pub const ALL: [DeploymentEnv; 3] = [
        DeploymentEnv::Mainnet,
        DeploymentEnv::Alfajores,
        DeploymentEnv::Local,
    ];

    pub fn dir_name(self) -> &'static str {
        match self {
            DeploymentEnv::Mainnet => "mainnet",
            DeploymentEnv::Alfajores => "alfajores",
            DeploymentEnv::Local => "local",
        }
    }

    pub fn preset(self) -> NetworkPreset {
        match self {
            DeploymentEnv::Mainnet => NetworkPreset {
                chain_id: 42220,
                chain_name: "Celo Mainnet",
                rpc_url: "https://forno.celo.org",
                explorer_url: "https://celoscan.io",
                currency_name: "CELO",
                currency_symbol: "CELO",
                decimals: 18,
                contract_address: Some(MAINNET_CONTRACT_ADDRESS),
            },
            DeploymentEnv::Alfajores => NetworkPreset {
                chain_id: 44787,
                chain_name: "Celo Alfajores Testnet",
                rpc_url: "https://alfajores-forno.celo-testnet.org",
                explorer_url: "https://alfajores.celoscan.io",
                currency_name: "CELO",
                currency_symbol: "CELO",
                decimals: 18,
                contract_address: None,
            },
            DeploymentEnv::Local => NetworkPreset {
                chain_id: 31337,
                chain_name: "Local Devnet",
                rpc_url: "http://localhost:8545",
                explorer_url: "http://localhost:8545",
                currency_name: "CELO",
                currency_symbol: "CELO",
                decimals: 18,
                contract_address: None,
            },
        }
    }
}

impl fmt::Display for DeploymentEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeploymentEnv::Mainnet => "Mainnet",
            DeploymentEnv::Alfajores => "Alfajores",
            DeploymentEnv::Local => "Local",
        };
        write!(f, "{name}")
    }
}

/// Fallback network parameters used when no record or override is present.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct NetworkPreset {
    pub chain_id: u64,
    pub chain_name: &'static str,
    pub rpc_url: &'static str,
    pub explorer_url: &'static str,
    pub currency_name: &'static str,
    pub currency_symbol: &'static str,
    pub decimals: u8,
    pub contract_address: Option<&'static str>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub deployed_at: String,
    pub contract_address: String,
    pub network_url: String,
    pub chain_id: u64,
    #[serde(default)]
    pub explorer_url: Option<String>,
    #[serde(default)]
    pub deployment_block: Option<u64>,
    #[serde(default)]
    pub owner: Option<String>,
}

impl DeploymentRecord {
    pub fn is_for_chain(&self, chain_id: u64) -> bool {
        self.chain_id == chain_id
    }
}

#[derive(Debug)]
pub struct DeploymentStore {
    path: PathBuf,
}

impl DeploymentStore {
    pub fn new(env: DeploymentEnv) -> Result<Self> {
        Self::at(DEPLOYMENTS_ROOT, env)
    }

    /// Opens the store for `env` under an arbitrary root directory.
    pub fn at(root: impl AsRef<Path>, env: DeploymentEnv) -> Result<Self> {
        let path = ensure_store(root.as_ref(), env)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<DeploymentRecord>> {
        read_record(&self.path)
    }

    pub fn save(&self, record: DeploymentRecord) -> Result<()> {
        write_record(&self.path, &record)
    }
}

pub fn ensure_structure() -> Result<()> {
    for env in DeploymentEnv::ALL {
        let _ = ensure_store(Path::new(DEPLOYMENTS_ROOT), env)?;
    }
    Ok(())
}

fn ensure_store(root: &Path, env: DeploymentEnv) -> Result<PathBuf> {
    if !root.exists() {
        fs::create_dir_all(root).with_context(|| {
            format!("Failed to create deployments directory {}", root.display())
        })?;
    }

    let env_dir = root.join(env.dir_name());
    if !env_dir.exists() {
        fs::create_dir_all(&env_dir).with_context(|| {
            format!("Failed to create {}/{} directory", root.display(), env.dir_name())
        })?;
    }

    let file_path = env_dir.join(DEPLOYMENTS_FILE);
    if !file_path.exists() {
        let mut file = fs::File::create(&file_path).with_context(|| {
            format!(
                "Failed to create deployment record file for {} at {:?}",
                env, file_path
            )
        })?;
        file.write_all(b"").with_context(|| {
            format!("Failed to initialize deployment record file for {}", env)
        })?;
    }

    Ok(file_path)
}

fn read_record(path: impl AsRef<Path>) -> Result<Option<DeploymentRecord>> {
    let data = fs::read(path.as_ref()).context("Failed to read deployment records")?;
    if data.is_empty() || data.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    if let Ok(record) = serde_json::from_slice::<DeploymentRecord>(&data) {
        return Ok(Some(record));
    }
    if let Ok(mut records) = serde_json::from_slice::<Vec<DeploymentRecord>>(&data) {
        return Ok(records.pop());
    }
    Err(anyhow!(
        "Failed to parse deployment record JSON; expected a single deployment object"
    ))
}

fn write_record(path: impl AsRef<Path>, record: &DeploymentRecord) -> Result<()> {
    let json = serde_json::to_vec_pretty(record)
        .context("Failed to serialize deployment record")?;
    fs::write(path.as_ref(), json).context("Failed to write deployment record")?;
    Ok(())
}

/// Records an existing market contract for `env`, replacing any previous record.
pub fn record_deployment(
    store: &DeploymentStore,
    env: DeploymentEnv,
    contract_address: impl AsRef<str>,
    network_url: impl AsRef<str>,
    deployment_block: Option<u64>,
    owner: Option<impl AsRef<str>>,
) -> Result<DeploymentRecord> {
    let preset = env.preset();
    let record = DeploymentRecord {
        deployed_at: Utc::now().to_rfc3339(),
        contract_address: contract_address.as_ref().to_string(),
        network_url: network_url.as_ref().to_string(),
        chain_id: preset.chain_id,
        explorer_url: Some(preset.explorer_url.to_string()),
        deployment_block,
        owner: owner.map(|owner| owner.as_ref().to_string()),
    };
    store.save(record.clone())?;
    Ok(record)
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;
    use tempdir::TempDir;

    #[test]
    fn load__fresh_store__returns_none() {
        // given
        let dir = TempDir::new("deployments").unwrap();
        let store = DeploymentStore::at(dir.path(), DeploymentEnv::Alfajores).unwrap();

        // when
        let record = store.load().unwrap();

        // then
        assert!(record.is_none());
        assert!(store.path().ends_with("alfajores/deployments.json"));
    }

    #[test]
    fn record_deployment__saved_record__is_loaded_back_with_preset_chain() {
        // given
        let dir = TempDir::new("deployments").unwrap();
        let store = DeploymentStore::at(dir.path(), DeploymentEnv::Mainnet).unwrap();

        // when
        let saved = record_deployment(
            &store,
            DeploymentEnv::Mainnet,
            MAINNET_CONTRACT_ADDRESS,
            "https://forno.celo.org",
            Some(12),
            None::<&str>,
        )
        .unwrap();

        // then
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded, saved);
        assert!(loaded.is_for_chain(42220));
        assert_eq!(loaded.explorer_url.as_deref(), Some("https://celoscan.io"));
    }

    #[test]
    fn load__legacy_array_file__returns_last_record() {
        // given
        let dir = TempDir::new("deployments").unwrap();
        let store = DeploymentStore::at(dir.path(), DeploymentEnv::Local).unwrap();
        let json = r#"[
            {"deployed_at":"a","contract_address":"0x1","network_url":"u","chain_id":31337},
            {"deployed_at":"b","contract_address":"0x2","network_url":"u","chain_id":31337}
        ]"#;
        fs::write(store.path(), json).unwrap();

        // when
        let record = store.load().unwrap().unwrap();

        // then
        assert_eq!(record.contract_address, "0x2");
        assert_eq!(record.deployment_block, None);
    }

    #[test]
    fn load__garbage_file__returns_error() {
        // given
        let dir = TempDir::new("deployments").unwrap();
        let store = DeploymentStore::at(dir.path(), DeploymentEnv::Local).unwrap();
        fs::write(store.path(), "not json").unwrap();

        // when
        let result = store.load();

        // then
        assert!(result.is_err());
    }
}
