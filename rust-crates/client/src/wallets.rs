use eth_keystore::decrypt_key;
use ethers::signers::{
    LocalWallet,
    MnemonicBuilder,
    Signer,
    coins_bip39::English,
};
use rpassword::prompt_password;
use std::{
    fs,
    path::{
        Path,
        PathBuf,
    },
};

pub const ENV_PLATFORM_PRIVATE_KEY: &str = "PREDICT_PLATFORM_PRIVATE_KEY";
pub const ENV_KEYSTORE_PASSWORD: &str = "PREDICT_KEYSTORE_PASSWORD";

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error(
        "no platform credential configured; set PREDICT_PLATFORM_PRIVATE_KEY or pass a keystore name"
    )]
    Missing,
    #[error("HOME environment variable not set")]
    NoHome,
    #[error("platform private key is not a 32-byte hex string")]
    MalformedKey,
    #[error("failed to read wallet directory {path}: {source}")]
    Directory {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("wallet '{name}' not found in {dir}")]
    NotFound { name: String, dir: String },
    #[error("failed to read password for wallet '{0}'")]
    Password(String),
    #[error("invalid password for wallet '{0}'")]
    InvalidPassword(String),
    #[error("wallet '{0}' contained unsupported key material")]
    Unsupported(String),
}

#[derive(Clone, Debug)]
pub struct WalletDescriptor {
    pub name: String,
    pub path: PathBuf,
}

impl WalletDescriptor {
    pub fn new(name: impl Into<String>, path: PathBuf) -> Self {
        Self {
            name: name.into(),
            path,
        }
    }
}

/// Where the platform signing key comes from.
#[derive(Clone, Debug)]
pub enum PlatformCredential {
    PrivateKey(String),
    Keystore(WalletDescriptor),
}

impl PlatformCredential {
    /// Environment key first, then the named keystore.
    pub fn locate(
        keystore: Option<&str>,
        wallet_dir: Option<&str>,
    ) -> Result<Self, CredentialError> {
        if let Some(raw) = std::env::var(ENV_PLATFORM_PRIVATE_KEY)
            .ok()
            .filter(|raw| !raw.trim().is_empty())
        {
            return Ok(PlatformCredential::PrivateKey(raw));
        }
        let name = keystore.ok_or(CredentialError::Missing)?;
        let dir = resolve_wallet_dir(wallet_dir)?;
        find_wallet(&dir, name).map(PlatformCredential::Keystore)
    }

    pub fn unlock(&self, chain_id: u64) -> Result<LocalWallet, CredentialError> {
        let wallet = match self {
            PlatformCredential::PrivateKey(raw) => parse_private_key(raw)?,
            PlatformCredential::Keystore(descriptor) => unlock_wallet(descriptor)?,
        };
        Ok(wallet.with_chain_id(chain_id))
    }
}

pub fn default_wallet_dir() -> Result<PathBuf, CredentialError> {
    let home = std::env::var("HOME").map_err(|_| CredentialError::NoHome)?;
    Ok(PathBuf::from(home).join(".celo").join("wallets"))
}

pub fn resolve_wallet_dir(dir: Option<&str>) -> Result<PathBuf, CredentialError> {
    match dir {
        Some(raw) => {
            let expanded = shellexpand::tilde(raw);
            Ok(PathBuf::from(expanded.into_owned()))
        }
        None => default_wallet_dir(),
    }
}

pub fn list_wallets(dir: &Path) -> Result<Vec<WalletDescriptor>, CredentialError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let io_err = |source| CredentialError::Directory {
        path: dir.to_path_buf(),
        source,
    };
    let mut wallets = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if !path.is_file() {
            continue;
        }
        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }
        let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };
        wallets.push(WalletDescriptor::new(name, path.clone()));
    }
    wallets.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(wallets)
}

pub fn find_wallet(dir: &Path, name: &str) -> Result<WalletDescriptor, CredentialError> {
    let wallets = list_wallets(dir)?;
    wallets
        .into_iter()
        .find(|w| w.name == name)
        .ok_or_else(|| CredentialError::NotFound {
            name: name.to_string(),
            dir: dir.to_string_lossy().into_owned(),
        })
}

pub fn parse_private_key(raw: &str) -> Result<LocalWallet, CredentialError> {
    let trimmed = raw.trim();
    let hex_part = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    let bytes = hex::decode(hex_part).map_err(|_| CredentialError::MalformedKey)?;
    if bytes.len() != 32 {
        return Err(CredentialError::MalformedKey);
    }
    LocalWallet::from_bytes(&bytes).map_err(|_| CredentialError::MalformedKey)
}

pub fn unlock_wallet(descriptor: &WalletDescriptor) -> Result<LocalWallet, CredentialError> {
    let password = match std::env::var(ENV_KEYSTORE_PASSWORD) {
        Ok(password) => password,
        Err(_) => {
            let prompt = format!("Enter password for wallet '{}': ", descriptor.name);
            prompt_password(prompt)
                .map_err(|_| CredentialError::Password(descriptor.name.clone()))?
        }
    };

    let secret = decrypt_key(&descriptor.path, password.as_bytes())
        .map_err(|_| CredentialError::InvalidPassword(descriptor.name.clone()))?;

    if let Ok(wallet) = LocalWallet::from_bytes(&secret) {
        return Ok(wallet);
    }

    if let Ok(mnemonic) = std::str::from_utf8(&secret) {
        let word_count = mnemonic.split_whitespace().count();
        if word_count >= 12 {
            return MnemonicBuilder::<English>::default()
                .phrase(mnemonic)
                .build()
                .map_err(|_| CredentialError::Unsupported(descriptor.name.clone()));
        }
    }

    Err(CredentialError::Unsupported(descriptor.name.clone()))
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;
    use ethers::types::Address;
    use tempdir::TempDir;

    // Well-known first development account.
    const DEV_KEY: &str =
        "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn parse_private_key__dev_key__derives_known_address() {
        // when
        let wallet = parse_private_key(DEV_KEY).unwrap();

        // then
        let expected: Address = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".parse().unwrap();
        assert_eq!(wallet.address(), expected);
    }

    #[test]
    fn parse_private_key__short_or_non_hex__is_rejected() {
        assert!(matches!(
            parse_private_key("0x1234"),
            Err(CredentialError::MalformedKey)
        ));
        assert!(matches!(
            parse_private_key("not a key"),
            Err(CredentialError::MalformedKey)
        ));
    }

    #[test]
    fn find_wallet__only_json_files__are_listed() {
        // given
        let dir = TempDir::new("wallets").unwrap();
        fs::write(dir.path().join("platform.json"), "{}").unwrap();
        fs::write(dir.path().join("notes.txt"), "").unwrap();

        // when
        let wallets = list_wallets(dir.path()).unwrap();
        let missing = find_wallet(dir.path(), "notes");

        // then
        assert_eq!(wallets.len(), 1);
        assert_eq!(wallets[0].name, "platform");
        assert!(matches!(missing, Err(CredentialError::NotFound { .. })));
    }
}
