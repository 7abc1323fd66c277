//! Where to connect, who pays, and how long to wait.
//!
//! Values resolve the way the Anchor toolchain resolves them: explicit settings first,
//! then the `ANCHOR_PROVIDER_URL` / `ANCHOR_WALLET` environment variables, then the
//! Solana CLI config file.
use crate::error::{IdlClientError, Result};
use serde::Deserialize;
use solana_cli_config::Config;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::signature::{read_keypair_file, Keypair};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

pub const PROVIDER_URL_ENV: &str = "ANCHOR_PROVIDER_URL";
pub const WALLET_ENV: &str = "ANCHOR_WALLET";
pub const TIMEOUT_ENV: &str = "IDL_CLIENT_TIMEOUT_MS";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub fn normalize_to_url_if_moniker<T: AsRef<str>>(url_or_moniker: T) -> String {
    match url_or_moniker.as_ref() {
        "m" | "mainnet" | "mainnet-beta" => "https://api.mainnet-beta.solana.com",
        "t" | "testnet" => "https://api.testnet.solana.com",
        "d" | "devnet" => "https://api.devnet.solana.com",
        "l" | "localhost" | "localnet" => "http://localhost:8899",
        url => url,
    }
    .to_string()
}

/// Load configuration from the standard Solana CLI config path.
pub fn load_default_solana_cli_config() -> Result<Config> {
    let config_file = solana_cli_config::CONFIG_FILE.as_ref().ok_or_else(|| {
        IdlClientError::Config(
            "unable to determine a config file path: no home directory on this OS or user"
                .to_string(),
        )
    })?;
    Config::load(config_file).map_err(|source| IdlClientError::Io {
        path: config_file.clone(),
        source,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfig {
    pub url: String,
    pub commitment: CommitmentConfig,
    pub wallet_path: String,
    /// Default bound on every suspending call made through clients built from this config.
    pub timeout: Duration,
}

impl ProviderConfig {
    pub fn new(url: impl AsRef<str>, wallet_path: impl Into<String>) -> Self {
        Self {
            url: normalize_to_url_if_moniker(url),
            commitment: CommitmentConfig::confirmed(),
            wallet_path: wallet_path.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_commitment(mut self, commitment: CommitmentConfig) -> Self {
        self.commitment = commitment;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Resolve from the environment, falling back to the Solana CLI config file
    /// (or its defaults when there is no such file).
    pub fn env() -> Result<Self> {
        let cli_config = load_default_solana_cli_config().unwrap_or_default();
        Self::from_env_with(|key| std::env::var(key).ok(), cli_config)
    }

    fn from_env_with(var: impl Fn(&str) -> Option<String>, cli_config: Config) -> Result<Self> {
        let url = var(PROVIDER_URL_ENV).unwrap_or(cli_config.json_rpc_url);
        let wallet_path = var(WALLET_ENV).unwrap_or(cli_config.keypair_path);
        let commitment = CommitmentConfig::from_str(&cli_config.commitment)
            .unwrap_or_else(|_| CommitmentConfig::confirmed());
        let timeout = match var(TIMEOUT_ENV) {
            Some(ms) => Duration::from_millis(ms.trim().parse::<u64>().map_err(|e| {
                IdlClientError::Config(format!("{TIMEOUT_ENV}={ms:?} is not a number of milliseconds: {e}"))
            })?),
            None => DEFAULT_TIMEOUT,
        };
        Ok(Self::new(url, wallet_path)
            .with_commitment(commitment)
            .with_timeout(timeout))
    }

    /// Read the `[provider]` table of an `Anchor.toml`.
    pub fn from_anchor_toml(path: impl AsRef<Path>) -> Result<Self> {
        let provider = AnchorToml::load(path.as_ref())?.provider.ok_or_else(|| {
            IdlClientError::Config(format!("{} has no [provider] table", path.as_ref().display()))
        })?;
        Ok(Self::new(provider.cluster, provider.wallet))
    }

    /// Read the payer keypair, expanding a leading `~`.
    pub fn load_wallet(&self) -> Result<Keypair> {
        let path = shellexpand::tilde(&self.wallet_path);
        read_keypair_file(&*path).map_err(|e| {
            IdlClientError::Config(format!("could not read keypair file {path}: {e}"))
        })
    }

    #[cfg(feature = "client")]
    pub fn rpc_client(&self) -> solana_client::nonblocking::rpc_client::RpcClient {
        solana_client::nonblocking::rpc_client::RpcClient::new_with_timeout_and_commitment(
            self.url.clone(),
            self.timeout,
            self.commitment,
        )
    }
}

/// The parts of `Anchor.toml` this crate reads.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct AnchorToml {
    pub provider: Option<AnchorProvider>,
    /// cluster -> program name -> deployment
    #[serde(default)]
    pub programs: BTreeMap<String, BTreeMap<String, ProgramEntry>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AnchorProvider {
    pub cluster: String,
    pub wallet: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum ProgramEntry {
    Address(String),
    Detailed {
        address: String,
        idl: Option<String>,
    },
}

impl ProgramEntry {
    pub fn address(&self) -> &str {
        match self {
            ProgramEntry::Address(address) | ProgramEntry::Detailed { address, .. } => address,
        }
    }

    pub fn idl(&self) -> Option<&str> {
        match self {
            ProgramEntry::Address(_) => None,
            ProgramEntry::Detailed { idl, .. } => idl.as_deref(),
        }
    }
}

impl AnchorToml {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|source| IdlClientError::Io {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&contents)
            .map_err(|e| IdlClientError::Config(format!("{}: {e}", path.display())))
    }
}
