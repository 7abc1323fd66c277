//! Put these Clap arg structs (flattened) at the top level of a Clap CLI
//! made with the Derive API to add the `-u/--url`, `-k/--keypair`, `--commitment`
//! and `--timeout` args, resolved the way `anchor test` resolves its provider.
use clap::{Parser, ValueEnum};
use solana_devtools_idl_client::config::normalize_to_url_if_moniker;
use solana_devtools_idl_client::{ProviderConfig, Result};
use solana_sdk::commitment_config::CommitmentConfig;
use std::time::Duration;

/// Specify an RPC URL or cluster moniker (`localnet`, `devnet`, ...).
#[derive(Debug, Default, Parser)]
pub struct UrlArg {
    #[clap(short, long)]
    #[cfg_attr(feature = "env", clap(env = "ANCHOR_PROVIDER_URL"))]
    pub url: Option<String>,
}

impl UrlArg {
    pub fn resolve(&self, config: &mut ProviderConfig) {
        if let Some(url) = &self.url {
            config.url = normalize_to_url_if_moniker(url);
        }
    }
}

#[derive(ValueEnum, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum CommitmentLevel {
    Processed,
    #[default]
    Confirmed,
    Finalized,
}

impl From<CommitmentLevel> for CommitmentConfig {
    fn from(level: CommitmentLevel) -> Self {
        match level {
            CommitmentLevel::Processed => CommitmentConfig::processed(),
            CommitmentLevel::Confirmed => CommitmentConfig::confirmed(),
            CommitmentLevel::Finalized => CommitmentConfig::finalized(),
        }
    }
}

/// Specify a commitment level for RPC client requests.
#[derive(Debug, Default, Parser)]
pub struct CommitmentArg {
    #[clap(long, value_enum)]
    #[cfg_attr(feature = "env", clap(env = "SOLANA_RPC_COMMITMENT"))]
    pub commitment: Option<CommitmentLevel>,
}

impl CommitmentArg {
    pub fn resolve(&self, config: &mut ProviderConfig) {
        if let Some(level) = self.commitment {
            config.commitment = level.into();
        }
    }
}

/// Path to the keypair file that pays for and signs every transaction.
#[derive(Debug, Default, Parser)]
pub struct KeypairArg {
    /// Defaults to `ANCHOR_WALLET`, then the Solana CLI's configured keypair.
    #[clap(short, long)]
    #[cfg_attr(feature = "env", clap(env = "ANCHOR_WALLET"))]
    pub keypair: Option<String>,
}

impl KeypairArg {
    pub fn resolve(&self, config: &mut ProviderConfig) {
        if let Some(path) = &self.keypair {
            config.wallet_path = path.clone();
        }
    }
}

/// Bound on every network call, in milliseconds.
#[derive(Debug, Default, Parser)]
pub struct TimeoutArg {
    #[clap(long = "timeout", value_name = "MS")]
    #[cfg_attr(feature = "env", clap(env = "IDL_CLIENT_TIMEOUT_MS"))]
    pub timeout_ms: Option<u64>,
}

impl TimeoutArg {
    pub fn resolve(&self, config: &mut ProviderConfig) {
        if let Some(ms) = self.timeout_ms {
            config.timeout = Duration::from_millis(ms);
        }
    }
}

/// Every provider arg at once.
#[derive(Debug, Default, Parser)]
pub struct ProviderArgs {
    #[clap(flatten)]
    pub url: UrlArg,
    #[clap(flatten)]
    pub keypair: KeypairArg,
    #[clap(flatten)]
    pub commitment: CommitmentArg,
    #[clap(flatten)]
    pub timeout: TimeoutArg,
}

impl ProviderArgs {
    /// Explicit args first, then the environment, then the Solana CLI config file.
    pub fn resolve(&self) -> Result<ProviderConfig> {
        Ok(self.resolve_with(ProviderConfig::env()?))
    }

    /// Override `base` with whatever was given on the command line.
    pub fn resolve_with(&self, mut base: ProviderConfig) -> ProviderConfig {
        self.url.resolve(&mut base);
        self.keypair.resolve(&mut base);
        self.commitment.resolve(&mut base);
        self.timeout.resolve(&mut base);
        base
    }
}
