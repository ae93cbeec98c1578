use ethers::types::Address;
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::debug;

use crate::{
    error::{Result, SessionError},
    provider::{WalletOptions, TRANSFER_GAS},
};

pub const DEFAULT_RPC_URL: &str = "http://localhost:8545";
pub const DEFAULT_STORE_PATH: &str = "wallet-session.json";

pub const RPC_URL_VAR: &str = "WALLET_RPC_URL";
pub const CONTRACT_ADDRESS_VAR: &str = "WALLET_CONTRACT_ADDRESS";
pub const STORE_PATH_VAR: &str = "WALLET_STORE_PATH";
pub const CONFIRMATIONS_VAR: &str = "WALLET_CONFIRMATIONS";
pub const TRANSFER_GAS_VAR: &str = "WALLET_TRANSFER_GAS";

// Everything optional so env vars can fill the gaps.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawConfig {
    rpc_url: Option<String>,
    contract_address: Option<String>,
    store_path: Option<PathBuf>,
    confirmations: Option<usize>,
    transfer_gas: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub rpc_url: String,
    /// Deployed `Transactions` ledger.
    pub contract_address: Address,
    /// Where the cached count and the pending-append journal live.
    pub store_path: PathBuf,
    pub confirmations: usize,
    pub transfer_gas: u64,
}

fn parse_var<T: FromStr>(var: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| SessionError::Config(format!("{}: {}", var, e)))
}

impl RawConfig {
    fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(RPC_URL_VAR) {
            self.rpc_url = Some(url);
        }
        if let Some(address) = lookup(CONTRACT_ADDRESS_VAR) {
            self.contract_address = Some(address);
        }
        if let Some(path) = lookup(STORE_PATH_VAR) {
            self.store_path = Some(path.into());
        }
        if let Some(raw) = lookup(CONFIRMATIONS_VAR) {
            self.confirmations = Some(parse_var(CONFIRMATIONS_VAR, &raw)?);
        }
        if let Some(raw) = lookup(TRANSFER_GAS_VAR) {
            self.transfer_gas = Some(parse_var(TRANSFER_GAS_VAR, &raw)?);
        }
        Ok(())
    }

    fn finish(self) -> Result<Config> {
        let address = self.contract_address.ok_or_else(|| {
            SessionError::Config(format!(
                "contract_address is not set (config file or {})",
                CONTRACT_ADDRESS_VAR
            ))
        })?;
        let contract_address = Address::from_str(address.trim())
            .map_err(|e| SessionError::Config(format!("contract_address {:?}: {}", address, e)))?;

        let confirmations = self.confirmations.unwrap_or(1);
        if confirmations == 0 {
            return Err(SessionError::Config("confirmations must be at least 1".into()));
        }

        Ok(Config {
            rpc_url: self.rpc_url.unwrap_or_else(|| DEFAULT_RPC_URL.to_string()),
            contract_address,
            store_path: self
                .store_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_PATH)),
            confirmations,
            transfer_gas: self.transfer_gas.unwrap_or(TRANSFER_GAS),
        })
    }
}

impl Config {
    /// Parses a TOML document without looking at the environment.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Self::parse(raw, |_| None)
    }

    /// Loads `.env`, then the optional TOML file at `path`, then applies the
    /// `WALLET_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Ok(env) = dotenv::dotenv() {
            debug!(path = %env.display(), "loaded .env");
        }
        let raw = match path {
            Some(path) => fs::read_to_string(path).map_err(|e| {
                SessionError::Config(format!("reading {}: {}", path.display(), e))
            })?,
            None => String::new(),
        };
        Self::parse(&raw, |var| std::env::var(var).ok())
    }

    fn parse<F>(raw: &str, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config: RawConfig =
            toml::from_str(raw).map_err(|e| SessionError::Config(e.to_string()))?;
        config.apply_overrides(lookup)?;
        config.finish()
    }

    pub fn wallet_options(&self) -> WalletOptions {
        WalletOptions {
            confirmations: self.confirmations,
            poll_interval: None,
            transfer_gas: self.transfer_gas.into(),
        }
    }
}
