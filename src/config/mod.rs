// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Pipeline configuration
//!
//! Loaded from an optional TOML file, then overridden from the environment
//! (`.env` is honoured). Everything is validated before any collaborator is
//! constructed.
//!
//! Environment variables:
//! - `ATTEST_NETWORK`: `local` or `testnet`
//! - `ATTEST_RPC_URL`, `ATTEST_CHAIN_ID`
//! - `ATTEST_VERIFIER_ADDRESS`, `ATTEST_REGISTRY_ADDRESS`, `ATTEST_DEPLOYMENT_INFO`
//! - `ATTEST_STORE_DIR`
//! - `ATTEST_PROVER_URL`, `ATTEST_ALLOW_INSECURE_PROVER`
//! - `ATTEST_GAS_PRICE_GWEI`, `ATTEST_CONFIRMATION_TIMEOUT_SECS`
//! - `ATTEST_PRIVATE_KEY`: key of the `admin` identity
//! - `ATTEST_<NAME>_PRIVATE_KEY`: key of a declared identity

pub mod deployment;

pub use deployment::DeploymentInfo;

use crate::accounts::Role;
use crate::error::ConfigError;
use crate::transactions::GasPricePolicy;
use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

/// Deployment target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkProfile {
    /// Ephemeral pre-funded development chain
    #[default]
    Local,
    /// Public test network, accounts funded by the operator
    Testnet,
}

impl NetworkProfile {
    pub fn default_chain_id(&self) -> Option<u64> {
        match self {
            NetworkProfile::Local => Some(1337),
            NetworkProfile::Testnet => None,
        }
    }

    pub fn default_gas_mode(&self) -> GasPriceMode {
        match self {
            NetworkProfile::Local => GasPriceMode::Fixed,
            NetworkProfile::Testnet => GasPriceMode::Network,
        }
    }

    /// Whether identities must be funded by the operator
    pub fn operator_funded(&self) -> bool {
        matches!(self, NetworkProfile::Testnet)
    }
}

impl FromStr for NetworkProfile {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" | "ganache" | "dev" => Ok(NetworkProfile::Local),
            "testnet" | "holesky" | "sepolia" => Ok(NetworkProfile::Testnet),
            other => Err(ConfigError::invalid(
                "network",
                format!("unknown network profile '{}'", other),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GasPriceMode {
    Fixed,
    Network,
}

/// A named signing identity. The key never appears in `Debug` output.
#[derive(Clone, Deserialize)]
pub struct IdentityConfig {
    pub name: String,
    pub role: Role,
    pub private_key: String,
    #[serde(default)]
    pub address: Option<Address>,
}

impl fmt::Debug for IdentityConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityConfig")
            .field("name", &self.name)
            .field("role", &self.role)
            .field("private_key", &"<redacted>")
            .field("address", &self.address)
            .finish()
    }
}

/// Which identity signs each attestation flow
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowIdentities {
    pub model: String,
    pub sensor: String,
    pub prediction: String,
}

impl Default for FlowIdentities {
    fn default() -> Self {
        Self {
            model: "engineer".to_string(),
            sensor: "worker".to_string(),
            prediction: "engineer".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub network: NetworkProfile,
    pub rpc_url: String,
    /// Expected chain id; checked against the ledger on connect
    pub chain_id: Option<u64>,
    pub verifier_address: Option<Address>,
    pub registry_address: Option<Address>,
    /// Hardhat artifact or bare ABI JSON; built-in ABI when unset
    pub verifier_artifact: Option<PathBuf>,
    pub registry_artifact: Option<PathBuf>,
    /// Deployment script output supplying contract addresses
    pub deployment_info: Option<PathBuf>,
    pub identities: Vec<IdentityConfig>,
    pub flows: FlowIdentities,
    /// Overrides the network profile's default
    pub gas_price_mode: Option<GasPriceMode>,
    pub gas_price_gwei: u64,
    pub gas_margin_percent: u64,
    pub confirmation_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub confirmations: u64,
    /// Preflight warns below this balance on operator-funded networks
    pub min_balance_gwei: u64,
    pub store_dir: PathBuf,
    pub prover_url: Option<String>,
    pub prover_timeout_secs: u64,
    pub allow_insecure_prover: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            network: NetworkProfile::Local,
            rpc_url: "http://127.0.0.1:8545".to_string(),
            chain_id: None,
            verifier_address: None,
            registry_address: None,
            verifier_artifact: None,
            registry_artifact: None,
            deployment_info: None,
            identities: Vec::new(),
            flows: FlowIdentities::default(),
            gas_price_mode: None,
            gas_price_gwei: 20,
            gas_margin_percent: 20,
            confirmation_timeout_secs: 60,
            poll_interval_ms: 500,
            confirmations: 1,
            min_balance_gwei: 10_000_000, // 0.01 ETH
            store_dir: PathBuf::from("./local_storage"),
            prover_url: None,
            prover_timeout_secs: 120,
            allow_insecure_prover: false,
        }
    }
}

fn gwei(amount: u64) -> U256 {
    U256::from(amount) * U256::exp10(9)
}

fn parse_env<T: FromStr>(field: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::invalid(field, e.to_string()))
}

impl PipelineConfig {
    /// Load from an optional TOML file plus environment, then validate
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::load_local(path)?;
        config.resolve_deployment()?;
        config.validate()?;

        info!(
            "Configuration loaded: network={:?}, rpc={}, identities={}",
            config.network,
            config.rpc_url,
            config.identities.len()
        );
        Ok(config)
    }

    /// File and environment only, without validation. For commands that
    /// never reach the ledger, so contract addresses and identities may be
    /// absent.
    pub fn load_local(path: Option<&Path>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        debug!("Local configuration: store_dir={}", config.store_dir.display());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Apply `ATTEST_*` overrides from `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("ATTEST_NETWORK") {
            self.network = v.parse()?;
        }
        if let Some(v) = lookup("ATTEST_RPC_URL") {
            self.rpc_url = v;
        }
        if let Some(v) = lookup("ATTEST_CHAIN_ID") {
            self.chain_id = Some(parse_env("chain_id", &v)?);
        }
        if let Some(v) = lookup("ATTEST_VERIFIER_ADDRESS") {
            self.verifier_address = Some(parse_env("verifier_address", &v)?);
        }
        if let Some(v) = lookup("ATTEST_REGISTRY_ADDRESS") {
            self.registry_address = Some(parse_env("registry_address", &v)?);
        }
        if let Some(v) = lookup("ATTEST_DEPLOYMENT_INFO") {
            self.deployment_info = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("ATTEST_STORE_DIR") {
            self.store_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("ATTEST_PROVER_URL") {
            self.prover_url = Some(v);
        }
        if let Some(v) = lookup("ATTEST_ALLOW_INSECURE_PROVER") {
            self.allow_insecure_prover = parse_env("allow_insecure_prover", &v)?;
        }
        if let Some(v) = lookup("ATTEST_GAS_PRICE_GWEI") {
            self.gas_price_gwei = parse_env("gas_price_gwei", &v)?;
        }
        if let Some(v) = lookup("ATTEST_CONFIRMATION_TIMEOUT_SECS") {
            self.confirmation_timeout_secs = parse_env("confirmation_timeout_secs", &v)?;
        }

        if let Some(key) = lookup("ATTEST_PRIVATE_KEY") {
            match self.identities.iter_mut().find(|i| i.name == "admin") {
                Some(admin) => admin.private_key = key,
                None => self.identities.push(IdentityConfig {
                    name: "admin".to_string(),
                    role: Role::Admin,
                    private_key: key,
                    address: None,
                }),
            }
        }
        for identity in self.identities.iter_mut() {
            let var = format!("ATTEST_{}_PRIVATE_KEY", identity.name.to_ascii_uppercase());
            if let Some(key) = lookup(&var) {
                identity.private_key = key;
            }
        }
        Ok(())
    }

    /// Fill contract addresses from the deployment info file, if configured.
    /// Explicit addresses win.
    pub fn resolve_deployment(&mut self) -> Result<(), ConfigError> {
        let Some(path) = self.deployment_info.clone() else {
            return Ok(());
        };
        let info = DeploymentInfo::load(&path)?;
        if self.verifier_address.is_none() {
            self.verifier_address = Some(info.verifier_address());
        }
        if self.registry_address.is_none() {
            self.registry_address = Some(info.registry_address());
        }
        info!(
            "Deployment info {} applied (network: {})",
            path.display(),
            info.network.as_deref().unwrap_or("unknown")
        );
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        url::Url::parse(&self.rpc_url).map_err(|e| ConfigError::invalid("rpc_url", e.to_string()))?;

        if self.verifier_address.is_none() {
            return Err(ConfigError::missing("verifier_address"));
        }
        if self.registry_address.is_none() {
            return Err(ConfigError::missing("registry_address"));
        }
        if self.identities.is_empty() {
            return Err(ConfigError::missing("identities"));
        }

        let mut names = HashSet::new();
        for identity in &self.identities {
            if identity.name.is_empty() {
                return Err(ConfigError::invalid("identities", "identity name is empty"));
            }
            if !names.insert(identity.name.as_str()) {
                return Err(ConfigError::invalid(
                    "identities",
                    format!("duplicate identity '{}'", identity.name),
                ));
            }
        }
        for (flow, name) in [
            ("flows.model", &self.flows.model),
            ("flows.sensor", &self.flows.sensor),
            ("flows.prediction", &self.flows.prediction),
        ] {
            if !names.contains(name.as_str()) {
                return Err(ConfigError::invalid(
                    flow,
                    format!("identity '{}' is not declared", name),
                ));
            }
        }

        if self.confirmation_timeout_secs == 0 {
            return Err(ConfigError::invalid("confirmation_timeout_secs", "must be > 0"));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::invalid("poll_interval_ms", "must be > 0"));
        }
        if self.confirmations == 0 {
            return Err(ConfigError::invalid("confirmations", "must be >= 1"));
        }
        if self.gas_margin_percent > 500 {
            return Err(ConfigError::invalid("gas_margin_percent", "must be <= 500"));
        }
        if let Some(url) = &self.prover_url {
            url::Url::parse(url).map_err(|e| ConfigError::invalid("prover_url", e.to_string()))?;
        }
        Ok(())
    }

    /// Chain id the ledger must report, if one is known
    pub fn expected_chain_id(&self) -> Option<u64> {
        self.chain_id.or_else(|| self.network.default_chain_id())
    }

    pub fn gas_price_policy(&self) -> GasPricePolicy {
        match self
            .gas_price_mode
            .unwrap_or_else(|| self.network.default_gas_mode())
        {
            GasPriceMode::Network => GasPricePolicy::Network,
            GasPriceMode::Fixed => GasPricePolicy::Fixed(gwei(self.gas_price_gwei)),
        }
    }

    pub fn min_balance(&self) -> U256 {
        gwei(self.min_balance_gwei)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
