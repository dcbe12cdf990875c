// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Deployment metadata written by the contract deployment scripts

use crate::error::ConfigError;
use ethers::types::Address;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeploymentInfo {
    #[serde(alias = "registry_address")]
    pub pdm_system_address: Address,
    #[serde(alias = "verifier_address")]
    pub groth16_verifier_address: Address,
    #[serde(default)]
    pub network: Option<String>,
    #[serde(default)]
    pub rpc_url: Option<String>,
    #[serde(default)]
    pub deployer_account: Option<Address>,
    #[serde(default)]
    pub deployment_time: Option<String>,
    #[serde(default)]
    pub gas_price_gwei: Option<f64>,
}

impl DeploymentInfo {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn registry_address(&self) -> Address {
        self.pdm_system_address
    }

    pub fn verifier_address(&self) -> Address {
        self.groth16_verifier_address
    }
}
