// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Account Registry
//!
//! Named signing identities built from configuration. Private keys are held
//! as `LocalWallet`s bound to the ledger's chain id and are only reachable
//! through [`SignerHandle`], which signs inside the crate and never exposes
//! or prints key material.

use crate::config::IdentityConfig;
use crate::error::{ConfigError, PipelineError};
use crate::ledger::LedgerClient;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Signature, U256};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Engineer,
    Worker,
    User,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Admin => "admin",
            Role::Engineer => "engineer",
            Role::Worker => "worker",
            Role::User => "user",
        };
        f.write_str(name)
    }
}

struct SigningIdentity {
    name: String,
    role: Role,
    wallet: LocalWallet,
}

/// Capability to sign as one identity
#[derive(Clone)]
pub struct SignerHandle {
    identity: Arc<SigningIdentity>,
}

impl SignerHandle {
    pub fn name(&self) -> &str {
        &self.identity.name
    }

    pub fn address(&self) -> Address {
        self.identity.wallet.address()
    }

    pub fn role(&self) -> Role {
        self.identity.role
    }

    pub(crate) fn sign_transaction(&self, tx: &TypedTransaction) -> Result<Signature, PipelineError> {
        self.identity
            .wallet
            .sign_transaction_sync(tx)
            .map_err(|e| PipelineError::Signing(e.to_string()))
    }
}

impl fmt::Debug for SignerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignerHandle")
            .field("name", &self.identity.name)
            .field("role", &self.identity.role)
            .field("address", &self.address())
            .finish()
    }
}

/// Balance of one identity as seen by preflight
#[derive(Debug, Clone)]
pub struct FundingStatus {
    pub name: String,
    pub address: Address,
    pub balance: U256,
    pub sufficient: bool,
}

pub struct AccountRegistry {
    chain_id: u64,
    identities: HashMap<String, SignerHandle>,
}

impl AccountRegistry {
    /// Build the registry for `chain_id`. A declared address must match
    /// the one derived from the key.
    pub fn from_config(entries: &[IdentityConfig], chain_id: u64) -> Result<Self, ConfigError> {
        let mut identities = HashMap::new();
        for entry in entries {
            let wallet = entry
                .private_key
                .parse::<LocalWallet>()
                .map_err(|_| {
                    ConfigError::invalid(
                        format!("identities.{}.private_key", entry.name),
                        "not a valid secp256k1 private key",
                    )
                })?
                .with_chain_id(chain_id);

            if let Some(declared) = entry.address {
                if declared != wallet.address() {
                    return Err(ConfigError::invalid(
                        format!("identities.{}.address", entry.name),
                        format!(
                            "declared {:?} but key controls {:?}",
                            declared,
                            wallet.address()
                        ),
                    ));
                }
            }

            let handle = SignerHandle {
                identity: Arc::new(SigningIdentity {
                    name: entry.name.clone(),
                    role: entry.role,
                    wallet,
                }),
            };
            if identities.insert(entry.name.clone(), handle).is_some() {
                return Err(ConfigError::invalid(
                    "identities",
                    format!("duplicate identity '{}'", entry.name),
                ));
            }
        }

        info!("👤 Account registry loaded {} identities", identities.len());
        Ok(Self {
            chain_id,
            identities,
        })
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn lookup(&self, name: &str) -> Result<&SignerHandle, PipelineError> {
        self.identities
            .get(name)
            .ok_or_else(|| PipelineError::identity_unknown(name))
    }

    pub fn address_of(&self, name: &str) -> Result<Address, PipelineError> {
        Ok(self.lookup(name)?.address())
    }

    pub fn role_of(&self, name: &str) -> Result<Role, PipelineError> {
        Ok(self.lookup(name)?.role())
    }

    pub fn signer_for(&self, name: &str) -> Result<SignerHandle, PipelineError> {
        self.lookup(name).cloned()
    }

    /// Sorted identity names
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.identities.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn balance_of(
        &self,
        ledger: &dyn LedgerClient,
        name: &str,
    ) -> Result<U256, PipelineError> {
        let address = self.address_of(name)?;
        Ok(ledger.balance(address).await?)
    }

    /// Balances of every identity, flagging those below `min_balance`
    pub async fn preflight(
        &self,
        ledger: &dyn LedgerClient,
        min_balance: U256,
    ) -> Result<Vec<FundingStatus>, PipelineError> {
        let mut report = Vec::new();
        for name in self.names() {
            let address = self.address_of(&name)?;
            let balance = ledger.balance(address).await?;
            let sufficient = balance >= min_balance;
            if !sufficient {
                warn!(
                    "⚠️ Identity '{}' ({:?}) is underfunded: {} wei < {} wei",
                    name, address, balance, min_balance
                );
            }
            report.push(FundingStatus {
                name,
                address,
                balance,
                sufficient,
            });
        }
        Ok(report)
    }
}

impl fmt::Debug for AccountRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountRegistry")
            .field("chain_id", &self.chain_id)
            .field("identities", &self.names())
            .finish()
    }
}
