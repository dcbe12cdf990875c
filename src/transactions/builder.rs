// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Transaction builder
//!
//! Builds and signs legacy (EIP-155) contract calls. Each identity has a
//! nonce lane: a mutex guarding the next nonce this process intends to use.
//! The nonce of a build is `max(ledger pending count, lane cursor)`, so two
//! builds for one identity get consecutive nonces even before either is
//! broadcast.

use super::{GasPricePolicy, SignedTransaction, Simulation};
use crate::accounts::{AccountRegistry, SignerHandle};
use crate::contracts::ContractCall;
use crate::error::{LedgerError, PipelineError};
use crate::ledger::LedgerClient;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{TransactionRequest, H256, U256};
use ethers::utils::keccak256;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

type Lane = Arc<Mutex<Option<U256>>>;

/// Exclusive hold on one identity's nonce lane
pub struct LaneGuard {
    signer: SignerHandle,
    cursor: OwnedMutexGuard<Option<U256>>,
}

impl LaneGuard {
    pub fn identity(&self) -> &str {
        self.signer.name()
    }

    /// Next nonce this process would use, if it has built anything yet
    pub fn cursor(&self) -> Option<U256> {
        *self.cursor
    }
}

pub struct TransactionBuilder {
    ledger: Arc<dyn LedgerClient>,
    accounts: Arc<AccountRegistry>,
    gas_policy: GasPricePolicy,
    gas_margin_percent: u64,
    lanes: Mutex<HashMap<String, Lane>>,
}

impl TransactionBuilder {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        accounts: Arc<AccountRegistry>,
        gas_policy: GasPricePolicy,
        gas_margin_percent: u64,
    ) -> Self {
        Self {
            ledger,
            accounts,
            gas_policy,
            gas_margin_percent,
            lanes: Mutex::new(HashMap::new()),
        }
    }

    pub fn gas_policy(&self) -> GasPricePolicy {
        self.gas_policy
    }

    /// Take exclusive hold of `identity`'s nonce lane. Fails with
    /// `IdentityUnknown` before touching the ledger.
    pub async fn lock_lane(&self, identity: &str) -> Result<LaneGuard, PipelineError> {
        let signer = self.accounts.signer_for(identity)?;
        let lane = {
            let mut lanes = self.lanes.lock().await;
            lanes
                .entry(identity.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(None)))
                .clone()
        };
        let cursor = lane.lock_owned().await;
        Ok(LaneGuard { signer, cursor })
    }

    /// Build and sign `call` as `identity`
    pub async fn build_and_sign(
        &self,
        identity: &str,
        call: &ContractCall,
        gas_limit_hint: Option<U256>,
    ) -> Result<SignedTransaction, PipelineError> {
        let mut lane = self.lock_lane(identity).await?;
        self.build_locked(&mut lane, call, gas_limit_hint).await
    }

    /// Build and sign while holding the lane. The cursor advances only when
    /// signing succeeds.
    pub async fn build_locked(
        &self,
        lane: &mut LaneGuard,
        call: &ContractCall,
        gas_limit_hint: Option<U256>,
    ) -> Result<SignedTransaction, PipelineError> {
        let from = lane.signer.address();
        let chain_id = self.accounts.chain_id();

        let ledger_nonce = self.ledger.transaction_count(from).await?;
        let nonce = match *lane.cursor {
            Some(cursor) if cursor > ledger_nonce => cursor,
            _ => ledger_nonce,
        };

        let request = TransactionRequest::new()
            .from(from)
            .to(call.target)
            .data(call.data.clone())
            .nonce(nonce)
            .chain_id(chain_id);

        let gas_limit = match gas_limit_hint {
            Some(hint) => hint,
            None => self.with_margin(self.estimate(&request, call).await?),
        };
        let gas_price = self.current_gas_price().await?;

        let tx = TypedTransaction::Legacy(request.gas(gas_limit).gas_price(gas_price));
        let signature = lane.signer.sign_transaction(&tx)?;
        let raw = tx.rlp_signed(&signature);
        let hash = H256::from(keccak256(&raw));

        *lane.cursor = Some(nonce + 1);

        debug!(
            "✍️ Signed {}.{} as {} nonce={} gas={} price={}",
            call.contract,
            call.function,
            lane.identity(),
            nonce,
            gas_limit,
            gas_price
        );

        Ok(SignedTransaction {
            identity: lane.identity().to_string(),
            from,
            to: call.target,
            nonce,
            gas_limit,
            gas_price,
            raw,
            hash,
        })
    }

    /// Dry-run `call` as `identity` without signing or touching the nonce
    /// lane. Without a limit, the one a build would choose is checked.
    pub async fn simulate(
        &self,
        identity: &str,
        call: &ContractCall,
        gas_limit: Option<U256>,
    ) -> Result<Simulation, PipelineError> {
        let signer = self.accounts.signer_for(identity)?;
        let from = signer.address();
        let nonce = self.ledger.transaction_count(from).await?;
        let request = TransactionRequest::new()
            .from(from)
            .to(call.target)
            .data(call.data.clone())
            .nonce(nonce)
            .chain_id(self.accounts.chain_id());

        let gas_estimate = self.estimate(&request, call).await?;
        let gas_limit = gas_limit.unwrap_or_else(|| self.with_margin(gas_estimate));
        let gas_price = self.current_gas_price().await?;
        let simulation = Simulation::new(from, call.target, nonce, gas_estimate, gas_limit, gas_price);

        info!(
            "🎯 Simulated {}.{} as {}: estimate {} of limit {}, cost {} ETH",
            call.contract,
            call.function,
            identity,
            simulation.gas_estimate,
            simulation.gas_limit,
            simulation.estimated_cost_eth
        );
        if !simulation.is_valid {
            warn!("⚠️ Gas limit {} below estimate {}", gas_limit, gas_estimate);
        }
        Ok(simulation)
    }

    async fn estimate(
        &self,
        request: &TransactionRequest,
        call: &ContractCall,
    ) -> Result<U256, PipelineError> {
        let estimate_tx = TypedTransaction::Legacy(request.clone());
        self.ledger
            .estimate_gas(&estimate_tx)
            .await
            .map_err(|e| match e {
                LedgerError::Unavailable(reason) => PipelineError::LedgerUnavailable(reason),
                other => {
                    warn!(
                        "❌ Gas estimation failed for {}.{}: {}",
                        call.contract, call.function, other
                    );
                    PipelineError::GasEstimationFailed {
                        reason: other.to_string(),
                    }
                }
            })
    }

    fn with_margin(&self, estimate: U256) -> U256 {
        estimate * U256::from(100 + self.gas_margin_percent) / U256::from(100)
    }

    async fn current_gas_price(&self) -> Result<U256, PipelineError> {
        match self.gas_policy {
            GasPricePolicy::Fixed(price) => Ok(price),
            GasPricePolicy::Network => Ok(self.ledger.gas_price().await?),
        }
    }

    /// Forget the lane cursor so the next build re-reads the ledger
    pub fn reset_lane(&self, lane: &mut LaneGuard) {
        if lane.cursor.is_some() {
            info!("🔄 Resetting nonce lane for {}", lane.identity());
        }
        *lane.cursor = None;
    }
}
