// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Explicit dependency bundle handed to the orchestrator and the CLI

use crate::accounts::{AccountRegistry, FundingStatus};
use crate::commitment::CommitmentStore;
use crate::config::PipelineConfig;
use crate::contracts::{self, ContractCall, ContractSet};
use crate::error::{ConfigError, PipelineError};
use crate::ledger::{EthersLedger, LedgerClient};
use crate::metrics::SubmissionMetrics;
use crate::prover::{self, ProofProvider};
use crate::transactions::{Simulation, Submitter, TransactionBuilder, TransactionDispatcher};
use ethers::types::U256;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Registry counters and identity balances at one block. A counter is
/// `None` when the registry ABI does not expose it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemStats {
    pub block_number: u64,
    pub total_users: Option<U256>,
    pub engineer_count: Option<U256>,
    pub data_counter: Option<U256>,
    pub model_counter: Option<U256>,
    pub balances: BTreeMap<String, U256>,
}

#[derive(Clone)]
pub struct PipelineContext {
    pub config: Arc<PipelineConfig>,
    pub ledger: Arc<dyn LedgerClient>,
    pub accounts: Arc<AccountRegistry>,
    pub contracts: Arc<ContractSet>,
    pub prover: Arc<dyn ProofProvider>,
    pub store: CommitmentStore,
    pub dispatcher: Arc<TransactionDispatcher>,
    pub metrics: SubmissionMetrics,
}

impl PipelineContext {
    /// Connect to the configured JSON-RPC endpoint and prover
    pub async fn connect(config: PipelineConfig) -> Result<Self, PipelineError> {
        let ledger = EthersLedger::new(&config.rpc_url, config.poll_interval())?;
        let prover = prover::from_config(&config)?;
        Self::from_parts(config, Arc::new(ledger), prover).await
    }

    /// Assemble a context from already-built collaborators. The ledger's
    /// chain id must match the configured one.
    pub async fn from_parts(
        config: PipelineConfig,
        ledger: Arc<dyn LedgerClient>,
        prover: Arc<dyn ProofProvider>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;

        let chain_id = ledger.chain_id().await?;
        if let Some(expected) = config.expected_chain_id() {
            if expected != chain_id {
                return Err(ConfigError::ChainIdMismatch {
                    expected,
                    actual: chain_id,
                }
                .into());
            }
        }

        let accounts = Arc::new(AccountRegistry::from_config(&config.identities, chain_id)?);
        let contracts = Arc::new(ContractSet::from_config(&config)?);
        let store = CommitmentStore::open(&config.store_dir).await?;
        let metrics = SubmissionMetrics::new();

        let builder = Arc::new(TransactionBuilder::new(
            ledger.clone(),
            accounts.clone(),
            config.gas_price_policy(),
            config.gas_margin_percent,
        ));
        let submitter = Arc::new(Submitter::new(
            ledger.clone(),
            config.poll_interval(),
            config.confirmations,
            metrics.clone(),
        ));
        let dispatcher = Arc::new(TransactionDispatcher::new(builder, submitter));

        if prover.backend() == prover::ProofBackend::InsecureStub && !config.allow_insecure_prover {
            warn!("⚠️ Stub prover configured without allow_insecure_prover; attestations will be refused");
        }

        info!(
            "✅ Pipeline connected: chain {} ({:?}), prover {}, verifier {:?}, registry {:?}",
            chain_id,
            config.network,
            prover.name(),
            contracts.verifier.address(),
            contracts.registry.address()
        );

        Ok(Self {
            config: Arc::new(config),
            ledger,
            accounts,
            contracts,
            prover,
            store,
            dispatcher,
            metrics,
        })
    }

    pub async fn balance_of(&self, name: &str) -> Result<U256, PipelineError> {
        self.accounts.balance_of(self.ledger.as_ref(), name).await
    }

    /// Balances of all identities, with underfunded ones flagged. On
    /// operator-funded networks they are also listed in a warning.
    pub async fn preflight(&self) -> Result<Vec<FundingStatus>, PipelineError> {
        let report = self
            .accounts
            .preflight(self.ledger.as_ref(), self.config.min_balance())
            .await?;
        if self.config.network.operator_funded() {
            let underfunded: Vec<&str> = report
                .iter()
                .filter(|s| !s.sufficient)
                .map(|s| s.name.as_str())
                .collect();
            if !underfunded.is_empty() {
                warn!(
                    "⚠️ Fund these identities before submitting: {}",
                    underfunded.join(", ")
                );
            }
        }
        Ok(report)
    }

    /// Estimate gas and cost of `call` as `identity` without sending it
    pub async fn simulate(
        &self,
        identity: &str,
        call: &ContractCall,
        gas_limit: Option<U256>,
    ) -> Result<Simulation, PipelineError> {
        self.dispatcher
            .builder()
            .simulate(identity, call, gas_limit)
            .await
    }

    pub async fn system_stats(&self) -> Result<SystemStats, PipelineError> {
        let block_number = self.ledger.block_number().await?;
        let registry = &self.contracts.registry;
        let mut counters = Vec::with_capacity(4);
        for function in [
            contracts::TOTAL_USERS,
            contracts::ENGINEER_COUNT,
            contracts::DATA_COUNTER,
            contracts::MODEL_COUNTER,
        ] {
            let value = if registry.has_function(function) {
                Some(registry.read_uint(self.ledger.as_ref(), function).await?)
            } else {
                debug!("Registry ABI has no {}", function);
                None
            };
            counters.push(value);
        }

        let mut balances = BTreeMap::new();
        for name in self.accounts.names() {
            let balance = self.accounts.balance_of(self.ledger.as_ref(), &name).await?;
            balances.insert(name, balance);
        }

        Ok(SystemStats {
            block_number,
            total_users: counters[0],
            engineer_count: counters[1],
            data_counter: counters[2],
            model_counter: counters[3],
            balances,
        })
    }
}
