// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Ledger access
//!
//! [`LedgerClient`] is the narrow RPC surface the pipeline needs. The
//! production implementation wraps an ethers `Provider<Http>`; tests supply
//! in-memory ledgers. Node error messages are classified once, here, into
//! [`LedgerError`] so the rest of the crate never inspects strings.

use crate::error::{ConfigError, LedgerError};
use async_trait::async_trait;
use ethers::providers::{Http, Middleware, Provider, ProviderError, RpcError};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, BlockId, BlockNumber, Bytes, TransactionReceipt, H256, U256};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn chain_id(&self) -> Result<u64, LedgerError>;

    async fn block_number(&self) -> Result<u64, LedgerError>;

    /// Transaction count including pending transactions
    async fn transaction_count(&self, address: Address) -> Result<U256, LedgerError>;

    async fn balance(&self, address: Address) -> Result<U256, LedgerError>;

    async fn gas_price(&self) -> Result<U256, LedgerError>;

    async fn estimate_gas(&self, tx: &TypedTransaction) -> Result<U256, LedgerError>;

    /// Execute a read-only call against the latest block
    async fn call(&self, tx: &TypedTransaction) -> Result<Bytes, LedgerError>;

    /// Broadcast a signed transaction, returning the node-reported hash
    async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256, LedgerError>;

    async fn transaction_receipt(
        &self,
        hash: H256,
    ) -> Result<Option<TransactionReceipt>, LedgerError>;

    /// Unix timestamp of a block, if the block exists
    async fn block_timestamp(&self, number: u64) -> Result<Option<u64>, LedgerError>;
}

/// Map a node's JSON-RPC error message to a ledger error class
pub fn classify_rpc_message(message: &str) -> LedgerError {
    let lower = message.to_ascii_lowercase();
    let reason = message.to_string();

    if lower.contains("already known")
        || lower.contains("already imported")
        || lower.contains("known transaction")
    {
        LedgerError::AlreadyKnown { reason }
    } else if lower.contains("nonce too low")
        || lower.contains("replacement transaction underpriced")
        || lower.contains("correct nonce")
        || lower.contains("nonce has already been used")
    {
        LedgerError::NonceConflict { reason }
    } else if lower.contains("execution reverted") || lower.contains("revert") {
        LedgerError::ExecutionReverted { reason }
    } else {
        LedgerError::Rejected { reason }
    }
}

fn classify_provider_error(err: ProviderError) -> LedgerError {
    if let Some(response) = err.as_error_response() {
        return classify_rpc_message(&response.message);
    }
    match err {
        // Transport failures surface as client errors without a JSON-RPC body
        ProviderError::JsonRpcClientError(_) | ProviderError::HTTPError(_) => {
            LedgerError::Unavailable(err.to_string())
        }
        other => LedgerError::Other(other.to_string()),
    }
}

/// [`LedgerClient`] over HTTP JSON-RPC
#[derive(Clone)]
pub struct EthersLedger {
    provider: Arc<Provider<Http>>,
}

impl EthersLedger {
    pub fn new(rpc_url: &str, polling_interval: Duration) -> Result<Self, ConfigError> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| ConfigError::invalid("rpc_url", e.to_string()))?
            .interval(polling_interval);
        Ok(Self {
            provider: Arc::new(provider),
        })
    }

    pub fn provider(&self) -> Arc<Provider<Http>> {
        self.provider.clone()
    }
}

#[async_trait]
impl LedgerClient for EthersLedger {
    async fn chain_id(&self) -> Result<u64, LedgerError> {
        let chain_id = self
            .provider
            .get_chainid()
            .await
            .map_err(classify_provider_error)?;
        Ok(chain_id.as_u64())
    }

    async fn block_number(&self) -> Result<u64, LedgerError> {
        let number = self
            .provider
            .get_block_number()
            .await
            .map_err(classify_provider_error)?;
        Ok(number.as_u64())
    }

    async fn transaction_count(&self, address: Address) -> Result<U256, LedgerError> {
        self.provider
            .get_transaction_count(address, Some(BlockId::Number(BlockNumber::Pending)))
            .await
            .map_err(classify_provider_error)
    }

    async fn balance(&self, address: Address) -> Result<U256, LedgerError> {
        self.provider
            .get_balance(address, None)
            .await
            .map_err(classify_provider_error)
    }

    async fn gas_price(&self) -> Result<U256, LedgerError> {
        self.provider
            .get_gas_price()
            .await
            .map_err(classify_provider_error)
    }

    async fn estimate_gas(&self, tx: &TypedTransaction) -> Result<U256, LedgerError> {
        self.provider
            .estimate_gas(tx, None)
            .await
            .map_err(classify_provider_error)
    }

    async fn call(&self, tx: &TypedTransaction) -> Result<Bytes, LedgerError> {
        self.provider
            .call(tx, None)
            .await
            .map_err(classify_provider_error)
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256, LedgerError> {
        let pending = self
            .provider
            .send_raw_transaction(raw)
            .await
            .map_err(classify_provider_error)?;
        let hash = pending.tx_hash();
        debug!("📤 Raw transaction accepted by node: {:?}", hash);
        Ok(hash)
    }

    async fn transaction_receipt(
        &self,
        hash: H256,
    ) -> Result<Option<TransactionReceipt>, LedgerError> {
        self.provider
            .get_transaction_receipt(hash)
            .await
            .map_err(classify_provider_error)
    }

    async fn block_timestamp(&self, number: u64) -> Result<Option<u64>, LedgerError> {
        let block = self
            .provider
            .get_block(number)
            .await
            .map_err(classify_provider_error)?;
        Ok(block.map(|b| b.timestamp.as_u64()))
    }
}
