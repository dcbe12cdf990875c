// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Transaction building, submission and confirmation tracking

pub mod builder;
pub mod dispatcher;
pub mod submitter;

pub use builder::{LaneGuard, TransactionBuilder};
pub use dispatcher::{Dispatched, TransactionDispatcher};
pub use submitter::{Broadcast, Submitter};

use ethers::types::{Address, Bytes, Log, TransactionReceipt, H256, U256};
use ethers::utils::format_ether;
use serde::{Deserialize, Serialize};

/// How the gas price of outgoing transactions is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GasPricePolicy {
    /// Fixed price in wei
    Fixed(U256),
    /// Whatever the node reports for `eth_gasPrice`
    Network,
}

/// A signed transaction ready for broadcast. Serializable so it can be
/// journalled before it is handed to the node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub identity: String,
    pub from: Address,
    pub to: Address,
    pub nonce: U256,
    pub gas_limit: U256,
    pub gas_price: U256,
    pub raw: Bytes,
    pub hash: H256,
}

/// Gas estimate and cost of a call that was not sent
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Simulation {
    pub from: Address,
    pub to: Address,
    pub nonce: U256,
    pub gas_estimate: U256,
    pub gas_limit: U256,
    pub gas_price: U256,
    pub estimated_cost_wei: U256,
    pub estimated_cost_eth: String,
    /// Whether the estimate fits in the gas limit
    pub is_valid: bool,
}

impl Simulation {
    pub fn new(
        from: Address,
        to: Address,
        nonce: U256,
        gas_estimate: U256,
        gas_limit: U256,
        gas_price: U256,
    ) -> Self {
        let estimated_cost_wei = gas_estimate * gas_price;
        Self {
            from,
            to,
            nonce,
            gas_estimate,
            gas_limit,
            gas_price,
            estimated_cost_wei,
            estimated_cost_eth: format_ether(estimated_cost_wei),
            is_valid: gas_estimate <= gas_limit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReceiptStatus {
    Success,
    Reverted,
}

/// The parts of a ledger receipt the pipeline uses
#[derive(Debug, Clone)]
pub struct Receipt {
    pub transaction_hash: H256,
    pub block_number: u64,
    pub gas_used: U256,
    pub status: ReceiptStatus,
    pub logs: Vec<Log>,
}

impl From<TransactionReceipt> for Receipt {
    fn from(receipt: TransactionReceipt) -> Self {
        let status = match receipt.status {
            Some(status) if status.as_u64() == 1 => ReceiptStatus::Success,
            _ => ReceiptStatus::Reverted,
        };
        Self {
            transaction_hash: receipt.transaction_hash,
            block_number: receipt.block_number.map(|n| n.as_u64()).unwrap_or_default(),
            gas_used: receipt.gas_used.unwrap_or_default(),
            status,
            logs: receipt.logs,
        }
    }
}

/// Final result of submitting a transaction
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Included and executed successfully
    Confirmed(Receipt),
    /// Included but execution failed
    Reverted(Receipt),
    /// Not seen included before the deadline. The transaction may still
    /// land; query the hash later.
    TimedOut { tx_hash: H256 },
    /// The node refused the transaction outright
    BroadcastRejected { reason: String },
}

impl Outcome {
    pub fn tx_hash(&self) -> Option<H256> {
        match self {
            Outcome::Confirmed(r) | Outcome::Reverted(r) => Some(r.transaction_hash),
            Outcome::TimedOut { tx_hash } => Some(*tx_hash),
            Outcome::BroadcastRejected { .. } => None,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, Outcome::Confirmed(_))
    }
}
