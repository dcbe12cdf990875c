// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Broadcast and confirmation tracking
//!
//! A broadcast is refused, accepted, or fails with a retryable class
//! (`NonceConflict`, `LedgerUnavailable`). An accepted transaction is polled
//! for its receipt until it has the configured number of confirmations or
//! the deadline passes. A timeout never means failure: the transaction may
//! still be included, and [`Submitter::query_outcome`] answers later.

use super::{Outcome, Receipt, ReceiptStatus, SignedTransaction};
use crate::error::{LedgerError, PipelineError};
use crate::ledger::LedgerClient;
use crate::metrics::SubmissionMetrics;
use ethers::types::{TransactionReceipt, H256};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

/// Node response to a broadcast that did not fail transiently
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Broadcast {
    Accepted(H256),
    Rejected(String),
}

pub struct Submitter {
    ledger: Arc<dyn LedgerClient>,
    poll_interval: Duration,
    confirmations: u64,
    metrics: SubmissionMetrics,
}

impl Submitter {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        poll_interval: Duration,
        confirmations: u64,
        metrics: SubmissionMetrics,
    ) -> Self {
        Self {
            ledger,
            poll_interval,
            confirmations: confirmations.max(1),
            metrics,
        }
    }

    /// Broadcast and wait for the outcome
    pub async fn submit(
        &self,
        signed: &SignedTransaction,
        wait: Duration,
    ) -> Result<Outcome, PipelineError> {
        match self.broadcast(signed).await? {
            Broadcast::Accepted(hash) => self.await_confirmation(hash, wait).await,
            Broadcast::Rejected(reason) => Ok(Outcome::BroadcastRejected { reason }),
        }
    }

    /// Hand the raw transaction to the node
    pub async fn broadcast(&self, signed: &SignedTransaction) -> Result<Broadcast, PipelineError> {
        self.metrics.record_broadcast();
        match self.ledger.send_raw_transaction(signed.raw.clone()).await {
            Ok(hash) => {
                if hash != signed.hash {
                    warn!(
                        "Node reported hash {:?} for transaction {:?}",
                        hash, signed.hash
                    );
                }
                info!(
                    "📤 Broadcast {:?} from {} (nonce {})",
                    hash, signed.identity, signed.nonce
                );
                Ok(Broadcast::Accepted(hash))
            }
            Err(LedgerError::AlreadyKnown { reason }) => {
                info!(
                    "📤 Node already holds {:?} from {} (nonce {}): {}",
                    signed.hash, signed.identity, signed.nonce, reason
                );
                Ok(Broadcast::Accepted(signed.hash))
            }
            Err(LedgerError::NonceConflict { reason }) => {
                self.metrics.record_nonce_conflict();
                warn!(
                    "⚠️ Nonce conflict for {} at nonce {}: {}",
                    signed.identity, signed.nonce, reason
                );
                Err(PipelineError::NonceConflict { reason })
            }
            Err(LedgerError::Unavailable(reason)) => {
                error!("❌ Ledger unavailable during broadcast: {}", reason);
                Err(PipelineError::LedgerUnavailable(reason))
            }
            Err(LedgerError::Rejected { reason })
            | Err(LedgerError::ExecutionReverted { reason })
            | Err(LedgerError::Other(reason)) => {
                self.metrics.record_rejected();
                warn!("❌ Broadcast from {} rejected: {}", signed.identity, reason);
                Ok(Broadcast::Rejected(reason))
            }
        }
    }

    /// Poll for inclusion of `hash` until `wait` elapses
    pub async fn await_confirmation(
        &self,
        hash: H256,
        wait: Duration,
    ) -> Result<Outcome, PipelineError> {
        match timeout(wait, self.poll_until_final(hash)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                self.metrics.record_timed_out();
                warn!("⏱️ Transaction {:?} not confirmed within {:?}", hash, wait);
                Ok(Outcome::TimedOut { tx_hash: hash })
            }
        }
    }

    /// Receipt-based outcome of a previously broadcast transaction, without
    /// waiting. `None` while the ledger has no receipt.
    pub async fn query_outcome(&self, hash: H256) -> Result<Option<Outcome>, PipelineError> {
        let receipt = self.ledger.transaction_receipt(hash).await?;
        Ok(receipt.map(|r| self.classify(r)))
    }

    async fn poll_until_final(&self, hash: H256) -> Result<Outcome, PipelineError> {
        loop {
            match self.ledger.transaction_receipt(hash).await {
                Ok(Some(receipt)) => {
                    if self.is_deep_enough(&receipt).await {
                        return Ok(self.classify(receipt));
                    }
                }
                Ok(None) => debug!("Transaction {:?} still pending", hash),
                // Transient while waiting; the deadline bounds the retries
                Err(e) => warn!("Receipt query for {:?} failed: {}", hash, e),
            }
            sleep(self.poll_interval).await;
        }
    }

    async fn is_deep_enough(&self, receipt: &TransactionReceipt) -> bool {
        if self.confirmations <= 1 {
            return true;
        }
        let Some(included) = receipt.block_number.map(|n| n.as_u64()) else {
            return false;
        };
        match self.ledger.block_number().await {
            Ok(head) => head.saturating_sub(included) + 1 >= self.confirmations,
            Err(e) => {
                debug!("Block number query failed: {}", e);
                false
            }
        }
    }

    fn classify(&self, receipt: TransactionReceipt) -> Outcome {
        let receipt = Receipt::from(receipt);
        match receipt.status {
            ReceiptStatus::Success => {
                self.metrics.record_confirmed();
                info!(
                    "✅ Transaction {:?} confirmed in block {}",
                    receipt.transaction_hash, receipt.block_number
                );
                Outcome::Confirmed(receipt)
            }
            ReceiptStatus::Reverted => {
                self.metrics.record_reverted();
                warn!(
                    "❌ Transaction {:?} reverted in block {}",
                    receipt.transaction_hash, receipt.block_number
                );
                Outcome::Reverted(receipt)
            }
        }
    }
}
