// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Serialized build and broadcast per identity
//!
//! The identity's nonce lane is held from nonce selection until the node
//! has answered the broadcast, then released before waiting for
//! confirmation. Submissions from one identity are therefore ordered, while
//! distinct identities proceed in parallel.
//!
//! Callers that must record a transaction before it reaches the node use
//! [`TransactionDispatcher::sign`] and [`TransactionDispatcher::broadcast_signed`]
//! directly. A broadcast whose answer was lost keeps the lane cursor: the
//! node may hold the transaction, so its nonce is not handed out again.

use super::builder::{LaneGuard, TransactionBuilder};
use super::submitter::{Broadcast, Submitter};
use super::{Outcome, SignedTransaction};
use crate::contracts::ContractCall;
use crate::error::PipelineError;
use ethers::types::{H256, U256};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Broadcast result with the transaction that was sent
#[derive(Debug, Clone)]
pub enum Dispatched {
    Accepted(SignedTransaction),
    Rejected(String),
}

pub struct TransactionDispatcher {
    builder: Arc<TransactionBuilder>,
    submitter: Arc<Submitter>,
}

impl TransactionDispatcher {
    pub fn new(builder: Arc<TransactionBuilder>, submitter: Arc<Submitter>) -> Self {
        Self { builder, submitter }
    }

    pub fn builder(&self) -> &TransactionBuilder {
        &self.builder
    }

    pub fn submitter(&self) -> &Submitter {
        &self.submitter
    }

    /// Build, sign and broadcast `call` as `identity`. A nonce conflict is
    /// retried once with a nonce re-read from the ledger.
    pub async fn dispatch(
        &self,
        identity: &str,
        call: &ContractCall,
        gas_limit_hint: Option<U256>,
    ) -> Result<Dispatched, PipelineError> {
        let mut lane = self.builder.lock_lane(identity).await?;
        let mut retried = false;

        loop {
            let signed = self
                .builder
                .build_locked(&mut lane, call, gas_limit_hint)
                .await?;

            match self.broadcast_signed(&mut lane, &signed).await {
                Ok(Broadcast::Accepted(_)) => return Ok(Dispatched::Accepted(signed)),
                Ok(Broadcast::Rejected(reason)) => return Ok(Dispatched::Rejected(reason)),
                Err(PipelineError::NonceConflict { reason }) if !retried => {
                    warn!(
                        "🔁 Retrying {}.{} for {} after nonce conflict: {}",
                        call.contract, call.function, identity, reason
                    );
                    retried = true;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Lock `identity`'s lane and sign `call` without broadcasting. The lane
    /// stays held until the guard is dropped.
    pub async fn sign(
        &self,
        identity: &str,
        call: &ContractCall,
        gas_limit_hint: Option<U256>,
    ) -> Result<(LaneGuard, SignedTransaction), PipelineError> {
        let mut lane = self.builder.lock_lane(identity).await?;
        let signed = self
            .builder
            .build_locked(&mut lane, call, gas_limit_hint)
            .await?;
        Ok((lane, signed))
    }

    /// Broadcast a transaction signed under `lane`. Refusals and nonce
    /// conflicts reset the lane; transport failures leave it as is.
    pub async fn broadcast_signed(
        &self,
        lane: &mut LaneGuard,
        signed: &SignedTransaction,
    ) -> Result<Broadcast, PipelineError> {
        match self.submitter.broadcast(signed).await {
            Ok(Broadcast::Rejected(reason)) => {
                self.builder.reset_lane(lane);
                Ok(Broadcast::Rejected(reason))
            }
            Err(e @ PipelineError::NonceConflict { .. }) => {
                self.builder.reset_lane(lane);
                Err(e)
            }
            other => other,
        }
    }

    /// Hand an already signed transaction to the node again under its
    /// identity's lane
    pub async fn rebroadcast(&self, signed: &SignedTransaction) -> Result<Broadcast, PipelineError> {
        let mut lane = self.builder.lock_lane(&signed.identity).await?;
        self.broadcast_signed(&mut lane, signed).await
    }

    /// Dispatch and wait for the outcome
    pub async fn send(
        &self,
        identity: &str,
        call: &ContractCall,
        gas_limit_hint: Option<U256>,
        wait: Duration,
    ) -> Result<Outcome, PipelineError> {
        match self.dispatch(identity, call, gas_limit_hint).await? {
            Dispatched::Accepted(signed) => self.submitter.await_confirmation(signed.hash, wait).await,
            Dispatched::Rejected(reason) => Ok(Outcome::BroadcastRejected { reason }),
        }
    }

    pub async fn await_confirmation(
        &self,
        hash: H256,
        wait: Duration,
    ) -> Result<Outcome, PipelineError> {
        self.submitter.await_confirmation(hash, wait).await
    }
}
