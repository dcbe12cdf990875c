// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Attestation flows
//!
//! Model registration, sensor-data submission and prediction recording,
//! each driven as a journalled saga through commit, store, prove, verifier
//! submission and registry submission.

pub mod journal;
pub mod orchestrator;
pub mod requests;

pub use journal::{Anchored, Claims, Saga, SagaJournal, SagaStage};
pub use orchestrator::AttestationOrchestrator;
pub use requests::{
    ModelRegistration, PredictionRecord, PredictionResult, SensorReading, SensorSubmission,
};

use crate::commitment::{verify_opening, BlindingNonce, Commitment, Payload};
use crate::error::PipelineError;
use chrono::{DateTime, Utc};
use ethers::types::{H256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttestationKind {
    Model,
    Sensor,
    Prediction,
}

impl fmt::Display for AttestationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AttestationKind::Model => "model",
            AttestationKind::Sensor => "sensor",
            AttestationKind::Prediction => "prediction",
        })
    }
}

/// Step of a flow, named in errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SagaStep {
    Commit,
    Store,
    Prove,
    SubmitProof,
    Register,
    Record,
}

impl fmt::Display for SagaStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SagaStep::Commit => "commit",
            SagaStep::Store => "store",
            SagaStep::Prove => "prove",
            SagaStep::SubmitProof => "submit_proof",
            SagaStep::Register => "register",
            SagaStep::Record => "record",
        })
    }
}

/// A failed flow step. Work done by earlier steps is kept.
#[derive(Debug, Error)]
#[error("{step} step failed: {source}")]
pub struct AttestationError {
    pub step: SagaStep,
    pub commitment: Option<Commitment>,
    pub tx_hash: Option<H256>,
    #[source]
    pub source: PipelineError,
}

impl AttestationError {
    pub fn new(step: SagaStep, source: impl Into<PipelineError>) -> Self {
        Self {
            step,
            commitment: None,
            tx_hash: None,
            source: source.into(),
        }
    }

    pub fn with_commitment(mut self, commitment: Commitment) -> Self {
        self.commitment = Some(commitment);
        self
    }

    pub fn with_tx(mut self, tx_hash: Option<H256>) -> Self {
        self.tx_hash = tx_hash.or(self.tx_hash);
        self
    }

    /// Whether resuming the saga later may succeed
    pub fn is_retryable(&self) -> bool {
        self.source.is_retryable()
    }
}

/// Completed attestation, kept for later reveal
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttestationRecord {
    pub kind: AttestationKind,
    pub identity: String,
    pub commitment: Commitment,
    /// Input commitment of a prediction
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_commitment: Option<Commitment>,
    pub proof_id: U256,
    pub entity_id: U256,
    pub verifier_tx: H256,
    pub registry_tx: H256,
    pub block_number: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anchored_at: Option<DateTime<Utc>>,
}

/// Payload and nonce behind a commitment
#[derive(Debug, Clone)]
pub struct Opening {
    pub commitment: Commitment,
    pub payload: Payload,
    pub nonce: BlindingNonce,
}

impl Opening {
    /// Re-derive the digest and compare
    pub fn verify(&self) -> bool {
        verify_opening(&self.commitment, &self.payload, &self.nonce)
    }
}
