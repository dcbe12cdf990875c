// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod accounts;
pub mod attestation;
pub mod cli;
pub mod commitment;
pub mod config;
pub mod context;
pub mod contracts;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod prover;
pub mod transactions;

pub use accounts::{AccountRegistry, FundingStatus, Role, SignerHandle};
pub use attestation::{
    AttestationError, AttestationKind, AttestationOrchestrator, AttestationRecord,
    ModelRegistration, Opening, PredictionRecord, PredictionResult, SagaStep, SensorReading,
    SensorSubmission,
};
pub use commitment::{commit, verify_opening, BlindingNonce, Commitment, CommitmentStore, Payload};
pub use config::{NetworkProfile, PipelineConfig};
pub use context::{PipelineContext, SystemStats};
pub use error::{ErrorClass, PipelineError};
pub use ledger::{EthersLedger, LedgerClient};
pub use metrics::SubmissionMetrics;
pub use prover::{CircuitId, InsecureStubProver, ProofArtifact, ProofProvider, RemoteProver};
pub use transactions::{Outcome, Receipt, ReceiptStatus, SignedTransaction, Simulation};
