// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Error taxonomy for the attestation pipeline
//!
//! Each component owns a `thiserror` enum (`StoreError`, `ProverError`,
//! `LedgerError`, `ConfigError`). They are folded into [`PipelineError`],
//! which is what the public operations return.

use ethers::types::H256;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failures of the durable commitment store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("commitment {commitment} not found in local store")]
    CommitmentNotFound { commitment: String },

    #[error("commitment {commitment} already has a stored opening")]
    CommitmentExists { commitment: String },

    #[error("payload and nonce do not open commitment {commitment}")]
    OpeningMismatch { commitment: String },

    #[error("prefix '{prefix}' matches {matches} stored commitments")]
    AmbiguousPrefix { prefix: String, matches: usize },

    #[error("'{prefix}' is not a hex commitment prefix")]
    InvalidPrefix { prefix: String },

    #[error("corrupt store record {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures of a proof provider
#[derive(Debug, Error)]
pub enum ProverError {
    #[error("unknown circuit '{circuit}'")]
    CircuitUnknown { circuit: String },

    #[error("prover unavailable: {reason}")]
    ProverUnavailable { reason: String },

    #[error("circuit {circuit} is missing inputs: {}", missing.join(", "))]
    InvalidInputs { circuit: String, missing: Vec<String> },

    #[error("malformed proof: {reason}")]
    MalformedProof { reason: String },
}

impl ProverError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::ProverUnavailable {
            reason: reason.into(),
        }
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedProof {
            reason: reason.into(),
        }
    }
}

/// Classified failures reported by the ledger node
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("ledger unreachable: {0}")]
    Unavailable(String),

    #[error("ledger rejected request: {reason}")]
    Rejected { reason: String },

    #[error("nonce conflict: {reason}")]
    NonceConflict { reason: String },

    /// The node already holds this exact transaction
    #[error("transaction already known: {reason}")]
    AlreadyKnown { reason: String },

    #[error("execution reverted: {reason}")]
    ExecutionReverted { reason: String },

    #[error("ledger error: {0}")]
    Other(String),
}

/// Startup configuration problems
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing configuration value: {field}")]
    Missing { field: String },

    #[error("invalid configuration value for {field}: {reason}")]
    Invalid { field: String, reason: String },

    #[error("malformed ABI for {contract}: {reason}")]
    MalformedAbi { contract: String, reason: String },

    #[error("ledger chain id {actual} does not match configured chain id {expected}")]
    ChainIdMismatch { expected: u64, actual: u64 },

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConfigError {
    pub fn missing(field: impl Into<String>) -> Self {
        Self::Missing {
            field: field.into(),
        }
    }

    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Coarse grouping used by callers deciding whether to retry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Refused at startup, nothing was attempted
    Configuration,
    /// A collaborator could not be reached
    Connectivity,
    /// The request itself is invalid, retrying will not help
    Validation,
    /// Nonce ordering problem, retry after re-reading the ledger
    Sequencing,
    /// The ledger executed the transaction and reported failure
    LedgerOutcome,
    /// Outcome unknown, query the transaction hash later
    Uncertain,
    Internal,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("payload is not serializable: {reason}")]
    PayloadNotSerializable { reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Prover(#[from] ProverError),

    #[error("identity '{name}' is not registered")]
    IdentityUnknown { name: String },

    #[error("ledger unavailable: {0}")]
    LedgerUnavailable(String),

    #[error("gas estimation failed: {reason}")]
    GasEstimationFailed { reason: String },

    #[error("nonce conflict: {reason}")]
    NonceConflict { reason: String },

    #[error("broadcast rejected: {reason}")]
    BroadcastRejected { reason: String },

    #[error("transaction {tx_hash:?} reverted in block {block_number}")]
    Reverted { tx_hash: H256, block_number: u64 },

    #[error("transaction {tx_hash:?} not confirmed within {timeout:?}")]
    TimedOut { tx_hash: H256, timeout: Duration },

    #[error("refusing insecure stub proof for circuit {circuit}")]
    InsecureProofRefused { circuit: String },

    #[error("event {event} not emitted by {contract} in transaction {tx_hash:?}")]
    MissingEvent {
        contract: String,
        event: String,
        tx_hash: H256,
    },

    #[error("failed to encode call {function}: {reason}")]
    CallEncoding { function: String, reason: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("ledger error: {0}")]
    Ledger(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<LedgerError> for PipelineError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Unavailable(reason) => Self::LedgerUnavailable(reason),
            LedgerError::Rejected { reason } => Self::BroadcastRejected { reason },
            LedgerError::NonceConflict { reason } => Self::NonceConflict { reason },
            LedgerError::AlreadyKnown { reason } => Self::Ledger(reason),
            LedgerError::ExecutionReverted { reason } => Self::GasEstimationFailed { reason },
            LedgerError::Other(reason) => Self::Ledger(reason),
        }
    }
}

impl PipelineError {
    pub fn identity_unknown(name: impl Into<String>) -> Self {
        Self::IdentityUnknown { name: name.into() }
    }

    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest(reason.into())
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Config(_) | Self::InsecureProofRefused { .. } => ErrorClass::Configuration,
            Self::LedgerUnavailable(_) => ErrorClass::Connectivity,
            Self::Prover(ProverError::ProverUnavailable { .. }) => ErrorClass::Connectivity,
            Self::NonceConflict { .. } => ErrorClass::Sequencing,
            Self::Reverted { .. } | Self::MissingEvent { .. } => ErrorClass::LedgerOutcome,
            Self::TimedOut { .. } => ErrorClass::Uncertain,
            Self::PayloadNotSerializable { .. }
            | Self::Store(_)
            | Self::Prover(_)
            | Self::IdentityUnknown { .. }
            | Self::GasEstimationFailed { .. }
            | Self::BroadcastRejected { .. }
            | Self::CallEncoding { .. }
            | Self::InvalidRequest(_) => ErrorClass::Validation,
            Self::Signing(_) | Self::Ledger(_) | Self::Internal(_) => ErrorClass::Internal,
        }
    }

    /// Whether repeating the same operation later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.class(),
            ErrorClass::Connectivity | ErrorClass::Sequencing | ErrorClass::Uncertain
        )
    }

    pub fn is_commitment_not_found(&self) -> bool {
        matches!(self, Self::Store(StoreError::CommitmentNotFound { .. }))
    }
}
