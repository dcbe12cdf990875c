// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Saga journal
//!
//! Every stage transition of an attestation is written to
//! `<store_dir>/sagas/<commitment>.json` before the next step starts.
//! A pending stage is written with the signed transaction before it is
//! broadcast, so a resumed saga re-queries the ledger by hash and, if the
//! node never saw it, re-sends the same bytes under the same nonce.

use super::AttestationKind;
use crate::commitment::Commitment;
use crate::error::StoreError;
use crate::prover::ProofArtifact;
use crate::transactions::SignedTransaction;
use chrono::{DateTime, Utc};
use ethers::types::{H256, U256};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

const SAGAS_DIR: &str = "sagas";

/// Scaled public claims of an attestation, everything needed to rebuild
/// its circuit inputs and registry call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Claims {
    Model {
        model_type: String,
        domain_type: String,
        accuracy: U256,
        rmse: U256,
    },
    Sensor {
        machine_type: String,
        data_count: U256,
        metadata_hash: H256,
        air_temp: U256,
        process_temp: U256,
        rotational_speed: U256,
        torque: U256,
        tool_wear: U256,
    },
    Prediction {
        model_id: U256,
        sensor_data_id: U256,
        model_commitment: Commitment,
        input_commitment: Commitment,
        rul: U256,
        failure_probability: U256,
        confidence_score: U256,
    },
}

impl Claims {
    pub fn kind(&self) -> AttestationKind {
        match self {
            Claims::Model { .. } => AttestationKind::Model,
            Claims::Sensor { .. } => AttestationKind::Sensor,
            Claims::Prediction { .. } => AttestationKind::Prediction,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum SagaStage {
    Committed,
    Proved {
        proofs: [ProofArtifact; 2],
    },
    VerifierPending {
        proofs: [ProofArtifact; 2],
        tx: SignedTransaction,
    },
    VerifierSubmitted {
        proof_id: U256,
        verifier_tx: H256,
    },
    RegistryPending {
        proof_id: U256,
        verifier_tx: H256,
        tx: SignedTransaction,
    },
    Completed(Anchored),
}

/// Ledger coordinates of a completed attestation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anchored {
    pub proof_id: U256,
    pub verifier_tx: H256,
    pub registry_tx: H256,
    pub entity_id: U256,
    pub block_number: u64,
}

impl SagaStage {
    pub fn name(&self) -> &'static str {
        match self {
            SagaStage::Committed => "committed",
            SagaStage::Proved { .. } => "proved",
            SagaStage::VerifierPending { .. } => "verifier_pending",
            SagaStage::VerifierSubmitted { .. } => "verifier_submitted",
            SagaStage::RegistryPending { .. } => "registry_pending",
            SagaStage::Completed(_) => "completed",
        }
    }

    /// Hash of the transaction awaiting confirmation, if any
    pub fn pending_tx(&self) -> Option<H256> {
        self.pending_signed().map(|tx| tx.hash)
    }

    pub fn pending_signed(&self) -> Option<&SignedTransaction> {
        match self {
            SagaStage::VerifierPending { tx, .. } | SagaStage::RegistryPending { tx, .. } => Some(tx),
            _ => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, SagaStage::Completed(_))
    }
}

/// Durable state of one attestation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Saga {
    /// Primary commitment; the output commitment for predictions
    pub commitment: Commitment,
    pub identity: String,
    pub claims: Claims,
    #[serde(flatten)]
    pub stage: SagaStage,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Saga {
    pub fn new(commitment: Commitment, identity: &str, claims: Claims) -> Self {
        let now = Utc::now();
        Self {
            commitment,
            identity: identity.to_string(),
            claims,
            stage: SagaStage::Committed,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn kind(&self) -> AttestationKind {
        self.claims.kind()
    }
}

#[derive(Debug, Clone)]
pub struct SagaJournal {
    dir: PathBuf,
}

impl SagaJournal {
    pub async fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = root.as_ref().join(SAGAS_DIR);
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn path_for(&self, commitment: &Commitment) -> PathBuf {
        self.dir.join(format!("{}.json", commitment.to_hex()))
    }

    /// Atomically replace the journal entry of `saga`
    pub async fn save(&self, saga: &mut Saga) -> Result<(), StoreError> {
        saga.updated_at = Utc::now();
        let path = self.path_for(&saga.commitment);
        let bytes = serde_json::to_vec_pretty(&*saga).map_err(|e| StoreError::Corrupt {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        let dir = self.dir.clone();

        tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
            let mut tmp = NamedTempFile::new_in(&dir)?;
            tmp.write_all(&bytes)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&path).map_err(|e| StoreError::Io(e.error))?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))??;

        debug!("📝 Saga {} -> {}", saga.commitment, saga.stage.name());
        Ok(())
    }

    pub async fn load(&self, commitment: &Commitment) -> Result<Option<Saga>, StoreError> {
        let path = self.path_for(commitment);
        match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| StoreError::Corrupt {
                    path,
                    reason: e.to_string(),
                }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    /// All journalled sagas, oldest first
    pub async fn list(&self) -> Result<Vec<Saga>, StoreError> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut sagas = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(stem) = name.to_str().and_then(|n| n.strip_suffix(".json")) else {
                continue;
            };
            let Ok(commitment) = stem.parse::<Commitment>() else {
                continue;
            };
            if let Some(saga) = self.load(&commitment).await? {
                sagas.push(saga);
            }
        }
        sagas.sort_by_key(|s| s.created_at);
        Ok(sagas)
    }

    /// Sagas that have not completed
    pub async fn pending(&self) -> Result<Vec<Saga>, StoreError> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|s| !s.stage.is_completed())
            .collect())
    }
}
