// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Local Commitment Store
//!
//! Durable record of `commitment -> (payload, nonce)` openings. One JSON file
//! per commitment under `<root>/commitments/`. New records are written to a
//! temp file in the same directory and persisted with no-clobber semantics,
//! so a record is either fully present or absent and is never overwritten.

use super::generator::{verify_opening, Payload};
use super::{BlindingNonce, Commitment};
use crate::error::StoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const COMMITMENTS_DIR: &str = "commitments";

/// Statistics about store usage since it was opened
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    pub records: usize,
    pub writes: u64,
    pub hits: u64,
    pub misses: u64,
    pub purged: u64,
}

/// A stored opening
#[derive(Debug, Clone)]
pub struct StoreRecord {
    pub commitment: Commitment,
    pub payload: Payload,
    pub nonce: BlindingNonce,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum StoredPayload {
    Bytes { hex: String },
    Record { value: Value },
}

#[derive(Serialize, Deserialize)]
struct StoredRecord {
    commitment: Commitment,
    payload: StoredPayload,
    nonce: BlindingNonce,
    created_at: DateTime<Utc>,
}

impl From<&Payload> for StoredPayload {
    fn from(payload: &Payload) -> Self {
        match payload {
            Payload::Bytes(bytes) => StoredPayload::Bytes {
                hex: hex::encode(bytes),
            },
            Payload::Record(value) => StoredPayload::Record {
                value: value.clone(),
            },
        }
    }
}

impl StoredPayload {
    fn into_payload(self) -> Result<Payload, String> {
        match self {
            StoredPayload::Bytes { hex } => hex::decode(hex)
                .map(Payload::Bytes)
                .map_err(|e| format!("invalid payload hex: {}", e)),
            StoredPayload::Record { value } => Ok(Payload::Record(value)),
        }
    }
}

/// File-backed commitment store
#[derive(Clone)]
pub struct CommitmentStore {
    dir: PathBuf,
    stats: Arc<RwLock<StoreStats>>,
}

impl CommitmentStore {
    /// Open (creating if needed) the store rooted at `root` and index any
    /// records already on disk.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = root.as_ref().join(COMMITMENTS_DIR);
        tokio::fs::create_dir_all(&dir).await?;

        let store = Self {
            dir,
            stats: Arc::new(RwLock::new(StoreStats::default())),
        };
        let existing = store.list().await?.len();
        store.stats.write().await.records = existing;

        info!(
            "📂 Commitment store opened at {} ({} records)",
            store.dir.display(),
            existing
        );
        Ok(store)
    }

    /// Path of the record for `commitment`, whether or not it exists
    pub fn path_for(&self, commitment: &Commitment) -> PathBuf {
        self.dir.join(format!("{}.json", commitment.to_hex()))
    }

    /// Durably record an opening. Fails with `CommitmentExists` if the
    /// commitment is already stored and with `OpeningMismatch` if the
    /// payload and nonce do not open it.
    pub async fn put(
        &self,
        commitment: &Commitment,
        payload: &Payload,
        nonce: &BlindingNonce,
    ) -> Result<StoreRecord, StoreError> {
        if !verify_opening(commitment, payload, nonce) {
            return Err(StoreError::OpeningMismatch {
                commitment: commitment.to_string(),
            });
        }

        let record = StoreRecord {
            commitment: *commitment,
            payload: payload.clone(),
            nonce: nonce.clone(),
            created_at: Utc::now(),
        };
        let stored = StoredRecord {
            commitment: *commitment,
            payload: StoredPayload::from(payload),
            nonce: nonce.clone(),
            created_at: record.created_at,
        };
        let bytes = serde_json::to_vec_pretty(&stored).map_err(|e| StoreError::Corrupt {
            path: self.path_for(commitment),
            reason: e.to_string(),
        })?;

        let dir = self.dir.clone();
        let path = self.path_for(commitment);
        let label = commitment.to_string();
        tokio::task::spawn_blocking(move || write_new(&dir, &path, &bytes, label))
            .await
            .map_err(|e| StoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))??;

        let mut stats = self.stats.write().await;
        stats.records += 1;
        stats.writes += 1;
        drop(stats);

        debug!("📥 Stored opening for {}", commitment);
        Ok(record)
    }

    /// Payload and nonce recorded for `commitment`
    pub async fn get(
        &self,
        commitment: &Commitment,
    ) -> Result<(Payload, BlindingNonce), StoreError> {
        let record = self.record(commitment).await?;
        Ok((record.payload, record.nonce))
    }

    /// Full record for `commitment`
    pub async fn record(&self, commitment: &Commitment) -> Result<StoreRecord, StoreError> {
        let path = self.path_for(commitment);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.stats.write().await.misses += 1;
                return Err(StoreError::CommitmentNotFound {
                    commitment: commitment.to_string(),
                });
            }
            Err(e) => return Err(StoreError::Io(e)),
        };

        let stored: StoredRecord =
            serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupt {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        if &stored.commitment != commitment {
            return Err(StoreError::Corrupt {
                path,
                reason: format!("record holds {}", stored.commitment),
            });
        }
        let payload = stored
            .payload
            .into_payload()
            .map_err(|reason| StoreError::Corrupt {
                path: path.clone(),
                reason,
            })?;

        self.stats.write().await.hits += 1;
        Ok(StoreRecord {
            commitment: stored.commitment,
            payload,
            nonce: stored.nonce,
            created_at: stored.created_at,
        })
    }

    pub async fn contains(&self, commitment: &Commitment) -> bool {
        tokio::fs::try_exists(self.path_for(commitment))
            .await
            .unwrap_or(false)
    }

    /// Explicitly delete a stored opening
    pub async fn purge(&self, commitment: &Commitment) -> Result<(), StoreError> {
        match tokio::fs::remove_file(self.path_for(commitment)).await {
            Ok(()) => {
                let mut stats = self.stats.write().await;
                stats.records = stats.records.saturating_sub(1);
                stats.purged += 1;
                drop(stats);
                warn!("🗑️ Purged opening for {}", commitment);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::CommitmentNotFound {
                    commitment: commitment.to_string(),
                })
            }
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    /// All stored commitments, sorted
    pub async fn list(&self) -> Result<Vec<Commitment>, StoreError> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut commitments = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(stem) = name.to_str().and_then(|n| n.strip_suffix(".json")) else {
                continue;
            };
            if let Ok(commitment) = stem.parse::<Commitment>() {
                commitments.push(commitment);
            }
        }
        commitments.sort();
        Ok(commitments)
    }

    /// Resolve a unique hex prefix (with or without `0x`) to a commitment
    pub async fn resolve_prefix(&self, prefix: &str) -> Result<Commitment, StoreError> {
        let needle = prefix
            .strip_prefix("0x")
            .unwrap_or(prefix)
            .to_ascii_lowercase();
        if needle.is_empty() || !needle.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(StoreError::InvalidPrefix {
                prefix: prefix.to_string(),
            });
        }

        let matches: Vec<Commitment> = self
            .list()
            .await?
            .into_iter()
            .filter(|c| c.to_hex().starts_with(&needle))
            .collect();
        match matches.as_slice() {
            [single] => Ok(*single),
            [] => Err(StoreError::CommitmentNotFound {
                commitment: prefix.to_string(),
            }),
            many => Err(StoreError::AmbiguousPrefix {
                prefix: prefix.to_string(),
                matches: many.len(),
            }),
        }
    }

    pub async fn get_stats(&self) -> StoreStats {
        self.stats.read().await.clone()
    }
}

fn write_new(dir: &Path, path: &Path, bytes: &[u8], label: String) -> Result<(), StoreError> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist_noclobber(path).map_err(|e| {
        if e.error.kind() == std::io::ErrorKind::AlreadyExists {
            StoreError::CommitmentExists { commitment: label }
        } else {
            StoreError::Io(e.error)
        }
    })?;
    Ok(())
}
