// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Commitment generation
//!
//! A commitment is `sha256(canonical(payload) || nonce)`. Structured records
//! are canonicalised as compact JSON with object keys sorted at every depth,
//! so equal records always hash equally regardless of field order.

use super::{BlindingNonce, Commitment};
use crate::error::PipelineError;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Data being committed to
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Raw bytes, hashed verbatim
    Bytes(Vec<u8>),
    /// Structured record, hashed in canonical JSON form
    Record(Value),
}

impl Payload {
    /// Build a record payload from any serializable value
    pub fn from_serializable<T: Serialize + ?Sized>(value: &T) -> Result<Self, PipelineError> {
        serde_json::to_value(value)
            .map(Payload::Record)
            .map_err(|e| PipelineError::PayloadNotSerializable {
                reason: e.to_string(),
            })
    }

    /// Parse a JSON document into a record. `Ok(None)` when the bytes are
    /// not JSON. Integers beyond 64 bits are refused since a record would
    /// only keep them as floats.
    pub fn from_json_slice(bytes: &[u8]) -> Result<Option<Self>, PipelineError> {
        let Ok(value) = serde_json::from_slice::<Value>(bytes) else {
            return Ok(None);
        };
        if let Some(literal) = oversized_integer(bytes) {
            return Err(PipelineError::PayloadNotSerializable {
                reason: format!(
                    "integer {} does not fit in 64 bits; encode it as a string",
                    literal
                ),
            });
        }
        Ok(Some(Payload::Record(value)))
    }

    /// Deterministic byte encoding fed to the hash
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, PipelineError> {
        match self {
            Payload::Bytes(bytes) => Ok(bytes.clone()),
            Payload::Record(value) => {
                let mut out = Vec::new();
                write_canonical(value, &mut out).map_err(|e| {
                    PipelineError::PayloadNotSerializable {
                        reason: e.to_string(),
                    }
                })?;
                Ok(out)
            }
        }
    }

    pub fn as_record(&self) -> Option<&Value> {
        match self {
            Payload::Record(value) => Some(value),
            Payload::Bytes(_) => None,
        }
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Record(value)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Bytes(bytes)
    }
}

fn write_canonical(value: &Value, out: &mut Vec<u8>) -> Result<(), serde_json::Error> {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));
            out.push(b'{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                serde_json::to_writer(&mut *out, key)?;
                out.push(b':');
                write_canonical(item, out)?;
            }
            out.push(b'}');
        }
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(item, out)?;
            }
            out.push(b']');
        }
        scalar => serde_json::to_writer(&mut *out, scalar)?,
    }
    Ok(())
}

/// Commitment of `payload` under a specific nonce
pub fn derive_commitment(
    payload: &Payload,
    nonce: &BlindingNonce,
) -> Result<Commitment, PipelineError> {
    let mut hasher = Sha256::new();
    hasher.update(payload.canonical_bytes()?);
    hasher.update(nonce.as_bytes());
    Ok(Commitment::from_bytes(hasher.finalize().into()))
}

/// Commit to `payload` under a fresh random nonce.
///
/// The returned nonce is the only way to open the commitment later; callers
/// hand both to the [`CommitmentStore`](super::CommitmentStore).
pub fn commit(payload: &Payload) -> Result<(Commitment, BlindingNonce), PipelineError> {
    let nonce = BlindingNonce::random();
    let commitment = derive_commitment(payload, &nonce)?;
    Ok((commitment, nonce))
}

/// Check that `(payload, nonce)` opens `commitment`
pub fn verify_opening(commitment: &Commitment, payload: &Payload, nonce: &BlindingNonce) -> bool {
    derive_commitment(payload, nonce)
        .map(|derived| &derived == commitment)
        .unwrap_or(false)
}

/// SHA-256 of a record's canonical encoding, without blinding
pub fn content_hash(value: &Value) -> Result<[u8; 32], PipelineError> {
    let bytes = Payload::Record(value.clone()).canonical_bytes()?;
    Ok(Sha256::digest(bytes).into())
}

/// First integer literal of a valid JSON document that neither `i64` nor
/// `u64` can hold
fn oversized_integer(json: &[u8]) -> Option<String> {
    let mut in_string = false;
    let mut escaped = false;
    let mut i = 0;
    while i < json.len() {
        let b = json[i];
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            i += 1;
            continue;
        }
        if b == b'"' {
            in_string = true;
            i += 1;
            continue;
        }
        if b == b'-' || b.is_ascii_digit() {
            let start = i;
            while i < json.len() && matches!(json[i], b'-' | b'+' | b'.' | b'e' | b'E' | b'0'..=b'9') {
                i += 1;
            }
            let literal = String::from_utf8_lossy(&json[start..i]);
            let integral = !literal.contains(['.', 'e', 'E']);
            if integral && literal.parse::<i64>().is_err() && literal.parse::<u64>().is_err() {
                return Some(literal.into_owned());
            }
            continue;
        }
        i += 1;
    }
    None
}
