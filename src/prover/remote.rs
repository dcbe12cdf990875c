// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! HTTP client for a snarkjs proving service
//!
//! `POST {endpoint}/prove` with `{"circuit": "...", "inputs": {name: "decimal"}}`
//! returns the snarkjs `groth16.fullProve` result:
//! `{"proof": {"pi_a": [..], "pi_b": [[..],[..]], "pi_c": [..]}, "publicSignals": [..]}`.

use super::{validate_inputs, CircuitId, NamedInputs, ProofArtifact, ProofBackend, ProofProvider};
use crate::commitment::Commitment;
use crate::error::{ConfigError, ProverError};
use async_trait::async_trait;
use ethers::types::U256;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
struct SnarkjsProof {
    pi_a: Vec<String>,
    pi_b: Vec<Vec<String>>,
    pi_c: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ProveResponse {
    proof: SnarkjsProof,
    #[serde(rename = "publicSignals")]
    public_signals: Vec<String>,
}

pub struct RemoteProver {
    client: Client,
    endpoint: String,
}

impl RemoteProver {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, ConfigError> {
        url::Url::parse(endpoint).map_err(|e| ConfigError::invalid("prover_url", e.to_string()))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::invalid("prover_url", e.to_string()))?;

        let endpoint = endpoint.trim_end_matches('/').to_string();
        info!("Remote prover configured: endpoint={}", endpoint);
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Check if the proving service answers
    pub async fn health_check(&self) -> bool {
        match self
            .client
            .get(format!("{}/health", self.endpoint))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!("Prover health check failed: {}", e);
                false
            }
        }
    }
}

fn parse_field(value: &str, what: &str) -> Result<U256, ProverError> {
    U256::from_dec_str(value)
        .map_err(|e| ProverError::malformed(format!("{} '{}': {}", what, value, e)))
}

fn parse_pair(values: &[String], what: &str) -> Result<[U256; 2], ProverError> {
    // snarkjs emits projective points with a trailing "1"
    if values.len() < 2 {
        return Err(ProverError::malformed(format!(
            "{} has {} coordinates",
            what,
            values.len()
        )));
    }
    Ok([parse_field(&values[0], what)?, parse_field(&values[1], what)?])
}

/// Convert snarkjs output to verifier layout. The G2 point `pi_b` has its
/// coordinate pairs swapped for the Solidity pairing precompile.
fn artifact_from_response(
    circuit: CircuitId,
    commitment: Commitment,
    response: ProveResponse,
) -> Result<ProofArtifact, ProverError> {
    let proof = response.proof;
    if proof.pi_b.len() < 2 {
        return Err(ProverError::malformed("pi_b must hold two coordinate pairs"));
    }
    let b0 = parse_pair(&proof.pi_b[0], "pi_b[0]")?;
    let b1 = parse_pair(&proof.pi_b[1], "pi_b[1]")?;

    let public_inputs = response
        .public_signals
        .iter()
        .map(|s| parse_field(s, "public signal"))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ProofArtifact {
        circuit,
        commitment,
        a: parse_pair(&proof.pi_a, "pi_a")?,
        b: [[b0[1], b0[0]], [b1[1], b1[0]]],
        c: parse_pair(&proof.pi_c, "pi_c")?,
        public_inputs,
        backend: ProofBackend::Remote,
    })
}

#[async_trait]
impl ProofProvider for RemoteProver {
    fn name(&self) -> &str {
        "remote"
    }

    fn backend(&self) -> ProofBackend {
        ProofBackend::Remote
    }

    async fn prove(
        &self,
        circuit: CircuitId,
        commitment: Commitment,
        inputs: &NamedInputs,
    ) -> Result<ProofArtifact, ProverError> {
        validate_inputs(circuit, inputs)?;

        let encoded: BTreeMap<&str, String> = inputs
            .iter()
            .map(|(name, value)| (name.as_str(), value.to_string()))
            .collect();
        let body = serde_json::json!({
            "circuit": circuit.as_str(),
            "inputs": encoded,
        });

        let url = format!("{}/prove", self.endpoint);
        debug!("Prover POST {} circuit={}", url, circuit);

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProverError::unavailable(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ProverError::CircuitUnknown {
                circuit: circuit.to_string(),
            });
        }
        if status.is_server_error() {
            let text = response.text().await.unwrap_or_default();
            warn!("❌ Prover returned {}: {}", status, text);
            return Err(ProverError::unavailable(format!("{}: {}", status, text)));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProverError::malformed(format!(
                "prover returned {}: {}",
                status, text
            )));
        }

        let parsed: ProveResponse = response
            .json()
            .await
            .map_err(|e| ProverError::malformed(e.to_string()))?;
        let artifact = artifact_from_response(circuit, commitment, parsed)?;
        info!("✅ Proof generated for {} ({})", circuit, commitment);
        Ok(artifact)
    }
}
