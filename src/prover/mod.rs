// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Zero-knowledge proof providers
//!
//! The orchestrator only sees [`ProofProvider`]. Production deployments use
//! [`RemoteProver`], which talks to a snarkjs-backed proving service.
//! [`InsecureStubProver`] returns fixed demo tuples and marks its artifacts
//! as insecure so they can be refused downstream.

pub mod remote;
pub mod stub;

pub use remote::RemoteProver;
pub use stub::InsecureStubProver;

use crate::commitment::{BlindingNonce, Commitment};
use crate::config::PipelineConfig;
use crate::error::{ConfigError, ProverError};
use async_trait::async_trait;
use ethers::abi::Token;
use ethers::types::U256;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Named circuit inputs, each a field element
pub type NamedInputs = BTreeMap<String, U256>;

/// BN254 scalar field modulus, little-endian limbs
const BN254_SCALAR_MODULUS: U256 = U256([
    0x43e1_f593_f000_0001,
    0x2833_e848_79b9_7091,
    0xb850_45b6_8181_585d,
    0x3064_4e72_e131_a029,
]);

/// Reduce a 32-byte value into the BN254 scalar field
pub fn field_element(bytes: &[u8; 32]) -> U256 {
    U256::from_big_endian(bytes) % BN254_SCALAR_MODULUS
}

pub fn commitment_input(commitment: &Commitment) -> U256 {
    field_element(commitment.as_bytes())
}

pub fn nonce_input(nonce: &BlindingNonce) -> U256 {
    field_element(nonce.as_bytes())
}

/// Known circuits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitId {
    ModelAccuracy,
    ModelRmse,
    SensorValidity,
    SensorRange,
    PredictionComputation,
    PredictionConsistency,
}

impl CircuitId {
    pub const ALL: [CircuitId; 6] = [
        CircuitId::ModelAccuracy,
        CircuitId::ModelRmse,
        CircuitId::SensorValidity,
        CircuitId::SensorRange,
        CircuitId::PredictionComputation,
        CircuitId::PredictionConsistency,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitId::ModelAccuracy => "model_accuracy",
            CircuitId::ModelRmse => "model_rmse",
            CircuitId::SensorValidity => "sensor_validity",
            CircuitId::SensorRange => "sensor_range",
            CircuitId::PredictionComputation => "prediction_computation",
            CircuitId::PredictionConsistency => "prediction_consistency",
        }
    }

    /// Input names the circuit requires
    pub fn required_inputs(&self) -> &'static [&'static str] {
        match self {
            CircuitId::ModelAccuracy => &["model_commitment", "accuracy", "nonce"],
            CircuitId::ModelRmse => &["model_commitment", "rmse", "nonce"],
            CircuitId::SensorValidity | CircuitId::SensorRange => &[
                "data_commitment",
                "air_temp",
                "process_temp",
                "rotational_speed",
                "torque",
                "tool_wear",
                "nonce",
            ],
            CircuitId::PredictionComputation | CircuitId::PredictionConsistency => &[
                "input_commitment",
                "output_commitment",
                "model_commitment",
                "rul_prediction",
                "failure_probability",
                "input_nonce",
                "output_nonce",
            ],
        }
    }
}

impl fmt::Display for CircuitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CircuitId {
    type Err = ProverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CircuitId::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| ProverError::CircuitUnknown {
                circuit: s.to_string(),
            })
    }
}

/// Check that every input the circuit needs is present
pub fn validate_inputs(circuit: CircuitId, inputs: &NamedInputs) -> Result<(), ProverError> {
    let missing: Vec<String> = circuit
        .required_inputs()
        .iter()
        .filter(|name| !inputs.contains_key(**name))
        .map(|name| name.to_string())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ProverError::InvalidInputs {
            circuit: circuit.to_string(),
            missing,
        })
    }
}

/// Which kind of backend produced an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProofBackend {
    Remote,
    InsecureStub,
}

/// Groth16 proof in the layout the on-chain verifier expects
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProofArtifact {
    pub circuit: CircuitId,
    pub commitment: Commitment,
    pub a: [U256; 2],
    pub b: [[U256; 2]; 2],
    pub c: [U256; 2],
    pub public_inputs: Vec<U256>,
    pub backend: ProofBackend,
}

impl ProofArtifact {
    pub fn is_insecure(&self) -> bool {
        self.backend == ProofBackend::InsecureStub
    }

    /// ABI arguments `(uint256[2], uint256[2][2], uint256[2], uint256[])`
    pub fn to_tokens(&self) -> Vec<Token> {
        let pair = |p: &[U256; 2]| Token::FixedArray(vec![Token::Uint(p[0]), Token::Uint(p[1])]);
        vec![
            pair(&self.a),
            Token::FixedArray(vec![pair(&self.b[0]), pair(&self.b[1])]),
            pair(&self.c),
            Token::Array(self.public_inputs.iter().copied().map(Token::Uint).collect()),
        ]
    }
}

/// Produces proofs for named circuits
#[async_trait]
pub trait ProofProvider: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    fn backend(&self) -> ProofBackend;

    /// Prove `circuit` over `inputs`, binding the artifact to `commitment`
    async fn prove(
        &self,
        circuit: CircuitId,
        commitment: Commitment,
        inputs: &NamedInputs,
    ) -> Result<ProofArtifact, ProverError>;
}

/// Build the configured provider: remote when a prover URL is set, otherwise
/// the stub, which must be explicitly allowed.
pub fn from_config(config: &PipelineConfig) -> Result<Arc<dyn ProofProvider>, ConfigError> {
    match &config.prover_url {
        Some(url) => {
            let timeout = Duration::from_secs(config.prover_timeout_secs);
            Ok(Arc::new(RemoteProver::new(url, timeout)?))
        }
        None if config.allow_insecure_prover => Ok(Arc::new(InsecureStubProver::new())),
        None => Err(ConfigError::invalid(
            "prover_url",
            "no prover configured; set prover_url or allow_insecure_prover",
        )),
    }
}
