// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Insecure stub prover
//!
//! Returns fixed proof tuples so the pipeline can be exercised against a
//! local verifier that accepts anything. Artifacts are tagged
//! [`ProofBackend::InsecureStub`]; the orchestrator refuses them unless
//! `allow_insecure_prover` is set.

use super::{validate_inputs, CircuitId, NamedInputs, ProofArtifact, ProofBackend, ProofProvider};
use crate::commitment::Commitment;
use crate::error::ProverError;
use async_trait::async_trait;
use ethers::types::U256;
use tracing::{debug, warn};

pub struct InsecureStubProver;

impl InsecureStubProver {
    pub fn new() -> Self {
        warn!("⚠️ InsecureStubProver enabled: proofs are fixed values and verify nothing");
        Self
    }
}

impl Default for InsecureStubProver {
    fn default() -> Self {
        Self::new()
    }
}

fn tuple(a: [u64; 2], b: [[u64; 2]; 2], c: [u64; 2]) -> ([U256; 2], [[U256; 2]; 2], [U256; 2]) {
    let pair = |p: [u64; 2]| [U256::from(p[0]), U256::from(p[1])];
    (pair(a), [pair(b[0]), pair(b[1])], pair(c))
}

fn input_or(inputs: &NamedInputs, name: &str, default: u64) -> U256 {
    inputs.get(name).copied().unwrap_or_else(|| U256::from(default))
}

#[async_trait]
impl ProofProvider for InsecureStubProver {
    fn name(&self) -> &str {
        "insecure-stub"
    }

    fn backend(&self) -> ProofBackend {
        ProofBackend::InsecureStub
    }

    async fn prove(
        &self,
        circuit: CircuitId,
        commitment: Commitment,
        inputs: &NamedInputs,
    ) -> Result<ProofArtifact, ProverError> {
        validate_inputs(circuit, inputs)?;

        let ((a, b, c), public_inputs) = match circuit {
            CircuitId::ModelAccuracy => (
                tuple([123456, 789012], [[111111, 222222], [333333, 444444]], [555555, 666666]),
                vec![input_or(inputs, "accuracy", 9000)],
            ),
            CircuitId::ModelRmse => (
                tuple([777777, 888888], [[999999, 101010], [121212, 131313]], [141414, 151515]),
                vec![input_or(inputs, "rmse", 1000)],
            ),
            CircuitId::SensorValidity => (
                tuple([161616, 171717], [[181818, 191919], [202020, 212121]], [222222, 232323]),
                vec![U256::one()],
            ),
            CircuitId::SensorRange => (
                tuple([242424, 252525], [[262626, 272727], [282828, 292929]], [303030, 313131]),
                vec![U256::one()],
            ),
            CircuitId::PredictionComputation => (
                tuple([323232, 333333], [[343434, 353535], [363636, 373737]], [383838, 393939]),
                vec![input_or(inputs, "rul_prediction", 1000)],
            ),
            CircuitId::PredictionConsistency => (
                tuple([404040, 414141], [[424242, 434343], [444444, 454545]], [464646, 474747]),
                vec![U256::one()],
            ),
        };

        debug!("🧪 Stub proof for {} bound to {}", circuit, commitment);
        Ok(ProofArtifact {
            circuit,
            commitment,
            a,
            b,
            c,
            public_inputs,
            backend: ProofBackend::InsecureStub,
        })
    }
}
