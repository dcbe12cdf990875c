// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use super::test_flows::model_request;
use crate::common::*;
use commit_attest::attestation::{AttestationOrchestrator, SagaStage, SagaStep};
use commit_attest::contracts::abi::{REGISTRY_ABI, VERIFIER_ABI};
use commit_attest::contracts::{REGISTER_MODEL, SUBMIT_MODEL_PROOF};
use commit_attest::error::PipelineError;
use ethers::types::U256;
use std::sync::Arc;
use tempfile::TempDir;

#[tokio::test]
async fn test_stub_proofs_refused_unless_allowed() {
    let dir = TempDir::new().unwrap();
    let ledger = Arc::new(FakeLedger::new().with_contract_events());
    let mut config = test_config(dir.path());
    config.allow_insecure_prover = false;
    let ctx = test_context(config, ledger.clone()).await;
    let orch = AttestationOrchestrator::new(ctx).await.unwrap();

    let err = orch.register_model(model_request()).await.unwrap_err();

    assert_eq!(err.step, SagaStep::Prove);
    assert!(matches!(err.source, PipelineError::InsecureProofRefused { .. }));
    assert!(!err.is_retryable());
    assert!(ledger.sent().is_empty());

    // The commitment and its opening are kept
    let commitment = err.commitment.unwrap();
    assert!(orch.context().store.contains(&commitment).await);
    let saga = orch.saga(&commitment).await.unwrap().unwrap();
    assert_eq!(saga.stage, SagaStage::Committed);
    assert_eq!(orch.pending().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_invalid_request_stores_nothing() {
    let dir = TempDir::new().unwrap();
    let ledger = Arc::new(FakeLedger::new().with_contract_events());
    let ctx = test_context(test_config(dir.path()), ledger.clone()).await;
    let orch = AttestationOrchestrator::new(ctx).await.unwrap();

    let mut request = model_request();
    request.accuracy = 1.5;
    let err = orch.register_model(request).await.unwrap_err();

    assert_eq!(err.step, SagaStep::Commit);
    assert!(matches!(err.source, PipelineError::InvalidRequest(_)));
    assert!(err.commitment.is_none());
    assert!(orch.context().store.list().await.unwrap().is_empty());
    assert!(ledger.sent().is_empty());
}

#[tokio::test]
async fn test_registry_revert_keeps_submitted_proof() {
    let dir = TempDir::new().unwrap();
    let ledger = Arc::new(FakeLedger::new().with_contract_events());
    let ctx = test_context(test_config(dir.path()), ledger.clone()).await;
    let orch = AttestationOrchestrator::new(ctx).await.unwrap();
    ledger.revert_on(selector_of(REGISTRY_ABI, REGISTER_MODEL));

    let err = orch.register_model(model_request()).await.unwrap_err();

    assert_eq!(err.step, SagaStep::Register);
    assert!(matches!(err.source, PipelineError::Reverted { .. }));
    let reverted_tx = err.tx_hash.unwrap();
    let commitment = err.commitment.unwrap();

    let saga = orch.saga(&commitment).await.unwrap().unwrap();
    let verifier_tx = match saga.stage {
        SagaStage::VerifierSubmitted {
            proof_id,
            verifier_tx,
        } => {
            assert_eq!(proof_id, U256::from(1));
            verifier_tx
        }
        other => panic!("expected VerifierSubmitted, got {:?}", other),
    };

    ledger.clear_reverts();
    let record = orch.resume(&commitment).await.unwrap();

    assert_eq!(record.verifier_tx, verifier_tx);
    assert_ne!(record.registry_tx, reverted_tx);
    let verifier_sends = ledger
        .sent()
        .iter()
        .filter(|tx| tx.selector() == selector_of(VERIFIER_ABI, SUBMIT_MODEL_PROOF))
        .count();
    assert_eq!(verifier_sends, 1);
    assert_eq!(ledger.sent().len(), 3);

    let metrics = orch.context().metrics.snapshot();
    assert_eq!(metrics.reverted, 1);
    assert_eq!(metrics.attestations_failed, 1);
    assert_eq!(metrics.attestations_completed, 1);
}

#[tokio::test]
async fn test_verifier_revert_returns_to_proved() {
    let dir = TempDir::new().unwrap();
    let ledger = Arc::new(FakeLedger::new().with_contract_events());
    let ctx = test_context(test_config(dir.path()), ledger.clone()).await;
    let orch = AttestationOrchestrator::new(ctx).await.unwrap();
    ledger.revert_on(selector_of(VERIFIER_ABI, SUBMIT_MODEL_PROOF));

    let err = orch.register_model(model_request()).await.unwrap_err();

    assert_eq!(err.step, SagaStep::SubmitProof);
    assert!(matches!(err.source, PipelineError::Reverted { .. }));
    let saga = orch.saga(&err.commitment.unwrap()).await.unwrap().unwrap();
    assert!(matches!(saga.stage, SagaStage::Proved { .. }));
    assert_eq!(ledger.sent().len(), 1);
}

#[tokio::test]
async fn test_rejected_broadcast_keeps_proofs() {
    let dir = TempDir::new().unwrap();
    let ledger = Arc::new(
        FakeLedger::new()
            .with_contract_events()
            .with_min_gas_price(U256::from(100_000_000_000u64)),
    );
    let ctx = test_context(test_config(dir.path()), ledger.clone()).await;
    let orch = AttestationOrchestrator::new(ctx).await.unwrap();

    let err = orch.register_model(model_request()).await.unwrap_err();

    assert_eq!(err.step, SagaStep::SubmitProof);
    assert!(matches!(err.source, PipelineError::BroadcastRejected { .. }));
    assert!(err.tx_hash.is_none());
    let saga = orch.saga(&err.commitment.unwrap()).await.unwrap().unwrap();
    match saga.stage {
        SagaStage::Proved { proofs } => {
            assert!(proofs.iter().all(|p| p.commitment == saga.commitment));
        }
        other => panic!("expected Proved, got {:?}", other),
    }
}
