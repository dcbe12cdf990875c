// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use super::test_flows::model_request;
use crate::common::*;
use async_trait::async_trait;
use commit_attest::attestation::{AttestationOrchestrator, SagaStage, SagaStep};
use commit_attest::commitment::Commitment;
use commit_attest::contracts::abi::{REGISTRY_ABI, VERIFIER_ABI};
use commit_attest::contracts::{REGISTER_MODEL, SUBMIT_MODEL_PROOF};
use commit_attest::error::{LedgerError, PipelineError};
use commit_attest::ledger::LedgerClient;
use ethers::abi::Token;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, TransactionReceipt, H256, U256};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Ledger whose next broadcasts fail with a connection reset. With
/// `deliver`, the transaction reaches the node before the answer is lost.
struct ResettingLedger {
    inner: Arc<FakeLedger>,
    resets: AtomicU32,
    deliver: bool,
}

impl ResettingLedger {
    fn new(inner: Arc<FakeLedger>, resets: u32, deliver: bool) -> Self {
        Self {
            inner,
            resets: AtomicU32::new(resets),
            deliver,
        }
    }
}

#[async_trait]
impl LedgerClient for ResettingLedger {
    async fn chain_id(&self) -> Result<u64, LedgerError> {
        self.inner.chain_id().await
    }

    async fn block_number(&self) -> Result<u64, LedgerError> {
        self.inner.block_number().await
    }

    async fn transaction_count(&self, address: Address) -> Result<U256, LedgerError> {
        self.inner.transaction_count(address).await
    }

    async fn balance(&self, address: Address) -> Result<U256, LedgerError> {
        self.inner.balance(address).await
    }

    async fn gas_price(&self) -> Result<U256, LedgerError> {
        self.inner.gas_price().await
    }

    async fn estimate_gas(&self, tx: &TypedTransaction) -> Result<U256, LedgerError> {
        self.inner.estimate_gas(tx).await
    }

    async fn call(&self, tx: &TypedTransaction) -> Result<Bytes, LedgerError> {
        self.inner.call(tx).await
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256, LedgerError> {
        let reset = self
            .resets
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if !reset {
            return self.inner.send_raw_transaction(raw).await;
        }
        if self.deliver {
            self.inner.send_raw_transaction(raw).await?;
        }
        Err(LedgerError::Unavailable("connection reset".into()))
    }

    async fn transaction_receipt(
        &self,
        hash: H256,
    ) -> Result<Option<TransactionReceipt>, LedgerError> {
        self.inner.transaction_receipt(hash).await
    }

    async fn block_timestamp(&self, number: u64) -> Result<Option<u64>, LedgerError> {
        self.inner.block_timestamp(number).await
    }
}

fn verifier_sends(ledger: &FakeLedger) -> usize {
    let selector = selector_of(VERIFIER_ABI, SUBMIT_MODEL_PROOF);
    ledger
        .sent()
        .iter()
        .filter(|tx| tx.selector() == selector)
        .count()
}

#[tokio::test]
async fn test_timed_out_submission_resumes_without_resending() {
    let dir = TempDir::new().unwrap();
    let ledger = Arc::new(
        FakeLedger::new()
            .with_contract_events()
            .with_mine_after_polls(u32::MAX),
    );
    let mut config = test_config(dir.path());
    config.confirmation_timeout_secs = 1;

    let ctx = test_context(config.clone(), ledger.clone()).await;
    let orch = AttestationOrchestrator::new(ctx).await.unwrap();
    let err = orch.register_model(model_request()).await.unwrap_err();

    assert_eq!(err.step, SagaStep::SubmitProof);
    assert!(matches!(err.source, PipelineError::TimedOut { .. }));
    assert!(err.is_retryable());
    let pending_tx = err.tx_hash.unwrap();
    let commitment = err.commitment.unwrap();
    let saga = orch.saga(&commitment).await.unwrap().unwrap();
    assert!(matches!(
        saga.stage,
        SagaStage::VerifierPending { ref tx, .. } if tx.hash == pending_tx
    ));
    drop(orch);

    // The transaction lands while no process is watching
    ledger.set_mine_after_polls(0);
    ledger.mine_all();

    let ctx = test_context(config, ledger.clone()).await;
    let orch = AttestationOrchestrator::new(ctx).await.unwrap();
    assert_eq!(orch.pending().await.unwrap().len(), 1);
    let record = orch.resume(&commitment).await.unwrap();

    assert_eq!(record.verifier_tx, pending_tx);
    assert_eq!(ledger.sent().len(), 2);
    assert_eq!(ledger.sent()[1].nonce, U256::from(1));
    assert!(orch.pending().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_completed_records_reload_on_restart() {
    let dir = TempDir::new().unwrap();
    let ledger = Arc::new(FakeLedger::new().with_contract_events());
    let config = test_config(dir.path());

    let record = {
        let ctx = test_context(config.clone(), ledger.clone()).await;
        let orch = AttestationOrchestrator::new(ctx).await.unwrap();
        orch.register_model(model_request()).await.unwrap()
    };

    let ctx = test_context(config, ledger.clone()).await;
    let orch = AttestationOrchestrator::new(ctx).await.unwrap();
    let reloaded = orch.record(&record.commitment).await.unwrap();
    assert_eq!(reloaded.entity_id, record.entity_id);
    assert_eq!(reloaded.registry_tx, record.registry_tx);

    // Resuming a completed saga sends nothing
    let resumed = orch.resume(&record.commitment).await.unwrap();
    assert_eq!(resumed.entity_id, record.entity_id);
    assert_eq!(ledger.sent().len(), 2);
}

#[tokio::test]
async fn test_resume_unknown_commitment() {
    let dir = TempDir::new().unwrap();
    let ledger = Arc::new(FakeLedger::new());
    let ctx = test_context(test_config(dir.path()), ledger).await;
    let orch = AttestationOrchestrator::new(ctx).await.unwrap();

    let err = orch
        .resume(&Commitment::from_bytes([0x11; 32]))
        .await
        .unwrap_err();
    assert!(err.source.is_commitment_not_found());
}

#[tokio::test]
async fn test_refused_saga_resumes_once_allowed() {
    let dir = TempDir::new().unwrap();
    let ledger = Arc::new(FakeLedger::new().with_contract_events());
    let mut config = test_config(dir.path());
    config.allow_insecure_prover = false;

    let ctx = test_context(config.clone(), ledger.clone()).await;
    let orch = AttestationOrchestrator::new(ctx).await.unwrap();
    let commitment = orch
        .register_model(model_request())
        .await
        .unwrap_err()
        .commitment
        .unwrap();

    config.allow_insecure_prover = true;
    let ctx = test_context(config, ledger.clone()).await;
    let orch = AttestationOrchestrator::new(ctx).await.unwrap();
    let record = orch.resume(&commitment).await.unwrap();
    assert_eq!(record.commitment, commitment);
    assert_eq!(ledger.sent().len(), 2);
}

#[tokio::test]
async fn test_lost_broadcast_answer_is_not_sent_twice() {
    let dir = TempDir::new().unwrap();
    let fake = Arc::new(FakeLedger::new().with_contract_events());
    let ledger = Arc::new(ResettingLedger::new(fake.clone(), 1, true));
    let ctx = test_context_over(test_config(dir.path()), ledger).await;
    let orch = AttestationOrchestrator::new(ctx).await.unwrap();

    let err = orch.register_model(model_request()).await.unwrap_err();

    assert_eq!(err.step, SagaStep::SubmitProof);
    assert!(matches!(err.source, PipelineError::LedgerUnavailable(_)));
    assert!(err.is_retryable());
    let delivered = fake.sent();
    assert_eq!(delivered.len(), 1);
    assert_eq!(err.tx_hash, Some(delivered[0].hash));

    let commitment = err.commitment.unwrap();
    let saga = orch.saga(&commitment).await.unwrap().unwrap();
    assert_eq!(saga.stage.pending_tx(), Some(delivered[0].hash));

    let record = orch.resume(&commitment).await.unwrap();
    assert_eq!(record.verifier_tx, delivered[0].hash);
    assert_eq!(verifier_sends(&fake), 1);
    assert_eq!(fake.sent().len(), 2);
    assert_eq!(fake.sent()[1].nonce, U256::from(1));
}

#[tokio::test]
async fn test_undelivered_transaction_is_resent_verbatim() {
    let dir = TempDir::new().unwrap();
    let fake = Arc::new(FakeLedger::new().with_contract_events());
    let config = test_config(dir.path());

    let (commitment, journalled) = {
        let ledger = Arc::new(ResettingLedger::new(fake.clone(), 1, false));
        let ctx = test_context_over(config.clone(), ledger).await;
        let orch = AttestationOrchestrator::new(ctx).await.unwrap();
        let err = orch.register_model(model_request()).await.unwrap_err();
        (err.commitment.unwrap(), err.tx_hash.unwrap())
    };
    assert!(fake.sent().is_empty());

    // Restart: a fresh process has no lane state
    let ctx = test_context(config, fake.clone()).await;
    let orch = AttestationOrchestrator::new(ctx).await.unwrap();
    let record = orch.resume(&commitment).await.unwrap();

    let sent = fake.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].hash, journalled);
    assert_eq!(sent[0].nonce, U256::zero());
    assert_eq!(record.verifier_tx, journalled);
}

#[tokio::test]
async fn test_pooled_transaction_is_awaited_after_restart() {
    let dir = TempDir::new().unwrap();
    let fake = Arc::new(
        FakeLedger::new()
            .with_contract_events()
            .with_mine_after_polls(u32::MAX),
    );
    let mut config = test_config(dir.path());
    config.confirmation_timeout_secs = 1;

    let commitment = {
        let ctx = test_context(config.clone(), fake.clone()).await;
        let orch = AttestationOrchestrator::new(ctx).await.unwrap();
        let err = orch.register_model(model_request()).await.unwrap_err();
        assert!(matches!(err.source, PipelineError::TimedOut { .. }));
        err.commitment.unwrap()
    };
    fake.set_mine_after_polls(0);

    let ctx = test_context(config, fake.clone()).await;
    let orch = AttestationOrchestrator::new(ctx).await.unwrap();
    let miner = {
        let fake = fake.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            fake.mine_all();
        })
    };
    let record = orch.resume(&commitment).await.unwrap();
    miner.await.unwrap();

    // The node still held the first submission, so it was not re-queued
    assert_eq!(verifier_sends(&fake), 1);
    assert_eq!(record.verifier_tx, fake.sent()[0].hash);
}

#[tokio::test]
async fn test_spent_nonce_rolls_back_to_resign() {
    let dir = TempDir::new().unwrap();
    let fake = Arc::new(FakeLedger::new().with_contract_events());
    let config = test_config(dir.path());

    let commitment = {
        let ledger = Arc::new(ResettingLedger::new(fake.clone(), 1, false));
        let ctx = test_context_over(config.clone(), ledger).await;
        let orch = AttestationOrchestrator::new(ctx).await.unwrap();
        orch.register_model(model_request())
            .await
            .unwrap_err()
            .commitment
            .unwrap()
    };

    // Another sender takes the engineer's nonce 0 meanwhile
    let ctx = test_context(config, fake.clone()).await;
    let other = ctx
        .contracts
        .registry
        .call(
            REGISTER_MODEL,
            &[
                Token::FixedBytes(vec![7u8; 32]),
                Token::String("GRU".into()),
                Token::String("predictive_maintenance".into()),
                Token::Uint(9000.into()),
                Token::Uint(500.into()),
                Token::Uint(9.into()),
            ],
        )
        .unwrap();
    ctx.dispatcher
        .send("engineer", &other, None, Duration::from_secs(1))
        .await
        .unwrap();

    let orch = AttestationOrchestrator::new(ctx).await.unwrap();
    let err = orch.resume(&commitment).await.unwrap_err();
    assert!(matches!(err.source, PipelineError::NonceConflict { .. }));
    assert!(err.is_retryable());
    let saga = orch.saga(&commitment).await.unwrap().unwrap();
    assert!(matches!(saga.stage, SagaStage::Proved { .. }));

    let record = orch.resume(&commitment).await.unwrap();
    assert_eq!(verifier_sends(&fake), 1);
    let verifier_tx = fake
        .sent()
        .into_iter()
        .find(|tx| tx.selector() == selector_of(VERIFIER_ABI, SUBMIT_MODEL_PROOF))
        .unwrap();
    assert_eq!(verifier_tx.nonce, U256::from(1));
    assert_eq!(record.verifier_tx, verifier_tx.hash);
}

#[tokio::test]
async fn test_concurrent_resumes_drive_one_flow() {
    let dir = TempDir::new().unwrap();
    let ledger = Arc::new(FakeLedger::new().with_contract_events());
    let ctx = test_context(test_config(dir.path()), ledger.clone()).await;
    let orch = AttestationOrchestrator::new(ctx).await.unwrap();
    ledger.revert_on(selector_of(REGISTRY_ABI, REGISTER_MODEL));

    let commitment = orch
        .register_model(model_request())
        .await
        .unwrap_err()
        .commitment
        .unwrap();
    ledger.clear_reverts();

    let (first, second) = tokio::join!(orch.resume(&commitment), orch.resume(&commitment));
    let (first, second) = (first.unwrap(), second.unwrap());

    assert_eq!(first.entity_id, second.entity_id);
    assert_eq!(first.registry_tx, second.registry_tx);
    // verifier, reverted registry call, one registry retry
    assert_eq!(ledger.sent().len(), 3);
}
