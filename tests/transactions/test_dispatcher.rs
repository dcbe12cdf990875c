// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use crate::common::*;
use commit_attest::contracts::{ContractCall, SUBMIT_SENSOR_DATA};
use commit_attest::error::PipelineError;
use commit_attest::transactions::{Dispatched, Outcome};
use ethers::abi::Token;
use ethers::types::{Address, U256};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn sensor_call(ctx: &commit_attest::PipelineContext, seed: u8) -> ContractCall {
    ctx.contracts
        .registry
        .call(
            SUBMIT_SENSOR_DATA,
            &[
                Token::FixedBytes(vec![seed; 32]),
                Token::String("M".into()),
                Token::Uint(8.into()),
                Token::FixedBytes(vec![0xab; 32]),
                Token::Uint(1.into()),
            ],
        )
        .unwrap()
}

#[tokio::test]
async fn test_nonce_conflict_is_retried_once() {
    let dir = TempDir::new().unwrap();
    let ledger = Arc::new(FakeLedger::new());
    let ctx = test_context(test_config(dir.path()), ledger.clone()).await;
    ledger.inject_nonce_conflicts(1);

    let outcome = ctx
        .dispatcher
        .send("worker", &sensor_call(&ctx, 1), None, Duration::from_secs(1))
        .await
        .unwrap();

    assert!(outcome.is_confirmed());
    assert_eq!(ledger.sent().len(), 1);
    assert_eq!(ctx.metrics.snapshot().nonce_conflicts, 1);
}

#[tokio::test]
async fn test_second_nonce_conflict_surfaces() {
    let dir = TempDir::new().unwrap();
    let ledger = Arc::new(FakeLedger::new());
    let ctx = test_context(test_config(dir.path()), ledger.clone()).await;
    ledger.inject_nonce_conflicts(2);

    let err = ctx
        .dispatcher
        .dispatch("worker", &sensor_call(&ctx, 1), None)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::NonceConflict { .. }));
    assert!(err.is_retryable());
    assert!(ledger.sent().is_empty());
}

#[tokio::test]
async fn test_rejection_resets_lane() {
    let dir = TempDir::new().unwrap();
    let ledger = Arc::new(FakeLedger::new().with_min_gas_price(U256::from(50_000_000_000u64)));
    let ctx = test_context(test_config(dir.path()), ledger.clone()).await;

    let first = ctx
        .dispatcher
        .dispatch("worker", &sensor_call(&ctx, 1), None)
        .await
        .unwrap();
    assert!(matches!(first, Dispatched::Rejected(_)));

    // The refused nonce is not skipped
    let lane = ctx.dispatcher.builder().lock_lane("worker").await.unwrap();
    assert_eq!(lane.cursor(), None);
}

#[tokio::test]
async fn test_concurrent_sends_from_one_identity_are_ordered() {
    let dir = TempDir::new().unwrap();
    let ledger = Arc::new(FakeLedger::new().with_mine_after_polls(1));
    let ctx = test_context(test_config(dir.path()), ledger.clone()).await;
    let wait = Duration::from_secs(2);

    let calls: Vec<ContractCall> = (1..=4).map(|seed| sensor_call(&ctx, seed)).collect();
    let outcomes = futures::future::join_all(
        calls
            .iter()
            .map(|call| ctx.dispatcher.send("worker", call, None, wait)),
    )
    .await;

    for outcome in &outcomes {
        assert!(matches!(outcome, Ok(Outcome::Confirmed(_))));
    }
    let worker: Address = WORKER_ADDRESS.parse().unwrap();
    let mut nonces: Vec<u64> = ledger
        .sent()
        .iter()
        .filter(|tx| tx.from == worker)
        .map(|tx| tx.nonce.as_u64())
        .collect();
    nonces.sort_unstable();
    assert_eq!(nonces, vec![0, 1, 2, 3]);
}

#[tokio::test]
async fn test_identities_have_independent_lanes() {
    let dir = TempDir::new().unwrap();
    let ledger = Arc::new(FakeLedger::new());
    let ctx = test_context(test_config(dir.path()), ledger.clone()).await;
    let call = sensor_call(&ctx, 3);

    let (a, b) = tokio::join!(
        ctx.dispatcher.dispatch("worker", &call, None),
        ctx.dispatcher.dispatch("engineer", &call, None),
    );
    let (Dispatched::Accepted(a), Dispatched::Accepted(b)) = (a.unwrap(), b.unwrap()) else {
        panic!("both broadcasts should be accepted");
    };
    assert_eq!(a.nonce, U256::zero());
    assert_eq!(b.nonce, U256::zero());
    assert_ne!(a.from, b.from);
}
