// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use crate::common::*;
use async_trait::async_trait;
use commit_attest::accounts::{AccountRegistry, Role};
use commit_attest::contracts::{ContractCall, REGISTER_MODEL};
use commit_attest::error::{LedgerError, PipelineError};
use commit_attest::ledger::LedgerClient;
use commit_attest::transactions::{GasPricePolicy, TransactionBuilder};
use ethers::abi::Token;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, TransactionReceipt, H256, U256};
use ethers::utils::rlp::Rlp;
use mockall::mock;
use std::sync::Arc;
use tempfile::TempDir;

mock! {
    pub Ledger {}

    #[async_trait]
    impl LedgerClient for Ledger {
        async fn chain_id(&self) -> Result<u64, LedgerError>;
        async fn block_number(&self) -> Result<u64, LedgerError>;
        async fn transaction_count(&self, address: Address) -> Result<U256, LedgerError>;
        async fn balance(&self, address: Address) -> Result<U256, LedgerError>;
        async fn gas_price(&self) -> Result<U256, LedgerError>;
        async fn estimate_gas(&self, tx: &TypedTransaction) -> Result<U256, LedgerError>;
        async fn call(&self, tx: &TypedTransaction) -> Result<Bytes, LedgerError>;
        async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256, LedgerError>;
        async fn transaction_receipt(&self, hash: H256) -> Result<Option<TransactionReceipt>, LedgerError>;
        async fn block_timestamp(&self, number: u64) -> Result<Option<u64>, LedgerError>;
    }
}

fn register_call(ctx: &commit_attest::PipelineContext) -> ContractCall {
    ctx.contracts
        .registry
        .call(
            REGISTER_MODEL,
            &[
                Token::FixedBytes(vec![1u8; 32]),
                Token::String("LSTM".into()),
                Token::String("predictive_maintenance".into()),
                Token::Uint(9500.into()),
                Token::Uint(420.into()),
                Token::Uint(1.into()),
            ],
        )
        .unwrap()
}

#[tokio::test]
async fn test_sequential_builds_use_consecutive_nonces() {
    let dir = TempDir::new().unwrap();
    let ledger = Arc::new(FakeLedger::new());
    let engineer: Address = ENGINEER_ADDRESS.parse().unwrap();
    ledger.set_nonce(engineer, 7);

    let ctx = test_context(test_config(dir.path()), ledger.clone()).await;
    let call = register_call(&ctx);
    let builder = ctx.dispatcher.builder();

    let first = builder.build_and_sign("engineer", &call, None).await.unwrap();
    let second = builder.build_and_sign("engineer", &call, None).await.unwrap();

    assert_eq!(first.nonce, U256::from(7));
    assert_eq!(second.nonce, U256::from(8));
    assert_ne!(first.hash, second.hash);
    assert_eq!(first.from, engineer);
}

#[tokio::test]
async fn test_signed_bytes_carry_chain_and_signer() {
    let dir = TempDir::new().unwrap();
    let ledger = Arc::new(FakeLedger::new());
    let ctx = test_context(test_config(dir.path()), ledger.clone()).await;
    let call = register_call(&ctx);

    let signed = ctx
        .dispatcher
        .builder()
        .build_and_sign("worker", &call, None)
        .await
        .unwrap();

    let (tx, signature) = TypedTransaction::decode_signed(&Rlp::new(&signed.raw)).unwrap();
    let worker: Address = WORKER_ADDRESS.parse().unwrap();
    assert_eq!(signature.recover(tx.sighash()).unwrap(), worker);
    assert_eq!(tx.chain_id().map(|c| c.as_u64()), Some(CHAIN_ID));
    assert_eq!(tx.to_addr(), Some(&registry_address()));

    // 20 gwei fixed price and a 20% margin over the fake estimate
    let estimate = 100_000 + 16 * call.data.len() as u64;
    assert_eq!(signed.gas_limit, U256::from(estimate * 120 / 100));
    assert_eq!(signed.gas_price, U256::from(20_000_000_000u64));
}

#[tokio::test]
async fn test_gas_hint_skips_estimation() {
    let dir = TempDir::new().unwrap();
    let ledger = Arc::new(FakeLedger::new());
    let ctx = test_context(test_config(dir.path()), ledger.clone()).await;
    let call = register_call(&ctx);
    ledger.revert_estimate_on(call.selector());

    let signed = ctx
        .dispatcher
        .builder()
        .build_and_sign("engineer", &call, Some(U256::from(300_000)))
        .await
        .unwrap();
    assert_eq!(signed.gas_limit, U256::from(300_000));
}

#[tokio::test]
async fn test_unknown_identity_touches_no_ledger() {
    // No expectations: any ledger call panics
    let ledger = Arc::new(MockLedger::new());
    let accounts = Arc::new(
        AccountRegistry::from_config(&[identity("engineer", Role::Engineer, ENGINEER_KEY)], CHAIN_ID)
            .unwrap(),
    );
    let builder = TransactionBuilder::new(
        ledger,
        accounts,
        GasPricePolicy::Fixed(U256::from(20_000_000_000u64)),
        20,
    );
    let call = ContractCall {
        contract: "registry".into(),
        target: registry_address(),
        function: REGISTER_MODEL.into(),
        data: Bytes::from(vec![0u8; 4]),
    };

    let err = builder.build_and_sign("ghost", &call, None).await.unwrap_err();
    assert!(matches!(err, PipelineError::IdentityUnknown { ref name } if name == "ghost"));
}

#[tokio::test]
async fn test_network_gas_price_policy() {
    let mut ledger = MockLedger::new();
    ledger
        .expect_transaction_count()
        .returning(|_| Ok(U256::from(3)));
    ledger
        .expect_estimate_gas()
        .returning(|_| Ok(U256::from(50_000)));
    ledger
        .expect_gas_price()
        .times(1)
        .returning(|| Ok(U256::from(7_000_000_000u64)));

    let accounts = Arc::new(
        AccountRegistry::from_config(&[identity("admin", Role::Admin, ADMIN_KEY)], CHAIN_ID).unwrap(),
    );
    let builder = TransactionBuilder::new(Arc::new(ledger), accounts, GasPricePolicy::Network, 10);
    let call = ContractCall {
        contract: "registry".into(),
        target: registry_address(),
        function: REGISTER_MODEL.into(),
        data: Bytes::from(vec![0u8; 4]),
    };

    let signed = builder.build_and_sign("admin", &call, None).await.unwrap();
    assert_eq!(signed.nonce, U256::from(3));
    assert_eq!(signed.gas_price, U256::from(7_000_000_000u64));
    assert_eq!(signed.gas_limit, U256::from(55_000));
}

#[tokio::test]
async fn test_estimation_revert_is_gas_estimation_failure() {
    let dir = TempDir::new().unwrap();
    let ledger = Arc::new(FakeLedger::new());
    let ctx = test_context(test_config(dir.path()), ledger.clone()).await;
    let call = register_call(&ctx);
    ledger.revert_estimate_on(call.selector());

    let err = ctx
        .dispatcher
        .builder()
        .build_and_sign("engineer", &call, None)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::GasEstimationFailed { .. }));
    assert!(ledger.sent().is_empty());
}

#[tokio::test]
async fn test_simulation_estimates_without_sending() {
    // No send expectation: broadcasting would panic
    let mut ledger = MockLedger::new();
    ledger
        .expect_transaction_count()
        .returning(|_| Ok(U256::from(4)));
    ledger
        .expect_estimate_gas()
        .times(2)
        .returning(|_| Ok(U256::from(80_000)));

    let accounts = Arc::new(
        AccountRegistry::from_config(&[identity("engineer", Role::Engineer, ENGINEER_KEY)], CHAIN_ID)
            .unwrap(),
    );
    let builder = TransactionBuilder::new(
        Arc::new(ledger),
        accounts,
        GasPricePolicy::Fixed(U256::from(20_000_000_000u64)),
        20,
    );
    let call = ContractCall {
        contract: "registry".into(),
        target: registry_address(),
        function: REGISTER_MODEL.into(),
        data: Bytes::from(vec![0u8; 4]),
    };

    let sim = builder.simulate("engineer", &call, None).await.unwrap();
    assert_eq!(sim.nonce, U256::from(4));
    assert_eq!(sim.gas_limit, U256::from(96_000));
    assert_eq!(sim.estimated_cost_wei, U256::from(1_600_000_000_000_000u64));
    assert_eq!(sim.estimated_cost_eth, "0.001600000000000000");
    assert!(sim.is_valid);

    let tight = builder
        .simulate("engineer", &call, Some(U256::from(79_999)))
        .await
        .unwrap();
    assert!(!tight.is_valid);

    // The lane was never advanced
    let lane = builder.lock_lane("engineer").await.unwrap();
    assert_eq!(lane.cursor(), None);
}

#[tokio::test]
async fn test_system_stats_reads_registry_counters() {
    let dir = TempDir::new().unwrap();
    let ledger = Arc::new(FakeLedger::new());
    ledger.set_registry_view("totalUsers", 3);
    ledger.set_registry_view("engineerCount", 1);
    ledger.set_registry_view("dataCounter", 12);
    ledger.set_registry_view("modelCounter", 2);
    let engineer: Address = ENGINEER_ADDRESS.parse().unwrap();
    ledger.set_balance(engineer, U256::exp10(18));

    let ctx = test_context(test_config(dir.path()), ledger.clone()).await;
    let stats = ctx.system_stats().await.unwrap();

    assert_eq!(stats.total_users, Some(U256::from(3)));
    assert_eq!(stats.engineer_count, Some(U256::from(1)));
    assert_eq!(stats.data_counter, Some(U256::from(12)));
    assert_eq!(stats.model_counter, Some(U256::from(2)));
    assert_eq!(stats.balances["engineer"], U256::exp10(18));
    assert_eq!(stats.balances["worker"], U256::zero());
    assert_eq!(stats.balances.len(), 3);
}

#[tokio::test]
async fn test_system_stats_surfaces_reverted_view() {
    let dir = TempDir::new().unwrap();
    let ledger = Arc::new(FakeLedger::new());
    ledger.set_registry_view("totalUsers", 3);

    let ctx = test_context(test_config(dir.path()), ledger).await;
    let err = ctx.system_stats().await.unwrap_err();
    assert!(matches!(err, PipelineError::Ledger(ref reason) if reason.contains("engineerCount")));
}
