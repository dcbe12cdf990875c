// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use crate::common::*;
use chrono::{TimeZone, Utc};
use commit_attest::attestation::{
    AttestationKind, AttestationOrchestrator, ModelRegistration, PredictionRecord,
    PredictionResult, SagaStage, SensorReading, SensorSubmission,
};
use commit_attest::commitment::Payload;
use commit_attest::contracts::abi::{REGISTRY_ABI, VERIFIER_ABI};
use commit_attest::contracts::{
    MAKE_PREDICTION, REGISTER_MODEL, SUBMIT_MODEL_PROOF, SUBMIT_SENSOR_DATA,
};
use ethers::abi::Token;
use ethers::types::{Address, U256};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tempfile::TempDir;

pub fn model_request() -> ModelRegistration {
    ModelRegistration {
        snapshot: Payload::Record(json!({
            "architecture": "LSTM",
            "layers": [64, 32],
            "weights_sha256": "9f2c1e"
        })),
        model_type: "LSTM".into(),
        domain_type: "predictive_maintenance".into(),
        accuracy: 0.95,
        rmse: 0.042,
    }
}

fn reading() -> SensorReading {
    SensorReading {
        machine_id: Some(7),
        machine_type: "M".into(),
        air_temperature: 298.1,
        process_temperature: 308.6,
        rotational_speed: 1551,
        torque: 42.8,
        tool_wear: 0,
        timestamp: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
    }
}

async fn orchestrator(dir: &TempDir, ledger: Arc<FakeLedger>) -> AttestationOrchestrator {
    let ctx = test_context(test_config(dir.path()), ledger).await;
    AttestationOrchestrator::new(ctx).await.unwrap()
}

#[tokio::test]
async fn test_register_model_end_to_end() {
    let dir = TempDir::new().unwrap();
    let ledger = Arc::new(FakeLedger::new().with_contract_events());
    let orch = orchestrator(&dir, ledger.clone()).await;

    let record = orch.register_model(model_request()).await.unwrap();

    assert_eq!(record.kind, AttestationKind::Model);
    assert_eq!(record.identity, "engineer");
    assert_eq!(record.proof_id, U256::from(1));
    assert_eq!(record.entity_id, U256::from(2));
    assert!(record.anchored_at.is_some());

    let sent = ledger.sent();
    assert_eq!(sent.len(), 2);
    let engineer: Address = ENGINEER_ADDRESS.parse().unwrap();
    assert!(sent.iter().all(|tx| tx.from == engineer));
    assert_eq!(sent[0].to, verifier_address());
    assert_eq!(sent[1].to, registry_address());
    assert_eq!(sent[0].hash, record.verifier_tx);
    assert_eq!(sent[1].hash, record.registry_tx);

    let proof_args = decode_call(VERIFIER_ABI, SUBMIT_MODEL_PROOF, &sent[0].data);
    assert_eq!(
        proof_args[0],
        Token::FixedBytes(record.commitment.as_bytes().to_vec())
    );

    let args = decode_call(REGISTRY_ABI, REGISTER_MODEL, &sent[1].data);
    assert_eq!(args[1], Token::String("LSTM".into()));
    assert_eq!(args[2], Token::String("predictive_maintenance".into()));
    assert_eq!(args[3], Token::Uint(U256::from(9500)));
    assert_eq!(args[4], Token::Uint(U256::from(420)));
    assert_eq!(args[5], Token::Uint(record.proof_id));

    let saga = orch.saga(&record.commitment).await.unwrap().unwrap();
    assert!(saga.stage.is_completed());
    assert!(orch.pending().await.unwrap().is_empty());

    let metrics = orch.context().metrics.snapshot();
    assert_eq!(metrics.attestations_completed, 1);
    assert_eq!(metrics.proofs_generated, 2);
    assert_eq!(metrics.confirmed, 2);
}

#[tokio::test]
async fn test_submit_sensor_data_end_to_end() {
    let dir = TempDir::new().unwrap();
    let ledger = Arc::new(FakeLedger::new().with_contract_events());
    let orch = orchestrator(&dir, ledger.clone()).await;
    let reading = reading();

    let record = orch
        .submit_sensor_data(SensorSubmission {
            reading: reading.clone(),
        })
        .await
        .unwrap();

    assert_eq!(record.kind, AttestationKind::Sensor);
    assert_eq!(record.identity, "worker");
    let worker: Address = WORKER_ADDRESS.parse().unwrap();
    assert!(ledger.sent().iter().all(|tx| tx.from == worker));

    let sent = ledger.sent();
    let args = decode_call(REGISTRY_ABI, SUBMIT_SENSOR_DATA, &sent[1].data);
    assert_eq!(args[1], Token::String("M".into()));
    // machine_id plus the seven measured fields
    assert_eq!(args[2], Token::Uint(U256::from(8)));
    // Compact JSON, keys sorted, no whitespace
    let metadata = br#"{"data_count":8,"machine_type":"M","timestamp":"2025-01-01T00:00:00Z"}"#;
    assert_eq!(args[3], Token::FixedBytes(Sha256::digest(metadata).to_vec()));

    let opening = orch.reveal(&record.commitment).await.unwrap();
    assert!(opening.verify());
    let revealed: SensorReading =
        serde_json::from_value(opening.payload.as_record().unwrap().clone()).unwrap();
    assert_eq!(revealed, reading);
}

#[tokio::test]
async fn test_record_prediction_end_to_end() {
    let dir = TempDir::new().unwrap();
    let ledger = Arc::new(FakeLedger::new().with_contract_events());
    let orch = orchestrator(&dir, ledger.clone()).await;

    let model = orch.register_model(model_request()).await.unwrap();
    let data = orch
        .submit_sensor_data(SensorSubmission { reading: reading() })
        .await
        .unwrap();

    let input = Payload::Record(json!({"window": [[298.1, 308.6, 1551, 42.8, 0]]}));
    let result = PredictionResult {
        machine_id: Some(7),
        rul: 1200,
        failure_probability: 0.125,
        risk_level: "LOW".into(),
    };
    let record = orch
        .record_prediction(PredictionRecord {
            model_id: model.entity_id,
            sensor_data_id: data.entity_id,
            model_commitment: model.commitment,
            input: input.clone(),
            result: result.clone(),
            confidence_score: 8700,
        })
        .await
        .unwrap();

    assert_eq!(record.kind, AttestationKind::Prediction);
    let input_commitment = record.input_commitment.unwrap();

    let sent = ledger.sent();
    let args = decode_call(REGISTRY_ABI, MAKE_PREDICTION, &sent.last().unwrap().data);
    assert_eq!(args[0], Token::Uint(model.entity_id));
    assert_eq!(args[1], Token::Uint(data.entity_id));
    assert_eq!(
        args[2],
        Token::FixedBytes(input_commitment.as_bytes().to_vec())
    );
    assert_eq!(
        args[3],
        Token::FixedBytes(record.commitment.as_bytes().to_vec())
    );
    assert_eq!(args[4], Token::Uint(U256::from(8700)));

    // Both sides of the prediction can be opened later
    let opened_input = orch.reveal(&input_commitment).await.unwrap();
    assert_eq!(opened_input.payload, input);
    let opened_output = orch.reveal(&record.commitment).await.unwrap();
    assert_eq!(
        opened_output.payload,
        Payload::from_serializable(&result).unwrap()
    );

    let records = orch.records().await;
    assert_eq!(records.len(), 3);
    assert!(records.windows(2).all(|w| w[0].block_number <= w[1].block_number));
    assert_eq!(orch.record(&record.commitment).await, Some(record));
}

#[tokio::test]
async fn test_reveal_by_prefix() {
    let dir = TempDir::new().unwrap();
    let ledger = Arc::new(FakeLedger::new().with_contract_events());
    let orch = orchestrator(&dir, ledger).await;
    let record = orch.register_model(model_request()).await.unwrap();

    let prefix = format!("0x{}", &record.commitment.to_hex()[..16]);
    let opening = orch.reveal_prefix(&prefix).await.unwrap();
    assert_eq!(opening.commitment, record.commitment);
    assert_eq!(opening.payload, model_request().snapshot);
}

#[tokio::test]
async fn test_completed_saga_journal_shape() {
    let dir = TempDir::new().unwrap();
    let ledger = Arc::new(FakeLedger::new().with_contract_events());
    let orch = orchestrator(&dir, ledger).await;
    let record = orch.register_model(model_request()).await.unwrap();

    let saga = orch.saga(&record.commitment).await.unwrap().unwrap();
    match saga.stage {
        SagaStage::Completed(anchor) => {
            assert_eq!(anchor.entity_id, record.entity_id);
            assert_eq!(anchor.registry_tx, record.registry_tx);
        }
        other => panic!("expected completed saga, got {:?}", other),
    }
}
