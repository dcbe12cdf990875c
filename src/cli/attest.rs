// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{anyhow, Context, Result};
use clap::Args;
use ethers::types::U256;
use futures::future::join_all;
use std::path::PathBuf;
use tracing::warn;

use super::read_payload;
use crate::attestation::{
    AttestationOrchestrator, AttestationRecord, ModelRegistration, PredictionRecord,
    PredictionResult, SensorReading, SensorSubmission,
};
use crate::commitment::Commitment;
use crate::context::PipelineContext;

/// Arguments for register-model command
#[derive(Args, Debug)]
pub struct RegisterModelArgs {
    /// Model snapshot file (weights, serialized parameters)
    #[arg(long)]
    pub snapshot: PathBuf,

    /// Model architecture, e.g. LSTM-CNN
    #[arg(long)]
    pub model_type: String,

    /// Application domain
    #[arg(long, default_value = "industrial_machinery")]
    pub domain_type: String,

    /// Validation accuracy in [0, 1]
    #[arg(long)]
    pub accuracy: f64,

    /// Validation RMSE
    #[arg(long)]
    pub rmse: f64,
}

/// Arguments for submit-sensor command
#[derive(Args, Debug)]
pub struct SubmitSensorArgs {
    /// JSON file holding one sensor reading
    #[arg(long)]
    pub reading: PathBuf,
}

/// Arguments for record-prediction command
#[derive(Args, Debug)]
pub struct RecordPredictionArgs {
    /// On-chain id of the registered model
    #[arg(long)]
    pub model_id: u64,

    /// On-chain id of the submitted sensor data
    #[arg(long)]
    pub sensor_data_id: u64,

    /// Commitment of the model that made the prediction
    #[arg(long)]
    pub model_commitment: String,

    /// Model input file
    #[arg(long)]
    pub input: PathBuf,

    #[arg(long)]
    pub machine_id: Option<u64>,

    /// Predicted remaining useful life in cycles
    #[arg(long)]
    pub rul: u64,

    /// Failure probability in [0, 1]
    #[arg(long)]
    pub failure_probability: f64,

    #[arg(long, default_value = "LOW")]
    pub risk_level: String,

    /// Confidence in basis points (0-10000)
    #[arg(long, default_value_t = 8500)]
    pub confidence: u64,
}

/// Arguments for resume command
#[derive(Args, Debug)]
pub struct ResumeArgs {
    /// Commitment of the attestation to continue
    #[arg(required_unless_present = "all")]
    pub commitment: Option<String>,

    /// Continue every pending attestation
    #[arg(long, conflicts_with = "commitment")]
    pub all: bool,
}

/// Arguments for simulate command
#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Commitment of a pending attestation
    pub commitment: String,

    /// Gas limit to check the estimate against
    #[arg(long)]
    pub gas_limit: Option<u64>,
}

fn parse_commitment(text: &str) -> Result<Commitment> {
    text.parse()
        .map_err(|e| anyhow!("invalid commitment '{}': {}", text, e))
}

fn print_record(record: &AttestationRecord) -> Result<()> {
    println!(
        "✅ {} attestation #{} anchored in block {}",
        record.kind, record.entity_id, record.block_number
    );
    println!("{}", serde_json::to_string_pretty(record)?);
    Ok(())
}

pub async fn register_model(ctx: &PipelineContext, args: RegisterModelArgs) -> Result<()> {
    let orchestrator = AttestationOrchestrator::new(ctx.clone()).await?;
    let record = orchestrator
        .register_model(ModelRegistration {
            snapshot: read_payload(&args.snapshot, false)?,
            model_type: args.model_type,
            domain_type: args.domain_type,
            accuracy: args.accuracy,
            rmse: args.rmse,
        })
        .await?;
    print_record(&record)
}

pub async fn submit_sensor(ctx: &PipelineContext, args: SubmitSensorArgs) -> Result<()> {
    let text = std::fs::read_to_string(&args.reading)
        .with_context(|| format!("reading {}", args.reading.display()))?;
    let reading: SensorReading = serde_json::from_str(&text)
        .with_context(|| format!("parsing sensor reading {}", args.reading.display()))?;

    let orchestrator = AttestationOrchestrator::new(ctx.clone()).await?;
    let record = orchestrator
        .submit_sensor_data(SensorSubmission { reading })
        .await?;
    print_record(&record)
}

pub async fn record_prediction(ctx: &PipelineContext, args: RecordPredictionArgs) -> Result<()> {
    let request = PredictionRecord {
        model_id: U256::from(args.model_id),
        sensor_data_id: U256::from(args.sensor_data_id),
        model_commitment: parse_commitment(&args.model_commitment)?,
        input: read_payload(&args.input, false)?,
        result: PredictionResult {
            machine_id: args.machine_id,
            rul: args.rul,
            failure_probability: args.failure_probability,
            risk_level: args.risk_level,
        },
        confidence_score: args.confidence,
    };

    let orchestrator = AttestationOrchestrator::new(ctx.clone()).await?;
    let record = orchestrator.record_prediction(request).await?;
    print_record(&record)
}

pub async fn resume(ctx: &PipelineContext, args: ResumeArgs) -> Result<()> {
    let orchestrator = AttestationOrchestrator::new(ctx.clone()).await?;

    if !args.all {
        let text = args
            .commitment
            .ok_or_else(|| anyhow!("commitment required unless --all is given"))?;
        let record = orchestrator.resume(&parse_commitment(&text)?).await?;
        return print_record(&record);
    }

    let pending = orchestrator.pending().await?;
    if pending.is_empty() {
        println!("Nothing to resume");
        return Ok(());
    }
    println!("🔄 Resuming {} attestations", pending.len());

    // Distinct identities proceed in parallel; one identity's sends stay ordered
    let results = join_all(
        pending
            .iter()
            .map(|saga| orchestrator.resume(&saga.commitment)),
    )
    .await;

    let mut failed = 0;
    for result in results {
        match result {
            Ok(record) => print_record(&record)?,
            Err(e) => {
                failed += 1;
                warn!("❌ {}", e);
                eprintln!("❌ {}", e);
            }
        }
    }
    if failed > 0 {
        return Err(anyhow!("{} attestations did not complete", failed));
    }
    Ok(())
}

pub async fn simulate(ctx: &PipelineContext, args: SimulateArgs) -> Result<()> {
    let orchestrator = AttestationOrchestrator::new(ctx.clone()).await?;
    let commitment = ctx.store.resolve_prefix(&args.commitment).await?;
    let simulation = orchestrator
        .simulate_next(&commitment, args.gas_limit.map(U256::from))
        .await?;

    println!("🎯 Next transaction of {}", commitment);
    println!("  From:      {:?}", simulation.from);
    println!("  To:        {:?}", simulation.to);
    println!("  Nonce:     {}", simulation.nonce);
    println!("  Gas:       {} estimated, {} limit", simulation.gas_estimate, simulation.gas_limit);
    println!("  Gas price: {} wei", simulation.gas_price);
    println!(
        "  Cost:      {} wei ({} ETH)",
        simulation.estimated_cost_wei, simulation.estimated_cost_eth
    );
    if simulation.is_valid {
        println!("✅ Transaction fits its gas limit");
        Ok(())
    } else {
        Err(anyhow!(
            "gas limit {} is below the estimate {}",
            simulation.gas_limit,
            simulation.gas_estimate
        ))
    }
}

pub async fn pending(ctx: &PipelineContext) -> Result<()> {
    let orchestrator = AttestationOrchestrator::new(ctx.clone()).await?;
    let pending = orchestrator.pending().await?;
    if pending.is_empty() {
        println!("No pending attestations");
        return Ok(());
    }
    for saga in pending {
        let tx = saga
            .stage
            .pending_tx()
            .map(|h| format!("  tx {:?}", h))
            .unwrap_or_default();
        println!(
            "  {} {:<10} {:<18} {} (updated {}){}",
            saga.commitment,
            saga.kind().to_string(),
            saga.stage.name(),
            saga.identity,
            saga.updated_at,
            tx
        );
    }
    Ok(())
}
