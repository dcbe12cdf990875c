// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod attest;
pub mod inspect;

use crate::commitment::Payload;
use crate::config::PipelineConfig;
use crate::context::PipelineContext;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

/// Commitment attestation CLI
#[derive(Parser, Debug)]
#[command(name = "attest-cli")]
#[command(version)]
#[command(about = "Commit to private data, prove claims about it and anchor it on-chain", long_about = None)]
pub struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true, env = "ATTEST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Print submission metrics in Prometheus format after the command
    #[arg(long, global = true)]
    pub metrics: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Commit to a payload and keep its opening in the local store
    Commit(inspect::CommitArgs),

    /// Show the payload and nonce behind a stored commitment
    Reveal(inspect::RevealArgs),

    /// Commit, prove and register a trained model
    RegisterModel(attest::RegisterModelArgs),

    /// Commit, prove and submit a sensor reading
    SubmitSensor(attest::SubmitSensorArgs),

    /// Commit, prove and record a prediction
    RecordPrediction(attest::RecordPredictionArgs),

    /// Continue interrupted attestations
    Resume(attest::ResumeArgs),

    /// Estimate gas and cost of the next transaction of a pending attestation
    Simulate(attest::SimulateArgs),

    /// List attestations that have not completed
    Pending,

    /// Look up the outcome of a transaction by hash
    Receipt(inspect::ReceiptArgs),

    /// Show identities, addresses and balances
    Accounts,

    /// Show registry counters and identity balances
    Stats,
}

/// Execute CLI command
pub async fn execute(cli: Cli) -> Result<()> {
    // The local store needs neither contracts nor identities
    match cli.command {
        Commands::Commit(args) => {
            let config = PipelineConfig::load_local(cli.config.as_deref())?;
            inspect::commit(&config, args).await
        }
        Commands::Reveal(args) => {
            let config = PipelineConfig::load_local(cli.config.as_deref())?;
            inspect::reveal(&config, args).await
        }
        command => {
            let config = PipelineConfig::load(cli.config.as_deref())?;
            let ctx = PipelineContext::connect(config).await?;
            let result = match command {
                Commands::RegisterModel(args) => attest::register_model(&ctx, args).await,
                Commands::SubmitSensor(args) => attest::submit_sensor(&ctx, args).await,
                Commands::RecordPrediction(args) => attest::record_prediction(&ctx, args).await,
                Commands::Resume(args) => attest::resume(&ctx, args).await,
                Commands::Simulate(args) => attest::simulate(&ctx, args).await,
                Commands::Pending => attest::pending(&ctx).await,
                Commands::Receipt(args) => inspect::receipt(&ctx, args).await,
                Commands::Accounts => inspect::accounts(&ctx).await,
                Commands::Stats => inspect::stats(&ctx).await,
                Commands::Commit(_) | Commands::Reveal(_) => Ok(()),
            };
            if cli.metrics {
                print!("{}", ctx.metrics.export_prometheus());
            }
            result
        }
    }
}

/// Read a payload file: JSON documents become records, anything else (or
/// any file with `raw`) is committed as bytes
pub(crate) fn read_payload(path: &Path, raw: bool) -> Result<Payload> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    if raw {
        return Ok(Payload::Bytes(bytes));
    }
    match Payload::from_json_slice(&bytes).with_context(|| format!("parsing {}", path.display()))? {
        Some(record) => Ok(record),
        None => Ok(Payload::Bytes(bytes)),
    }
}
