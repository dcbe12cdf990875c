// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{anyhow, Result};
use clap::Args;
use ethers::types::{H256, U256};
use ethers::utils::format_units;
use std::path::PathBuf;
use std::str::FromStr;

use super::read_payload;
use crate::commitment::{commit as commit_payload, verify_opening, CommitmentStore, Payload};
use crate::config::PipelineConfig;
use crate::context::PipelineContext;
use crate::transactions::Outcome;

/// Arguments for the commit command
#[derive(Args, Debug)]
pub struct CommitArgs {
    /// File holding the payload
    #[arg(long)]
    pub file: PathBuf,

    /// Commit the file bytes even if they parse as JSON
    #[arg(long)]
    pub raw: bool,
}

/// Arguments for the reveal command
#[derive(Args, Debug)]
pub struct RevealArgs {
    /// Commitment hex, or a unique prefix of one
    pub commitment: String,
}

/// Arguments for the receipt command
#[derive(Args, Debug)]
pub struct ReceiptArgs {
    /// Transaction hash
    pub tx_hash: String,
}

pub async fn commit(config: &PipelineConfig, args: CommitArgs) -> Result<()> {
    let payload = read_payload(&args.file, args.raw)?;
    let store = CommitmentStore::open(&config.store_dir).await?;
    let (commitment, nonce) = commit_payload(&payload)?;
    let record = store.put(&commitment, &payload, &nonce).await?;

    println!("✅ Committed {}", args.file.display());
    println!("  Commitment: {}", commitment);
    println!("  Stored at:  {}", store.path_for(&commitment).display());
    println!("  Created:    {}", record.created_at);
    Ok(())
}

pub async fn reveal(config: &PipelineConfig, args: RevealArgs) -> Result<()> {
    let store = CommitmentStore::open(&config.store_dir).await?;
    let commitment = store.resolve_prefix(&args.commitment).await?;
    let record = store.record(&commitment).await?;

    println!("🔓 Commitment {}", commitment);
    println!("  Nonce:   0x{}", record.nonce.to_hex());
    println!("  Created: {}", record.created_at);
    match &record.payload {
        Payload::Record(value) => {
            println!("  Payload:");
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        Payload::Bytes(bytes) => println!("  Payload: 0x{}", hex::encode(bytes)),
    }
    if verify_opening(&commitment, &record.payload, &record.nonce) {
        println!("✅ Opening verified");
        Ok(())
    } else {
        Err(anyhow!("stored opening does not match commitment {}", commitment))
    }
}

pub async fn receipt(ctx: &PipelineContext, args: ReceiptArgs) -> Result<()> {
    let hash = H256::from_str(args.tx_hash.trim())
        .map_err(|e| anyhow!("invalid transaction hash '{}': {}", args.tx_hash, e))?;

    match ctx.dispatcher.submitter().query_outcome(hash).await? {
        None => println!("⏳ {:?} has no receipt yet", hash),
        Some(Outcome::Confirmed(r)) => println!(
            "✅ {:?} confirmed in block {} (gas used {})",
            hash, r.block_number, r.gas_used
        ),
        Some(Outcome::Reverted(r)) => println!(
            "❌ {:?} reverted in block {} (gas used {})",
            hash, r.block_number, r.gas_used
        ),
        Some(other) => println!("{:?}: {:?}", hash, other),
    }
    Ok(())
}

pub async fn accounts(ctx: &PipelineContext) -> Result<()> {
    let report = ctx.preflight().await?;
    println!("👛 Identities on chain {}:", ctx.accounts.chain_id());
    for status in report {
        let role = ctx.accounts.role_of(&status.name)?;
        let balance = format_units(status.balance, "ether").unwrap_or_else(|_| status.balance.to_string());
        println!(
            "  {:<12} {:<9} {:?}  {} ETH{}",
            status.name,
            role,
            status.address,
            balance,
            if status.sufficient { "" } else { "  ⚠️ underfunded" }
        );
    }
    Ok(())
}

pub async fn stats(ctx: &PipelineContext) -> Result<()> {
    let stats = ctx.system_stats().await?;
    let counter = |value: Option<U256>| value.map(|v| v.to_string()).unwrap_or_else(|| "n/a".to_string());

    println!("📊 Registry at block {}", stats.block_number);
    println!("  Users:     {}", counter(stats.total_users));
    println!("  Engineers: {}", counter(stats.engineer_count));
    println!("  Data:      {}", counter(stats.data_counter));
    println!("  Models:    {}", counter(stats.model_counter));
    for (name, balance) in &stats.balances {
        let eth = format_units(*balance, "ether").unwrap_or_else(|_| balance.to_string());
        println!("  {:<10} {} ETH", name, eth);
    }
    Ok(())
}
