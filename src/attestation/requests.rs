// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Attestation requests and the fixed-point scaling of their claims

use crate::commitment::{Commitment, Payload};
use crate::error::PipelineError;
use chrono::{DateTime, Utc};
use ethers::types::U256;
use serde::{Deserialize, Serialize};

/// Fixed-point factor for ratios (accuracy, rmse, failure probability)
pub const RATIO_SCALE: f64 = 10_000.0;
/// Fixed-point factor for temperatures and torque
pub const PHYSICAL_SCALE: f64 = 100.0;
/// Upper bound of a confidence score (100.00%)
pub const MAX_CONFIDENCE: u64 = 10_000;

/// Scale a non-negative measurement to an on-chain integer, rounding to
/// the nearest unit
pub fn scale(field: &str, value: f64, factor: f64) -> Result<U256, PipelineError> {
    if !value.is_finite() || value < 0.0 {
        return Err(PipelineError::invalid_request(format!(
            "{} must be a finite non-negative number, got {}",
            field, value
        )));
    }
    let scaled = (value * factor).round();
    if scaled > u64::MAX as f64 {
        return Err(PipelineError::invalid_request(format!(
            "{} is too large: {}",
            field, value
        )));
    }
    Ok(U256::from(scaled as u64))
}

fn require_ratio(field: &str, value: f64) -> Result<(), PipelineError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(PipelineError::invalid_request(format!(
            "{} must be within [0, 1], got {}",
            field, value
        )));
    }
    Ok(())
}

fn require_text(field: &str, value: &str) -> Result<(), PipelineError> {
    if value.trim().is_empty() {
        return Err(PipelineError::invalid_request(format!("{} is empty", field)));
    }
    Ok(())
}

/// Register a trained model
#[derive(Debug, Clone)]
pub struct ModelRegistration {
    /// Model snapshot (weights digest, serialized parameters, ...)
    pub snapshot: Payload,
    pub model_type: String,
    pub domain_type: String,
    pub accuracy: f64,
    pub rmse: f64,
}

impl ModelRegistration {
    pub fn validate(&self) -> Result<(), PipelineError> {
        require_text("model_type", &self.model_type)?;
        require_text("domain_type", &self.domain_type)?;
        require_ratio("accuracy", self.accuracy)?;
        scale("rmse", self.rmse, RATIO_SCALE)?;
        Ok(())
    }
}

/// One reading of a machine's sensors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_id: Option<u64>,
    pub machine_type: String,
    /// Kelvin
    pub air_temperature: f64,
    /// Kelvin
    pub process_temperature: f64,
    /// rpm
    pub rotational_speed: u64,
    /// Nm
    pub torque: f64,
    /// minutes
    pub tool_wear: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SensorSubmission {
    pub reading: SensorReading,
}

impl SensorSubmission {
    pub fn validate(&self) -> Result<(), PipelineError> {
        let r = &self.reading;
        require_text("machine_type", &r.machine_type)?;
        scale("air_temperature", r.air_temperature, PHYSICAL_SCALE)?;
        scale("process_temperature", r.process_temperature, PHYSICAL_SCALE)?;
        scale("torque", r.torque, PHYSICAL_SCALE)?;
        Ok(())
    }
}

/// Model output for one machine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_id: Option<u64>,
    /// Remaining useful life in cycles
    pub rul: u64,
    pub failure_probability: f64,
    pub risk_level: String,
}

/// Record a prediction made by a registered model on registered data
#[derive(Debug, Clone)]
pub struct PredictionRecord {
    pub model_id: U256,
    pub sensor_data_id: U256,
    pub model_commitment: Commitment,
    pub input: Payload,
    pub result: PredictionResult,
    /// Basis points, 0..=10000
    pub confidence_score: u64,
}

impl PredictionRecord {
    pub fn validate(&self) -> Result<(), PipelineError> {
        require_ratio("failure_probability", self.result.failure_probability)?;
        require_text("risk_level", &self.result.risk_level)?;
        if self.confidence_score > MAX_CONFIDENCE {
            return Err(PipelineError::invalid_request(format!(
                "confidence_score must be <= {}, got {}",
                MAX_CONFIDENCE, self.confidence_score
            )));
        }
        Ok(())
    }
}
