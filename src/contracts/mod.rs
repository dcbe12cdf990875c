// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Contract bindings for the proof verifier and the attestation registry
//!
//! ABIs come from Hardhat artifacts (`{"abi": [...]}`), bare ABI arrays, or
//! the built-in defaults in [`abi`]. Calls are encoded with
//! `ethers::abi::Function::encode_input`; entity ids are decoded from the
//! events the target contract emits in a receipt.

pub mod abi;

use crate::config::PipelineConfig;
use crate::error::{ConfigError, LedgerError, PipelineError};
use crate::ledger::LedgerClient;
use crate::transactions::Receipt;
use ethers::abi::{Abi, RawLog, Token};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, TransactionRequest, U256};
use serde_json::Value;
use std::path::Path;
use tracing::debug;

pub const SUBMIT_MODEL_PROOF: &str = "submitModelProof";
pub const SUBMIT_SENSOR_PROOF: &str = "submitSensorProof";
pub const SUBMIT_PREDICTION_PROOF: &str = "submitPredictionProof";
pub const PROOF_SUBMITTED: &str = "ProofSubmitted";

pub const REGISTER_MODEL: &str = "registerZKModel";
pub const SUBMIT_SENSOR_DATA: &str = "submitZKSensorData";
pub const MAKE_PREDICTION: &str = "makeZKPrediction";
pub const MODEL_REGISTERED: &str = "ModelRegistered";
pub const SENSOR_DATA_SUBMITTED: &str = "SensorDataSubmitted";
pub const PREDICTION_RECORDED: &str = "PredictionRecorded";

pub const TOTAL_USERS: &str = "totalUsers";
pub const ENGINEER_COUNT: &str = "engineerCount";
pub const DATA_COUNTER: &str = "dataCounter";
pub const MODEL_COUNTER: &str = "modelCounter";

const VERIFIER_FUNCTIONS: &[&str] = &[SUBMIT_MODEL_PROOF, SUBMIT_SENSOR_PROOF, SUBMIT_PREDICTION_PROOF];
const VERIFIER_EVENTS: &[&str] = &[PROOF_SUBMITTED];
const REGISTRY_FUNCTIONS: &[&str] = &[REGISTER_MODEL, SUBMIT_SENSOR_DATA, MAKE_PREDICTION];
const REGISTRY_EVENTS: &[&str] = &[MODEL_REGISTERED, SENSOR_DATA_SUBMITTED, PREDICTION_RECORDED];

/// An encoded call to a contract function
#[derive(Debug, Clone)]
pub struct ContractCall {
    pub contract: String,
    pub target: Address,
    pub function: String,
    pub data: Bytes,
}

impl ContractCall {
    /// 4-byte function selector
    pub fn selector(&self) -> [u8; 4] {
        let mut selector = [0u8; 4];
        let len = self.data.len().min(4);
        selector[..len].copy_from_slice(&self.data[..len]);
        selector
    }
}

/// Parse an ABI from a Hardhat artifact or a bare ABI array
pub fn parse_abi(contract: &str, json: &str) -> Result<Abi, ConfigError> {
    let malformed = |reason: String| ConfigError::MalformedAbi {
        contract: contract.to_string(),
        reason,
    };
    let value: Value = serde_json::from_str(json).map_err(|e| malformed(e.to_string()))?;
    let abi_value = match value {
        Value::Object(mut artifact) => artifact
            .remove("abi")
            .ok_or_else(|| malformed("artifact has no \"abi\" field".to_string()))?,
        array @ Value::Array(_) => array,
        _ => return Err(malformed("expected an artifact object or ABI array".to_string())),
    };
    serde_json::from_value(abi_value).map_err(|e| malformed(e.to_string()))
}

#[derive(Debug, Clone)]
pub struct ContractBinding {
    name: String,
    address: Address,
    abi: Abi,
}

impl ContractBinding {
    /// Bind `abi` at `address`, checking it declares the functions and
    /// events the pipeline relies on
    pub fn new(
        name: &str,
        address: Address,
        abi: Abi,
        functions: &[&str],
        events: &[&str],
    ) -> Result<Self, ConfigError> {
        for function in functions {
            if abi.function(function).is_err() {
                return Err(ConfigError::MalformedAbi {
                    contract: name.to_string(),
                    reason: format!("missing function {}", function),
                });
            }
        }
        for event in events {
            if abi.event(event).is_err() {
                return Err(ConfigError::MalformedAbi {
                    contract: name.to_string(),
                    reason: format!("missing event {}", event),
                });
            }
        }
        Ok(Self {
            name: name.to_string(),
            address,
            abi,
        })
    }

    pub fn verifier(address: Address, artifact: Option<&Path>) -> Result<Self, ConfigError> {
        let abi = load_abi("verifier", artifact, abi::VERIFIER_ABI)?;
        Self::new("verifier", address, abi, VERIFIER_FUNCTIONS, VERIFIER_EVENTS)
    }

    pub fn registry(address: Address, artifact: Option<&Path>) -> Result<Self, ConfigError> {
        let abi = load_abi("registry", artifact, abi::REGISTRY_ABI)?;
        Self::new("registry", address, abi, REGISTRY_FUNCTIONS, REGISTRY_EVENTS)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn abi(&self) -> &Abi {
        &self.abi
    }

    /// Encode a call to `function` with `args`
    pub fn call(&self, function: &str, args: &[Token]) -> Result<ContractCall, PipelineError> {
        let encoding_error = |reason: String| PipelineError::CallEncoding {
            function: function.to_string(),
            reason,
        };
        let func = self
            .abi
            .function(function)
            .map_err(|e| encoding_error(e.to_string()))?;
        let data = func
            .encode_input(args)
            .map_err(|e| encoding_error(e.to_string()))?;

        Ok(ContractCall {
            contract: self.name.clone(),
            target: self.address,
            function: function.to_string(),
            data: Bytes::from(data),
        })
    }

    pub fn has_function(&self, function: &str) -> bool {
        self.abi.function(function).is_ok()
    }

    /// `eth_call` a view function that returns a single uint
    pub async fn read_uint(
        &self,
        ledger: &dyn LedgerClient,
        function: &str,
    ) -> Result<U256, PipelineError> {
        let call = self.call(function, &[])?;
        let tx = TypedTransaction::Legacy(
            TransactionRequest::new()
                .to(self.address)
                .data(call.data.clone()),
        );
        let output = ledger.call(&tx).await.map_err(|e| match e {
            LedgerError::Unavailable(reason) => PipelineError::LedgerUnavailable(reason),
            other => PipelineError::Ledger(format!("{}.{}: {}", self.name, function, other)),
        })?;

        let undecodable = |reason: String| {
            PipelineError::Ledger(format!("{}.{} returned {}", self.name, function, reason))
        };
        let tokens = self
            .abi
            .function(function)
            .map_err(|e| undecodable(e.to_string()))?
            .decode_output(&output)
            .map_err(|e| undecodable(e.to_string()))?;
        match tokens.as_slice() {
            [Token::Uint(value)] => Ok(*value),
            other => Err(undecodable(format!("{:?}", other))),
        }
    }

    /// Decode the `field` of the first `event` this contract emitted in
    /// `receipt`
    pub fn event_uint(
        &self,
        receipt: &Receipt,
        event: &str,
        field: &str,
    ) -> Result<U256, PipelineError> {
        let missing = || PipelineError::MissingEvent {
            contract: self.name.clone(),
            event: event.to_string(),
            tx_hash: receipt.transaction_hash,
        };
        let abi_event = self.abi.event(event).map_err(|_| missing())?;
        let signature = abi_event.signature();

        for log in &receipt.logs {
            if log.address != self.address || log.topics.first() != Some(&signature) {
                continue;
            }
            let parsed = match abi_event.parse_log(RawLog {
                topics: log.topics.clone(),
                data: log.data.to_vec(),
            }) {
                Ok(parsed) => parsed,
                Err(e) => {
                    debug!("Skipping undecodable {} log: {}", event, e);
                    continue;
                }
            };
            if let Some(Token::Uint(value)) = parsed
                .params
                .into_iter()
                .find(|p| p.name == field)
                .map(|p| p.value)
            {
                return Ok(value);
            }
        }
        Err(missing())
    }
}

fn load_abi(contract: &str, artifact: Option<&Path>, default: &str) -> Result<Abi, ConfigError> {
    match artifact {
        Some(path) => {
            let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            parse_abi(contract, &json)
        }
        None => parse_abi(contract, default),
    }
}

/// The two contracts the pipeline writes to
#[derive(Debug, Clone)]
pub struct ContractSet {
    pub verifier: ContractBinding,
    pub registry: ContractBinding,
}

impl ContractSet {
    pub fn from_config(config: &PipelineConfig) -> Result<Self, ConfigError> {
        let verifier_address = config
            .verifier_address
            .ok_or_else(|| ConfigError::missing("verifier_address"))?;
        let registry_address = config
            .registry_address
            .ok_or_else(|| ConfigError::missing("registry_address"))?;
        Ok(Self {
            verifier: ContractBinding::verifier(
                verifier_address,
                config.verifier_artifact.as_deref(),
            )?,
            registry: ContractBinding::registry(
                registry_address,
                config.registry_artifact.as_deref(),
            )?,
        })
    }
}
