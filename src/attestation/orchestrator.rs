// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Attestation orchestrator
//!
//! Drives each flow as a saga:
//! `Committed → Proved → VerifierPending → VerifierSubmitted → RegistryPending → Completed`.
//! The journal is written after every transition, so an interrupted flow
//! continues with [`AttestationOrchestrator::resume`] from the last
//! recorded stage. A pending stage is journalled with the signed
//! transaction before the broadcast. On resume it is re-queried by hash and
//! only the same bytes are ever sent again, so a nonce is never spent twice
//! on one submission.
//!
//! At most one flow drives a given commitment at a time.

use super::journal::{Anchored, Claims, Saga, SagaJournal, SagaStage};
use super::requests::{
    scale, ModelRegistration, PredictionRecord, SensorSubmission, PHYSICAL_SCALE, RATIO_SCALE,
};
use super::{AttestationError, AttestationKind, AttestationRecord, Opening, SagaStep};
use crate::commitment::generator::content_hash;
use crate::commitment::{commit, Commitment, Payload};
use crate::context::PipelineContext;
use crate::contracts::{self, ContractCall};
use crate::error::{PipelineError, ProverError, StoreError};
use crate::prover::{commitment_input, nonce_input, CircuitId, NamedInputs, ProofArtifact};
use crate::transactions::{Broadcast, Outcome, Receipt, SignedTransaction, Simulation};
use chrono::{DateTime, TimeZone, Utc};
use ethers::abi::Token;
use ethers::types::{H256, U256};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, error, info, warn};

pub struct AttestationOrchestrator {
    ctx: PipelineContext,
    journal: SagaJournal,
    records: RwLock<HashMap<Commitment, AttestationRecord>>,
    flows: Mutex<HashMap<Commitment, Arc<Mutex<()>>>>,
}

impl AttestationOrchestrator {
    /// Open the saga journal under the store directory and reload the
    /// records of completed sagas
    pub async fn new(ctx: PipelineContext) -> Result<Self, PipelineError> {
        let journal = SagaJournal::open(&ctx.config.store_dir).await?;

        let mut records = HashMap::new();
        for saga in journal.list().await? {
            if let SagaStage::Completed(anchor) = &saga.stage {
                records.insert(saga.commitment, record_of(&saga, anchor, None));
            }
        }
        if !records.is_empty() {
            info!("📚 Loaded {} completed attestations", records.len());
        }

        Ok(Self {
            ctx,
            journal,
            records: RwLock::new(records),
            flows: Mutex::new(HashMap::new()),
        })
    }

    pub fn context(&self) -> &PipelineContext {
        &self.ctx
    }

    /// Commit a model snapshot, prove its accuracy and RMSE claims, and
    /// register it
    pub async fn register_model(
        &self,
        request: ModelRegistration,
    ) -> Result<AttestationRecord, AttestationError> {
        let claims = (|| -> Result<Claims, PipelineError> {
            request.validate()?;
            Ok(Claims::Model {
                model_type: request.model_type.clone(),
                domain_type: request.domain_type.clone(),
                accuracy: scale("accuracy", request.accuracy, RATIO_SCALE)?,
                rmse: scale("rmse", request.rmse, RATIO_SCALE)?,
            })
        })()
        .map_err(|e| AttestationError::new(SagaStep::Commit, e))?;

        let commitment = self.commit_and_store(&request.snapshot).await?;
        info!(
            "🧠 Registering {} model {} as {}",
            request.model_type, commitment, self.ctx.config.flows.model
        );
        self.start(commitment, &self.ctx.config.flows.model, claims)
            .await
    }

    /// Commit a sensor reading, prove its validity and range, and submit it
    pub async fn submit_sensor_data(
        &self,
        submission: SensorSubmission,
    ) -> Result<AttestationRecord, AttestationError> {
        let (payload, claims) = (|| -> Result<(Payload, Claims), PipelineError> {
            submission.validate()?;
            let reading = &submission.reading;
            let payload = Payload::from_serializable(reading)?;
            let record = payload.as_record().and_then(Value::as_object);
            let data_count = record.map(|m| m.len()).unwrap_or_default();
            let timestamp = record
                .and_then(|m| m.get("timestamp"))
                .cloned()
                .unwrap_or(Value::Null);
            let metadata = json!({
                "data_count": data_count,
                "machine_type": reading.machine_type,
                "timestamp": timestamp,
            });

            let claims = Claims::Sensor {
                machine_type: reading.machine_type.clone(),
                data_count: U256::from(data_count),
                metadata_hash: H256::from(content_hash(&metadata)?),
                air_temp: scale("air_temperature", reading.air_temperature, PHYSICAL_SCALE)?,
                process_temp: scale(
                    "process_temperature",
                    reading.process_temperature,
                    PHYSICAL_SCALE,
                )?,
                rotational_speed: U256::from(reading.rotational_speed),
                torque: scale("torque", reading.torque, PHYSICAL_SCALE)?,
                tool_wear: U256::from(reading.tool_wear),
            };
            Ok((payload, claims))
        })()
        .map_err(|e| AttestationError::new(SagaStep::Commit, e))?;

        let commitment = self.commit_and_store(&payload).await?;
        info!(
            "📡 Submitting sensor data {} as {}",
            commitment, self.ctx.config.flows.sensor
        );
        self.start(commitment, &self.ctx.config.flows.sensor, claims)
            .await
    }

    /// Commit a prediction's input and output, prove the computation, and
    /// record it against the model and sensor data it used
    pub async fn record_prediction(
        &self,
        request: PredictionRecord,
    ) -> Result<AttestationRecord, AttestationError> {
        let (output, failure_probability) = (|| -> Result<(Payload, U256), PipelineError> {
            request.validate()?;
            Ok((
                Payload::from_serializable(&request.result)?,
                scale(
                    "failure_probability",
                    request.result.failure_probability,
                    RATIO_SCALE,
                )?,
            ))
        })()
        .map_err(|e| AttestationError::new(SagaStep::Commit, e))?;

        let input_commitment = self.commit_and_store(&request.input).await?;
        let output_commitment = self.commit_and_store(&output).await?;

        let claims = Claims::Prediction {
            model_id: request.model_id,
            sensor_data_id: request.sensor_data_id,
            model_commitment: request.model_commitment,
            input_commitment,
            rul: U256::from(request.result.rul),
            failure_probability,
            confidence_score: U256::from(request.confidence_score),
        };
        info!(
            "🔮 Recording prediction {} (model {}, data {}) as {}",
            output_commitment, request.model_id, request.sensor_data_id, self.ctx.config.flows.prediction
        );
        self.start(output_commitment, &self.ctx.config.flows.prediction, claims)
            .await
    }

    /// Continue a journalled saga from its last recorded stage
    pub async fn resume(
        &self,
        commitment: &Commitment,
    ) -> Result<AttestationRecord, AttestationError> {
        let _flow = self.lock_flow(commitment).await;
        let saga = self
            .journal
            .load(commitment)
            .await
            .map_err(|e| AttestationError::new(SagaStep::Commit, e).with_commitment(*commitment))?
            .ok_or_else(|| {
                AttestationError::new(
                    SagaStep::Commit,
                    StoreError::CommitmentNotFound {
                        commitment: commitment.to_string(),
                    },
                )
                .with_commitment(*commitment)
            })?;

        info!(
            "🔄 Resuming {} attestation {} from stage {}",
            saga.kind(),
            commitment,
            saga.stage.name()
        );
        self.drive(saga).await
    }

    /// Dry-run the transaction the saga would send next, with `gas_limit`
    /// or the limit a build would choose
    pub async fn simulate_next(
        &self,
        commitment: &Commitment,
        gas_limit: Option<U256>,
    ) -> Result<Simulation, PipelineError> {
        let saga = self
            .journal
            .load(commitment)
            .await?
            .ok_or_else(|| StoreError::CommitmentNotFound {
                commitment: commitment.to_string(),
            })?;
        let call = match &saga.stage {
            SagaStage::Proved { proofs } => self.verifier_call(&saga, proofs)?,
            SagaStage::VerifierSubmitted { proof_id, .. } => self.registry_call(&saga, *proof_id)?,
            stage => {
                return Err(PipelineError::invalid_request(format!(
                    "attestation {} has nothing to send at stage {}",
                    commitment,
                    stage.name()
                )))
            }
        };
        self.ctx.simulate(&saga.identity, &call, gas_limit).await
    }

    /// Sagas that have not completed
    pub async fn pending(&self) -> Result<Vec<Saga>, PipelineError> {
        Ok(self.journal.pending().await?)
    }

    pub async fn saga(&self, commitment: &Commitment) -> Result<Option<Saga>, PipelineError> {
        Ok(self.journal.load(commitment).await?)
    }

    /// Payload and nonce behind `commitment`
    pub async fn reveal(&self, commitment: &Commitment) -> Result<Opening, PipelineError> {
        let (payload, nonce) = self.ctx.store.get(commitment).await?;
        info!("🔓 Revealed {}", commitment);
        Ok(Opening {
            commitment: *commitment,
            payload,
            nonce,
        })
    }

    /// Reveal by unique hex prefix of a stored commitment
    pub async fn reveal_prefix(&self, prefix: &str) -> Result<Opening, PipelineError> {
        let commitment = self.ctx.store.resolve_prefix(prefix).await?;
        self.reveal(&commitment).await
    }

    /// Completed attestations, oldest block first
    pub async fn records(&self) -> Vec<AttestationRecord> {
        let mut records: Vec<AttestationRecord> =
            self.records.read().await.values().cloned().collect();
        records.sort_by_key(|r| (r.block_number, r.commitment));
        records
    }

    pub async fn record(&self, commitment: &Commitment) -> Option<AttestationRecord> {
        self.records.read().await.get(commitment).cloned()
    }

    async fn commit_and_store(&self, payload: &Payload) -> Result<Commitment, AttestationError> {
        let (commitment, nonce) =
            commit(payload).map_err(|e| AttestationError::new(SagaStep::Commit, e))?;
        self.ctx
            .store
            .put(&commitment, payload, &nonce)
            .await
            .map_err(|e| AttestationError::new(SagaStep::Store, e).with_commitment(commitment))?;
        Ok(commitment)
    }

    async fn start(
        &self,
        commitment: Commitment,
        identity: &str,
        claims: Claims,
    ) -> Result<AttestationRecord, AttestationError> {
        let _flow = self.lock_flow(&commitment).await;
        let mut saga = Saga::new(commitment, identity, claims);
        if let Err(e) = self.journal.save(&mut saga).await {
            self.ctx.metrics.record_attestation(false);
            return Err(AttestationError::new(SagaStep::Store, e).with_commitment(commitment));
        }
        self.drive(saga).await
    }

    /// Serializes flows on one commitment. Entries are kept for the life
    /// of the orchestrator.
    async fn lock_flow(&self, commitment: &Commitment) -> OwnedMutexGuard<()> {
        let flow = {
            let mut flows = self.flows.lock().await;
            flows
                .entry(*commitment)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        flow.lock_owned().await
    }

    async fn drive(&self, mut saga: Saga) -> Result<AttestationRecord, AttestationError> {
        let commitment = saga.commitment;
        match self.advance(&mut saga).await {
            Ok(record) => Ok(record),
            Err(e) => {
                self.ctx.metrics.record_attestation(false);
                let e = e.with_commitment(commitment);
                if e.source.is_retryable() {
                    warn!(
                        "⚠️ {} attestation {} paused at {}: {}",
                        saga.kind(),
                        commitment,
                        saga.stage.name(),
                        e
                    );
                } else {
                    error!("❌ {} attestation {} failed: {}", saga.kind(), commitment, e);
                }
                Err(e)
            }
        }
    }

    async fn advance(&self, saga: &mut Saga) -> Result<AttestationRecord, AttestationError> {
        let wait = self.ctx.config.confirmation_timeout();
        // Hash broadcast by this run; any other pending tx came from the journal
        let mut in_flight: Option<H256> = None;

        loop {
            let (step, next) = match saga.stage.clone() {
                SagaStage::Committed => {
                    let proofs = self
                        .prove(saga)
                        .await
                        .map_err(|e| AttestationError::new(SagaStep::Prove, e))?;
                    (SagaStep::Prove, SagaStage::Proved { proofs })
                }
                SagaStage::Proved { proofs } => {
                    let step = SagaStep::SubmitProof;
                    let call = self
                        .verifier_call(saga, &proofs)
                        .map_err(|e| AttestationError::new(step, e))?;
                    let hash = self
                        .submit(saga, step, &call, |tx| SagaStage::VerifierPending {
                            proofs: proofs.clone(),
                            tx,
                        })
                        .await?;
                    in_flight = Some(hash);
                    continue;
                }
                SagaStage::VerifierPending { proofs, tx } => {
                    let step = SagaStep::SubmitProof;
                    let tx_hash = tx.hash;
                    let fail = |e: PipelineError| AttestationError::new(step, e).with_tx(Some(tx_hash));
                    let rollback = SagaStage::Proved { proofs };
                    if in_flight != Some(tx_hash) {
                        self.recover(saga, step, &tx, rollback.clone()).await?;
                        in_flight = Some(tx_hash);
                    }
                    let receipt = match self.confirm(tx_hash, wait).await {
                        Ok(receipt) => receipt,
                        Err(e @ PipelineError::Reverted { .. }) => {
                            saga.stage = rollback;
                            self.persist(saga, step).await?;
                            return Err(fail(e));
                        }
                        Err(e) => return Err(fail(e)),
                    };
                    let proof_id = self
                        .ctx
                        .contracts
                        .verifier
                        .event_uint(&receipt, contracts::PROOF_SUBMITTED, "proofId")
                        .map_err(fail)?;
                    info!("✅ Proofs for {} accepted as proof #{}", saga.commitment, proof_id);
                    (
                        step,
                        SagaStage::VerifierSubmitted {
                            proof_id,
                            verifier_tx: tx_hash,
                        },
                    )
                }
                SagaStage::VerifierSubmitted {
                    proof_id,
                    verifier_tx,
                } => {
                    let step = SagaStep::Register;
                    let call = self
                        .registry_call(saga, proof_id)
                        .map_err(|e| AttestationError::new(step, e))?;
                    let hash = self
                        .submit(saga, step, &call, |tx| SagaStage::RegistryPending {
                            proof_id,
                            verifier_tx,
                            tx,
                        })
                        .await?;
                    in_flight = Some(hash);
                    continue;
                }
                SagaStage::RegistryPending {
                    proof_id,
                    verifier_tx,
                    tx,
                } => {
                    let step = SagaStep::Register;
                    let tx_hash = tx.hash;
                    let fail = |e: PipelineError| AttestationError::new(step, e).with_tx(Some(tx_hash));
                    let rollback = SagaStage::VerifierSubmitted {
                        proof_id,
                        verifier_tx,
                    };
                    if in_flight != Some(tx_hash) {
                        self.recover(saga, step, &tx, rollback.clone()).await?;
                        in_flight = Some(tx_hash);
                    }
                    let receipt = match self.confirm(tx_hash, wait).await {
                        Ok(receipt) => receipt,
                        Err(e @ PipelineError::Reverted { .. }) => {
                            saga.stage = rollback;
                            self.persist(saga, step).await?;
                            return Err(fail(e));
                        }
                        Err(e) => return Err(fail(e)),
                    };
                    let (event, field) = entity_event(saga.kind());
                    let entity_id = self
                        .ctx
                        .contracts
                        .registry
                        .event_uint(&receipt, event, field)
                        .map_err(fail)?;
                    (
                        step,
                        SagaStage::Completed(Anchored {
                            proof_id,
                            verifier_tx,
                            registry_tx: tx_hash,
                            entity_id,
                            block_number: receipt.block_number,
                        }),
                    )
                }
                SagaStage::Completed(anchor) => {
                    return Ok(self.finish(saga, &anchor).await);
                }
            };

            saga.stage = next;
            self.persist(saga, step).await?;
        }
    }

    /// Sign `call`, journal the pending stage built from the signed
    /// transaction, then broadcast it. The identity's lane is held
    /// throughout.
    ///
    /// A refusal or a repeated nonce conflict restores the previous stage.
    /// A lost answer leaves the saga pending on the journalled hash, which
    /// the error carries.
    async fn submit<F>(
        &self,
        saga: &mut Saga,
        step: SagaStep,
        call: &ContractCall,
        pending: F,
    ) -> Result<H256, AttestationError>
    where
        F: Fn(SignedTransaction) -> SagaStage,
    {
        let dispatcher = &self.ctx.dispatcher;
        let before = saga.stage.clone();
        let mut retried = false;

        loop {
            let (mut lane, signed) = dispatcher
                .sign(&saga.identity, call, None)
                .await
                .map_err(|e| AttestationError::new(step, e))?;
            let hash = signed.hash;

            saga.stage = pending(signed.clone());
            if let Err(e) = self.journal.save(saga).await {
                saga.stage = before;
                dispatcher.builder().reset_lane(&mut lane);
                return Err(AttestationError::new(step, e));
            }

            let outcome = dispatcher.broadcast_signed(&mut lane, &signed).await;
            drop(lane);
            match outcome {
                Ok(Broadcast::Accepted(_)) => return Ok(hash),
                Ok(Broadcast::Rejected(reason)) => {
                    saga.stage = before;
                    self.persist(saga, step).await?;
                    return Err(AttestationError::new(
                        step,
                        PipelineError::BroadcastRejected { reason },
                    ));
                }
                Err(PipelineError::NonceConflict { reason }) if !retried => {
                    warn!(
                        "🔁 Re-signing {}.{} for {} after nonce conflict: {}",
                        call.contract, call.function, saga.identity, reason
                    );
                    retried = true;
                    saga.stage = before.clone();
                    self.persist(saga, step).await?;
                }
                Err(e @ PipelineError::NonceConflict { .. }) => {
                    saga.stage = before;
                    self.persist(saga, step).await?;
                    return Err(AttestationError::new(step, e));
                }
                Err(e) => {
                    warn!(
                        "⚠️ No answer for {:?} from {}, keeping it pending",
                        hash, saga.identity
                    );
                    return Err(AttestationError::new(step, e).with_tx(Some(hash)));
                }
            }
        }
    }

    /// Settle a journalled transaction this run did not broadcast: keep it
    /// if the ledger has a receipt, otherwise hand the same bytes to the
    /// node again. If its nonce went to another transaction, `rollback`
    /// becomes the stage so the next run signs afresh.
    async fn recover(
        &self,
        saga: &mut Saga,
        step: SagaStep,
        tx: &SignedTransaction,
        rollback: SagaStage,
    ) -> Result<(), AttestationError> {
        let submitter = self.ctx.dispatcher.submitter();
        let fail = |e: PipelineError| AttestationError::new(step, e).with_tx(Some(tx.hash));

        if submitter.query_outcome(tx.hash).await.map_err(fail)?.is_some() {
            return Ok(());
        }

        info!(
            "📤 Re-sending journalled {:?} from {} (nonce {})",
            tx.hash, tx.identity, tx.nonce
        );
        match self.ctx.dispatcher.rebroadcast(tx).await {
            Ok(Broadcast::Accepted(_)) => Ok(()),
            Ok(Broadcast::Rejected(reason)) => {
                saga.stage = rollback;
                self.persist(saga, step).await?;
                Err(AttestationError::new(
                    step,
                    PipelineError::BroadcastRejected { reason },
                ))
            }
            Err(e @ PipelineError::NonceConflict { .. }) => {
                // The nonce is spent; by this transaction only if it has a receipt
                if submitter.query_outcome(tx.hash).await.map_err(fail)?.is_some() {
                    return Ok(());
                }
                warn!(
                    "⚠️ Nonce {} of {} went to another transaction, re-signing on next resume",
                    tx.nonce, tx.identity
                );
                saga.stage = rollback;
                self.persist(saga, step).await?;
                Err(AttestationError::new(step, e))
            }
            Err(e) => Err(fail(e)),
        }
    }

    async fn persist(&self, saga: &mut Saga, step: SagaStep) -> Result<(), AttestationError> {
        self.journal
            .save(saga)
            .await
            .map_err(|e| AttestationError::new(step, e).with_tx(saga.stage.pending_tx()))
    }

    async fn finish(&self, saga: &Saga, anchor: &Anchored) -> AttestationRecord {
        let anchored_at = match self.ctx.ledger.block_timestamp(anchor.block_number).await {
            Ok(Some(t)) => Utc.timestamp_opt(t as i64, 0).single(),
            Ok(None) => None,
            Err(e) => {
                debug!("Block {} timestamp unavailable: {}", anchor.block_number, e);
                None
            }
        };
        let record = record_of(saga, anchor, anchored_at);

        self.records
            .write()
            .await
            .insert(saga.commitment, record.clone());
        self.ctx.metrics.record_attestation(true);
        info!(
            "✅ {} attestation {} recorded as #{} in block {}",
            record.kind, record.commitment, record.entity_id, record.block_number
        );
        record
    }

    async fn prove(&self, saga: &Saga) -> Result<[ProofArtifact; 2], PipelineError> {
        let (circuits, inputs) = self.circuit_inputs(saga).await?;
        let first = self.prove_one(circuits[0], saga.commitment, &inputs).await?;
        let second = self.prove_one(circuits[1], saga.commitment, &inputs).await?;
        Ok([first, second])
    }

    async fn prove_one(
        &self,
        circuit: CircuitId,
        commitment: Commitment,
        inputs: &NamedInputs,
    ) -> Result<ProofArtifact, PipelineError> {
        let required: NamedInputs = circuit
            .required_inputs()
            .iter()
            .filter_map(|name| inputs.get(*name).map(|v| (name.to_string(), *v)))
            .collect();

        let started = Instant::now();
        let artifact = match self.ctx.prover.prove(circuit, commitment, &required).await {
            Ok(artifact) => artifact,
            Err(e) => {
                self.ctx.metrics.record_proof_failure();
                return Err(e.into());
            }
        };
        self.ctx
            .metrics
            .record_proof(started.elapsed().as_millis() as u64);

        if artifact.circuit != circuit || artifact.commitment != commitment {
            return Err(ProverError::malformed(format!(
                "artifact for {} / {} returned for {} / {}",
                artifact.circuit, artifact.commitment, circuit, commitment
            ))
            .into());
        }
        if artifact.is_insecure() && !self.ctx.config.allow_insecure_prover {
            return Err(PipelineError::InsecureProofRefused {
                circuit: circuit.to_string(),
            });
        }
        debug!("Proof {} ready for {}", circuit, commitment);
        Ok(artifact)
    }

    /// Circuit inputs rebuilt from the journalled claims and stored nonces
    async fn circuit_inputs(
        &self,
        saga: &Saga,
    ) -> Result<([CircuitId; 2], NamedInputs), PipelineError> {
        let mut inputs = NamedInputs::new();
        let mut put = |name: &str, value: U256| {
            inputs.insert(name.to_string(), value);
        };

        let circuits = match &saga.claims {
            Claims::Model { accuracy, rmse, .. } => {
                let (_, nonce) = self.ctx.store.get(&saga.commitment).await?;
                put("model_commitment", commitment_input(&saga.commitment));
                put("accuracy", *accuracy);
                put("rmse", *rmse);
                put("nonce", nonce_input(&nonce));
                [CircuitId::ModelAccuracy, CircuitId::ModelRmse]
            }
            Claims::Sensor {
                air_temp,
                process_temp,
                rotational_speed,
                torque,
                tool_wear,
                ..
            } => {
                let (_, nonce) = self.ctx.store.get(&saga.commitment).await?;
                put("data_commitment", commitment_input(&saga.commitment));
                put("air_temp", *air_temp);
                put("process_temp", *process_temp);
                put("rotational_speed", *rotational_speed);
                put("torque", *torque);
                put("tool_wear", *tool_wear);
                put("nonce", nonce_input(&nonce));
                [CircuitId::SensorValidity, CircuitId::SensorRange]
            }
            Claims::Prediction {
                model_commitment,
                input_commitment,
                rul,
                failure_probability,
                ..
            } => {
                let (_, input_nonce) = self.ctx.store.get(input_commitment).await?;
                let (_, output_nonce) = self.ctx.store.get(&saga.commitment).await?;
                put("input_commitment", commitment_input(input_commitment));
                put("output_commitment", commitment_input(&saga.commitment));
                put("model_commitment", commitment_input(model_commitment));
                put("rul_prediction", *rul);
                put("failure_probability", *failure_probability);
                put("input_nonce", nonce_input(&input_nonce));
                put("output_nonce", nonce_input(&output_nonce));
                [
                    CircuitId::PredictionComputation,
                    CircuitId::PredictionConsistency,
                ]
            }
        };
        Ok((circuits, inputs))
    }

    fn verifier_call(
        &self,
        saga: &Saga,
        proofs: &[ProofArtifact; 2],
    ) -> Result<ContractCall, PipelineError> {
        let function = match saga.kind() {
            AttestationKind::Model => contracts::SUBMIT_MODEL_PROOF,
            AttestationKind::Sensor => contracts::SUBMIT_SENSOR_PROOF,
            AttestationKind::Prediction => contracts::SUBMIT_PREDICTION_PROOF,
        };
        let mut args = vec![saga.commitment.to_token()];
        args.extend(proofs[0].to_tokens());
        args.extend(proofs[1].to_tokens());
        self.ctx.contracts.verifier.call(function, &args)
    }

    fn registry_call(&self, saga: &Saga, proof_id: U256) -> Result<ContractCall, PipelineError> {
        let (function, args) = match &saga.claims {
            Claims::Model {
                model_type,
                domain_type,
                accuracy,
                rmse,
            } => (
                contracts::REGISTER_MODEL,
                vec![
                    saga.commitment.to_token(),
                    Token::String(model_type.clone()),
                    Token::String(domain_type.clone()),
                    Token::Uint(*accuracy),
                    Token::Uint(*rmse),
                    Token::Uint(proof_id),
                ],
            ),
            Claims::Sensor {
                machine_type,
                data_count,
                metadata_hash,
                ..
            } => (
                contracts::SUBMIT_SENSOR_DATA,
                vec![
                    saga.commitment.to_token(),
                    Token::String(machine_type.clone()),
                    Token::Uint(*data_count),
                    Token::FixedBytes(metadata_hash.as_bytes().to_vec()),
                    Token::Uint(proof_id),
                ],
            ),
            Claims::Prediction {
                model_id,
                sensor_data_id,
                input_commitment,
                confidence_score,
                ..
            } => (
                contracts::MAKE_PREDICTION,
                vec![
                    Token::Uint(*model_id),
                    Token::Uint(*sensor_data_id),
                    input_commitment.to_token(),
                    saga.commitment.to_token(),
                    Token::Uint(*confidence_score),
                    Token::Uint(proof_id),
                ],
            ),
        };
        self.ctx.contracts.registry.call(function, &args)
    }

    async fn confirm(&self, tx_hash: H256, wait: Duration) -> Result<Receipt, PipelineError> {
        match self.ctx.dispatcher.await_confirmation(tx_hash, wait).await? {
            Outcome::Confirmed(receipt) => Ok(receipt),
            Outcome::Reverted(receipt) => Err(PipelineError::Reverted {
                tx_hash,
                block_number: receipt.block_number,
            }),
            Outcome::TimedOut { tx_hash } => Err(PipelineError::TimedOut {
                tx_hash,
                timeout: wait,
            }),
            Outcome::BroadcastRejected { reason } => Err(PipelineError::BroadcastRejected { reason }),
        }
    }
}

fn entity_event(kind: AttestationKind) -> (&'static str, &'static str) {
    match kind {
        AttestationKind::Model => (contracts::MODEL_REGISTERED, "modelId"),
        AttestationKind::Sensor => (contracts::SENSOR_DATA_SUBMITTED, "dataId"),
        AttestationKind::Prediction => (contracts::PREDICTION_RECORDED, "predictionId"),
    }
}

fn record_of(
    saga: &Saga,
    anchor: &Anchored,
    anchored_at: Option<DateTime<Utc>>,
) -> AttestationRecord {
    let input_commitment = match &saga.claims {
        Claims::Prediction {
            input_commitment, ..
        } => Some(*input_commitment),
        _ => None,
    };
    AttestationRecord {
        kind: saga.kind(),
        identity: saga.identity.clone(),
        commitment: saga.commitment,
        input_commitment,
        proof_id: anchor.proof_id,
        entity_id: anchor.entity_id,
        verifier_tx: anchor.verifier_tx,
        registry_tx: anchor.registry_tx,
        block_number: anchor.block_number,
        anchored_at,
    }
}
