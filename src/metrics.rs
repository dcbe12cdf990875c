// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Submission and proving counters
//!
//! Cheap to clone; every clone shares the same counters. Exported in
//! Prometheus text format by the CLI `metrics` command.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Counters {
    broadcasts: AtomicU64,
    confirmed: AtomicU64,
    reverted: AtomicU64,
    timed_out: AtomicU64,
    rejected: AtomicU64,
    nonce_conflicts: AtomicU64,
    proofs_generated: AtomicU64,
    proof_failures: AtomicU64,
    proof_duration_ms: AtomicU64,
    attestations_completed: AtomicU64,
    attestations_failed: AtomicU64,
}

#[derive(Debug, Clone, Default)]
pub struct SubmissionMetrics {
    counters: Arc<Counters>,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub broadcasts: u64,
    pub confirmed: u64,
    pub reverted: u64,
    pub timed_out: u64,
    pub rejected: u64,
    pub nonce_conflicts: u64,
    pub proofs_generated: u64,
    pub proof_failures: u64,
    pub proof_duration_ms: u64,
    pub attestations_completed: u64,
    pub attestations_failed: u64,
}

impl SubmissionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_broadcast(&self) {
        self.counters.broadcasts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_confirmed(&self) {
        self.counters.confirmed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reverted(&self) {
        self.counters.reverted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timed_out(&self) {
        self.counters.timed_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.counters.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_nonce_conflict(&self) {
        self.counters.nonce_conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_proof(&self, duration_ms: u64) {
        self.counters.proofs_generated.fetch_add(1, Ordering::Relaxed);
        self.counters
            .proof_duration_ms
            .fetch_add(duration_ms, Ordering::Relaxed);
    }

    pub fn record_proof_failure(&self) {
        self.counters.proof_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_attestation(&self, success: bool) {
        if success {
            self.counters
                .attestations_completed
                .fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters
                .attestations_failed
                .fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let c = &self.counters;
        MetricsSnapshot {
            broadcasts: c.broadcasts.load(Ordering::Relaxed),
            confirmed: c.confirmed.load(Ordering::Relaxed),
            reverted: c.reverted.load(Ordering::Relaxed),
            timed_out: c.timed_out.load(Ordering::Relaxed),
            rejected: c.rejected.load(Ordering::Relaxed),
            nonce_conflicts: c.nonce_conflicts.load(Ordering::Relaxed),
            proofs_generated: c.proofs_generated.load(Ordering::Relaxed),
            proof_failures: c.proof_failures.load(Ordering::Relaxed),
            proof_duration_ms: c.proof_duration_ms.load(Ordering::Relaxed),
            attestations_completed: c.attestations_completed.load(Ordering::Relaxed),
            attestations_failed: c.attestations_failed.load(Ordering::Relaxed),
        }
    }

    /// Average proof generation time in milliseconds
    pub fn avg_proof_ms(&self) -> f64 {
        let s = self.snapshot();
        if s.proofs_generated == 0 {
            0.0
        } else {
            s.proof_duration_ms as f64 / s.proofs_generated as f64
        }
    }

    /// Export metrics in Prometheus text format
    pub fn export_prometheus(&self) -> String {
        let s = self.snapshot();
        let counters = [
            ("attest_tx_broadcast_total", "Transactions handed to the ledger", s.broadcasts),
            ("attest_tx_confirmed_total", "Transactions confirmed successfully", s.confirmed),
            ("attest_tx_reverted_total", "Transactions included but reverted", s.reverted),
            ("attest_tx_timed_out_total", "Confirmation waits that hit the deadline", s.timed_out),
            ("attest_tx_rejected_total", "Broadcasts refused by the node", s.rejected),
            ("attest_nonce_conflicts_total", "Broadcasts that hit a nonce conflict", s.nonce_conflicts),
            ("attest_proofs_generated_total", "Proofs produced", s.proofs_generated),
            ("attest_proof_failures_total", "Proof requests that failed", s.proof_failures),
            ("attest_attestations_completed_total", "Attestation flows completed", s.attestations_completed),
            ("attest_attestations_failed_total", "Attestation flows that failed", s.attestations_failed),
        ];

        let mut out = String::new();
        for (name, help, value) in counters {
            let _ = writeln!(out, "# HELP {} {}", name, help);
            let _ = writeln!(out, "# TYPE {} counter", name);
            let _ = writeln!(out, "{} {}\n", name, value);
        }
        let _ = writeln!(out, "# HELP attest_avg_proof_ms Average proof generation time in milliseconds");
        let _ = writeln!(out, "# TYPE attest_avg_proof_ms gauge");
        let _ = writeln!(out, "attest_avg_proof_ms {:.2}", self.avg_proof_ms());
        out
    }
}
