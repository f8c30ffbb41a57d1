//! # Reconciliation Loop
//!
//! Periodically re-probes the authority and, when it is reachable, drives
//! every parked contingency record toward a terminal state:
//!
//! - each record is attempted at most once per cycle, under its
//!   per-document lease, so concurrent cycles never resubmit the same
//!   record twice simultaneously;
//! - a record with a receipt is polled; one without is resubmitted whole
//!   (after a status-query shortcut that catches documents the authority
//!   already authorized on a lost response);
//! - retries are bounded: past the configured ceiling the record is
//!   reported for escalation instead of retried, and is never
//!   auto-cancelled.
//!
//! The loop itself is a plain `run_reconciliation_cycle` method driven by
//! an interval task, so tests invoke cycles directly without timers.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use nfe_core::DocumentState;
use nfe_sefaz::{Outcome, SubmissionBatch, SubmissionReply};

use crate::contingency::ContingencyRecord;
use crate::orchestrator::Emitter;

/// What one reconciliation cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationReport {
    /// Whether the availability probe allowed the cycle to run.
    pub probed_available: bool,
    /// Records attempted this cycle.
    pub attempted: u32,
    /// Documents that reached `AUTHORIZED`.
    pub authorized: u32,
    /// Documents that reached `REJECTED`.
    pub rejected: u32,
    /// Records left queued for the next cycle.
    pub rescheduled: u32,
    /// Access keys whose retry ceiling is exhausted; each needs a human.
    pub escalations: Vec<String>,
}

enum ReconcileOutcome {
    Authorized,
    Rejected,
    Rescheduled,
}

impl Emitter {
    /// Run one reconciliation cycle over the pending contingency queue.
    pub async fn run_reconciliation_cycle(&self) -> ReconciliationReport {
        let mut report = ReconciliationReport::default();
        let pending = self.store.pending_contingency();
        if pending.is_empty() {
            return report;
        }

        report.probed_available = self
            .availability
            .is_available(self.transport.as_ref(), &self.table, &self.endpoint)
            .await;
        if !report.probed_available {
            tracing::debug!(
                pending = pending.len(),
                "authority still unavailable, cycle skipped"
            );
            return report;
        }

        for record in pending {
            let key = record.access_key.clone();
            if record.retry_count >= self.config.retry_ceiling {
                let condition = crate::error::EmissionError::EscalationRequired {
                    access_key: key.as_str().to_string(),
                    attempts: record.retry_count,
                };
                tracing::error!(%condition, "reconciliation halted for document");
                report.escalations.push(key.as_str().to_string());
                continue;
            }
            if !self.acquire_lease(&key) {
                // Another cycle or emission path is on this document.
                continue;
            }
            report.attempted += 1;
            let outcome = self.reconcile_record(record).await;
            self.release_lease(&key);
            match outcome {
                ReconcileOutcome::Authorized => report.authorized += 1,
                ReconcileOutcome::Rejected => report.rejected += 1,
                ReconcileOutcome::Rescheduled => report.rescheduled += 1,
            }
        }
        tracing::info!(
            attempted = report.attempted,
            authorized = report.authorized,
            rejected = report.rejected,
            rescheduled = report.rescheduled,
            "reconciliation cycle finished"
        );
        report
    }

    async fn reconcile_record(&self, mut record: ContingencyRecord) -> ReconcileOutcome {
        let key = record.access_key.clone();

        let attempt = if let Some(receipt) = record.receipt.clone() {
            self.transport.poll_receipt(&receipt, &self.endpoint).await
        } else {
            // A previous submission may have been authorized on a reply
            // this process never saw. Only a positive answer
            // short-circuits; any other query result is ignored and the
            // document is resubmitted normally.
            if let Ok(response) = self.transport.query_status(&key, &self.endpoint).await {
                self.append_response(&key, response.clone());
                if self.table.classify_response(&response) == Outcome::Success {
                    return self.finalize_authorized(&key, &response).await;
                }
            }

            let batch = SubmissionBatch::single(
                self.lots.next(),
                record.envelope.xml().to_string(),
                self.config.synchronous_submission,
            );
            self.transport
                .submit_batch(&batch, &self.endpoint)
                .await
                .map(|reply| {
                    if let SubmissionReply::Receipt { receipt, .. } = &reply {
                        record.receipt = Some(receipt.clone());
                    }
                    reply.response().clone()
                })
        };

        match attempt {
            Err(error) => {
                record.note_failure(error.to_string());
                self.persist_record(&record);
                tracing::warn!(
                    access_key = %key,
                    retry_count = record.retry_count,
                    "reconciliation attempt failed, rescheduled"
                );
                ReconcileOutcome::Rescheduled
            }
            Ok(response) => {
                self.append_response(&key, response.clone());
                match self.table.classify_response(&response) {
                    Outcome::Success => self.finalize_authorized(&key, &response).await,
                    Outcome::RejectedRecoverable | Outcome::RejectedFatal => {
                        if let Err(error) = self.mark_rejected(&key) {
                            tracing::warn!(access_key = %key, %error, "rejection bookkeeping failed");
                        }
                        if let Err(error) = self.store.remove_contingency(&key) {
                            tracing::warn!(access_key = %key, %error, "record removal failed");
                        }
                        ReconcileOutcome::Rejected
                    }
                    Outcome::ServiceUnavailable => {
                        self.availability.invalidate();
                        record.note_failure(format!("cStat {}", response.status));
                        self.persist_record(&record);
                        ReconcileOutcome::Rescheduled
                    }
                    Outcome::Pending => {
                        // Batch accepted; keep the receipt and let the
                        // next cycle poll for the result.
                        record.last_attempt = Some(chrono::Utc::now());
                        self.persist_record(&record);
                        if self
                            .store
                            .document(&key)
                            .map(|r| r.state == DocumentState::Contingency)
                            .unwrap_or(false)
                        {
                            if let Err(error) =
                                self.commit_transition(&key, DocumentState::Submitted)
                            {
                                tracing::warn!(access_key = %key, %error, "state bookkeeping failed");
                            }
                        }
                        ReconcileOutcome::Rescheduled
                    }
                }
            }
        }
    }

    async fn finalize_authorized(
        &self,
        key: &nfe_core::AccessKey,
        response: &nfe_sefaz::AuthorityResponse,
    ) -> ReconcileOutcome {
        if let Err(error) = self.mark_authorized(key, response) {
            tracing::warn!(access_key = %key, %error, "authorization bookkeeping failed");
        }
        if let Err(error) = self.store.remove_contingency(key) {
            tracing::warn!(access_key = %key, %error, "record removal failed");
        }
        ReconcileOutcome::Authorized
    }

    fn persist_record(&self, record: &ContingencyRecord) {
        if let Err(error) = self.store.update_contingency(record) {
            tracing::warn!(access_key = %record.access_key, %error, "record update failed");
        }
    }
}

/// Spawn the background reconciliation loop.
///
/// Runs a cycle every `config.reconcile_interval()` until the returned
/// [`ReconcilerHandle`] is shut down or dropped.
pub fn spawn_reconciler(emitter: Arc<Emitter>) -> ReconcilerHandle {
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let interval = emitter.config.reconcile_interval();
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so a fresh process
        // does not race its own first emissions.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    emitter.run_reconciliation_cycle().await;
                }
                result = shutdown_rx.changed() => {
                    if result.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
    });
    ReconcilerHandle { shutdown_tx, task }
}

/// Handle controlling a spawned reconciliation loop.
#[derive(Debug)]
pub struct ReconcilerHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ReconcilerHandle {
    /// Stop the loop and wait for the task to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.task.await;
    }

    /// Abort the loop without waiting.
    pub fn abort(&self) {
        self.task.abort();
    }
}
