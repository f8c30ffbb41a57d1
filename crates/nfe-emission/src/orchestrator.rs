//! # Emission Orchestrator
//!
//! Drives one document through the full emission protocol: access-key
//! stamping, canonical assembly, signing, availability-gated submission,
//! response interpretation, and contingency entry when the authority
//! cannot be reached.
//!
//! ## Ownership
//!
//! The orchestrator exclusively owns contingency records and document
//! lifecycle state, held behind the [`EmissionStore`] repository it is
//! constructed with. Transport and signing are stateless collaborators
//! invoked by value.
//!
//! ## Concurrency
//!
//! `emit` is `&self`; emissions run fully in parallel. The only shared
//! mutable state is the contingency queue (guarded per document by a
//! lease set) and the availability cache (read-mostly, single-writer
//! refresh).

use std::sync::Arc;

use dashmap::DashMap;

use nfe_core::{
    random_control_code, AccessKey, DocumentState, EmissionTimestamp, FiscalDocument,
};
use nfe_sefaz::{
    AuthorityResponse, Endpoint, LotSequence, Outcome, SefazTransport, StatusTable,
    SubmissionBatch, SubmissionReply,
};
use nfe_sign::{sign, SignedEnvelope, SigningCapability};
use nfe_xml::{assemble, assemble_epec_event, EpecEvent};

use crate::availability::AvailabilityCache;
use crate::config::EmissionConfig;
use crate::contingency::{ContingencyMode, ContingencyRecord};
use crate::error::EmissionError;
use crate::store::{DocumentRecord, EmissionStore};

/// Result of driving one document through the emission protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmissionOutcome {
    /// The authority authorized the document.
    Authorized {
        /// Access key of the document.
        access_key: AccessKey,
        /// Authorization protocol number.
        protocol: String,
    },
    /// The authority rejected the document; a human must correct and
    /// re-emit.
    Rejected {
        /// Access key of the document.
        access_key: AccessKey,
        /// Whether a corrected resubmission could fix it.
        outcome: Outcome,
        /// The rejection response.
        response: AuthorityResponse,
    },
    /// The document was routed to contingency; reconciliation will finish
    /// it.
    Contingency {
        /// Access key of the document.
        access_key: AccessKey,
        /// Mode the document entered contingency under.
        mode: ContingencyMode,
    },
    /// The batch was received but the final result is still pending; the
    /// receipt is parked for reconciliation.
    Pending {
        /// Access key of the document.
        access_key: AccessKey,
        /// Receipt for the outstanding poll.
        receipt: String,
    },
}

/// The emission orchestrator.
pub struct Emitter {
    pub(crate) transport: Arc<dyn SefazTransport>,
    pub(crate) signer: Arc<dyn SigningCapability>,
    pub(crate) store: Arc<dyn EmissionStore>,
    pub(crate) endpoint: Endpoint,
    pub(crate) table: StatusTable,
    pub(crate) availability: AvailabilityCache,
    pub(crate) lots: LotSequence,
    pub(crate) leases: DashMap<String, ()>,
    pub(crate) config: EmissionConfig,
}

impl Emitter {
    /// Assemble an orchestrator from its collaborators.
    pub fn new(
        transport: Arc<dyn SefazTransport>,
        signer: Arc<dyn SigningCapability>,
        store: Arc<dyn EmissionStore>,
        endpoint: Endpoint,
        table: StatusTable,
        config: EmissionConfig,
    ) -> Self {
        let availability = AvailabilityCache::new(config.probe_ttl());
        Self {
            transport,
            signer,
            store,
            endpoint,
            table,
            availability,
            lots: LotSequence::starting_at(1),
            leases: DashMap::new(),
            config,
        }
    }

    /// Emit a document: stamp, assemble, sign, submit.
    pub async fn emit(&self, document: FiscalDocument) -> Result<EmissionOutcome, EmissionError> {
        let control_code = random_control_code();
        self.emit_with_control_code(document, &control_code).await
    }

    /// Emit with an explicit 8-digit control code (`cNF`), for callers
    /// that need deterministic keys.
    pub async fn emit_with_control_code(
        &self,
        document: FiscalDocument,
        control_code: &str,
    ) -> Result<EmissionOutcome, EmissionError> {
        let key = AccessKey::generate(&document.access_key_fields(control_code))?;

        // A key already known to the engine must still be in DRAFT;
        // signing anything further along is a lifecycle violation.
        match self.store.document(&key) {
            Some(existing) => {
                existing.state.transition_to(DocumentState::Signed)?;
            }
            None => {
                self.store
                    .put_document(&key, DocumentRecord::draft(document.clone()));
            }
        }

        let xml = assemble(&document, &key)?;
        let envelope = sign(&xml, &key.element_id(), self.signer.as_ref())?;

        self.commit_transition(&key, DocumentState::Signed)?;
        self.store.update_document(&key, &mut |record| {
            record.envelope = Some(envelope.clone());
        })?;
        tracing::info!(access_key = %key, "document signed");

        self.submit_signed(&key).await
    }

    /// Emit with a caller-supplied deadline over the submission phase.
    ///
    /// On expiry the in-flight call is aborted and a transport timeout is
    /// surfaced; local state is not rolled back, so the document stays
    /// `SIGNED` and can be retried or routed to contingency.
    pub async fn emit_with_deadline(
        &self,
        document: FiscalDocument,
        deadline: std::time::Duration,
    ) -> Result<EmissionOutcome, EmissionError> {
        let control_code = random_control_code();
        self.emit_with_deadline_and_code(document, &control_code, deadline)
            .await
    }

    /// [`emit_with_deadline`](Self::emit_with_deadline) with an explicit
    /// control code.
    pub async fn emit_with_deadline_and_code(
        &self,
        document: FiscalDocument,
        control_code: &str,
        deadline: std::time::Duration,
    ) -> Result<EmissionOutcome, EmissionError> {
        match tokio::time::timeout(
            deadline,
            self.emit_with_control_code(document, control_code),
        )
        .await
        {
            Ok(result) => result,
            Err(_elapsed) => Err(EmissionError::Transport(
                nfe_sefaz::TransportError::Timeout {
                    endpoint: self.endpoint.urls.authorization.to_string(),
                    elapsed_ms: deadline.as_millis() as u64,
                },
            )),
        }
    }

    /// Drop the cached availability verdict so the next submission or
    /// reconciliation cycle probes the authority again.
    pub fn invalidate_availability(&self) {
        self.availability.invalidate();
    }

    /// Submit (or resubmit) an already-signed document.
    ///
    /// The document must be `SIGNED` or `CONTINGENCY`; anything else is a
    /// lifecycle violation.
    pub async fn submit_signed(&self, key: &AccessKey) -> Result<EmissionOutcome, EmissionError> {
        let record = self
            .store
            .document(key)
            .ok_or_else(|| crate::store::StoreError::NotFound {
                access_key: key.as_str().to_string(),
            })?;

        // Fail fast before any network work.
        record.state.transition_to(DocumentState::Submitted)?;
        let envelope = record
            .envelope
            .clone()
            .ok_or_else(|| nfe_core::StateError::InvalidTransition {
                from: record.state,
                to: DocumentState::Submitted,
                reason: "no signed envelope".into(),
            })?;

        if !self
            .availability
            .is_available(self.transport.as_ref(), &self.table, &self.endpoint)
            .await
        {
            tracing::warn!(access_key = %key, "authority unavailable, entering contingency");
            return self
                .enter_contingency(key, envelope, "availability probe negative")
                .await;
        }

        let batch = SubmissionBatch::single(
            self.lots.next(),
            envelope.xml().to_string(),
            self.config.synchronous_submission,
        );
        match self.transport.submit_batch(&batch, &self.endpoint).await {
            Err(error) => {
                tracing::warn!(access_key = %key, %error, "submission failed, entering contingency");
                self.availability.invalidate();
                self.enter_contingency(key, envelope, error.to_string()).await
            }
            Ok(reply) => self.interpret_reply(key, envelope, reply).await,
        }
    }

    async fn interpret_reply(
        &self,
        key: &AccessKey,
        envelope: SignedEnvelope,
        reply: SubmissionReply,
    ) -> Result<EmissionOutcome, EmissionError> {
        let response = reply.response().clone();
        self.append_response(key, response.clone());

        match self.table.classify_response(&response) {
            Outcome::ServiceUnavailable => {
                self.availability.invalidate();
                self.enter_contingency(key, envelope, format!("cStat {}", response.status))
                    .await
            }
            Outcome::Success => {
                self.mark_authorized(key, &response)?;
                Ok(EmissionOutcome::Authorized {
                    access_key: key.clone(),
                    protocol: response.protocol.clone().unwrap_or_default(),
                })
            }
            outcome @ (Outcome::RejectedRecoverable | Outcome::RejectedFatal) => {
                self.mark_rejected(key)?;
                Ok(EmissionOutcome::Rejected {
                    access_key: key.clone(),
                    outcome,
                    response,
                })
            }
            Outcome::Pending => {
                self.commit_transition(key, DocumentState::Submitted)?;
                match reply {
                    SubmissionReply::Receipt { receipt, .. } => {
                        self.follow_up_poll(key, envelope, receipt).await
                    }
                    // Pending without a receipt cannot be polled; park it
                    // for reconciliation by status query.
                    SubmissionReply::Immediate(_) => {
                        self.park_received(key, envelope, None, "pending without receipt")
                    }
                }
            }
        }
    }

    /// Short poll loop after a batch lands `PENDING`.
    async fn follow_up_poll(
        &self,
        key: &AccessKey,
        envelope: SignedEnvelope,
        receipt: String,
    ) -> Result<EmissionOutcome, EmissionError> {
        for attempt in 1..=self.config.poll_attempts {
            tokio::time::sleep(self.config.poll_delay()).await;
            match self.transport.poll_receipt(&receipt, &self.endpoint).await {
                Err(error) => {
                    tracing::warn!(access_key = %key, attempt, %error, "receipt poll failed");
                    return self.park_received(key, envelope, Some(receipt), &error.to_string());
                }
                Ok(response) => {
                    self.append_response(key, response.clone());
                    match self.table.classify_response(&response) {
                        Outcome::Pending => continue,
                        Outcome::Success => {
                            self.mark_authorized(key, &response)?;
                            return Ok(EmissionOutcome::Authorized {
                                access_key: key.clone(),
                                protocol: response.protocol.clone().unwrap_or_default(),
                            });
                        }
                        outcome @ (Outcome::RejectedRecoverable | Outcome::RejectedFatal) => {
                            self.mark_rejected(key)?;
                            return Ok(EmissionOutcome::Rejected {
                                access_key: key.clone(),
                                outcome,
                                response,
                            });
                        }
                        Outcome::ServiceUnavailable => {
                            self.availability.invalidate();
                            return self.park_received(
                                key,
                                envelope,
                                Some(receipt),
                                &format!("cStat {}", response.status),
                            );
                        }
                    }
                }
            }
        }
        self.park_received(key, envelope, Some(receipt), "result still pending")
    }

    /// Route a signed document into contingency: persist the record and,
    /// in event-based mode, register the pre-authorization event.
    async fn enter_contingency(
        &self,
        key: &AccessKey,
        envelope: SignedEnvelope,
        reason: impl Into<String>,
    ) -> Result<EmissionOutcome, EmissionError> {
        self.commit_transition(key, DocumentState::Contingency)?;

        let mode = self.config.contingency_mode;
        let mut record = ContingencyRecord::new(key.clone(), envelope, mode);
        record.last_error = Some(reason.into());
        let mut record = match self.store.put_contingency(record) {
            Ok(stored) => stored,
            Err(crate::store::StoreError::AlreadyQueued { .. }) => {
                tracing::debug!(access_key = %key, "document already parked");
                return Ok(EmissionOutcome::Contingency {
                    access_key: key.clone(),
                    mode,
                });
            }
            Err(other) => return Err(other.into()),
        };
        tracing::info!(access_key = %key, %mode, "document parked for reconciliation");

        if mode == ContingencyMode::Epec {
            self.register_epec(key, &mut record).await;
        }

        Ok(EmissionOutcome::Contingency {
            access_key: key.clone(),
            mode,
        })
    }

    /// Park a document the authority received but whose final result is
    /// outstanding. The document stays `SUBMITTED`; reconciliation polls
    /// the receipt (or queries status) until a terminal outcome.
    fn park_received(
        &self,
        key: &AccessKey,
        envelope: SignedEnvelope,
        receipt: Option<String>,
        reason: &str,
    ) -> Result<EmissionOutcome, EmissionError> {
        let mut record =
            ContingencyRecord::new(key.clone(), envelope, ContingencyMode::LocalPending);
        record.receipt = receipt.clone();
        record.last_error = Some(reason.to_string());
        match self.store.put_contingency(record) {
            Ok(_) | Err(crate::store::StoreError::AlreadyQueued { .. }) => {}
            Err(other) => return Err(other.into()),
        }
        tracing::info!(access_key = %key, ?receipt, "submitted document parked awaiting result");
        match receipt {
            Some(receipt) => Ok(EmissionOutcome::Pending {
                access_key: key.clone(),
                receipt,
            }),
            None => Ok(EmissionOutcome::Contingency {
                access_key: key.clone(),
                mode: ContingencyMode::LocalPending,
            }),
        }
    }

    /// Best-effort registration of the EPEC pre-authorization event.
    ///
    /// A failure here leaves the record queued; the full document is
    /// resubmitted by reconciliation either way.
    async fn register_epec(&self, key: &AccessKey, record: &mut ContingencyRecord) {
        let Some(document_record) = self.store.document(key) else {
            tracing::warn!(access_key = %key, "no document record for EPEC event");
            return;
        };
        let document = &document_record.document;
        let now = chrono::Utc::now()
            .with_timezone(document.header.emitted_at.as_datetime().offset());
        let event = EpecEvent {
            access_key: key.clone(),
            issuer_cnpj: document.issuer.cnpj.as_str().to_string(),
            environment: document.header.environment,
            registered_at: EmissionTimestamp::from_datetime(now).to_canonical_string(),
            total: document.totals.total.to_layout_string(),
            sequence: 1,
        };

        let result = async {
            let xml = assemble_epec_event(&event)?;
            let signed = sign(&xml, &event.element_id(), self.signer.as_ref())
                .map_err(EmissionError::Signature)?;
            let response = self
                .transport
                .submit_event(&self.lots.next().as_digits(), signed.xml(), &self.endpoint)
                .await?;
            Ok::<AuthorityResponse, EmissionError>(response)
        }
        .await;

        match result {
            Ok(response) => {
                self.append_response(key, response.clone());
                if self.table.classify_response(&response) == Outcome::Success {
                    record.epec_registered = true;
                    if let Err(error) = self.store.update_contingency(record) {
                        tracing::warn!(access_key = %key, %error, "EPEC bookkeeping failed");
                    }
                    tracing::info!(access_key = %key, "EPEC event registered");
                } else {
                    tracing::warn!(
                        access_key = %key,
                        status = response.status,
                        "EPEC event not accepted"
                    );
                }
            }
            Err(error) => {
                tracing::warn!(access_key = %key, %error, "EPEC event submission failed");
            }
        }
    }

    // ── lifecycle bookkeeping ────────────────────────────────────────────

    pub(crate) fn commit_transition(
        &self,
        key: &AccessKey,
        to: DocumentState,
    ) -> Result<(), EmissionError> {
        let mut transition: Result<(), EmissionError> = Ok(());
        self.store.update_document(key, &mut |record| {
            if record.state == to {
                return; // already committed by this flow
            }
            match record.state.transition_to(to) {
                Ok(next) => record.state = next,
                Err(error) => transition = Err(error.into()),
            }
        })?;
        transition
    }

    pub(crate) fn append_response(&self, key: &AccessKey, response: AuthorityResponse) {
        let result = self.store.update_document(key, &mut |record| {
            record.responses.push(response.clone());
        });
        if let Err(error) = result {
            tracing::warn!(access_key = %key, %error, "response retained in log only");
        }
    }

    pub(crate) fn mark_authorized(
        &self,
        key: &AccessKey,
        response: &AuthorityResponse,
    ) -> Result<(), EmissionError> {
        if let Some(record) = self.store.document(key) {
            if matches!(
                record.state,
                DocumentState::Signed | DocumentState::Contingency
            ) {
                self.commit_transition(key, DocumentState::Submitted)?;
            }
        }
        self.commit_transition(key, DocumentState::Authorized)?;
        let protocol = response.protocol.clone();
        self.store.update_document(key, &mut |record| {
            record.protocol = protocol.clone();
        })?;
        tracing::info!(access_key = %key, protocol = ?response.protocol, "document authorized");
        Ok(())
    }

    pub(crate) fn mark_rejected(&self, key: &AccessKey) -> Result<(), EmissionError> {
        if let Some(record) = self.store.document(key) {
            if matches!(
                record.state,
                DocumentState::Signed | DocumentState::Contingency
            ) {
                self.commit_transition(key, DocumentState::Submitted)?;
            }
        }
        self.commit_transition(key, DocumentState::Rejected)?;
        tracing::info!(access_key = %key, "document rejected");
        Ok(())
    }

    // ── per-document leases ──────────────────────────────────────────────

    /// Try to take the resubmission lease for a document. Returns `false`
    /// when another task holds it.
    pub(crate) fn acquire_lease(&self, key: &AccessKey) -> bool {
        use dashmap::mapref::entry::Entry;
        match self.leases.entry(key.as_str().to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(());
                true
            }
        }
    }

    /// Release a lease taken with [`acquire_lease`](Self::acquire_lease).
    pub(crate) fn release_lease(&self, key: &AccessKey) {
        self.leases.remove(key.as_str());
    }
}
