//! # Authority Transport Client
//!
//! The async trait covering the authority's five operations, and its
//! production implementation over HTTP.
//!
//! ## Error Handling
//!
//! Network-level failures (timeout, connection refused, malformed
//! response bytes) surface as [`TransportError`], the transient class the
//! orchestrator may route to contingency. A well-formed reply with a
//! non-success status is *not* an error: it comes back as an
//! [`AuthorityResponse`] and is classified by the interpreter.
//!
//! ## Timeout
//!
//! Every call carries a bounded per-request timeout (default 30 s).
//! Caller-side deadlines compose on top via `tokio::time::timeout`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use url::Url;

use nfe_core::AccessKey;

use crate::batch::SubmissionBatch;
use crate::endpoints::Endpoint;
use crate::error::TransportError;
use crate::response::{parse_authority_response, AuthorityResponse, SubmissionReply};
use crate::soap::{
    authorization_payload, envelope, event_payload, protocol_query_payload, receipt_poll_payload,
    status_service_payload, SoapOperation, OP_AUTHORIZATION, OP_EVENT_RECEPTION,
    OP_PROTOCOL_QUERY, OP_RECEIPT_POLL, OP_STATUS_SERVICE,
};

/// The authority operations the engine drives.
///
/// Implementations must be `Send + Sync`; they are shared via `Arc`
/// across emission tasks and the reconciliation loop. The trait is
/// object-safe so tests can substitute call-counting mocks.
#[async_trait]
pub trait SefazTransport: Send + Sync {
    /// Submit a batch. The authority either answers with the final
    /// result or hands back a receipt for polling; the reply preserves
    /// which happened.
    async fn submit_batch(
        &self,
        batch: &SubmissionBatch,
        endpoint: &Endpoint,
    ) -> Result<SubmissionReply, TransportError>;

    /// Poll the result of a previously submitted batch.
    async fn poll_receipt(
        &self,
        receipt: &str,
        endpoint: &Endpoint,
    ) -> Result<AuthorityResponse, TransportError>;

    /// Query the current protocol/status of a document by access key.
    async fn query_status(
        &self,
        key: &AccessKey,
        endpoint: &Endpoint,
    ) -> Result<AuthorityResponse, TransportError>;

    /// Submit a signed event (pre-authorization, for event-based
    /// contingency).
    async fn submit_event(
        &self,
        lot_digits: &str,
        signed_event: &str,
        endpoint: &Endpoint,
    ) -> Result<AuthorityResponse, TransportError>;

    /// Probe the status service.
    async fn heartbeat(&self, endpoint: &Endpoint) -> Result<AuthorityResponse, TransportError>;
}

/// Configuration for the HTTP client.
#[derive(Debug, Clone)]
pub struct SefazClientConfig {
    /// Per-call timeout.
    pub timeout: Duration,
}

impl Default for SefazClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
        }
    }
}

/// Production transport over HTTP.
#[derive(Debug, Clone)]
pub struct SefazClient {
    http: reqwest::Client,
    timeout: Duration,
}

impl SefazClient {
    /// Build a client from configuration.
    pub fn new(config: SefazClientConfig) -> Result<Self, TransportError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/xml; charset=utf-8"),
        );
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| TransportError::Unavailable {
                endpoint: "(client construction)".into(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            http,
            timeout: config.timeout,
        })
    }

    /// One SOAP round trip: wrap, post, surface transport failures,
    /// return the response body for parsing.
    async fn call(
        &self,
        operation: SoapOperation,
        url: &Url,
        payload: &nfe_xml::CanonicalXml,
    ) -> Result<String, TransportError> {
        let body = envelope(operation, payload)
            .map_err(|e| TransportError::MalformedResponse {
                endpoint: url.to_string(),
                reason: format!("envelope construction failed: {e}"),
            })?;

        let result = self
            .http
            .post(url.clone())
            .header("SOAPAction", operation.soap_action())
            .body(body.into_string())
            .send()
            .await;

        let response = result.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout {
                    endpoint: url.to_string(),
                    elapsed_ms: self.timeout.as_millis() as u64,
                }
            } else {
                TransportError::Unavailable {
                    endpoint: url.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| TransportError::Unavailable {
                endpoint: url.to_string(),
                reason: format!("body read failed: {e}"),
            })?;

        if !status.is_success() {
            tracing::warn!(
                endpoint = %url,
                http_status = status.as_u16(),
                operation = operation.method,
                "authority endpoint returned HTTP failure"
            );
            return Err(TransportError::Unavailable {
                endpoint: url.to_string(),
                reason: format!("HTTP {status}"),
            });
        }

        Ok(text)
    }
}

#[async_trait]
impl SefazTransport for SefazClient {
    async fn submit_batch(
        &self,
        batch: &SubmissionBatch,
        endpoint: &Endpoint,
    ) -> Result<SubmissionReply, TransportError> {
        let url = &endpoint.urls.authorization;
        let payload =
            authorization_payload(batch).map_err(|e| TransportError::MalformedResponse {
                endpoint: url.to_string(),
                reason: format!("payload construction failed: {e}"),
            })?;
        let body = self.call(OP_AUTHORIZATION, url, &payload).await?;
        let response = parse_authority_response(url.as_str(), &body)?;

        tracing::info!(
            lot = %batch.id,
            status = response.status,
            "batch submission answered"
        );

        if response.protocol.is_some() {
            return Ok(SubmissionReply::Immediate(response));
        }
        match response.receipt.clone() {
            Some(receipt) => Ok(SubmissionReply::Receipt { receipt, response }),
            None => Ok(SubmissionReply::Immediate(response)),
        }
    }

    async fn poll_receipt(
        &self,
        receipt: &str,
        endpoint: &Endpoint,
    ) -> Result<AuthorityResponse, TransportError> {
        let url = &endpoint.urls.receipt_poll;
        let payload = receipt_poll_payload(endpoint.environment.code(), receipt).map_err(|e| {
            TransportError::MalformedResponse {
                endpoint: url.to_string(),
                reason: format!("payload construction failed: {e}"),
            }
        })?;
        let body = self.call(OP_RECEIPT_POLL, url, &payload).await?;
        parse_authority_response(url.as_str(), &body)
    }

    async fn query_status(
        &self,
        key: &AccessKey,
        endpoint: &Endpoint,
    ) -> Result<AuthorityResponse, TransportError> {
        let url = &endpoint.urls.protocol_query;
        let payload =
            protocol_query_payload(endpoint.environment.code(), key).map_err(|e| {
                TransportError::MalformedResponse {
                    endpoint: url.to_string(),
                    reason: format!("payload construction failed: {e}"),
                }
            })?;
        let body = self.call(OP_PROTOCOL_QUERY, url, &payload).await?;
        parse_authority_response(url.as_str(), &body)
    }

    async fn submit_event(
        &self,
        lot_digits: &str,
        signed_event: &str,
        endpoint: &Endpoint,
    ) -> Result<AuthorityResponse, TransportError> {
        let url = &endpoint.urls.event_reception;
        let payload = event_payload(lot_digits, signed_event).map_err(|e| {
            TransportError::MalformedResponse {
                endpoint: url.to_string(),
                reason: format!("payload construction failed: {e}"),
            }
        })?;
        let body = self.call(OP_EVENT_RECEPTION, url, &payload).await?;
        parse_authority_response(url.as_str(), &body)
    }

    async fn heartbeat(&self, endpoint: &Endpoint) -> Result<AuthorityResponse, TransportError> {
        let url = &endpoint.urls.status_service;
        let payload = status_service_payload(
            endpoint.environment.code(),
            &endpoint.state.as_digits(),
        )
        .map_err(|e| TransportError::MalformedResponse {
            endpoint: url.to_string(),
            reason: format!("payload construction failed: {e}"),
        })?;
        let body = self.call(OP_STATUS_SERVICE, url, &payload).await?;
        parse_authority_response(url.as_str(), &body)
    }
}
