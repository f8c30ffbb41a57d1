//! # Availability Cache
//!
//! Cached heartbeat probing of one authority endpoint. The probe result
//! (positive or negative) is cached for the configured lifetime, so a
//! burst of emissions during an outage does not hammer the status
//! service. Reads are lock-free in the common case; refreshing is
//! single-writer behind an async gate.

use std::time::Duration;

use parking_lot::RwLock;
use tokio::time::Instant;

use nfe_sefaz::{Endpoint, Outcome, SefazTransport, StatusTable};

#[derive(Debug, Clone, Copy)]
struct Probe {
    at: Instant,
    available: bool,
}

/// Cached availability of one authority endpoint.
#[derive(Debug)]
pub struct AvailabilityCache {
    ttl: Duration,
    probe: RwLock<Option<Probe>>,
    refresh_gate: tokio::sync::Mutex<()>,
}

impl AvailabilityCache {
    /// A cache with the given probe lifetime.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            probe: RwLock::new(None),
            refresh_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Current cached verdict, if still fresh.
    fn cached(&self) -> Option<bool> {
        let guard = self.probe.read();
        guard
            .filter(|p| p.at.elapsed() < self.ttl)
            .map(|p| p.available)
    }

    /// Whether the endpoint is available, probing at most once per TTL.
    ///
    /// The heartbeat answers with the service status code; anything other
    /// than an operational reply (including transport failure) counts as
    /// unavailable.
    pub async fn is_available(
        &self,
        transport: &dyn SefazTransport,
        table: &StatusTable,
        endpoint: &Endpoint,
    ) -> bool {
        if let Some(available) = self.cached() {
            return available;
        }

        let _writer = self.refresh_gate.lock().await;
        // Another task may have refreshed while this one waited.
        if let Some(available) = self.cached() {
            return available;
        }

        let available = match transport.heartbeat(endpoint).await {
            Ok(response) => table.classify_response(&response) == Outcome::Success,
            Err(error) => {
                tracing::warn!(%error, "availability probe failed");
                false
            }
        };
        *self.probe.write() = Some(Probe {
            at: Instant::now(),
            available,
        });
        tracing::debug!(available, "availability probe refreshed");
        available
    }

    /// Drop the cached verdict so the next check probes again.
    pub fn invalidate(&self) {
        *self.probe.write() = None;
    }
}
