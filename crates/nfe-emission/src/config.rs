//! # Emission Configuration
//!
//! The knobs outer configuration hands to the orchestrator. Durations are
//! carried as whole seconds in serialized form.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::contingency::ContingencyMode;

/// Orchestrator configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmissionConfig {
    /// Availability probe cache lifetime in seconds (default 300).
    pub probe_ttl_secs: u64,
    /// Reconciliation cycle interval in seconds (default 300).
    pub reconcile_interval_secs: u64,
    /// Reconciliation attempts before escalation (default 48).
    pub retry_ceiling: u32,
    /// Contingency mode entered when the authority is unreachable.
    pub contingency_mode: ContingencyMode,
    /// Request synchronous batch processing (`indSinc`).
    pub synchronous_submission: bool,
    /// Follow-up polls after a batch lands `PENDING` in the emission
    /// path, before the document is handed to reconciliation.
    pub poll_attempts: u32,
    /// Delay between those follow-up polls, in seconds.
    pub poll_delay_secs: u64,
}

impl Default for EmissionConfig {
    fn default() -> Self {
        Self {
            probe_ttl_secs: 300,
            reconcile_interval_secs: 300,
            retry_ceiling: 48,
            contingency_mode: ContingencyMode::LocalPending,
            synchronous_submission: true,
            poll_attempts: 3,
            poll_delay_secs: 1,
        }
    }
}

impl EmissionConfig {
    /// Availability probe cache lifetime.
    pub fn probe_ttl(&self) -> Duration {
        Duration::from_secs(self.probe_ttl_secs)
    }

    /// Reconciliation cycle interval.
    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }

    /// Delay between follow-up polls.
    pub fn poll_delay(&self) -> Duration {
        Duration::from_secs(self.poll_delay_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_recommendations() {
        let config = EmissionConfig::default();
        assert_eq!(config.probe_ttl(), Duration::from_secs(300));
        assert_eq!(config.reconcile_interval(), Duration::from_secs(300));
        assert_eq!(config.retry_ceiling, 48);
        assert!(config.synchronous_submission);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config: EmissionConfig =
            serde_json::from_str(r#"{"retry_ceiling": 5}"#).expect("parse");
        assert_eq!(config.retry_ceiling, 5);
        assert_eq!(config.probe_ttl_secs, 300);
    }
}
