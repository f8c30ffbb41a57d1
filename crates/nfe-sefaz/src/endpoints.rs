//! # Endpoint Resolution
//!
//! The authority is federated: every state runs its own web services, in
//! two environments (homologation and production). This module models the
//! per-(state, environment) endpoint table that outer configuration hands
//! to the engine.
//!
//! The table is plain serde data; YAML helpers are provided because that
//! is how deployments ship it.

use serde::{Deserialize, Serialize};
use url::Url;

use nfe_core::{Environment, StateCode};

/// URLs of the five authority services of one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceUrls {
    /// Batch submission (`NFeAutorizacao4`).
    pub authorization: Url,
    /// Receipt polling (`NFeRetAutorizacao4`).
    pub receipt_poll: Url,
    /// Protocol/status query (`NFeConsultaProtocolo4`).
    pub protocol_query: Url,
    /// Event reception (`NFeRecepcaoEvento4`).
    pub event_reception: Url,
    /// Service status / heartbeat (`NFeStatusServico4`).
    pub status_service: Url,
}

/// One resolved endpoint: a state, an environment, and its service URLs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// The federation unit this endpoint serves.
    pub state: StateCode,
    /// The environment this endpoint belongs to.
    pub environment: Environment,
    /// Service URLs.
    pub urls: ServiceUrls,
}

/// The endpoint table consumed from outer configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointTable {
    /// All configured endpoints.
    pub endpoints: Vec<Endpoint>,
}

impl EndpointTable {
    /// Parse a table from YAML text.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Resolve the endpoint for a (state, environment) pair.
    pub fn resolve(&self, state: StateCode, environment: Environment) -> Option<&Endpoint> {
        self.endpoints
            .iter()
            .find(|e| e.state == state && e.environment == environment)
    }
}
