//! # nfe-sefaz — Authority Transport for the NF-e Emission Engine
//!
//! Talks to the tax authority's federated web services:
//!
//! - [`endpoints`]: per-(state, environment) endpoint table, consumed
//!   from outer configuration.
//! - [`soap`]: fixed SOAP envelope shapes and operation payloads, one
//!   `SOAPAction` per operation.
//! - [`batch`]: submission lots and the in-process lot id sequence.
//! - [`client`]: the [`SefazTransport`] trait and its HTTP
//!   implementation with bounded timeouts.
//! - [`response`]: immutable [`AuthorityResponse`] records, retained
//!   for audit.
//! - [`interpreter`]: the total, table-driven classification of status
//!   codes into outcome categories.

pub mod batch;
pub mod client;
pub mod endpoints;
pub mod error;
pub mod interpreter;
pub mod response;
pub mod soap;

// Re-export primary types.
pub use batch::{LotId, LotSequence, SubmissionBatch};
pub use client::{SefazClient, SefazClientConfig, SefazTransport};
pub use endpoints::{Endpoint, EndpointTable, ServiceUrls};
pub use error::TransportError;
pub use interpreter::{Outcome, StatusTable};
pub use response::{parse_authority_response, AuthorityResponse, SubmissionReply};
