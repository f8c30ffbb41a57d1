//! # nfe-core — Domain Model for the NF-e Emission Engine
//!
//! This crate provides the domain building blocks used throughout the
//! workspace:
//!
//! - **Identifier newtypes** with validating constructors (CNPJ, CPF,
//!   state code, series, document number, municipality code).
//! - **Fixed-point amounts** ([`Amount`], [`Quantity`]) so that rendered
//!   values are a pure function of stored values; floats never enter the
//!   signed byte stream.
//! - **The fiscal document model** ([`FiscalDocument`]) as handed to the
//!   engine, taxes pre-computed.
//! - **The document lifecycle state machine** ([`DocumentState`]) with
//!   structured transition errors.
//! - **The 44-digit access key** ([`AccessKey`]) and its mod-11 check
//!   digit.

pub mod access_key;
pub mod document;
pub mod error;
pub mod identity;
pub mod lifecycle;
pub mod money;
pub mod temporal;

// Re-export primary types.
pub use access_key::{random_control_code, AccessKey, AccessKeyFields};
pub use document::{
    Address, Carrier, DocumentHeader, DocumentModel, DocumentTotals, EmissionType, Environment,
    FiscalDocument, Issuer, LineItem, LineTaxes, Payment, PurposeCode, Recipient, RecipientTaxId,
    TaxGroup, TransportBlock,
};
pub use error::{StateError, ValidationError};
pub use identity::{Cnpj, Cpf, DocNumber, MunicipalityCode, Series, StateCode};
pub use lifecycle::DocumentState;
pub use money::{Amount, Quantity};
pub use temporal::EmissionTimestamp;
