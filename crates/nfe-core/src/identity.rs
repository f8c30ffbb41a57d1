//! # Identity Newtypes
//!
//! Domain-primitive newtypes for the identifiers that make up a fiscal
//! document header. Each identifier is a distinct type with a validating
//! constructor, so a series can never be passed where a document number is
//! expected and malformed values are rejected at the boundary.
//!
//! ## Validation
//!
//! All of these are fixed-width digit strings in the authority's layout:
//!
//! - CNPJ: 14 digits (issuer tax id)
//! - CPF: 11 digits (natural-person recipient)
//! - State code: 2-digit IBGE federation unit code, from the closed list
//! - Series: 0..=999, rendered as 3 digits in the access key
//! - Document number: 1..=999_999_999, rendered as 9 digits
//! - Municipality code: 7 digits

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Helper macro to implement `Deserialize` for string newtypes that must
/// validate their contents. Deserializes as a plain `String`, then routes
/// through the type's `new()` constructor so that invalid values are
/// rejected at deserialization time, not silently accepted.
macro_rules! impl_validating_deserialize {
    ($ty:ident) => {
        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let raw = String::deserialize(deserializer)?;
                Self::new(&raw).map_err(serde::de::Error::custom)
            }
        }
    };
}

fn all_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

// ---------------------------------------------------------------------------
// CNPJ / CPF
// ---------------------------------------------------------------------------

/// A CNPJ, the 14-digit federal tax id of a legal entity.
///
/// Format-validated only (14 ASCII digits). Registry-level validity is the
/// authority's concern and is reported back as a business rejection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Cnpj(String);

impl Cnpj {
    /// Validate and construct a CNPJ from a 14-digit string.
    pub fn new(raw: &str) -> Result<Self, ValidationError> {
        if raw.len() != 14 || !all_digits(raw) {
            return Err(ValidationError::invalid(
                "CNPJ",
                format!("expected 14 digits, got {:?}", raw),
            ));
        }
        Ok(Self(raw.to_string()))
    }

    /// The canonical 14-digit form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Cnpj {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl_validating_deserialize!(Cnpj);

/// A CPF, the 11-digit federal tax id of a natural person.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Cpf(String);

impl Cpf {
    /// Validate and construct a CPF from an 11-digit string.
    pub fn new(raw: &str) -> Result<Self, ValidationError> {
        if raw.len() != 11 || !all_digits(raw) {
            return Err(ValidationError::invalid(
                "CPF",
                format!("expected 11 digits, got {:?}", raw),
            ));
        }
        Ok(Self(raw.to_string()))
    }

    /// The canonical 11-digit form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Cpf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl_validating_deserialize!(Cpf);

// ---------------------------------------------------------------------------
// State code
// ---------------------------------------------------------------------------

/// IBGE federation-unit codes that can issue fiscal documents.
const IBGE_STATE_CODES: &[u8] = &[
    11, 12, 13, 14, 15, 16, 17, // North
    21, 22, 23, 24, 25, 26, 27, 28, 29, // Northeast
    31, 32, 33, 35, // Southeast
    41, 42, 43, // South
    50, 51, 52, 53, // Center-West
];

/// A 2-digit IBGE federation unit (state) code.
///
/// Serializes in its 2-digit string form so serialized configuration and
/// records round-trip through the validating constructor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateCode(u8);

impl Serialize for StateCode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.as_digits())
    }
}

impl StateCode {
    /// Validate and construct a state code from its 2-digit string form.
    pub fn new(raw: &str) -> Result<Self, ValidationError> {
        if raw.len() != 2 || !all_digits(raw) {
            return Err(ValidationError::invalid(
                "cUF",
                format!("expected 2 digits, got {:?}", raw),
            ));
        }
        let code: u8 = raw.parse().map_err(|_| {
            ValidationError::invalid("cUF", format!("not numeric: {:?}", raw))
        })?;
        Self::from_code(code)
    }

    /// Construct from a numeric IBGE code.
    pub fn from_code(code: u8) -> Result<Self, ValidationError> {
        if !IBGE_STATE_CODES.contains(&code) {
            return Err(ValidationError::invalid(
                "cUF",
                format!("{code} is not an IBGE federation unit code"),
            ));
        }
        Ok(Self(code))
    }

    /// The numeric IBGE code.
    pub fn code(&self) -> u8 {
        self.0
    }

    /// The zero-padded 2-digit form used in the access key and layout.
    pub fn as_digits(&self) -> String {
        format!("{:02}", self.0)
    }
}

impl std::fmt::Display for StateCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_digits())
    }
}

impl_validating_deserialize!(StateCode);

// ---------------------------------------------------------------------------
// Series / document number
// ---------------------------------------------------------------------------

/// A document series, 0..=999, rendered as 3 zero-padded digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Series(u16);

impl Serialize for Series {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.as_digits())
    }
}

impl Series {
    /// Validate and construct a series from its numeric value.
    pub fn new_numeric(value: u16) -> Result<Self, ValidationError> {
        if value > 999 {
            return Err(ValidationError::invalid(
                "serie",
                format!("expected 0..=999, got {value}"),
            ));
        }
        Ok(Self(value))
    }

    /// Validate and construct a series from a digit string of up to 3 digits.
    pub fn new(raw: &str) -> Result<Self, ValidationError> {
        if raw.is_empty() || raw.len() > 3 || !all_digits(raw) {
            return Err(ValidationError::invalid(
                "serie",
                format!("expected up to 3 digits, got {:?}", raw),
            ));
        }
        let value: u16 = raw
            .parse()
            .map_err(|_| ValidationError::invalid("serie", format!("not numeric: {:?}", raw)))?;
        Self::new_numeric(value)
    }

    /// The numeric value.
    pub fn value(&self) -> u16 {
        self.0
    }

    /// Zero-padded 3-digit form for the access key.
    pub fn as_digits(&self) -> String {
        format!("{:03}", self.0)
    }
}

impl std::fmt::Display for Series {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_digits())
    }
}

impl_validating_deserialize!(Series);

/// A document number, 1..=999_999_999, rendered as 9 zero-padded digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocNumber(u32);

impl Serialize for DocNumber {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.as_digits())
    }
}

impl DocNumber {
    /// Validate and construct a document number from its numeric value.
    pub fn new_numeric(value: u32) -> Result<Self, ValidationError> {
        if value == 0 || value > 999_999_999 {
            return Err(ValidationError::invalid(
                "nNF",
                format!("expected 1..=999999999, got {value}"),
            ));
        }
        Ok(Self(value))
    }

    /// Validate and construct a document number from a digit string.
    pub fn new(raw: &str) -> Result<Self, ValidationError> {
        if raw.is_empty() || raw.len() > 9 || !all_digits(raw) {
            return Err(ValidationError::invalid(
                "nNF",
                format!("expected up to 9 digits, got {:?}", raw),
            ));
        }
        let value: u32 = raw
            .parse()
            .map_err(|_| ValidationError::invalid("nNF", format!("not numeric: {:?}", raw)))?;
        Self::new_numeric(value)
    }

    /// The numeric value.
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Zero-padded 9-digit form for the access key.
    pub fn as_digits(&self) -> String {
        format!("{:09}", self.0)
    }
}

impl std::fmt::Display for DocNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_digits())
    }
}

impl_validating_deserialize!(DocNumber);

// ---------------------------------------------------------------------------
// Municipality code
// ---------------------------------------------------------------------------

/// A 7-digit IBGE municipality code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct MunicipalityCode(String);

impl MunicipalityCode {
    /// Validate and construct a municipality code from a 7-digit string.
    pub fn new(raw: &str) -> Result<Self, ValidationError> {
        if raw.len() != 7 || !all_digits(raw) {
            return Err(ValidationError::invalid(
                "cMun",
                format!("expected 7 digits, got {:?}", raw),
            ));
        }
        Ok(Self(raw.to_string()))
    }

    /// The canonical 7-digit form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MunicipalityCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl_validating_deserialize!(MunicipalityCode);
