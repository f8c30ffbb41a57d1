//! # Fixed-Point Amounts
//!
//! Monetary values and quantities are fixed-point integers, never floats.
//! Float arithmetic has non-deterministic rendering edge cases, and the
//! signature is computed over the rendered form, so the rendered form must
//! be a pure function of the stored value.
//!
//! - [`Amount`]: centavos (2 decimal places), rendered as `1234.56`.
//! - [`Quantity`]: ten-thousandths (4 decimal places), rendered as
//!   `1.0000`, the commercial-quantity precision of the layout.
//!
//! Both render with `.` as the separator regardless of locale.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A non-negative monetary amount in centavos.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(u64);

impl Amount {
    /// Zero.
    pub const ZERO: Amount = Amount(0);

    /// Construct from an integer number of centavos.
    pub fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Parse from the layout's decimal form (`1234.56`, at most 2
    /// decimal places, `.` separator).
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        parse_fixed(raw, 2)
            .map(Self)
            .map_err(|reason| ValidationError::invalid("vNF", reason))
    }

    /// The value in centavos.
    pub fn cents(&self) -> u64 {
        self.0
    }

    /// Saturating sum, for aggregate checks.
    pub fn saturating_add(self, other: Amount) -> Amount {
        Amount(self.0.saturating_add(other.0))
    }

    /// Render in the layout form: two decimal places, `.` separator.
    pub fn to_layout_string(&self) -> String {
        format!("{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_layout_string())
    }
}

/// A non-negative quantity in ten-thousandths of the commercial unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quantity(u64);

impl Quantity {
    /// Construct from an integer number of ten-thousandths.
    pub fn from_ten_thousandths(value: u64) -> Self {
        Self(value)
    }

    /// Construct from a whole number of units.
    pub fn from_units(units: u64) -> Self {
        Self(units * 10_000)
    }

    /// Parse from the layout's decimal form (at most 4 decimal places).
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        parse_fixed(raw, 4)
            .map(Self)
            .map_err(|reason| ValidationError::invalid("qCom", reason))
    }

    /// Render in the layout form: four decimal places, `.` separator.
    pub fn to_layout_string(&self) -> String {
        format!("{}.{:04}", self.0 / 10_000, self.0 % 10_000)
    }
}

impl std::fmt::Display for Quantity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_layout_string())
    }
}

/// Parse a non-negative decimal string into fixed-point with `scale`
/// decimal places. Rejects signs, exponents, group separators, and more
/// fractional digits than `scale`.
fn parse_fixed(raw: &str, scale: u32) -> Result<u64, String> {
    let (int_part, frac_part) = match raw.split_once('.') {
        Some((i, f)) => (i, f),
        None => (raw, ""),
    };
    if int_part.is_empty() || !int_part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("malformed decimal {:?}", raw));
    }
    if frac_part.len() as u32 > scale || !frac_part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!(
            "expected at most {scale} decimal places in {:?}",
            raw
        ));
    }
    let base: u64 = int_part
        .parse()
        .map_err(|_| format!("integer part out of range in {:?}", raw))?;
    let mut frac: u64 = if frac_part.is_empty() {
        0
    } else {
        frac_part
            .parse()
            .map_err(|_| format!("fraction out of range in {:?}", raw))?
    };
    frac *= 10u64.pow(scale - frac_part.len() as u32);
    base.checked_mul(10u64.pow(scale))
        .and_then(|v| v.checked_add(frac))
        .ok_or_else(|| format!("value out of range: {:?}", raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    // -- Amount -----------------------------------------------------------------

    #[test]
    fn amount_renders_two_places() {
        assert_eq!(Amount::from_cents(0).to_layout_string(), "0.00");
        assert_eq!(Amount::from_cents(5).to_layout_string(), "0.05");
        assert_eq!(Amount::from_cents(123_456).to_layout_string(), "1234.56");
    }

    #[test]
    fn amount_parse_round_trips() {
        for raw in ["0.00", "0.05", "1234.56", "10.00"] {
            let parsed = Amount::parse(raw).expect("parse");
            assert_eq!(parsed.to_layout_string(), raw);
        }
    }

    #[test]
    fn amount_parse_accepts_short_forms() {
        assert_eq!(Amount::parse("7").expect("parse").cents(), 700);
        assert_eq!(Amount::parse("7.5").expect("parse").cents(), 750);
    }

    #[test]
    fn amount_parse_rejects_malformed() {
        for raw in ["", "-1.00", "1,00", "1.234", "1.2.3", "1e2", ".50"] {
            assert!(Amount::parse(raw).is_err(), "{raw:?} should be rejected");
        }
    }

    // -- Quantity ---------------------------------------------------------------

    #[test]
    fn quantity_renders_four_places() {
        assert_eq!(Quantity::from_units(1).to_layout_string(), "1.0000");
        assert_eq!(
            Quantity::from_ten_thousandths(12_345).to_layout_string(),
            "1.2345"
        );
    }

    #[test]
    fn quantity_parse_round_trips() {
        for raw in ["1.0000", "0.5000", "12.3456"] {
            let parsed = Quantity::parse(raw).expect("parse");
            assert_eq!(parsed.to_layout_string(), raw);
        }
    }

    #[test]
    fn quantity_rejects_more_than_four_places() {
        assert!(Quantity::parse("1.00001").is_err());
    }
}
