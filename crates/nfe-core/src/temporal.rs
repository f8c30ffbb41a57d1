//! # Temporal Types
//!
//! Emission timestamps carry the issuer's UTC offset, because the layout
//! renders `dhEmi` as ISO 8601 with an explicit offset and the access key
//! derives its year-month field from the issuer's local date. Subsecond
//! precision is truncated so that two renderings of the same timestamp are
//! byte-identical.

use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// An emission timestamp with the issuer's fixed UTC offset and
/// second-level precision.
///
/// Serializes to ISO 8601 with offset (e.g. `2025-01-15T10:30:00-03:00`),
/// the exact form the layout requires for `dhEmi`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmissionTimestamp(DateTime<FixedOffset>);

impl EmissionTimestamp {
    /// Create a timestamp from a `chrono::DateTime<FixedOffset>`,
    /// truncating subsecond precision.
    pub fn from_datetime(dt: DateTime<FixedOffset>) -> Self {
        Self(dt.with_nanosecond_truncated())
    }

    /// Parse from an RFC 3339 string.
    pub fn parse(s: &str) -> Result<Self, chrono::ParseError> {
        DateTime::parse_from_rfc3339(s).map(Self::from_datetime)
    }

    /// Access the underlying `chrono` value.
    pub fn as_datetime(&self) -> &DateTime<FixedOffset> {
        &self.0
    }

    /// Render in the canonical layout form: RFC 3339 with offset,
    /// seconds precision, no subseconds.
    pub fn to_canonical_string(&self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::Secs, false)
    }

    /// The `AAMM` (two-digit year, two-digit month) field of the access
    /// key, taken from the issuer's local date.
    pub fn year_month_digits(&self) -> String {
        self.0.format("%y%m").to_string()
    }

    /// The same instant in UTC, for audit ordering.
    pub fn to_utc(&self) -> DateTime<Utc> {
        self.0.with_timezone(&Utc)
    }
}

impl std::fmt::Display for EmissionTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_canonical_string())
    }
}

/// Truncation helper kept off the public surface.
trait TruncateNanos {
    fn with_nanosecond_truncated(self) -> Self;
}

impl TruncateNanos for DateTime<FixedOffset> {
    fn with_nanosecond_truncated(self) -> Self {
        use chrono::Timelike;
        // with_nanosecond(0) only fails for leap-second values, which
        // cannot come out of the rounded value passed here.
        self.with_nanosecond(0).unwrap_or(self)
    }
}
