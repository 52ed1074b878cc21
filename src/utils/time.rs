//! Timestamp helpers.
//!
//! `serialize` and `deserialize` form a serde adapter (`#[serde(with =
//! "crate::utils::time")]`) that stores an `OffsetDateTime` as RFC 3339 text.

use serde::{Deserialize, Deserializer, Serializer};
use time::format_description::well_known::Rfc3339;
use time::{Date, OffsetDateTime, UtcOffset};

/// Deserialize an RFC 3339 formatted string into an OffsetDateTime
pub fn deserialize<'de, D>(deserializer: D) -> Result<OffsetDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    OffsetDateTime::parse(&s, &Rfc3339).map_err(serde::de::Error::custom)
}

/// Serialize an OffsetDateTime into an RFC 3339 formatted string
pub fn serialize<S>(datetime: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let s = datetime
        .format(&Rfc3339)
        .map_err(serde::ser::Error::custom)?;
    serializer.serialize_str(&s)
}

/// The local UTC offset, or UTC when it cannot be determined.
///
/// On Unix the offset can only be read while the process is
/// single-threaded, so resolve it once at startup and pass it along.
pub fn local_offset() -> UtcOffset {
    UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC)
}

/// Current wall-clock time expressed in `offset`.
pub fn now_at(offset: UtcOffset) -> OffsetDateTime {
    OffsetDateTime::now_utc().to_offset(offset)
}

/// Today's date as seen from `offset`.
pub fn today_at(offset: UtcOffset) -> Date {
    now_at(offset).date()
}
