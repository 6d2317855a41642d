//! Column encodings shared by the repositories.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC strings so that
//! lexicographic order matches chronological order.

use std::str::FromStr;

use chrono::SecondsFormat;

use robofleet_domain::id::ZoneId;
use robofleet_domain::time::Timestamp;

use crate::error::StorageError;

pub(crate) fn timestamp(ts: Timestamp) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(value: &str) -> Result<Timestamp, sqlx::Error> {
    chrono::DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.to_utc())
        .map_err(|err| sqlx::Error::Decode(Box::new(err)))
}

pub(crate) fn parse_optional_timestamp(
    value: Option<String>,
) -> Result<Option<Timestamp>, sqlx::Error> {
    value.as_deref().map(parse_timestamp).transpose()
}

/// Parse any column holding the textual form of a domain value.
pub(crate) fn parse<T>(value: &str) -> Result<T, sqlx::Error>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    T::from_str(value).map_err(|err| sqlx::Error::Decode(Box::new(err)))
}

pub(crate) fn zones(zone_ids: &[ZoneId]) -> Result<String, StorageError> {
    Ok(serde_json::to_string(zone_ids)?)
}

pub(crate) fn parse_zones(value: &str) -> Result<Vec<ZoneId>, sqlx::Error> {
    serde_json::from_str(value).map_err(|err| sqlx::Error::Decode(Box::new(err)))
}

pub(crate) fn percentage(value: i64) -> Result<i32, sqlx::Error> {
    i32::try_from(value).map_err(|err| sqlx::Error::Decode(Box::new(err)))
}
