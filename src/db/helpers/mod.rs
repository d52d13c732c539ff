use std::convert::TryFrom;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub fn to_i64(value: u32) -> i64 {
    i64::from(value)
}

pub fn to_u32(value: i64, field: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| anyhow!("{field} contains out-of-range value {value}"))
}

pub fn to_bool(value: i64, field: &str) -> Result<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(anyhow!("{field} contains non-boolean value {other}")),
    }
}

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

pub fn parse_uuid(value: &str, field: &str) -> Result<Uuid> {
    Uuid::parse_str(value).with_context(|| format!("failed to parse {field}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_negative_durations() {
        assert!(to_u32(-1, "duration_seconds").is_err());
        assert_eq!(to_u32(42, "duration_seconds").unwrap(), 42);
    }

    #[test]
    fn boolean_columns_are_strict() {
        assert!(!to_bool(0, "synced").unwrap());
        assert!(to_bool(1, "synced").unwrap());
        assert!(to_bool(2, "synced").is_err());
    }
}
