//! Message header protocol (wire attributes).
//!
//! Outbound attributes carry exactly two keys:
//! `{"type": "<tag>", "timestamp": "YYYY-MM-DDTHH:MM:SS.ffffffZ"}`.
//!
//! The timestamp profile is a strict subset of RFC3339: six fractional
//! digits and a literal `Z`. Explicit offsets (`+00:00`) are rejected even
//! though they are valid RFC3339. Instants the profile cannot represent
//! (years outside 0000..=9999, leap seconds) are refused in both directions.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, NaiveDateTime, TimeZone, Timelike, Utc};

use crate::error::{QmsgError, Result};
use crate::record::Record;
use crate::registry::Registry;

/// Transport attribute map.
pub type Attributes = BTreeMap<String, String>;

pub const TYPE_KEY: &str = "type";
pub const TIMESTAMP_KEY: &str = "timestamp";

/// `chrono` format string of the wire timestamp profile.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

const TIMESTAMP_LEN: usize = 27;

/// Parsed inbound header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Registered tag (attribute name is `type`).
    pub msg_type: String,
    pub timestamp: DateTime<Utc>,
}

/// Instants that can be placed on the wire.
///
/// Zone-aware values are converted to UTC; naive values are taken to already
/// be UTC wall-clock time.
pub trait IntoUtc {
    fn into_utc(self) -> DateTime<Utc>;
}

impl<Tz: TimeZone> IntoUtc for DateTime<Tz> {
    fn into_utc(self) -> DateTime<Utc> {
        self.with_timezone(&Utc)
    }
}

impl IntoUtc for NaiveDateTime {
    fn into_utc(self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self)
    }
}

/// Outbound attributes stamped with the current time.
pub fn create_attributes<R: Record>(record: &R, registry: &Registry) -> Result<Attributes> {
    create_attributes_at(record, registry, Utc::now())
}

pub fn create_attributes_at<R: Record>(
    record: &R,
    registry: &Registry,
    now: impl IntoUtc,
) -> Result<Attributes> {
    let tag = registry.tag_for::<R>().ok_or_else(|| {
        QmsgError::Configuration(format!("no type defined for record: {record:?}"))
    })?;

    let mut attributes = Attributes::new();
    attributes.insert(TYPE_KEY.to_owned(), tag.to_owned());
    attributes.insert(TIMESTAMP_KEY.to_owned(), format_timestamp(now)?);
    Ok(attributes)
}

/// Parse inbound attributes into a header.
pub fn create_header(attributes: &Attributes) -> Result<Header> {
    let (Some(msg_type), Some(timestamp)) =
        (attributes.get(TYPE_KEY), attributes.get(TIMESTAMP_KEY))
    else {
        return Err(QmsgError::decoding(format!(
            "missing attributes in message: {attributes:?}"
        )));
    };

    let timestamp = parse_timestamp(timestamp)?;
    Ok(Header {
        msg_type: msg_type.clone(),
        timestamp,
    })
}

/// Render `value` in the wire profile.
///
/// Fails with an encoding error when the instant has no four-digit-year,
/// `00..=59` seconds rendering.
pub fn format_timestamp(value: impl IntoUtc) -> Result<String> {
    let value = value.into_utc();
    if !(0..=9999).contains(&value.year()) || value.nanosecond() >= 1_000_000_000 {
        return Err(QmsgError::encoding(format!(
            "timestamp cannot be represented in the header format: {value:?}"
        )));
    }
    Ok(value.format(TIMESTAMP_FORMAT).to_string())
}

pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    strict_parse(value).ok_or_else(|| {
        QmsgError::decoding(format!(
            "timestamp in header is not in a valid RFC3339 format: {value}"
        ))
    })
}

fn strict_parse(value: &str) -> Option<DateTime<Utc>> {
    let bytes = value.as_bytes();
    if bytes.len() != TIMESTAMP_LEN {
        return None;
    }
    for (i, b) in bytes.iter().enumerate() {
        let ok = match i {
            4 | 7 => *b == b'-',
            10 => *b == b'T',
            13 | 16 => *b == b':',
            19 => *b == b'.',
            26 => *b == b'Z',
            _ => b.is_ascii_digit(),
        };
        if !ok {
            return None;
        }
    }

    let naive = NaiveDateTime::parse_from_str(value.get(..19)?, "%Y-%m-%dT%H:%M:%S").ok()?;
    // `:60` parses as a leap second
    if naive.nanosecond() >= 1_000_000_000 {
        return None;
    }
    let micros: u32 = value.get(20..26)?.parse().ok()?;
    let naive = naive.with_nanosecond(micros * 1_000)?;
    Some(Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use chrono::{FixedOffset, NaiveDate};

    use super::*;

    fn sample() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2016, 12, 10, 11, 15, 45).unwrap()
            + chrono::Duration::microseconds(123_456)
    }

    #[test]
    fn formats_utc_instant() {
        assert_eq!(format_timestamp(sample()).unwrap(), "2016-12-10T11:15:45.123456Z");
    }

    #[test]
    fn aware_instant_is_shifted_to_utc() {
        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
        let local = sample().with_timezone(&plus_two);
        assert_eq!(format_timestamp(local).unwrap(), "2016-12-10T11:15:45.123456Z");
    }

    #[test]
    fn naive_instant_is_taken_as_utc() {
        let naive = NaiveDate::from_ymd_opt(2016, 12, 10)
            .unwrap()
            .and_hms_micro_opt(11, 15, 45, 123_456)
            .unwrap();
        assert_eq!(format_timestamp(naive).unwrap(), "2016-12-10T11:15:45.123456Z");
    }

    #[test]
    fn round_trips_to_the_microsecond() {
        let t = sample();
        assert_eq!(parse_timestamp(&format_timestamp(t).unwrap()).unwrap(), t);
    }

    #[test]
    fn zero_micros_still_has_six_digits() {
        let t = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(format_timestamp(t).unwrap(), "2020-01-01T00:00:00.000000Z");
    }

    #[test]
    fn rejects_other_profiles() {
        for bad in [
            "2016-12-10T11:15:45.123456+00:00",
            "2016-12-10T11:15:45Z",
            "2016-12-10T11:15:45.123Z",
            "2016-12-10T11:15:45.1234567Z",
            "2016-12-10 11:15:45.123456Z",
            "2016-13-10T11:15:45.123456Z",
            "2016-12-31T23:59:60.000000Z",
            "2016-12-10T11:15:61.000000Z",
            "",
        ] {
            assert!(parse_timestamp(bad).is_err(), "accepted {bad}");
        }
    }

    #[test]
    fn boundary_years_are_formatted() {
        let first = Utc.with_ymd_and_hms(0, 1, 1, 0, 0, 0).unwrap();
        let last = Utc.with_ymd_and_hms(9999, 12, 31, 23, 59, 59).unwrap();
        assert_eq!(format_timestamp(first).unwrap(), "0000-01-01T00:00:00.000000Z");
        assert_eq!(format_timestamp(last).unwrap(), "9999-12-31T23:59:59.000000Z");
    }

    #[test]
    fn refuses_instants_outside_the_profile() {
        let far = Utc.with_ymd_and_hms(10000, 1, 1, 0, 0, 0).unwrap()
            + chrono::Duration::microseconds(1);
        let before_zero = Utc.with_ymd_and_hms(-1, 1, 1, 0, 0, 0).unwrap();
        let leap = NaiveDate::from_ymd_opt(2016, 12, 31)
            .unwrap()
            .and_hms_micro_opt(23, 59, 59, 1_000_000)
            .unwrap();

        for err in [
            format_timestamp(far).unwrap_err(),
            format_timestamp(before_zero).unwrap_err(),
            format_timestamp(leap).unwrap_err(),
        ] {
            assert_eq!(err.kind(), crate::ErrorKind::Encoding);
        }
    }
}
