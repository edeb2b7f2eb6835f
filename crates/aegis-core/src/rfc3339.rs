//! Minimal ISO-8601 UTC (`YYYY-MM-DDTHH:MM:SSZ`) formatting and parsing for
//! `SystemTime`, used by `serde(with = "rfc3339")` on wire timestamps (spec
//! §3 `last_heartbeat`, §6.2). No calendar crate is in the teacher's
//! dependency stack, so this uses the standard civil-from-days algorithm
//! (Howard Hinnant's `days_from_civil`/`civil_from_days`) rather than
//! pulling in `chrono`/`time` for a single field.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Deserializer, Serializer};

pub fn serialize<S: Serializer>(value: &SystemTime, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&format(*value))
}

pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<SystemTime, D::Error> {
    let raw = String::deserialize(d)?;
    parse(&raw).map_err(|e| serde::de::Error::custom(format!("invalid ISO-8601 timestamp: {e}")))
}

pub fn format(value: SystemTime) -> String {
    let secs = value
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs() as i64;
    let days = secs.div_euclid(86_400);
    let secs_of_day = secs.rem_euclid(86_400);
    let (year, month, day) = civil_from_days(days);
    let hour = secs_of_day / 3600;
    let minute = (secs_of_day % 3600) / 60;
    let second = secs_of_day % 60;
    format!("{year:04}-{month:02}-{day:02}T{hour:02}:{minute:02}:{second:02}Z")
}

pub fn parse(raw: &str) -> Result<SystemTime, &'static str> {
    let raw = raw.strip_suffix('Z').ok_or("missing trailing Z")?;
    let (date, time) = raw.split_once('T').ok_or("missing T separator")?;
    let mut date_parts = date.split('-');
    let year: i64 = date_parts
        .next()
        .ok_or("missing year")?
        .parse()
        .map_err(|_| "bad year")?;
    let month: u32 = date_parts
        .next()
        .ok_or("missing month")?
        .parse()
        .map_err(|_| "bad month")?;
    let day: u32 = date_parts
        .next()
        .ok_or("missing day")?
        .parse()
        .map_err(|_| "bad day")?;

    let mut time_parts = time.split(':');
    let hour: i64 = time_parts
        .next()
        .ok_or("missing hour")?
        .parse()
        .map_err(|_| "bad hour")?;
    let minute: i64 = time_parts
        .next()
        .ok_or("missing minute")?
        .parse()
        .map_err(|_| "bad minute")?;
    let second: i64 = time_parts
        .next()
        .ok_or("missing second")?
        .parse()
        .map_err(|_| "bad second")?;

    let days = days_from_civil(year, month, day);
    let total_secs = days * 86_400 + hour * 3600 + minute * 60 + second;
    if total_secs >= 0 {
        Ok(UNIX_EPOCH + Duration::from_secs(total_secs as u64))
    } else {
        UNIX_EPOCH
            .checked_sub(Duration::from_secs((-total_secs) as u64))
            .ok_or("timestamp before unix epoch overflow")
    }
}

/// Days since 1970-01-01 for a given proleptic Gregorian civil date.
fn days_from_civil(y: i64, m: u32, d: u32) -> i64 {
    let y = if m <= 2 { y - 1 } else { y };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = (y - era * 400) as i64; // [0, 399]
    let mp = ((m as i64 + 9) % 12) as i64; // [0, 11]
    let doy = (153 * mp + 2) / 5 + d as i64 - 1; // [0, 365]
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy; // [0, 146096]
    era * 146_097 + doe - 719_468
}

/// Inverse of [`days_from_civil`].
fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = z - era * 146_097; // [0, 146096]
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365; // [0, 399]
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100); // [0, 365]
    let mp = (5 * doy + 2) / 153; // [0, 11]
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32; // [1, 31]
    let m = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32; // [1, 12]
    (if m <= 2 { y + 1 } else { y }, m, d)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_canonical_example_from_spec() {
        let t = UNIX_EPOCH + Duration::from_secs(1_735_732_800); // 2025-01-01T12:00:00Z
        assert_eq!(format(t), "2025-01-01T12:00:00Z");
    }

    #[test]
    fn round_trips_through_parse_and_format() {
        let original = "2025-01-01T12:00:00Z";
        let parsed = parse(original).unwrap();
        assert_eq!(format(parsed), original);
    }

    #[test]
    fn rejects_missing_trailing_z() {
        assert!(parse("2025-01-01T12:00:00").is_err());
    }
}
