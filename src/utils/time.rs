//! RFC 3339 timestamps for serde.
//!
//! Use with `#[serde(with = "crate::utils::time")]` on an `OffsetDateTime`.

use serde::{Deserialize, Deserializer, Serializer};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

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

/// The current wall-clock time in UTC.
pub fn now() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

const MINUTES_PER_HOUR: i64 = 60;
const MINUTES_PER_DAY: i64 = 1_440;
const MINUTES_PER_MONTH: i64 = 43_200;

fn round_div(n: i64, d: i64) -> i64 {
    (n + d / 2) / d
}

fn plural(n: i64, unit: &str) -> String {
    if n == 1 {
        format!("1 {unit}")
    } else {
        format!("{n} {unit}s")
    }
}

/// Describes how far `then` lies from `now` in words, e.g. "3 minutes ago"
/// or "in about 2 hours".
///
/// The buckets are coarse: anything under half a minute is "less than a
/// minute", hours and months are "about", and years are "about", "over" or
/// "almost" depending on the leftover months.
pub fn format_relative(then: OffsetDateTime, now: OffsetDateTime) -> String {
    let seconds = (now - then).whole_seconds();
    let past = seconds >= 0;
    let minutes = round_div(seconds.abs(), 60);
    let distance = if minutes < 1 {
        "less than a minute".to_string()
    } else if minutes < 2 {
        "1 minute".to_string()
    } else if minutes < 45 {
        plural(minutes, "minute")
    } else if minutes < 90 {
        "about 1 hour".to_string()
    } else if minutes < MINUTES_PER_DAY {
        format!("about {}", plural(round_div(minutes, MINUTES_PER_HOUR), "hour"))
    } else if minutes < 2_520 {
        "1 day".to_string()
    } else if minutes < MINUTES_PER_MONTH {
        plural(round_div(minutes, MINUTES_PER_DAY), "day")
    } else if minutes < 2 * MINUTES_PER_MONTH {
        format!("about {}", plural(round_div(minutes, MINUTES_PER_MONTH), "month"))
    } else {
        let months = minutes / MINUTES_PER_MONTH;
        if months < 12 {
            plural(months, "month")
        } else {
            let (years, leftover) = (months / 12, months % 12);
            if leftover < 3 {
                format!("about {}", plural(years, "year"))
            } else if leftover < 9 {
                format!("over {}", plural(years, "year"))
            } else {
                format!("almost {}", plural(years + 1, "year"))
            }
        }
    };
    if past {
        format!("{distance} ago")
    } else {
        format!("in {distance}")
    }
}
