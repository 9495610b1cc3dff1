//! Serde adapters for the calendar and clock columns shared by entities and DTOs.

use time::{Date, Time, format_description::BorrowedFormatItem, macros::format_description};

const DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");
const CLOCK_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[hour]:[minute]");
const CLOCK_WITH_SECONDS_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[hour]:[minute]:[second]");

/// Parse a `YYYY-MM-DD` calendar date.
pub fn parse_date(value: &str) -> Result<Date, time::error::Parse> {
    Date::parse(value, DATE_FORMAT)
}

/// Render a calendar date as `YYYY-MM-DD`.
pub fn format_date(date: Date) -> String {
    date.format(DATE_FORMAT)
        .unwrap_or_else(|_| "invalid-date".into())
}

/// Parse a time of day given as `HH:MM` or `HH:MM:SS`; seconds are dropped.
pub fn parse_clock(value: &str) -> Result<Time, time::error::Parse> {
    let time = Time::parse(value, CLOCK_FORMAT)
        .or_else(|_| Time::parse(value, CLOCK_WITH_SECONDS_FORMAT))?;
    Ok(time.replace_second(0).unwrap_or(time))
}

/// Render a time of day as `HH:MM`.
pub fn format_clock(time: Time) -> String {
    time.format(CLOCK_FORMAT)
        .unwrap_or_else(|_| "invalid-time".into())
}

/// Blank form fields mean "not given".
fn non_blank(raw: Option<String>) -> Option<String> {
    raw.filter(|value| !value.trim().is_empty())
}

/// `#[serde(with = "...")]` module for `YYYY-MM-DD` dates.
pub mod date {
    use serde::{Deserialize, Deserializer, Serializer};
    use time::Date;

    pub fn serialize<S>(value: &Date, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format_date(*value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Date, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        super::parse_date(&raw).map_err(serde::de::Error::custom)
    }

    /// Same format for optional fields.
    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};
        use time::Date;

        pub fn serialize<S>(value: &Option<Date>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match value {
                Some(date) => serializer.serialize_str(&super::super::format_date(*date)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Date>, D::Error>
        where
            D: Deserializer<'de>,
        {
            super::super::non_blank(Option::<String>::deserialize(deserializer)?)
                .map(|raw| super::super::parse_date(&raw).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}

/// `#[serde(with = "...")]` module for `HH:MM` times of day.
pub mod clock {
    use serde::{Deserialize, Deserializer, Serializer};
    use time::Time;

    pub fn serialize<S>(value: &Time, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format_clock(*value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Time, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        super::parse_clock(&raw).map_err(serde::de::Error::custom)
    }

    /// Same format for optional fields.
    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};
        use time::Time;

        pub fn serialize<S>(value: &Option<Time>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match value {
                Some(time) => serializer.serialize_str(&super::super::format_clock(*time)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Time>, D::Error>
        where
            D: Deserializer<'de>,
        {
            super::super::non_blank(Option::<String>::deserialize(deserializer)?)
                .map(|raw| super::super::parse_clock(&raw).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}
