//! Service-level durations.
//!
//! Service levels are ISO-8601 durations restricted to the day-time subset
//! (`PnDTnHnMn.nS`, optional signs, case-insensitive), e.g. `P1D`, `PT8H`,
//! `P2DT4H30M`.

use chrono::TimeDelta;
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};

static DURATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^([-+]?)P(?:([-+]?[0-9]+)D)?(T(?:([-+]?[0-9]+)H)?(?:([-+]?[0-9]+)M)?(?:([-+]?[0-9]+)(?:[.,]([0-9]{0,9}))?S)?)?$",
    )
    .expect("valid duration regex")
});

/// Rejected service-level text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceLevelError {
    pub value: String,
}

impl Display for ServiceLevelError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "service level `{}` is not a valid ISO-8601 duration",
            self.value
        )
    }
}

impl Error for ServiceLevelError {}

/// Parses a service level into a signed duration.
pub fn parse_service_level(value: &str) -> Result<TimeDelta, ServiceLevelError> {
    let invalid = || ServiceLevelError {
        value: value.to_string(),
    };
    let caps = DURATION_RE.captures(value.trim()).ok_or_else(invalid)?;

    let days = caps.get(2);
    let time_part = caps.get(3);
    let hours = caps.get(4);
    let minutes = caps.get(5);
    let seconds = caps.get(6);

    if days.is_none() && time_part.is_none() {
        return Err(invalid());
    }
    if time_part.is_some() && hours.is_none() && minutes.is_none() && seconds.is_none() {
        return Err(invalid());
    }

    let number = |group: Option<regex::Match<'_>>| -> Result<i64, ServiceLevelError> {
        group.map_or(Ok(0), |m| m.as_str().parse::<i64>().map_err(|_| invalid()))
    };

    let mut total = TimeDelta::zero();
    let parts = [
        TimeDelta::try_days(number(days)?),
        TimeDelta::try_hours(number(hours)?),
        TimeDelta::try_minutes(number(minutes)?),
        TimeDelta::try_seconds(number(seconds)?),
    ];
    for part in parts {
        total = total
            .checked_add(&part.ok_or_else(invalid)?)
            .ok_or_else(invalid)?;
    }

    if let Some(fraction) = caps.get(7).filter(|m| !m.as_str().is_empty()) {
        let digits = fraction.as_str();
        let scale = 10_i64.pow(9 - digits.len() as u32);
        let nanos = digits.parse::<i64>().map_err(|_| invalid())? * scale;
        let negative_seconds = seconds.is_some_and(|m| m.as_str().starts_with('-'));
        let nanos = if negative_seconds { -nanos } else { nanos };
        total = total
            .checked_add(&TimeDelta::nanoseconds(nanos))
            .ok_or_else(invalid)?;
    }

    if &caps[1] == "-" {
        total = -total;
    }
    Ok(total)
}
