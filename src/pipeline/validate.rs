use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use crate::error::ValidationError;
use crate::types::fix::{Motion, Position, ValidatedFix};

const USER_LEN: usize = 2;
const MAX_NUMBER_LEN: usize = 12;

/// Query parameters of a fix upload, unparsed.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct RawFix {
    pub user: Option<String>,
    pub lat: Option<String>,
    pub lon: Option<String>,
    pub timestamp: Option<String>,
    pub hdop: Option<String>,
    pub altitude: Option<String>,
    pub speed: Option<String>,
    pub heading: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ValidationRules {
    pub freshness_window: Duration,
    /// Accept client timestamps of any age.
    pub allow_stale_timestamps: bool,
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self {
            freshness_window: Duration::days(1),
            allow_stale_timestamps: false,
        }
    }
}

pub fn validate(
    raw: &RawFix,
    now: DateTime<Utc>,
    rules: &ValidationRules,
) -> Result<ValidatedFix, ValidationError> {
    let user = check_user(raw.user.as_deref())?;
    let lat = check_number("lat", raw.lat.as_deref(), -90.0, 90.0)?;
    let lon = check_number("lon", raw.lon.as_deref(), -180.0, 180.0)?;
    let timestamp = check_time(raw.timestamp.as_deref(), now, rules)?;
    let hdop = check_number("hdop", raw.hdop.as_deref(), 0.0, 100.0)?;
    let altitude = check_number("altitude", raw.altitude.as_deref(), 0.0, 10_000.0)?;
    let speed = check_number("speed", raw.speed.as_deref(), 0.0, 300.0)?;
    let heading = check_number("heading", raw.heading.as_deref(), 0.0, 360.0)?;

    Ok(ValidatedFix {
        user,
        position: Position { lat, lon, altitude },
        motion: Motion {
            speed_reported: speed,
            heading,
            hdop,
        },
        client_timestamp: Some(timestamp),
    })
}

fn check_user(value: Option<&str>) -> Result<String, ValidationError> {
    let value = value.ok_or_else(|| ValidationError::new("user", "is required"))?;
    if value.chars().count() != USER_LEN {
        return Err(ValidationError::new(
            "user",
            format!("must be exactly {} characters", USER_LEN),
        ));
    }
    Ok(value.to_string())
}

fn check_number(
    field: &'static str,
    value: Option<&str>,
    min: f64,
    max: f64,
) -> Result<f64, ValidationError> {
    let value = match value {
        Some(v) if !v.is_empty() => v,
        _ => return Err(ValidationError::new(field, "is required")),
    };
    if value.len() > MAX_NUMBER_LEN {
        return Err(ValidationError::new(
            field,
            format!("must have at most {} characters", MAX_NUMBER_LEN),
        ));
    }

    match value.trim().parse::<f64>() {
        Ok(n) if n.is_finite() && (min..=max).contains(&n) => Ok(n),
        _ => Err(ValidationError::new(
            field,
            format!("must be a number between {} and {}", min, max),
        )),
    }
}

fn check_time(
    value: Option<&str>,
    now: DateTime<Utc>,
    rules: &ValidationRules,
) -> Result<i64, ValidationError> {
    let value = value.ok_or_else(|| ValidationError::new("timestamp", "is required"))?;
    let millis = match value.trim().parse::<f64>() {
        Ok(n) if n.is_finite() => n as i64,
        _ => return Err(ValidationError::new("timestamp", "must be a number")),
    };
    if DateTime::from_timestamp_millis(millis).is_none() {
        return Err(ValidationError::new("timestamp", "must represent a valid date"));
    }

    if !rules.allow_stale_timestamps {
        let age = (now.timestamp_millis() - millis).abs();
        if age >= rules.freshness_window.num_milliseconds() {
            return Err(ValidationError::new(
                "timestamp",
                "must not be further from server time than the freshness window",
            ));
        }
    }

    Ok(millis)
}
