use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub lat: f64,
    pub lon: f64,
    pub altitude: f64,
}

/// Motion values exactly as the device reported them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Motion {
    pub speed_reported: f64,
    pub heading: f64,
    pub hdop: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixTime {
    /// Server time of the append, Unix milliseconds.
    pub created: i64,
    pub created_string: String,
    /// Seconds since the previous fix, 0 for the very first one.
    pub diff: f64,
    /// Seconds between the client timestamp and `created`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_duration: Option<f64>,
}

/// Meters relative to the previous fix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Distance {
    pub horizontal: f64,
    pub vertical: f64,
    pub total: f64,
}

/// Meters per second relative to the previous fix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Speed {
    pub horizontal: f64,
    pub vertical: f64,
    pub total: f64,
}

/// One stored GPS fix with its derived deltas.
///
/// `distance` and `speed` are absent on the first fix ever stored, since
/// there is nothing to measure against. `ignore` is only ever set by hand
/// in the day file and excludes the fix from aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fix {
    pub index: u64,
    pub user: String,
    pub position: Position,
    pub motion: Motion,
    pub time: FixTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<Distance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<Speed>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub ignore: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// A fix that passed request validation and has not been stored yet.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedFix {
    pub user: String,
    pub position: Position,
    pub motion: Motion,
    /// Client-side capture time in Unix milliseconds, if the client sent one.
    pub client_timestamp: Option<i64>,
}

/// Persisted content of one day file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DayLog {
    #[serde(default)]
    pub entries: Vec<Fix>,
}
