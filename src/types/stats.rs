use serde::{Deserialize, Serialize};

const UNDEFINED: &str = "—";
const MS_TO_KMH: f64 = 3.6;

/// Trip statistics over the non-ignored fixes of a run.
///
/// Every mean and sum is `None` when no fix carried the underlying field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripStatistics {
    pub total_count: usize,
    pub used_count: usize,
    pub ignored_count: usize,
    /// Seconds.
    pub upload_mean: Option<f64>,
    /// Seconds.
    pub diff_mean: Option<f64>,
    /// m/s, as reported by the device.
    pub reported_speed_mean: Option<f64>,
    /// m/s, derived from consecutive fixes.
    pub horizontal_speed_mean: Option<f64>,
    /// m/s.
    pub max_speed: Option<f64>,
    pub ascent_km: Option<f64>,
    /// Kept negative.
    pub descent_km: Option<f64>,
    pub horizontal_distance_km: Option<f64>,
}

/// Display strings for a status panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSummary {
    pub data: String,
    pub upload: String,
    pub speed_reported: String,
    pub speed_calculated: String,
    pub max_speed: String,
    pub ascent: String,
    pub descent: String,
    pub distance: String,
}

impl TripStatistics {
    pub fn summary(&self) -> StatusSummary {
        StatusSummary {
            data: format!("{} ({} ignored)", self.used_count, self.ignored_count),
            upload: render(self.upload_mean, 1.0, 3, "s"),
            speed_reported: render(self.reported_speed_mean, MS_TO_KMH, 1, "km/h"),
            speed_calculated: render(self.horizontal_speed_mean, MS_TO_KMH, 1, "km/h"),
            max_speed: render(self.max_speed, MS_TO_KMH, 1, "km/h"),
            ascent: render(self.ascent_km, 1.0, 2, "km"),
            descent: render(self.descent_km, 1.0, 2, "km"),
            distance: render(self.horizontal_distance_km, 1.0, 2, "km"),
        }
    }
}

fn render(value: Option<f64>, scale: f64, decimals: usize, unit: &str) -> String {
    match value.map(|v| v * scale) {
        Some(v) if v.is_finite() => format!("{:.*} {}", decimals, v, unit),
        _ => UNDEFINED.to_string(),
    }
}
