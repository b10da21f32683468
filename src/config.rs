use std::path::PathBuf;
use std::sync::Arc;

use crate::pipeline::aggregate::{CappedSpeed, HighestSpeed, MaxSpeedPolicy};
use crate::pipeline::validate::ValidationRules;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub data_dir: PathBuf,
    pub allow_stale_timestamps: bool,
    /// m/s; faster derived speeds are treated as GPS spikes by `/stats`.
    pub max_plausible_speed: Option<f64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            data_dir: PathBuf::from("data"),
            allow_stale_timestamps: false,
            max_plausible_speed: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let port = std::env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.port);

        let data_dir = std::env::var("DATA_DIR")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);

        let allow_stale_timestamps = std::env::var("ALLOW_STALE_TIMESTAMPS")
            .ok()
            .map(|s| matches!(s.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(defaults.allow_stale_timestamps);

        let max_plausible_speed = std::env::var("MAX_PLAUSIBLE_SPEED")
            .ok()
            .and_then(|s| s.parse::<f64>().ok())
            .filter(|v| v.is_finite() && *v > 0.0);

        Self {
            port,
            data_dir,
            allow_stale_timestamps,
            max_plausible_speed,
        }
    }

    pub fn validation_rules(&self) -> ValidationRules {
        ValidationRules {
            allow_stale_timestamps: self.allow_stale_timestamps,
            ..ValidationRules::default()
        }
    }

    pub fn max_speed_policy(&self) -> Arc<dyn MaxSpeedPolicy> {
        match self.max_plausible_speed {
            Some(ceiling) => Arc::new(CappedSpeed { ceiling }),
            None => Arc::new(HighestSpeed),
        }
    }
}
