use crate::types::fix::Fix;
use crate::types::stats::TripStatistics;

/// A numeric field of a [`Fix`], addressed by its dotted JSON path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixField {
    TimeDiff,
    UploadDuration,
    ReportedSpeed,
    Heading,
    Hdop,
    Altitude,
    DistanceHorizontal,
    DistanceVertical,
    DistanceTotal,
    SpeedHorizontal,
    SpeedVertical,
    SpeedTotal,
}

impl FixField {
    pub fn from_path(path: &str) -> Option<Self> {
        match path {
            "time.diff" => Some(FixField::TimeDiff),
            "time.uploadDuration" => Some(FixField::UploadDuration),
            "motion.speedReported" => Some(FixField::ReportedSpeed),
            "motion.heading" => Some(FixField::Heading),
            "motion.hdop" => Some(FixField::Hdop),
            "position.altitude" => Some(FixField::Altitude),
            "distance.horizontal" => Some(FixField::DistanceHorizontal),
            "distance.vertical" => Some(FixField::DistanceVertical),
            "distance.total" => Some(FixField::DistanceTotal),
            "speed.horizontal" => Some(FixField::SpeedHorizontal),
            "speed.vertical" => Some(FixField::SpeedVertical),
            "speed.total" => Some(FixField::SpeedTotal),
            _ => None,
        }
    }

    pub fn path(&self) -> &'static str {
        match self {
            FixField::TimeDiff => "time.diff",
            FixField::UploadDuration => "time.uploadDuration",
            FixField::ReportedSpeed => "motion.speedReported",
            FixField::Heading => "motion.heading",
            FixField::Hdop => "motion.hdop",
            FixField::Altitude => "position.altitude",
            FixField::DistanceHorizontal => "distance.horizontal",
            FixField::DistanceVertical => "distance.vertical",
            FixField::DistanceTotal => "distance.total",
            FixField::SpeedHorizontal => "speed.horizontal",
            FixField::SpeedVertical => "speed.vertical",
            FixField::SpeedTotal => "speed.total",
        }
    }

    /// `None` when the fix does not carry this field.
    pub fn resolve(&self, fix: &Fix) -> Option<f64> {
        match self {
            FixField::TimeDiff => Some(fix.time.diff),
            FixField::UploadDuration => fix.time.upload_duration,
            FixField::ReportedSpeed => Some(fix.motion.speed_reported),
            FixField::Heading => Some(fix.motion.heading),
            FixField::Hdop => Some(fix.motion.hdop),
            FixField::Altitude => Some(fix.position.altitude),
            FixField::DistanceHorizontal => fix.distance.map(|d| d.horizontal),
            FixField::DistanceVertical => fix.distance.map(|d| d.vertical),
            FixField::DistanceTotal => fix.distance.map(|d| d.total),
            FixField::SpeedHorizontal => fix.speed.map(|s| s.horizontal),
            FixField::SpeedVertical => fix.speed.map(|s| s.vertical),
            FixField::SpeedTotal => fix.speed.map(|s| s.total),
        }
    }
}

/// Running sum and count of the values actually present.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MeanAccumulator {
    sum: f64,
    count: usize,
}

impl MeanAccumulator {
    pub fn push(&mut self, value: Option<f64>) {
        if let Some(value) = value {
            self.sum += value;
            self.count += 1;
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn mean(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum / self.count as f64)
        }
    }
}

pub fn mean<'a>(fixes: impl IntoIterator<Item = &'a Fix>, field: FixField) -> Option<f64> {
    let mut acc = MeanAccumulator::default();
    for fix in fixes {
        acc.push(field.resolve(fix));
    }
    acc.mean()
}

/// Chooses the trip's top speed from the non-ignored fixes.
pub trait MaxSpeedPolicy: Send + Sync {
    fn max_speed(&self, fixes: &[&Fix]) -> Option<f64>;
}

/// Highest derived horizontal speed, unfiltered.
#[derive(Debug, Clone, Copy, Default)]
pub struct HighestSpeed;

impl MaxSpeedPolicy for HighestSpeed {
    fn max_speed(&self, fixes: &[&Fix]) -> Option<f64> {
        fixes
            .iter()
            .filter_map(|fix| FixField::SpeedHorizontal.resolve(fix))
            .reduce(f64::max)
    }
}

/// Highest derived horizontal speed at or below `ceiling` m/s, so that
/// single GPS jumps do not show up as the trip's top speed.
#[derive(Debug, Clone, Copy)]
pub struct CappedSpeed {
    pub ceiling: f64,
}

impl MaxSpeedPolicy for CappedSpeed {
    fn max_speed(&self, fixes: &[&Fix]) -> Option<f64> {
        fixes
            .iter()
            .filter_map(|fix| FixField::SpeedHorizontal.resolve(fix))
            .filter(|speed| *speed <= self.ceiling)
            .reduce(f64::max)
    }
}

pub fn aggregate(fixes: &[Fix], policy: &dyn MaxSpeedPolicy) -> TripStatistics {
    let kept: Vec<&Fix> = fixes.iter().filter(|fix| !fix.ignore).collect();

    let mut ascent = MeanAccumulator::default();
    let mut descent = MeanAccumulator::default();
    let mut horizontal = MeanAccumulator::default();
    for fix in &kept {
        let Some(distance) = fix.distance else {
            continue;
        };
        horizontal.push(Some(distance.horizontal));
        ascent.push(Some(distance.vertical.max(0.0)));
        descent.push(Some(distance.vertical.min(0.0)));
    }

    TripStatistics {
        total_count: fixes.len(),
        used_count: kept.len(),
        ignored_count: fixes.len() - kept.len(),
        upload_mean: mean(kept.iter().copied(), FixField::UploadDuration),
        diff_mean: mean(kept.iter().copied(), FixField::TimeDiff),
        reported_speed_mean: mean(kept.iter().copied(), FixField::ReportedSpeed),
        horizontal_speed_mean: mean(kept.iter().copied(), FixField::SpeedHorizontal),
        max_speed: policy.max_speed(&kept),
        ascent_km: total_km(&ascent),
        descent_km: total_km(&descent),
        horizontal_distance_km: total_km(&horizontal),
    }
}

fn total_km(acc: &MeanAccumulator) -> Option<f64> {
    (acc.count > 0).then(|| acc.sum / 1000.0)
}
